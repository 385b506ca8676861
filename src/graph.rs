#![cfg(not(tarpaulin_include))]

use crate::charts::ChartRow;
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use plotters::prelude::*;
use std::io::Cursor;

/// Configuration options for chart rendering
///
/// The bitmap is rendered without a font backend, so charts carry no text;
/// category names travel alongside the image (see the `x-categories` header
/// set by the chart route).
#[derive(Clone, Debug)]
pub struct GraphOptions {
    /// Width of the graph in pixels
    pub width: u32,

    /// Height of the graph in pixels
    pub height: u32,

    pub bar_color: RGBColor,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            bar_color: BLUE,
        }
    }
}

/// Render one chart series as a PNG bar chart
///
/// Each row becomes one bar of height `Nilai1`, in row order.
/// Rows without a value are drawn as zero.
///
/// # Arguments
/// * `rows` - Rows of the series
/// * `options` - Image size and bar color
///
/// # Returns
/// * A Result containing the PNG image data as bytes or an error
pub fn create_bar_chart(
    rows: &[ChartRow],
    options: &GraphOptions,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let (width, height) = (options.width, options.height);
    let mut buffer = vec![0u8; (width * height * 3) as usize];

    let values: Vec<f64> = rows.iter().map(|r| r.nilai1.unwrap_or(0.0)).collect();

    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&WHITE)?;

        let max_y = values.iter().cloned().fold(0.0_f64, f64::max);
        let min_y = values.iter().cloned().fold(0.0_f64, f64::min);
        let top = if max_y > 0.0 { max_y * 1.1 } else { 1.0 };
        let count = values.len().max(1) as f64;

        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .build_cartesian_2d(0.0..count, (min_y * 1.1)..top)?;

        chart.draw_series(values.iter().enumerate().map(|(i, &v)| {
            let x = i as f64;
            Rectangle::new([(x + 0.15, 0.0), (x + 0.85, v)], options.bar_color.filled())
        }))?;

        // zero line
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(0.0, 0.0), (count, 0.0)],
            BLACK,
        )))?;

        root.present()?;
    }

    let image = RgbImage::from_raw(width, height, buffer).ok_or("chart buffer has the wrong size")?;
    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image).write_to(&mut png, ImageOutputFormat::Png)?;

    Ok(png.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_png() {
        let rows = vec![
            ChartRow::new("Dana Desa", 1200.0),
            ChartRow::new("Alokasi Dana Desa", 800.0),
        ];
        let options = GraphOptions {
            width: 320,
            height: 240,
            ..GraphOptions::default()
        };
        let png = create_bar_chart(&rows, &options).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn empty_series_still_renders() {
        let png = create_bar_chart(&[], &GraphOptions::default()).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
