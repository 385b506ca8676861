#![cfg(not(tarpaulin_include))]

use crate::charts::ChartPayload;
use std::error::Error;

const HEADER: [&str; 6] = ["series", "Kategori1", "Kategori2", "Nilai1", "Nilai2", "Nilai3"];

fn escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Convert a dashboard's series to CSV format
///
/// One row per chart row, prefixed with its series name. Text fields
/// containing commas, quotes or newlines are quoted; missing values are
/// left empty.
///
/// # Arguments
/// * `payload` - Series of one dashboard
///
/// # Returns
/// * `Result<String, Box<dyn Error>>` - CSV content as a string or an error
///
/// # Examples
/// ```
/// use cacm_desa::charts::{ChartPayload, ChartRow};
/// use cacm_desa::downloader::to_csv;
///
/// let mut payload = ChartPayload::new();
/// payload.insert("belanja_perkelompok".to_string(), vec![ChartRow::new("Belanja Modal", 10.0)]);
///
/// let csv = to_csv(&payload).unwrap();
/// assert_eq!(
///     csv,
///     "series,Kategori1,Kategori2,Nilai1,Nilai2,Nilai3\nbelanja_perkelompok,Belanja Modal,,10,,\n"
/// );
/// ```
pub fn to_csv(payload: &ChartPayload) -> Result<String, Box<dyn Error>> {
    let mut csv_content = HEADER.join(",");
    csv_content.push('\n');

    for (series, rows) in payload {
        for row in rows {
            let fields = [
                escape(series),
                escape(&row.kategori1),
                escape(row.kategori2.as_deref().unwrap_or_default()),
                number(row.nilai1),
                number(row.nilai2),
                number(row.nilai3),
            ];
            csv_content.push_str(&fields.join(","));
            csv_content.push('\n');
        }
    }

    Ok(csv_content)
}

/// Convert a dashboard's series to XLSX format
///
/// Writes a single worksheet with the same columns as [`to_csv`].
///
/// # Arguments
/// * `payload` - Series of one dashboard
///
/// # Returns
/// * `Result<Vec<u8>, Box<dyn Error>>` - XLSX file content as bytes or an error
pub fn to_xlsx(payload: &ChartPayload) -> Result<Vec<u8>, Box<dyn Error>> {
    use rust_xlsxwriter::{Workbook, Worksheet};

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();

    for (c, title) in HEADER.iter().enumerate() {
        worksheet.write_string(0, c as u16, *title)?;
    }

    let mut r: u32 = 1;
    for (series, rows) in payload {
        for row in rows {
            worksheet.write_string(r, 0, series)?;
            worksheet.write_string(r, 1, &row.kategori1)?;
            if let Some(k2) = &row.kategori2 {
                worksheet.write_string(r, 2, k2)?;
            }
            for (c, value) in [row.nilai1, row.nilai2, row.nilai3].into_iter().enumerate() {
                if let Some(v) = value {
                    worksheet.write_number(r, 3 + c as u16, v)?;
                }
            }
            r += 1;
        }
    }

    workbook.push_worksheet(worksheet);
    let buffer = workbook.save_to_buffer()?;

    Ok(buffer)
}
