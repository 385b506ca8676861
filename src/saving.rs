use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::charts::{ChartPayload, Dashboard};

/// Every dashboard of one pemda and fiscal year, computed by a refresh
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub kd_pemda: String,
    pub tahun: String,

    /// Unix seconds of the refresh that produced this snapshot
    pub created_at: i64,

    pub apbdes: ChartPayload,
    pub belanja: ChartPayload,
    pub pembiayaan: ChartPayload,
}

impl Snapshot {
    pub fn payload(&self, dashboard: Dashboard) -> &ChartPayload {
        match dashboard {
            Dashboard::Apbdes => &self.apbdes,
            Dashboard::Belanja => &self.belanja,
            Dashboard::Pembiayaan => &self.pembiayaan,
        }
    }

    pub fn payload_mut(&mut self, dashboard: Dashboard) -> &mut ChartPayload {
        match dashboard {
            Dashboard::Apbdes => &mut self.apbdes,
            Dashboard::Belanja => &mut self.belanja,
            Dashboard::Pembiayaan => &mut self.pembiayaan,
        }
    }
}

pub fn snapshot_path(dir: &Path, kd_pemda: &str, tahun: &str) -> PathBuf {
    dir.join(format!("{}_{}.bin.gz", kd_pemda, tahun))
}

pub fn save_snapshot(snapshot: &Snapshot, filename: &Path) -> std::io::Result<()> {
    if let Some(parent) = filename.parent() {
        create_dir_all(parent)?;
    }

    let file = File::create(filename)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut writer = std::io::BufWriter::new(encoder);

    serialize_into(&mut writer, snapshot).map_err(std::io::Error::other)?;

    let encoder = writer.into_inner().map_err(|e| e.into_error())?;
    encoder.finish()?.flush()?;

    Ok(())
}

pub fn load_snapshot(filename: &Path) -> std::io::Result<Snapshot> {
    let file = File::open(filename)?;
    let decoder = GzDecoder::new(file);
    let mut reader = std::io::BufReader::new(decoder);

    let snapshot: Snapshot = deserialize_from(&mut reader)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::ChartRow;

    #[test]
    fn snapshot_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = snapshot_path(&dir.path().join("snapshots"), "3513", "2024");
        assert!(path.ends_with("snapshots/3513_2024.bin.gz"));

        let mut snapshot = Snapshot {
            kd_pemda: "3513".into(),
            tahun: "2024".into(),
            created_at: 1_700_000_000,
            ..Snapshot::default()
        };
        snapshot
            .payload_mut(Dashboard::Pembiayaan)
            .insert("ringkasan_pembiayaan".into(), vec![ChartRow::new("Penerimaan", 25.0)]);

        save_snapshot(&snapshot, &path).unwrap();
        let loaded = load_snapshot(&path).unwrap();
        assert_eq!(loaded, snapshot);
        assert!(loaded.payload(Dashboard::Apbdes).is_empty());
    }

    #[test]
    fn missing_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_snapshot(&dir.path().join("nope.bin.gz")).is_err());
    }
}
