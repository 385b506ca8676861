//! Read access to the Siskeudes reference tables and dashboard figures.
//!
//! The production data lives in an external database; [`SiskeudesStore`] is
//! the seam the HTTP handlers talk to. [`FileStore`] answers the same
//! questions from a JSON export of the tables.

use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::cascade::InitialSelection;
use crate::charts::ChartRow;
use crate::options::FilterOption;
use crate::selection::Selection;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read store: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse store: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Parameters of one dashboard query
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DashboardQuery {
    pub tahun: String,
    pub selection: Selection,
}

pub trait SiskeudesStore: Send + Sync {
    fn provinsi(&self) -> Result<Vec<FilterOption>, StoreError>;

    /// Pemda list, optionally restricted to one provinsi
    fn pemda(&self, kd_prov: Option<&str>) -> Result<Vec<FilterOption>, StoreError>;

    fn kecamatan(&self, kd_pemda: &str) -> Result<Vec<FilterOption>, StoreError>;

    fn desa(&self, kd_kec: &str) -> Result<Vec<FilterOption>, StoreError>;

    fn sumber_dana(&self) -> Result<Vec<FilterOption>, StoreError>;

    /// Names of a pemda and its provinsi, `None` for unknown codes
    fn pemda_detail(&self, kd_pemda: &str) -> Result<Option<InitialSelection>, StoreError>;

    /// One named dashboard series under the given filters
    fn dashboard(&self, series: &str, query: &DashboardQuery) -> Result<Vec<ChartRow>, StoreError>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProvinsiRow {
    #[serde(rename = "Kd_Prov")]
    pub kd_prov: String,
    #[serde(rename = "Nama_Provinsi")]
    pub nama: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PemdaRow {
    #[serde(rename = "Kd_Pemda")]
    pub kd_pemda: String,
    #[serde(rename = "Kd_Prov")]
    pub kd_prov: String,
    #[serde(rename = "Nama_Pemda")]
    pub nama: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KecamatanRow {
    #[serde(rename = "Kd_Kec")]
    pub kd_kec: String,
    #[serde(rename = "Kd_Pemda")]
    pub kd_pemda: String,
    #[serde(rename = "Nama_Kecamatan")]
    pub nama: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DesaRow {
    #[serde(rename = "Kd_Desa")]
    pub kd_desa: String,
    #[serde(rename = "Kd_Kec")]
    pub kd_kec: String,
    #[serde(rename = "Nama_Desa")]
    pub nama: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SumberDanaRow {
    #[serde(rename = "Kode")]
    pub kode: String,
    #[serde(rename = "Nama_Sumber")]
    pub nama: String,
    #[serde(rename = "Urut", default)]
    pub urut: i32,
}

/// One pre-aggregated figure for a desa, year and sumber dana
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FactRow {
    #[serde(rename = "Tahun")]
    pub tahun: String,
    #[serde(rename = "Kd_Desa")]
    pub kd_desa: String,
    #[serde(rename = "Sumber_Dana", default)]
    pub sumber_dana: Option<String>,
    #[serde(rename = "Dashboard")]
    pub dashboard: String,
    #[serde(rename = "Kategori1")]
    pub kategori1: String,
    #[serde(rename = "Kategori2", default)]
    pub kategori2: Option<String>,
    #[serde(rename = "Nilai1", default)]
    pub nilai1: Option<f64>,
    #[serde(rename = "Nilai2", default)]
    pub nilai2: Option<f64>,
    #[serde(rename = "Nilai3", default)]
    pub nilai3: Option<f64>,
}

/// Layout of `siskeudes.json`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SiskeudesData {
    #[serde(default)]
    pub provinsi: Vec<ProvinsiRow>,
    #[serde(default)]
    pub pemda: Vec<PemdaRow>,
    #[serde(default)]
    pub kecamatan: Vec<KecamatanRow>,
    #[serde(default)]
    pub desa: Vec<DesaRow>,
    #[serde(default)]
    pub sumber_dana: Vec<SumberDanaRow>,
    #[serde(default)]
    pub facts: Vec<FactRow>,
}

/// Geographic chain of one desa
#[derive(Clone, Debug)]
struct Lineage {
    kd_prov: String,
    kd_pemda: String,
    kd_kec: String,
}

pub struct FileStore {
    data: SiskeudesData,
    lineage: HashMap<String, Lineage>,
}

/// 1-based `SUBSTRING(code, start, len)`, tolerant of short codes
fn substring(code: &str, start: usize, len: usize) -> &str {
    let from = (start - 1).min(code.len());
    let to = (from + len).min(code.len());
    code.get(from..to).unwrap_or_default()
}

impl FileStore {
    pub fn new(data: SiskeudesData) -> Self {
        let kec_pemda: HashMap<&str, &str> = data
            .kecamatan
            .iter()
            .map(|k| (k.kd_kec.as_str(), k.kd_pemda.as_str()))
            .collect();
        let pemda_prov: HashMap<&str, &str> = data
            .pemda
            .iter()
            .map(|p| (p.kd_pemda.as_str(), p.kd_prov.as_str()))
            .collect();

        let mut lineage = HashMap::new();
        for desa in &data.desa {
            let kd_pemda = kec_pemda
                .get(desa.kd_kec.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| substring(&desa.kd_kec, 1, 4).to_string());
            let kd_prov = pemda_prov
                .get(kd_pemda.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| substring(&kd_pemda, 1, 2).to_string());
            lineage.insert(
                desa.kd_desa.clone(),
                Lineage {
                    kd_prov,
                    kd_pemda,
                    kd_kec: desa.kd_kec.clone(),
                },
            );
        }

        FileStore { data, lineage }
    }

    /// Load `siskeudes.json`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let contents = fs::read_to_string(path)?;
        let data: SiskeudesData = serde_json::from_str(&contents)?;
        info!(
            "Loaded store from {}: {} pemda, {} desa, {} facts",
            path.display(),
            data.pemda.len(),
            data.desa.len(),
            data.facts.len()
        );
        Ok(Self::new(data))
    }

    fn matches(&self, fact: &FactRow, series: &str, query: &DashboardQuery) -> bool {
        if fact.dashboard != series || fact.tahun != query.tahun {
            return false;
        }

        let sel = &query.selection;
        if let Some(sd) = sel.sumberdana.as_deref() {
            if fact.sumber_dana.as_deref() != Some(sd) {
                return false;
            }
        }
        if let Some(desa) = sel.desa.as_deref() {
            if fact.kd_desa != desa {
                return false;
            }
        }

        let needs_lineage = sel.provinsi.is_some() || sel.pemda.is_some() || sel.kecamatan.is_some();
        if !needs_lineage {
            return true;
        }
        let Some(lineage) = self.lineage.get(&fact.kd_desa) else {
            return false;
        };
        sel.provinsi.as_deref().is_none_or(|p| lineage.kd_prov == p)
            && sel.pemda.as_deref().is_none_or(|p| lineage.kd_pemda == p)
            && sel.kecamatan.as_deref().is_none_or(|k| lineage.kd_kec == k)
    }
}

fn add(total: Option<f64>, value: Option<f64>) -> Option<f64> {
    match (total, value) {
        (Some(a), Some(b)) => Some(a + b),
        (a, b) => a.or(b),
    }
}

/// Sum fact rows per `(Kategori1, Kategori2)`, keeping first-seen order
///
/// `Nilai3` is a percentage; when present it is recomputed from the summed
/// `Nilai2 / Nilai1` instead of being added up.
pub fn aggregate<'a>(facts: impl Iterator<Item = &'a FactRow>) -> Vec<ChartRow> {
    let mut rows: Vec<ChartRow> = Vec::new();
    let mut index: HashMap<(String, Option<String>), usize> = HashMap::new();

    for fact in facts {
        let key = (fact.kategori1.clone(), fact.kategori2.clone());
        let i = *index.entry(key).or_insert_with(|| {
            rows.push(ChartRow {
                kategori1: fact.kategori1.clone(),
                kategori2: fact.kategori2.clone(),
                nilai1: None,
                nilai2: None,
                nilai3: None,
            });
            rows.len() - 1
        });
        let row = &mut rows[i];
        row.nilai1 = add(row.nilai1, fact.nilai1);
        row.nilai2 = add(row.nilai2, fact.nilai2);
        if fact.nilai3.is_some() {
            row.nilai3 = Some(0.0);
        }
    }

    for row in &mut rows {
        if row.nilai3.is_some() {
            row.nilai3 = match (row.nilai1, row.nilai2) {
                (Some(anggaran), Some(realisasi)) if anggaran != 0.0 => {
                    Some((realisasi / anggaran * 10000.0).round() / 100.0)
                }
                _ => Some(0.0),
            };
        }
    }
    rows
}

impl SiskeudesStore for FileStore {
    fn provinsi(&self) -> Result<Vec<FilterOption>, StoreError> {
        let mut rows: Vec<&ProvinsiRow> = self.data.provinsi.iter().collect();
        rows.sort_by(|a, b| a.kd_prov.cmp(&b.kd_prov));
        Ok(rows
            .into_iter()
            .map(|p| FilterOption::new(p.kd_prov.clone(), format!("{}  {}", p.kd_prov, p.nama)))
            .collect())
    }

    fn pemda(&self, kd_prov: Option<&str>) -> Result<Vec<FilterOption>, StoreError> {
        let mut rows: Vec<&PemdaRow> = self
            .data
            .pemda
            .iter()
            .filter(|p| kd_prov.is_none_or(|prov| p.kd_prov == prov))
            .collect();
        rows.sort_by(|a, b| a.kd_pemda.cmp(&b.kd_pemda));
        Ok(rows
            .into_iter()
            .map(|p| {
                let label = format!("{}  {}", substring(&p.kd_pemda, 3, 2), p.nama);
                FilterOption::new(p.kd_pemda.clone(), label)
            })
            .collect())
    }

    fn kecamatan(&self, kd_pemda: &str) -> Result<Vec<FilterOption>, StoreError> {
        let mut rows: Vec<&KecamatanRow> =
            self.data.kecamatan.iter().filter(|k| k.kd_pemda == kd_pemda).collect();
        rows.sort_by(|a, b| a.kd_kec.cmp(&b.kd_kec));
        Ok(rows
            .into_iter()
            .map(|k| {
                let label = format!("{}  {}", substring(&k.kd_kec, 6, 2), k.nama);
                FilterOption::new(k.kd_kec.clone(), label)
            })
            .collect())
    }

    fn desa(&self, kd_kec: &str) -> Result<Vec<FilterOption>, StoreError> {
        let mut rows: Vec<&DesaRow> = self.data.desa.iter().filter(|d| d.kd_kec == kd_kec).collect();
        rows.sort_by(|a, b| a.kd_desa.cmp(&b.kd_desa));
        Ok(rows
            .into_iter()
            .map(|d| {
                let label = format!("{}  {}", substring(&d.kd_desa, 6, 7), d.nama);
                FilterOption::new(d.kd_desa.clone(), label)
            })
            .collect())
    }

    fn sumber_dana(&self) -> Result<Vec<FilterOption>, StoreError> {
        let mut rows: Vec<&SumberDanaRow> = self.data.sumber_dana.iter().collect();
        rows.sort_by_key(|s| s.urut);
        Ok(rows
            .into_iter()
            .map(|s| FilterOption::new(s.kode.clone(), format!("{}  {}", s.kode, s.nama)))
            .collect())
    }

    fn pemda_detail(&self, kd_pemda: &str) -> Result<Option<InitialSelection>, StoreError> {
        let Some(pemda) = self.data.pemda.iter().find(|p| p.kd_pemda == kd_pemda) else {
            return Ok(None);
        };
        let provinsi = self
            .data
            .provinsi
            .iter()
            .find(|p| p.kd_prov == pemda.kd_prov)
            .map(|p| p.nama.clone())
            .unwrap_or_default();

        Ok(Some(InitialSelection {
            kd_prov: pemda.kd_prov.clone(),
            provinsi,
            kd_pemda: pemda.kd_pemda.clone(),
            pemda: pemda.nama.clone(),
        }))
    }

    fn dashboard(&self, series: &str, query: &DashboardQuery) -> Result<Vec<ChartRow>, StoreError> {
        Ok(aggregate(
            self.data.facts.iter().filter(|f| self.matches(f, series, query)),
        ))
    }
}
