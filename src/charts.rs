use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One row of a chart series, as returned by `sp_cacm_dashboard`
///
/// `Kategori1` is the category label; the `Nilai*` columns carry the
/// budget, realization and (for summaries) percentage figures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartRow {
    #[serde(rename = "Kategori1")]
    pub kategori1: String,

    #[serde(rename = "Kategori2")]
    pub kategori2: Option<String>,

    #[serde(rename = "Nilai1")]
    pub nilai1: Option<f64>,

    #[serde(rename = "Nilai2")]
    pub nilai2: Option<f64>,

    #[serde(rename = "Nilai3")]
    pub nilai3: Option<f64>,
}

impl ChartRow {
    pub fn new(kategori1: impl Into<String>, nilai1: f64) -> Self {
        ChartRow {
            kategori1: kategori1.into(),
            kategori2: None,
            nilai1: Some(nilai1),
            nilai2: None,
            nilai3: None,
        }
    }
}

/// Named chart series of one dashboard, keyed by series name
pub type ChartPayload = BTreeMap<String, Vec<ChartRow>>;

/// The dashboard pages that share the filter cascade
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dashboard {
    /// Ringkasan APBDes (landing dashboard)
    Apbdes,
    Belanja,
    Pembiayaan,
}

const APBDES_SERIES: &[&str] = &[
    "ringkasan_apbdes",
    "pendapatan_perkelompok",
    "pendapatan_persumberdana",
    "belanja_persumberdana",
    "belanja_perkelompok",
    "belanja_pertagging_tertinggi",
    "belanja_pertagging_terendah",
];

const BELANJA_SERIES: &[&str] = &[
    "ringkasan_apbdes",
    "belanja_perkelompok",
    "belanja_pertagging_tertinggi",
    "belanja_pertagging_terendah",
    "belanja_persumberdana",
    "realisasi_belanja_persumberdana",
    "realisasi_belanja_desa_terendah",
    "realisasi_belanja_desa_tertinggi",
    "belanja_per_bidang",
    "belanja_barjas_persumberdana",
    "belanja_modal_persumberdana",
    "belanja_pegawai_persumberdana",
    "belanja_tidak_terduga_persumberdana",
    "belanja_bid_ppd_persumberdana",
    "belanja_bid_pm_persumberdana",
    "belanja_bid_pk_persumberdana",
    "belanja_bid_pbendes_persumberdana",
    "belanja_bid_ppdes_persumberdana",
    "desa_belanja_pegawai_tinggi",
    "desa_belanja_pegawai_rendah",
    "desa_belanja_modal_tinggi",
    "desa_belanja_modal_rendah",
];

const PEMBIAYAAN_SERIES: &[&str] = &[
    "ringkasan_pembiayaan",
    "pengeluaran_pembiayaan_persumberdana",
    "penyertaan_modal_tertinggi",
];

impl Dashboard {
    pub const ALL: [Dashboard; 3] = [Dashboard::Apbdes, Dashboard::Belanja, Dashboard::Pembiayaan];

    /// Path of the chart-data endpoint serving this dashboard
    pub fn path(&self) -> &'static str {
        match self {
            Dashboard::Apbdes => "/api/dashboard/chart-data",
            Dashboard::Belanja => "/api/dashboard/chart-data/belanja",
            Dashboard::Pembiayaan => "/api/dashboard/chart-data/pembiayaan",
        }
    }

    /// Series rendered first as summary cards
    pub fn summary_key(&self) -> &'static str {
        match self {
            Dashboard::Apbdes | Dashboard::Belanja => "ringkasan_apbdes",
            Dashboard::Pembiayaan => "ringkasan_pembiayaan",
        }
    }

    /// Every `@nmdashboard` name this dashboard asks for
    pub fn series(&self) -> &'static [&'static str] {
        match self {
            Dashboard::Apbdes => APBDES_SERIES,
            Dashboard::Belanja => BELANJA_SERIES,
            Dashboard::Pembiayaan => PEMBIAYAAN_SERIES,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dashboard::Apbdes => "apbdes",
            Dashboard::Belanja => "belanja",
            Dashboard::Pembiayaan => "pembiayaan",
        }
    }
}

impl fmt::Display for Dashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dashboard {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apbdes" | "" => Ok(Dashboard::Apbdes),
            "belanja" => Ok(Dashboard::Belanja),
            "pembiayaan" => Ok(Dashboard::Pembiayaan),
            other => Err(format!("Unknown dashboard: {}", other)),
        }
    }
}

/// Split a chart-data response into its summary series and the rest
///
/// A missing summary series comes back as an empty list.
pub fn split_payload(dashboard: Dashboard, mut payload: ChartPayload) -> (Vec<ChartRow>, ChartPayload) {
    let ringkasan = payload.remove(dashboard.summary_key()).unwrap_or_default();
    (ringkasan, payload)
}

/// What a dashboard page currently shows in its chart area
#[derive(Clone, Debug, Default)]
pub struct ChartView {
    /// Summary cards, rendered first
    pub ringkasan: Option<Vec<ChartRow>>,

    /// Remaining chart series
    pub detail: Option<ChartPayload>,

    pub loading_ringkasan: bool,
    pub loading_detail: bool,

    /// Shows the "data not available" panel
    pub unavailable: bool,
}

impl ChartView {
    pub fn begin(&mut self) {
        self.loading_ringkasan = true;
        self.loading_detail = true;
    }

    pub fn show_summary(&mut self, ringkasan: Vec<ChartRow>) {
        self.ringkasan = Some(ringkasan);
        self.loading_ringkasan = false;
        self.unavailable = false;
    }

    pub fn show_detail(&mut self, detail: ChartPayload) {
        self.detail = Some(detail);
        self.loading_detail = false;
    }

    pub fn fail(&mut self) {
        self.ringkasan = Some(Vec::new());
        self.detail = None;
        self.loading_ringkasan = false;
        self.loading_detail = false;
        self.unavailable = true;
    }

    pub fn is_loading(&self) -> bool {
        self.loading_ringkasan || self.loading_detail
    }
}
