use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// Leading short code of an option label, e.g. the `13  ` in `13  Kab. Probolinggo`
    static ref LABEL_CODE: Regex = Regex::new(r"^\s*[\d.]+\s{2}\s*").unwrap();
}

/// A single entry of a filter dropdown
///
/// The filters endpoint sends a different field pair for each slot
/// (`Kd_Prov`/`provinsi`, `Kd_Pemda`/`namapemda`, `Kd_Kec`/`kecamatan`,
/// `Kd_Desa`/`desa`, `Kode`/`sumberdana`); all of them land here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOption {
    #[serde(alias = "Kd_Prov", alias = "Kd_Pemda", alias = "Kd_Kec", alias = "Kd_Desa", alias = "Kode")]
    pub code: String,

    #[serde(
        alias = "provinsi",
        alias = "namapemda",
        alias = "kecamatan",
        alias = "desa",
        alias = "sumberdana"
    )]
    pub label: String,
}

impl FilterOption {
    pub fn new(code: impl Into<String>, label: impl Into<String>) -> Self {
        FilterOption {
            code: code.into(),
            label: label.into(),
        }
    }

    /// Label without its leading short code
    pub fn display_name(&self) -> String {
        strip_code(&self.label)
    }
}

/// Remove the `"<code>  "` prefix from an option label
///
/// # Examples
/// ```
/// use cacm_desa::options::strip_code;
///
/// assert_eq!(strip_code("13  Kab. Probolinggo"), "Kab. Probolinggo");
/// assert_eq!(strip_code("01.2001  Ngadisari"), "Ngadisari");
/// assert_eq!(strip_code("Dana Desa"), "Dana Desa");
/// ```
pub fn strip_code(label: &str) -> String {
    LABEL_CODE.replace(label, "").trim().to_string()
}

/// Loading state of one slot's option list
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionState {
    /// Nothing cached
    Unset,
    /// Holds placeholder entries so the selected label can render
    Seeded,
    /// Holds the complete list from the server
    Loaded,
}

/// Cached option list for one slot
#[derive(Clone, Debug, Default)]
pub struct OptionSet {
    pub items: Vec<FilterOption>,

    /// True once the complete list was fetched
    pub fully_loaded: bool,

    /// Parent code of the load currently in flight (`Some(None)` for parentless slots)
    pending: Option<Option<String>>,
}

impl OptionSet {
    /// An option set holding placeholder entries only
    pub fn seeded(items: Vec<FilterOption>) -> Self {
        OptionSet {
            items,
            fully_loaded: false,
            pending: None,
        }
    }

    pub fn state(&self) -> OptionState {
        if self.fully_loaded {
            OptionState::Loaded
        } else if self.items.is_empty() {
            OptionState::Unset
        } else {
            OptionState::Seeded
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every cached entry and forget any load in flight
    pub fn clear(&mut self) {
        self.items.clear();
        self.fully_loaded = false;
        self.pending = None;
    }

    /// Whether a load for `parent` is already on its way
    pub fn is_loading(&self, parent: Option<&str>) -> bool {
        matches!(&self.pending, Some(p) if p.as_deref() == parent)
    }

    pub fn begin_load(&mut self, parent: Option<&str>) {
        self.pending = Some(parent.map(str::to_string));
    }

    /// Replace the list with a complete server response
    pub fn finish_load(&mut self, items: Vec<FilterOption>) {
        self.items = items;
        self.fully_loaded = true;
        self.pending = None;
    }

    /// A failed load leaves an empty dropdown
    pub fn fail_load(&mut self) {
        self.clear();
    }

    pub fn find(&self, code: &str) -> Option<&FilterOption> {
        self.items.iter().find(|o| o.code == code)
    }

    /// Display name of `code`, if the cache knows it
    pub fn display_name_for(&self, code: &str) -> Option<String> {
        self.find(code)
            .map(FilterOption::display_name)
            .filter(|name| !name.is_empty())
    }

    /// Case-insensitive label search, as typed into the dropdown's search box
    pub fn search(&self, query: &str) -> Vec<&FilterOption> {
        let q = query.trim().to_lowercase();
        self.items
            .iter()
            .filter(|o| q.is_empty() || o.label.to_lowercase().contains(&q))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_every_wire_shape() {
        let prov: FilterOption =
            serde_json::from_str(r#"{"provinsi":"35  Jawa Timur","Kd_Prov":"35"}"#).unwrap();
        assert_eq!(prov, FilterOption::new("35", "35  Jawa Timur"));

        let pemda: FilterOption =
            serde_json::from_str(r#"{"namapemda":"13  Kab. Probolinggo","Kd_Pemda":"3513"}"#)
                .unwrap();
        assert_eq!(pemda.code, "3513");

        let kec: FilterOption =
            serde_json::from_str(r#"{"kecamatan":"01  Sukapura","Kd_Kec":"3513.01"}"#).unwrap();
        assert_eq!(kec.display_name(), "Sukapura");

        let desa: FilterOption =
            serde_json::from_str(r#"{"desa":"01.2001  Ngadisari","Kd_Desa":"3513.01.2001"}"#)
                .unwrap();
        assert_eq!(desa.display_name(), "Ngadisari");

        let sd: FilterOption =
            serde_json::from_str(r#"{"sumberdana":"DDS  Dana Desa","Kode":"DDS"}"#).unwrap();
        assert_eq!(sd.code, "DDS");
    }

    #[test]
    fn state_tracks_seed_and_full_load() {
        let mut set = OptionSet::default();
        assert_eq!(set.state(), OptionState::Unset);

        set = OptionSet::seeded(vec![FilterOption::new("35", "35  Jawa Timur")]);
        assert_eq!(set.state(), OptionState::Seeded);

        set.begin_load(None);
        assert!(set.is_loading(None));
        set.finish_load(vec![
            FilterOption::new("35", "35  Jawa Timur"),
            FilterOption::new("52", "52  Nusa Tenggara Barat"),
        ]);
        assert_eq!(set.state(), OptionState::Loaded);
        assert!(!set.is_loading(None));

        set.fail_load();
        assert_eq!(set.state(), OptionState::Unset);
    }

    #[test]
    fn loading_is_tracked_per_parent() {
        let mut set = OptionSet::default();
        set.begin_load(Some("35"));
        assert!(set.is_loading(Some("35")));
        assert!(!set.is_loading(Some("52")));
        assert!(!set.is_loading(None));
    }

    #[test]
    fn search_matches_labels() {
        let set = OptionSet::seeded(vec![
            FilterOption::new("3513", "13  Kab. Probolinggo"),
            FilterOption::new("3514", "14  Kab. Pasuruan"),
        ]);
        assert_eq!(set.search("pasu").len(), 1);
        assert_eq!(set.search("").len(), 2);
        assert_eq!(
            set.display_name_for("3513").as_deref(),
            Some("Kab. Probolinggo")
        );
        assert_eq!(set.display_name_for("9999"), None);
    }
}
