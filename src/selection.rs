use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the five filter slots on a dashboard page
///
/// The first four form the geographic chain (provinsi > pemda > kecamatan > desa).
/// Sumber dana stands on its own and has no parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Provinsi,
    Pemda,
    Kecamatan,
    Desa,
    SumberDana,
}

impl Slot {
    /// All slots, in display order.
    pub const ALL: [Slot; 5] = [
        Slot::Provinsi,
        Slot::Pemda,
        Slot::Kecamatan,
        Slot::Desa,
        Slot::SumberDana,
    ];

    /// Name used for the `type` parameter of the filters endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Provinsi => "provinsi",
            Slot::Pemda => "pemda",
            Slot::Kecamatan => "kecamatan",
            Slot::Desa => "desa",
            Slot::SumberDana => "sumberdana",
        }
    }

    /// The slot whose code scopes this slot's option list
    pub fn parent(&self) -> Option<Slot> {
        match self {
            Slot::Pemda => Some(Slot::Provinsi),
            Slot::Kecamatan => Some(Slot::Pemda),
            Slot::Desa => Some(Slot::Kecamatan),
            Slot::Provinsi | Slot::SumberDana => None,
        }
    }

    /// The slot directly below this one in the geographic chain
    pub fn child(&self) -> Option<Slot> {
        match self {
            Slot::Provinsi => Some(Slot::Pemda),
            Slot::Pemda => Some(Slot::Kecamatan),
            Slot::Kecamatan => Some(Slot::Desa),
            Slot::Desa | Slot::SumberDana => None,
        }
    }

    /// Every slot below this one in the geographic chain, nearest first
    pub fn descendants(&self) -> Vec<Slot> {
        let mut out = Vec::new();
        let mut next = self.child();
        while let Some(slot) = next {
            out.push(slot);
            next = slot.child();
        }
        out
    }

    /// Query key carrying the parent code on the filters endpoint
    pub fn parent_key(&self) -> Option<&'static str> {
        match self.parent()? {
            Slot::Provinsi => Some("kdProv"),
            Slot::Pemda => Some("kdPemda"),
            Slot::Kecamatan => Some("kdKec"),
            Slot::Desa | Slot::SumberDana => None,
        }
    }

    /// Query key used by the chart-data endpoints
    pub fn chart_key(&self) -> &'static str {
        match self {
            Slot::Provinsi => "kdprov",
            Slot::Pemda => "kdpemda",
            Slot::Kecamatan => "kdkec",
            Slot::Desa => "kddesa",
            Slot::SumberDana => "kdsumberdana",
        }
    }

    /// Label shown on the filter modal
    pub fn label(&self) -> &'static str {
        match self {
            Slot::Provinsi => "Provinsi",
            Slot::Pemda => "Pemda",
            Slot::Kecamatan => "Kecamatan",
            Slot::Desa => "Desa",
            Slot::SumberDana => "Sumber Dana",
        }
    }

    fn index(&self) -> usize {
        match self {
            Slot::Provinsi => 0,
            Slot::Pemda => 1,
            Slot::Kecamatan => 2,
            Slot::Desa => 3,
            Slot::SumberDana => 4,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Slot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "provinsi" | "prov" => Ok(Slot::Provinsi),
            "pemda" => Ok(Slot::Pemda),
            "kecamatan" | "kec" => Ok(Slot::Kecamatan),
            "desa" => Ok(Slot::Desa),
            "sumberdana" | "sd" => Ok(Slot::SumberDana),
            other => Err(format!("Unknown filter type: {}", other)),
        }
    }
}

/// Current filter selection of a dashboard page
///
/// Every slot holds an optional code. `None` means "Semua" (no filter).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub provinsi: Option<String>,
    pub pemda: Option<String>,
    pub kecamatan: Option<String>,
    pub desa: Option<String>,
    pub sumberdana: Option<String>,
}

impl Selection {
    pub fn get(&self, slot: Slot) -> Option<&str> {
        match slot {
            Slot::Provinsi => self.provinsi.as_deref(),
            Slot::Pemda => self.pemda.as_deref(),
            Slot::Kecamatan => self.kecamatan.as_deref(),
            Slot::Desa => self.desa.as_deref(),
            Slot::SumberDana => self.sumberdana.as_deref(),
        }
    }

    /// Write one slot. Blank codes are stored as `None`.
    ///
    /// This does not touch any other slot; the cascade decides what to clear.
    pub fn set(&mut self, slot: Slot, code: Option<String>) {
        let code = code.filter(|c| !c.trim().is_empty());
        match slot {
            Slot::Provinsi => self.provinsi = code,
            Slot::Pemda => self.pemda = code,
            Slot::Kecamatan => self.kecamatan = code,
            Slot::Desa => self.desa = code,
            Slot::SumberDana => self.sumberdana = code,
        }
    }

    pub fn is_empty(&self) -> bool {
        Slot::ALL.iter().all(|slot| self.get(*slot).is_none())
    }

    /// Check the chain invariant: a lower code is only set when every higher one is
    pub fn is_consistent(&self) -> bool {
        Slot::ALL.iter().all(|slot| match slot.parent() {
            Some(parent) => self.get(*slot).is_none() || self.get(parent).is_some(),
            None => true,
        })
    }

    /// Build the chart-data query string from the non-empty slots
    ///
    /// # Returns
    /// * `String` - `""` when nothing is selected, otherwise `?kdprov=..&kdpemda=..`
    ///
    /// # Examples
    /// ```
    /// use cacm_desa::selection::Selection;
    ///
    /// let mut sel = Selection::default();
    /// assert_eq!(sel.query_string(), "");
    ///
    /// sel.provinsi = Some("35".to_string());
    /// sel.sumberdana = Some("DDS".to_string());
    /// assert_eq!(sel.query_string(), "?kdprov=35&kdsumberdana=DDS");
    /// ```
    pub fn query_string(&self) -> String {
        let pairs = self.query_pairs();
        if pairs.is_empty() {
            return String::new();
        }

        let joined = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("?{}", joined)
    }

    /// Non-empty slots as `(chart_key, code)` pairs, in slot order
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        Slot::ALL
            .iter()
            .filter_map(|slot| self.get(*slot).map(|code| (slot.chart_key(), code.to_string())))
            .collect()
    }
}

/// Per-slot storage indexed by [`Slot`]
#[derive(Clone, Debug, Default)]
pub struct PerSlot<T> {
    items: [T; 5],
}

impl<T> PerSlot<T> {
    pub fn get(&self, slot: Slot) -> &T {
        &self.items[slot.index()]
    }

    pub fn get_mut(&mut self, slot: Slot) -> &mut T {
        &mut self.items[slot.index()]
    }
}
