//! Hierarchical filter cascade shared by the dashboard pages.
//!
//! The cascade is a reducer: [`FilterCascade::dispatch`] applies one
//! [`Action`] and returns the [`Effect`]s the page has to run (network
//! fetches). It never performs I/O itself, so every transition can be
//! driven and checked synchronously.
//!
//! Clearing lower slots when a higher slot changes only happens once the
//! cascade is [`Phase::Ready`]. Until then the initial seed from the
//! user's session may write provinsi and pemda together without the
//! provinsi write wiping the pemda it arrived with.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::options::{FilterOption, OptionSet};
use crate::selection::{PerSlot, Selection, Slot};

/// Seeding phase of a page view
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Page mounted, session not known yet
    Idle,
    /// Initial filters requested from the server
    Seeding,
    /// Seed applied (or given up on); user changes now cascade
    Ready,
}

/// The user's home region, as sent by `filters?mode=initial`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialSelection {
    #[serde(rename = "kdProv", default)]
    pub kd_prov: String,

    #[serde(default)]
    pub provinsi: String,

    #[serde(rename = "kdPemda", default)]
    pub kd_pemda: String,

    #[serde(default)]
    pub pemda: String,
}

/// `data` of the initial filters response
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialFilters {
    pub selected: Option<InitialSelection>,

    #[serde(default)]
    pub pemda: Vec<FilterOption>,
}

/// Input to the cascade
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// The session is available; ask for the initial filters
    Mount,
    Seeded(InitialFilters),
    SeedFailed,
    Select(Slot, Option<String>),
    /// A dropdown was opened, or the user typed into its search box
    Open(Slot),
    OptionsLoaded {
        slot: Slot,
        parent: Option<String>,
        items: Vec<FilterOption>,
    },
    OptionsFailed {
        slot: Slot,
        parent: Option<String>,
    },
    ShowModal,
    CloseModal,
    Apply,
    Clear,
}

/// Work the page has to perform after a transition
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    FetchInitial,
    LoadOptions { slot: Slot, parent: Option<String> },
    FetchCharts(Selection),
}

/// Selection, option caches and seeding phase of one dashboard page
#[derive(Clone, Debug)]
pub struct FilterCascade {
    phase: Phase,
    selection: Selection,
    options: PerSlot<OptionSet>,
    modal_open: bool,
}

impl Default for FilterCascade {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterCascade {
    pub fn new() -> Self {
        FilterCascade {
            phase: Phase::Idle,
            selection: Selection::default(),
            options: PerSlot::default(),
            modal_open: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn options(&self, slot: Slot) -> &OptionSet {
        self.options.get(slot)
    }

    pub fn is_modal_open(&self) -> bool {
        self.modal_open
    }

    /// A child dropdown stays disabled until its parent has a value
    pub fn is_enabled(&self, slot: Slot) -> bool {
        match slot.parent() {
            Some(parent) => self.selection.get(parent).is_some(),
            None => true,
        }
    }

    /// Apply one action and return the effects it triggers
    pub fn dispatch(&mut self, action: Action) -> Vec<Effect> {
        match action {
            Action::Mount => self.mount(),
            Action::Seeded(initial) => self.apply_seed(initial),
            Action::SeedFailed => self.seed_failed(),
            Action::Select(slot, code) => self.select(slot, code),
            Action::Open(slot) => self.open(slot),
            Action::OptionsLoaded {
                slot,
                parent,
                items,
            } => {
                self.options_loaded(slot, parent, items);
                Vec::new()
            }
            Action::OptionsFailed { slot, parent } => {
                self.options_failed(slot, parent);
                Vec::new()
            }
            Action::ShowModal => {
                self.modal_open = true;
                Vec::new()
            }
            Action::CloseModal => {
                self.modal_open = false;
                Vec::new()
            }
            Action::Apply => self.apply_filters(),
            Action::Clear => self.clear_filters(),
        }
    }

    pub fn mount(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Idle {
            return Vec::new();
        }
        self.phase = Phase::Seeding;
        vec![Effect::FetchInitial]
    }

    /// Pre-select the user's home provinsi and pemda
    ///
    /// Runs at most once per page view; a seed arriving after the cascade is
    /// ready (for instance after the user pressed Clear) is dropped.
    pub fn apply_seed(&mut self, initial: InitialFilters) -> Vec<Effect> {
        if self.phase == Phase::Ready {
            debug!("initial filters arrived after the cascade was ready, ignoring");
            return Vec::new();
        }

        if let Some(sel) = initial.selected {
            self.selection.set(Slot::Provinsi, Some(sel.kd_prov.clone()));
            self.selection.set(Slot::Pemda, Some(sel.kd_pemda.clone()));
            if !self.selection.is_consistent() {
                warn!("initial pemda {} arrived without a provinsi, dropping it", sel.kd_pemda);
                self.selection.set(Slot::Pemda, None);
            }

            // one placeholder each, so the selected labels render before any dropdown opens
            if self.selection.provinsi.is_some() {
                let label = format!("{}  {}", sel.kd_prov, sel.provinsi).trim().to_string();
                *self.options.get_mut(Slot::Provinsi) =
                    OptionSet::seeded(vec![FilterOption::new(sel.kd_prov.clone(), label)]);
            }

            let pemda = if self.selection.pemda.is_none() {
                OptionSet::default()
            } else if !initial.pemda.is_empty() {
                OptionSet::seeded(initial.pemda)
            } else {
                let short = sel.kd_pemda.get(2..4).unwrap_or_default();
                let label = format!("{}  {}", short, sel.pemda).trim().to_string();
                OptionSet::seeded(vec![FilterOption::new(sel.kd_pemda.clone(), label)])
            };
            *self.options.get_mut(Slot::Pemda) = pemda;
        }

        self.phase = Phase::Ready;
        vec![Effect::FetchCharts(self.selection.clone())]
    }

    /// The initial request failed; start from whatever is selected
    pub fn seed_failed(&mut self) -> Vec<Effect> {
        if self.phase == Phase::Ready {
            return Vec::new();
        }
        warn!("initial filters unavailable, starting without a home region");
        self.phase = Phase::Ready;
        vec![Effect::FetchCharts(self.selection.clone())]
    }

    pub fn set_provinsi(&mut self, code: Option<String>) -> Vec<Effect> {
        self.select(Slot::Provinsi, code)
    }

    pub fn set_pemda(&mut self, code: Option<String>) -> Vec<Effect> {
        self.select(Slot::Pemda, code)
    }

    pub fn set_kecamatan(&mut self, code: Option<String>) -> Vec<Effect> {
        self.select(Slot::Kecamatan, code)
    }

    pub fn set_desa(&mut self, code: Option<String>) -> Vec<Effect> {
        self.select(Slot::Desa, code)
    }

    pub fn set_sumberdana(&mut self, code: Option<String>) -> Vec<Effect> {
        self.select(Slot::SumberDana, code)
    }

    fn select(&mut self, slot: Slot, code: Option<String>) -> Vec<Effect> {
        let writes_code = code.as_deref().is_some_and(|c| !c.trim().is_empty());
        if writes_code && !self.is_enabled(slot) {
            debug!("ignoring {} selection while its parent is unset", slot);
            return Vec::new();
        }

        let previous = self.selection.get(slot).map(str::to_string);
        self.selection.set(slot, code);
        let current = self.selection.get(slot).map(str::to_string);

        if self.phase != Phase::Ready || previous == current {
            return Vec::new();
        }

        for lower in slot.descendants() {
            self.selection.set(lower, None);
            self.options.get_mut(lower).clear();
        }

        match (slot.child(), current) {
            (Some(child), Some(code)) => self.request_options(child, Some(code)).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Lazy, memoized load of a dropdown's options
    pub fn open(&mut self, slot: Slot) -> Vec<Effect> {
        let parent = match slot.parent() {
            Some(parent_slot) => match self.selection.get(parent_slot) {
                Some(code) => Some(code.to_string()),
                None => return Vec::new(),
            },
            None => None,
        };

        if self.options.get(slot).fully_loaded {
            return Vec::new();
        }
        self.request_options(slot, parent).into_iter().collect()
    }

    fn request_options(&mut self, slot: Slot, parent: Option<String>) -> Option<Effect> {
        let set = self.options.get_mut(slot);
        if set.is_loading(parent.as_deref()) {
            return None;
        }
        set.begin_load(parent.as_deref());
        Some(Effect::LoadOptions { slot, parent })
    }

    /// Whether a response for `slot`/`parent` still belongs to the current selection
    fn is_current(&self, slot: Slot, parent: Option<&str>) -> bool {
        let parent_matches = match slot.parent() {
            Some(parent_slot) => self.selection.get(parent_slot) == parent,
            None => true,
        };
        parent_matches && self.options.get(slot).is_loading(parent)
    }

    pub fn options_loaded(&mut self, slot: Slot, parent: Option<String>, items: Vec<FilterOption>) {
        if !self.is_current(slot, parent.as_deref()) {
            debug!("dropping stale {} options for parent {:?}", slot, parent);
            return;
        }
        self.options.get_mut(slot).finish_load(items);
    }

    pub fn options_failed(&mut self, slot: Slot, parent: Option<String>) {
        if !self.is_current(slot, parent.as_deref()) {
            return;
        }
        warn!("loading {} options failed (parent {:?})", slot, parent);
        self.options.get_mut(slot).fail_load();
    }

    /// Close the filter modal and refetch charts for the current selection
    pub fn apply_filters(&mut self) -> Vec<Effect> {
        self.modal_open = false;
        vec![Effect::FetchCharts(self.selection.clone())]
    }

    /// Reset every slot and start over from an unfiltered baseline
    pub fn clear_filters(&mut self) -> Vec<Effect> {
        self.selection = Selection::default();
        for slot in Slot::Provinsi.descendants() {
            self.options.get_mut(slot).clear();
        }
        self.phase = Phase::Ready;
        vec![Effect::FetchCharts(Selection::default())]
    }

    fn name_of(&self, slot: Slot) -> Option<String> {
        let code = self.selection.get(slot)?;
        self.options.get(slot).display_name_for(code)
    }

    /// Heading describing the area the charts cover
    pub fn subtitle(&self) -> String {
        let code = |slot: Slot| self.selection.get(slot).unwrap_or_default().to_string();

        if let Some(desa) = self.name_of(Slot::Desa) {
            let kec = self.name_of(Slot::Kecamatan).unwrap_or_else(|| code(Slot::Kecamatan));
            let pemda = self.name_of(Slot::Pemda).unwrap_or_else(|| code(Slot::Pemda));
            return format!("Data CACM Desa {}, {}, {}", desa, kec, pemda)
                .trim()
                .to_string();
        }
        if let Some(kec) = self.name_of(Slot::Kecamatan) {
            return match self.name_of(Slot::Pemda) {
                Some(pemda) => format!("Data CACM Desa {}, {}", kec, pemda),
                None => format!("Data CACM Desa {}", kec),
            };
        }
        if let Some(pemda) = self.name_of(Slot::Pemda) {
            return format!("Data CACM Desa {}", pemda);
        }
        if let Some(prov) = self.name_of(Slot::Provinsi) {
            return format!("Data CACM Desa {}", prov);
        }
        "Data CACM Desa Seluruh Indonesia".to_string()
    }
}
