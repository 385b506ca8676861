use axum::{
    Extension, Json,
    extract::{Query, State},
};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::app::AppState;
use crate::error::AppError;
use crate::login::Session;
use crate::options::FilterOption;
use crate::selection::Slot;

lazy_static! {
    static ref PEMDA_CODE: Regex = Regex::new(r"\d{4}").unwrap();
}

#[derive(Debug, Default, Deserialize)]
pub struct FilterQuery {
    pub mode: Option<String>,

    #[serde(rename = "type")]
    pub kind: Option<String>,

    #[serde(rename = "kdProv")]
    pub kd_prov: Option<String>,

    #[serde(rename = "kdPemda")]
    pub kd_pemda: Option<String>,

    #[serde(rename = "kdKec")]
    pub kd_kec: Option<String>,
}

impl FilterQuery {
    fn parent(&self, slot: Slot) -> Option<&str> {
        let value = match slot.parent()? {
            Slot::Provinsi => self.kd_prov.as_deref(),
            Slot::Pemda => self.kd_pemda.as_deref(),
            Slot::Kecamatan => self.kd_kec.as_deref(),
            Slot::Desa | Slot::SumberDana => None,
        };
        value.filter(|v| !v.trim().is_empty())
    }
}

/// Field names an option of `slot` carries on the wire, as `(code, label)`
fn wire_keys(slot: Slot) -> (&'static str, &'static str) {
    match slot {
        Slot::Provinsi => ("Kd_Prov", "provinsi"),
        Slot::Pemda => ("Kd_Pemda", "namapemda"),
        Slot::Kecamatan => ("Kd_Kec", "kecamatan"),
        Slot::Desa => ("Kd_Desa", "desa"),
        Slot::SumberDana => ("Kode", "sumberdana"),
    }
}

pub fn wire_options(slot: Slot, options: &[FilterOption]) -> Value {
    let (code_key, label_key) = wire_keys(slot);
    Value::Array(
        options
            .iter()
            .map(|o| {
                let mut entry = Map::new();
                entry.insert(label_key.to_string(), Value::String(o.label.clone()));
                entry.insert(code_key.to_string(), Value::String(o.code.clone()));
                Value::Object(entry)
            })
            .collect(),
    )
}

/// First four-digit run of a stored pemda code, e.g. `3513` out of `3513.00`
pub fn extract_pemda(code: &str) -> Option<&str> {
    PEMDA_CODE.find(code).map(|m| m.as_str())
}

fn initial(state: &AppState, session: &Session) -> Result<Value, AppError> {
    let Some(kd_pemda) = session.kd_pemda.as_deref().and_then(extract_pemda) else {
        debug!("{} has no home pemda", session.username);
        return Ok(json!({ "type": "initial", "data": { "selected": null, "pemda": [] } }));
    };

    let detail = state
        .store
        .pemda_detail(kd_pemda)
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("Pemda not found".to_string()))?;

    let pemda = state
        .store
        .pemda(Some(&detail.kd_prov))
        .map_err(|e| AppError::Internal(e.to_string()))?
        .into_iter()
        .filter(|o| o.code == detail.kd_pemda)
        .collect::<Vec<_>>();

    Ok(json!({
        "type": "initial",
        "data": {
            "selected": detail,
            "pemda": wire_options(Slot::Pemda, &pemda),
        }
    }))
}

fn options(state: &AppState, slot: Slot, query: &FilterQuery) -> Result<Vec<FilterOption>, AppError> {
    let store = &state.store;
    let parent = query.parent(slot);

    let result = match (slot, parent) {
        (Slot::Provinsi, _) => store.provinsi(),
        (Slot::SumberDana, _) => store.sumber_dana(),
        (Slot::Pemda, Some(kd_prov)) => store.pemda(Some(kd_prov)),
        (Slot::Kecamatan, Some(kd_pemda)) => store.kecamatan(kd_pemda),
        (Slot::Desa, Some(kd_kec)) => store.desa(kd_kec),
        (_, None) => Ok(Vec::new()),
    };
    result.map_err(|e| AppError::Internal(e.to_string()))
}

/// `GET /api/dashboard/filters`
///
/// `mode=initial` returns the session user's home provinsi and pemda;
/// `type=<slot>` returns that slot's options under its parent code.
pub async fn get_filters(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Value>, AppError> {
    if query.mode.as_deref() == Some("initial") {
        return initial(&state, &session).map(Json);
    }

    let kind = query
        .kind
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("Missing type parameter".to_string()))?;
    let slot: Slot = kind.parse().map_err(AppError::BadRequest)?;

    let items = options(&state, slot, &query)?;
    debug!("{} {} options for {:?}", items.len(), slot, query.parent(slot));

    Ok(Json(json!({
        "type": slot.as_str(),
        "data": wire_options(slot, &items),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pemda_code_is_extracted() {
        assert_eq!(extract_pemda("3513"), Some("3513"));
        assert_eq!(extract_pemda("P-3513.00"), Some("3513"));
        assert_eq!(extract_pemda("35"), None);
    }

    #[test]
    fn options_use_slot_field_names() {
        let wire = wire_options(Slot::Desa, &[FilterOption::new("3513.01.2001", "01.2001  Ngadisari")]);
        assert_eq!(
            wire,
            json!([{ "desa": "01.2001  Ngadisari", "Kd_Desa": "3513.01.2001" }])
        );

        let back: Vec<FilterOption> = serde_json::from_value(wire).unwrap();
        assert_eq!(back[0].code, "3513.01.2001");
    }

    #[test]
    fn parent_comes_from_slot_key() {
        let query = FilterQuery {
            kd_pemda: Some("3513".into()),
            kd_kec: Some(" ".into()),
            ..FilterQuery::default()
        };
        assert_eq!(query.parent(Slot::Kecamatan), Some("3513"));
        assert_eq!(query.parent(Slot::Desa), None);
        assert_eq!(query.parent(Slot::Provinsi), None);
    }
}
