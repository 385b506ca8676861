//! Materialized dashboard snapshots per pemda and fiscal year.
//!
//! A refresh computes every dashboard for one `(Kd_Pemda, Tahun)` in the
//! background and stores the result on disk; the chart-data routes serve
//! whole-pemda queries from it once the refresh completed.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::app::AppState;
use crate::charts::{ChartPayload, Dashboard};
use crate::error::AppError;
use crate::saving::{Snapshot, save_snapshot, snapshot_path};
use crate::selection::Selection;
use crate::store::{DashboardQuery, SiskeudesStore, StoreError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshState {
    Running,
    Completed,
    Error,
}

#[derive(Clone, Debug)]
pub struct RefreshStatus {
    pub state: RefreshState,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(rename = "Kd_Pemda", default)]
    pub kd_pemda: Option<Value>,

    #[serde(rename = "Tahun", default)]
    pub tahun: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "Kd_Pemda")]
    pub kd_pemda: Option<String>,

    #[serde(rename = "Tahun")]
    pub tahun: Option<String>,
}

/// Accept both `"2024"` and `2024`
fn text(value: Option<&Value>) -> Option<String> {
    let s = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// Compute every dashboard of one pemda and year
pub fn build_snapshot(store: &dyn SiskeudesStore, kd_pemda: &str, tahun: &str) -> Result<Snapshot, StoreError> {
    let query = DashboardQuery {
        tahun: tahun.to_string(),
        selection: Selection {
            pemda: Some(kd_pemda.to_string()),
            ..Selection::default()
        },
    };

    let mut snapshot = Snapshot {
        kd_pemda: kd_pemda.to_string(),
        tahun: tahun.to_string(),
        created_at: Utc::now().timestamp(),
        ..Snapshot::default()
    };
    for dashboard in Dashboard::ALL {
        let mut payload = ChartPayload::new();
        for series in dashboard.series() {
            payload.insert(series.to_string(), store.dashboard(series, &query)?);
        }
        *snapshot.payload_mut(dashboard) = payload;
    }
    Ok(snapshot)
}

fn set_status(state: &AppState, key: &(String, String), refresh: RefreshState) {
    let status = RefreshStatus {
        state: refresh,
        updated_at: Utc::now(),
    };
    match state.refresh.write() {
        Ok(mut table) => {
            table.insert(key.clone(), status);
        }
        Err(poisoned) => {
            poisoned.into_inner().insert(key.clone(), status);
        }
    }
}

fn current_status(state: &AppState, key: &(String, String)) -> Option<RefreshStatus> {
    state.refresh.read().ok()?.get(key).cloned()
}

async fn run_refresh(state: Arc<AppState>, key: (String, String)) {
    let (kd_pemda, tahun) = key.clone();
    let store = state.store.clone();
    let path = snapshot_path(&state.config.snapshot_dir(), &kd_pemda, &tahun);

    let result = tokio::task::spawn_blocking(move || -> Result<(), String> {
        let snapshot = build_snapshot(store.as_ref(), &kd_pemda, &tahun).map_err(|e| e.to_string())?;
        save_snapshot(&snapshot, &path).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| e.to_string())
    .and_then(|r| r);

    match result {
        Ok(()) => {
            info!("refresh of {} {} completed", key.0, key.1);
            set_status(&state, &key, RefreshState::Completed);
        }
        Err(e) => {
            error!("refresh of {} {} failed: {}", key.0, key.1, e);
            set_status(&state, &key, RefreshState::Error);
        }
    }
}

/// `POST /api/dashboard/refresh`
///
/// Marks the pemda/year as running and recomputes it in the background.
/// A refresh already in progress is not started twice.
pub async fn start_refresh(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let (Some(kd_pemda), Some(tahun)) = (text(request.kd_pemda.as_ref()), text(request.tahun.as_ref())) else {
        return Err(AppError::BadRequest("Missing parameters".to_string()));
    };
    let key = (kd_pemda, tahun);

    let already_running = current_status(&state, &key).is_some_and(|s| s.state == RefreshState::Running);
    if !already_running {
        info!("refresh of {} {} started", key.0, key.1);
        set_status(&state, &key, RefreshState::Running);
        tokio::spawn(run_refresh(state.clone(), key));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "success": true, "status": "running" })),
    ))
}

/// `GET /api/dashboard/status`
pub async fn refresh_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Value>, AppError> {
    let (Some(kd_pemda), Some(tahun)) = (
        query.kd_pemda.filter(|s| !s.is_empty()),
        query.tahun.filter(|s| !s.is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "Missing Kd_Pemda or Tahun parameter".to_string(),
        ));
    };

    match current_status(&state, &(kd_pemda, tahun)) {
        Some(status) => Ok(Json(json!({
            "status": status.state,
            "lastUpdate": status.updated_at.to_rfc3339(),
        }))),
        None => Ok(Json(json!({
            "message": "No refresh status found for this Pemda and Tahun",
            "lastUpdate": null,
            "status": "not_found",
        }))),
    }
}
