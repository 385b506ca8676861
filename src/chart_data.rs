use axum::{
    Extension, Json,
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::Response,
};
use log::{debug, warn};
use serde::Deserialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::charts::{ChartPayload, Dashboard};
use crate::downloader;
use crate::error::AppError;
use crate::graph::{GraphOptions, create_bar_chart};
use crate::login::Session;
use crate::refresh::RefreshState;
use crate::saving::{load_snapshot, snapshot_path};
use crate::selection::{Selection, Slot};
use crate::store::DashboardQuery;

/// Query parameters shared by the chart-data, export and chart routes
#[derive(Debug, Default, Deserialize)]
pub struct ChartQuery {
    pub tahun: Option<String>,
    pub kdprov: Option<String>,
    pub kdpemda: Option<String>,
    pub kdkec: Option<String>,
    pub kddesa: Option<String>,
    pub kdsumberdana: Option<String>,

    /// Older pages send the sumber dana code under this name
    pub sumberdana: Option<String>,

    /// Export format, `csv` or `xlsx`
    pub format: Option<String>,
}

impl ChartQuery {
    /// Dashboard parameters, with the fiscal year defaulting to the session's
    pub fn to_dashboard_query(&self, session: &Session) -> DashboardQuery {
        let mut selection = Selection::default();
        selection.set(Slot::Provinsi, self.kdprov.clone());
        selection.set(Slot::Pemda, self.kdpemda.clone());
        selection.set(Slot::Kecamatan, self.kdkec.clone());
        selection.set(Slot::Desa, self.kddesa.clone());
        selection.set(
            Slot::SumberDana,
            self.kdsumberdana.clone().or_else(|| self.sumberdana.clone()),
        );

        let tahun = self
            .tahun
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| session.fiscal_year.to_string());

        DashboardQuery { tahun, selection }
    }
}

/// Pemda whose refresh snapshot can answer `query`, if any
///
/// Only whole-pemda queries qualify: no kecamatan, desa or sumber dana, and
/// a provinsi (when given) that contains the pemda.
fn snapshot_key(query: &DashboardQuery) -> Option<&str> {
    let sel = &query.selection;
    if sel.kecamatan.is_some() || sel.desa.is_some() || sel.sumberdana.is_some() {
        return None;
    }
    let pemda = sel.pemda.as_deref()?;
    match sel.provinsi.as_deref() {
        Some(prov) if !pemda.starts_with(prov) => None,
        _ => Some(pemda),
    }
}

fn from_snapshot(state: &AppState, dashboard: Dashboard, query: &DashboardQuery) -> Option<ChartPayload> {
    let kd_pemda = snapshot_key(query)?;
    let key = (kd_pemda.to_string(), query.tahun.clone());

    let completed = state
        .refresh
        .read()
        .ok()?
        .get(&key)
        .is_some_and(|s| s.state == RefreshState::Completed);
    if !completed {
        return None;
    }

    let path = snapshot_path(&state.config.snapshot_dir(), kd_pemda, &query.tahun);
    match load_snapshot(&path) {
        Ok(snapshot) => {
            debug!("serving {} for {} {} from snapshot", dashboard, kd_pemda, query.tahun);
            Some(snapshot.payload(dashboard).clone())
        }
        Err(e) => {
            warn!("snapshot {} unreadable: {}", path.display(), e);
            None
        }
    }
}

/// Compute every series of a dashboard
pub fn compute(state: &AppState, dashboard: Dashboard, query: &DashboardQuery) -> Result<ChartPayload, AppError> {
    if let Some(payload) = from_snapshot(state, dashboard, query) {
        return Ok(payload);
    }

    let mut payload = ChartPayload::new();
    for series in dashboard.series() {
        let rows = state
            .store
            .dashboard(series, query)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        payload.insert(series.to_string(), rows);
    }
    Ok(payload)
}

fn serve(state: &AppState, session: &Session, query: &ChartQuery, dashboard: Dashboard) -> Result<Json<ChartPayload>, AppError> {
    let query = query.to_dashboard_query(session);
    compute(state, dashboard, &query).map(Json)
}

pub async fn apbdes(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Query(query): Query<ChartQuery>,
) -> Result<Json<ChartPayload>, AppError> {
    serve(&state, &session, &query, Dashboard::Apbdes)
}

pub async fn belanja(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Query(query): Query<ChartQuery>,
) -> Result<Json<ChartPayload>, AppError> {
    serve(&state, &session, &query, Dashboard::Belanja)
}

pub async fn pembiayaan(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Query(query): Query<ChartQuery>,
) -> Result<Json<ChartPayload>, AppError> {
    serve(&state, &session, &query, Dashboard::Pembiayaan)
}

fn parse_dashboard(name: &str) -> Result<Dashboard, AppError> {
    name.parse().map_err(AppError::NotFound)
}

/// `GET /api/dashboard/export/:dashboard`
///
/// Downloads every series of the dashboard as CSV (default) or XLSX.
pub async fn export(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(name): Path<String>,
    Query(query): Query<ChartQuery>,
) -> Result<Response, AppError> {
    let dashboard = parse_dashboard(&name)?;
    let dashboard_query = query.to_dashboard_query(&session);
    let payload = compute(&state, dashboard, &dashboard_query)?;

    let (body, content_type, extension) = match query.format.as_deref().unwrap_or("csv") {
        "csv" => (
            downloader::to_csv(&payload)?.into_bytes(),
            "text/csv; charset=utf-8",
            "csv",
        ),
        "xlsx" => (
            downloader::to_xlsx(&payload)?,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "xlsx",
        ),
        other => return Err(AppError::BadRequest(format!("Unsupported format: {}", other))),
    };

    let filename = format!("cacm_{}_{}.{}", dashboard, dashboard_query.tahun, extension);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from(body))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// `GET /api/dashboard/chart/:dashboard/:series.png`
///
/// Bar chart of one series. Bars follow row order; the category names are
/// listed, URL-encoded and comma-separated, in the `x-categories` header.
pub async fn chart_png(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path((name, file)): Path<(String, String)>,
    Query(query): Query<ChartQuery>,
) -> Result<Response, AppError> {
    let dashboard = parse_dashboard(&name)?;
    let series = file
        .strip_suffix(".png")
        .filter(|s| dashboard.series().contains(s))
        .ok_or_else(|| AppError::NotFound(format!("Unknown series: {}", file)))?;

    let dashboard_query = query.to_dashboard_query(&session);
    let payload = compute(&state, dashboard, &dashboard_query)?;
    let rows = payload.get(series).cloned().unwrap_or_default();

    let png = create_bar_chart(&rows, &GraphOptions::default())?;
    let categories = rows
        .iter()
        .map(|r| urlencoding::encode(&r.kategori1).into_owned())
        .collect::<Vec<_>>()
        .join(",");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/png")
        .header("x-categories", categories)
        .body(Body::from(png))
        .map_err(|e| AppError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::login::Role;
    use std::time::SystemTime;

    fn session() -> Session {
        Session {
            username: "inspektur".into(),
            role: Role::Inspektorat,
            kd_pemda: Some("3513".into()),
            fiscal_year: 2024,
            expires_at: SystemTime::now(),
        }
    }

    #[test]
    fn tahun_defaults_to_session_year() {
        let query = ChartQuery::default().to_dashboard_query(&session());
        assert_eq!(query.tahun, "2024");
        assert!(query.selection.is_empty());
    }

    #[test]
    fn sumberdana_alias_is_accepted() {
        let query = ChartQuery {
            sumberdana: Some("DDS".into()),
            kdpemda: Some("".into()),
            ..ChartQuery::default()
        };
        let query = query.to_dashboard_query(&session());
        assert_eq!(query.selection.sumberdana.as_deref(), Some("DDS"));
        assert_eq!(query.selection.pemda, None);
    }

    #[test]
    fn only_whole_pemda_queries_use_snapshots() {
        let mut query = DashboardQuery {
            tahun: "2024".into(),
            selection: Selection {
                provinsi: Some("35".into()),
                pemda: Some("3513".into()),
                ..Selection::default()
            },
        };
        assert_eq!(snapshot_key(&query), Some("3513"));

        query.selection.provinsi = Some("52".into());
        assert_eq!(snapshot_key(&query), None);

        query.selection.provinsi = None;
        query.selection.kecamatan = Some("3513.01".into());
        assert_eq!(snapshot_key(&query), None);
    }
}
