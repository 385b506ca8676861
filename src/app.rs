use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::chart_data;
use crate::config::Config;
use crate::filters;
use crate::login;
use crate::refresh::{self, RefreshStatus};
use crate::store::{FileStore, SiskeudesData, SiskeudesStore};

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn SiskeudesStore>,

    /// Refresh progress keyed by `(Kd_Pemda, Tahun)`
    pub refresh: RwLock<HashMap<(String, String), RefreshStatus>>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn SiskeudesStore>) -> Self {
        AppState {
            config,
            store,
            refresh: RwLock::new(HashMap::new()),
        }
    }
}

/// Build the application router
///
/// Everything except the login page, the login form and static files sits
/// behind [`login::require_auth`].
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/dashboard", get(login::serve_dashboard_page))
        .route("/api/session", get(login::session_profile))
        .route("/api/dashboard/filters", get(filters::get_filters))
        .route("/api/dashboard/chart-data", get(chart_data::apbdes))
        .route("/api/dashboard/chart-data/belanja", get(chart_data::belanja))
        .route("/api/dashboard/chart-data/pembiayaan", get(chart_data::pembiayaan))
        .route("/api/dashboard/export/:dashboard", get(chart_data::export))
        .route("/api/dashboard/chart/:dashboard/:file", get(chart_data::chart_png))
        .route("/api/dashboard/refresh", post(refresh::start_refresh))
        .route("/api/dashboard/status", get(refresh::refresh_status))
        .route_layer(middleware::from_fn(login::require_auth));

    Router::new()
        .route("/", get(login::serve_login_page))
        .route("/login", post(login::handle_login))
        .route("/logout", get(login::handle_logout))
        .merge(protected)
        .nest_service("/static", ServeDir::new("static"))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;
    info!(
        "{} {} -> {} ({:.1} ms)",
        method,
        path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    response
}

/// Open the Siskeudes export, or start with empty tables when it is missing
fn open_store(config: &Config) -> Result<Arc<dyn SiskeudesStore>, Box<dyn std::error::Error>> {
    let path = config.store_file();
    if !path.exists() {
        warn!("{} not found, serving empty reference tables", path.display());
        return Ok(Arc::new(FileStore::new(SiskeudesData::default())));
    }
    Ok(Arc::new(FileStore::open(&path)?))
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    login::init_database(&config.database_dir)?;
    let store = open_store(&config)?;

    let address = config.address();
    let app_state = Arc::new(AppState::new(config, store));
    let app = router(app_state);

    let listener = TcpListener::bind(&address).await?;
    println!("Listening on http://{}", address);
    axum::serve(listener, app).await?;

    Ok(())
}
