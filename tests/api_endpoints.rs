#![cfg(feature = "web")]

use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Request, StatusCode, header};
use cacm_desa::app::{AppState, router};
use cacm_desa::config::Config;
use cacm_desa::login::{self, Role, User};
use cacm_desa::store::{FileStore, SiskeudesData};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

struct Fixture {
    dir: TempDir,
    state: Arc<AppState>,
}

fn fact(desa: &str, sd: &str, dashboard: &str, k1: &str, n1: f64, n2: f64) -> Value {
    json!({
        "Tahun": "2024", "Kd_Desa": desa, "Sumber_Dana": sd, "Dashboard": dashboard,
        "Kategori1": k1, "Nilai1": n1, "Nilai2": n2
    })
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        database_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    login::init_database(&config.database_dir).unwrap();

    let data: SiskeudesData = serde_json::from_value(json!({
        "provinsi": [
            {"Kd_Prov": "35", "Nama_Provinsi": "Jawa Timur"},
            {"Kd_Prov": "52", "Nama_Provinsi": "Nusa Tenggara Barat"}
        ],
        "pemda": [
            {"Kd_Pemda": "3513", "Kd_Prov": "35", "Nama_Pemda": "Kab. Probolinggo"},
            {"Kd_Pemda": "3514", "Kd_Prov": "35", "Nama_Pemda": "Kab. Pasuruan"}
        ],
        "kecamatan": [
            {"Kd_Kec": "3513.01", "Kd_Pemda": "3513", "Nama_Kecamatan": "Sukapura"},
            {"Kd_Kec": "3513.02", "Kd_Pemda": "3513", "Nama_Kecamatan": "Sumber"}
        ],
        "desa": [
            {"Kd_Desa": "3513.01.2001", "Kd_Kec": "3513.01", "Nama_Desa": "Ngadisari"},
            {"Kd_Desa": "3513.02.2001", "Kd_Kec": "3513.02", "Nama_Desa": "Sumberanom"}
        ],
        "sumber_dana": [
            {"Kode": "DDS", "Nama_Sumber": "Dana Desa", "Urut": 1},
            {"Kode": "ADD", "Nama_Sumber": "Alokasi Dana Desa", "Urut": 2}
        ],
        "facts": [
            fact("3513.01.2001", "DDS", "ringkasan_apbdes", "Pendapatan", 100.0, 90.0),
            fact("3513.02.2001", "DDS", "ringkasan_apbdes", "Pendapatan", 50.0, 40.0),
            fact("3513.02.2001", "ADD", "ringkasan_apbdes", "Pendapatan", 20.0, 10.0),
            fact("3513.01.2001", "DDS", "belanja_perkelompok", "Belanja Modal", 30.0, 25.0),
            fact("3513.01.2001", "DDS", "ringkasan_pembiayaan", "Penerimaan Pembiayaan", 5.0, 5.0)
        ]
    }))
    .unwrap();

    let state = Arc::new(AppState::new(config, Arc::new(FileStore::new(data))));
    Fixture { dir, state }
}

fn session_for(kd_pemda: Option<&str>) -> String {
    let user = User {
        username: "inspektur".into(),
        name: "Inspektur".into(),
        password_hash: String::new(),
        role: Role::Inspektorat,
        kd_pemda: kd_pemda.map(str::to_string),
        active: true,
    };
    login::create_session(&user, 2024, Duration::from_secs(600))
}

async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

async fn get_json(state: &Arc<AppState>, uri: &str, session: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().uri(uri);
    if let Some(id) = session {
        request = request.header(header::COOKIE, format!("session={}", id));
    }
    let (status, _, body) = send(state, request.body(Body::empty()).unwrap()).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn post_json(state: &Arc<AppState>, uri: &str, session: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, format!("session={}", session))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, _, body) = send(state, request).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn api_requires_a_session() {
    let fx = fixture();
    let (status, body) = get_json(&fx.state, "/api/dashboard/filters?mode=initial", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Unauthorized" }));

    let (status, _) = get_json(&fx.state, "/api/dashboard/chart-data", Some("not-a-session")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pages_redirect_to_login() {
    let fx = fixture();
    let request = Request::builder().uri("/dashboard").body(Body::empty()).unwrap();
    let (status, headers, _) = send(&fx.state, request).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers[header::LOCATION], "/");
}

#[tokio::test]
async fn initial_filters_come_from_session_pemda() {
    let fx = fixture();
    let session = session_for(Some("3513.00"));

    let (status, body) = get_json(&fx.state, "/api/dashboard/filters?mode=initial", Some(&session)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "type": "initial",
            "data": {
                "selected": {
                    "kdProv": "35", "provinsi": "Jawa Timur",
                    "kdPemda": "3513", "pemda": "Kab. Probolinggo"
                },
                "pemda": [{ "namapemda": "13  Kab. Probolinggo", "Kd_Pemda": "3513" }]
            }
        })
    );
}

#[tokio::test]
async fn initial_filters_without_or_with_unknown_pemda() {
    let fx = fixture();

    let session = session_for(None);
    let (status, body) = get_json(&fx.state, "/api/dashboard/filters?mode=initial", Some(&session)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["selected"], Value::Null);

    let session = session_for(Some("9999"));
    let (status, body) = get_json(&fx.state, "/api/dashboard/filters?mode=initial", Some(&session)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Pemda not found");
}

#[tokio::test]
async fn option_lists_by_type() {
    let fx = fixture();
    let session = session_for(Some("3513"));

    let (status, body) = get_json(
        &fx.state,
        "/api/dashboard/filters?type=kecamatan&kdPemda=3513",
        Some(&session),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "kecamatan");
    assert_eq!(
        body["data"],
        json!([
            { "kecamatan": "01  Sukapura", "Kd_Kec": "3513.01" },
            { "kecamatan": "02  Sumber", "Kd_Kec": "3513.02" }
        ])
    );

    let (_, body) = get_json(&fx.state, "/api/dashboard/filters?type=pemda&kdProv=35", Some(&session)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (_, body) = get_json(&fx.state, "/api/dashboard/filters?type=desa", Some(&session)).await;
    assert_eq!(body, json!({ "type": "desa", "data": [] }));

    let (_, body) = get_json(&fx.state, "/api/dashboard/filters?type=sumberdana", Some(&session)).await;
    assert_eq!(body["data"][0], json!({ "sumberdana": "DDS  Dana Desa", "Kode": "DDS" }));

    let (status, _) = get_json(&fx.state, "/api/dashboard/filters?type=kabupaten", Some(&session)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get_json(&fx.state, "/api/dashboard/filters", Some(&session)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chart_data_follows_the_selection() {
    let fx = fixture();
    let session = session_for(Some("3513"));

    let (status, body) = get_json(&fx.state, "/api/dashboard/chart-data", Some(&session)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_object().unwrap().len(), 7);
    assert_eq!(body["ringkasan_apbdes"][0]["Nilai1"], 170.0);

    let (_, body) = get_json(&fx.state, "/api/dashboard/chart-data?kdkec=3513.02", Some(&session)).await;
    assert_eq!(body["ringkasan_apbdes"][0]["Nilai1"], 70.0);

    let (_, body) = get_json(&fx.state, "/api/dashboard/chart-data?kdsumberdana=ADD", Some(&session)).await;
    assert_eq!(body["ringkasan_apbdes"][0]["Nilai2"], 10.0);

    // sumber dana under its older name
    let (_, body) = get_json(&fx.state, "/api/dashboard/chart-data?sumberdana=ADD", Some(&session)).await;
    assert_eq!(body["ringkasan_apbdes"][0]["Nilai2"], 10.0);

    let (_, body) = get_json(&fx.state, "/api/dashboard/chart-data?tahun=2023", Some(&session)).await;
    assert_eq!(body["ringkasan_apbdes"], json!([]));

    let (_, body) = get_json(&fx.state, "/api/dashboard/chart-data/belanja?kdprov=35", Some(&session)).await;
    assert_eq!(body.as_object().unwrap().len(), 22);
    assert_eq!(body["belanja_perkelompok"][0]["Kategori1"], "Belanja Modal");

    let (_, body) = get_json(&fx.state, "/api/dashboard/chart-data/pembiayaan", Some(&session)).await;
    assert_eq!(body.as_object().unwrap().len(), 3);
    assert_eq!(body["ringkasan_pembiayaan"][0]["Nilai1"], 5.0);
}

#[tokio::test]
async fn refresh_lifecycle() {
    let fx = fixture();
    let session = session_for(Some("3513"));
    let status_uri = "/api/dashboard/status?Kd_Pemda=3513&Tahun=2024";

    let (_, body) = get_json(&fx.state, status_uri, Some(&session)).await;
    assert_eq!(body["status"], "not_found");
    assert_eq!(body["lastUpdate"], Value::Null);

    let (status, _) = post_json(&fx.state, "/api/dashboard/refresh", &session, json!({ "Kd_Pemda": "3513" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post_json(
        &fx.state,
        "/api/dashboard/refresh",
        &session,
        json!({ "Kd_Pemda": "3513", "Tahun": 2024 }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);

    let mut last = Value::Null;
    for _ in 0..100 {
        let (_, body) = get_json(&fx.state, status_uri, Some(&session)).await;
        last = body;
        if last["status"] == "completed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(last["status"], "completed");
    assert!(last["lastUpdate"].is_string());
    assert!(fx.dir.path().join("snapshots/3513_2024.bin.gz").exists());

    // whole-pemda query now answered from the snapshot
    let (_, body) = get_json(&fx.state, "/api/dashboard/chart-data?kdpemda=3513&tahun=2024", Some(&session)).await;
    assert_eq!(body["ringkasan_apbdes"][0]["Nilai1"], 170.0);

    let (status, _) = get_json(&fx.state, "/api/dashboard/status?Kd_Pemda=3513", Some(&session)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn export_csv() {
    let fx = fixture();
    let session = session_for(Some("3513"));

    let request = Request::builder()
        .uri("/api/dashboard/export/pembiayaan?kdpemda=3513")
        .header(header::COOKIE, format!("session={}", session))
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&fx.state, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"cacm_pembiayaan_2024.csv\""
    );

    let csv = String::from_utf8(body).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "series,Kategori1,Kategori2,Nilai1,Nilai2,Nilai3");
    assert!(lines.contains(&"ringkasan_pembiayaan,Penerimaan Pembiayaan,,5,5,"));

    let (status, _) = get_json(&fx.state, "/api/dashboard/export/neraca", Some(&session)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get_json(&fx.state, "/api/dashboard/export/apbdes?format=pdf", Some(&session)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chart_image() {
    let fx = fixture();
    let session = session_for(Some("3513"));

    let request = Request::builder()
        .uri("/api/dashboard/chart/apbdes/ringkasan_apbdes.png")
        .header(header::COOKIE, format!("session={}", session))
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&fx.state, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(headers["x-categories"], "Pendapatan");
    assert_eq!(&body[1..4], b"PNG");

    let (status, _) = get_json(&fx.state, "/api/dashboard/chart/apbdes/nope.png", Some(&session)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn login_and_logout() {
    let fx = fixture();
    let users = fx.state.config.users_file();
    login::register_user(&users, "desa1", "rahasia", Role::Desa, Some("3513")).unwrap();

    let login_request = |password: &str| {
        Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!(
                "username=desa1&password={}&fiscal_year=2023",
                password
            )))
            .unwrap()
    };

    let (status, _, _) = send(&fx.state, login_request("salah")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, headers, _) = send(&fx.state, login_request("rahasia")).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers[header::LOCATION], "/dashboard");

    let cookie = headers[header::SET_COOKIE].to_str().unwrap();
    let session = cookie
        .split(';')
        .next()
        .and_then(|pair| pair.strip_prefix("session="))
        .unwrap()
        .to_string();

    let (status, body) = get_json(&fx.state, "/api/session", Some(&session)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "username": "desa1", "role": "desa", "kdPemda": "3513", "fiscalYear": 2023 })
    );

    let request = Request::builder()
        .uri("/logout")
        .header(header::COOKIE, format!("session={}", session))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&fx.state, request).await;
    assert_eq!(status, StatusCode::SEE_OTHER);

    let (status, _) = get_json(&fx.state, "/api/session", Some(&session)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn dashboard_page_ignores_orphaned_children() {
    let fx = fixture();
    let session = session_for(Some("3513"));

    let request = Request::builder()
        .uri("/dashboard")
        .header(header::COOKIE, format!("session={}", session))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&fx.state, request).await;
    assert_eq!(status, StatusCode::OK);

    let page = String::from_utf8(body).unwrap();
    assert!(page.contains("if (code && PARENT[slot] && !state.selection[PARENT[slot]]) return;"));
    assert!(page.contains("if (selected && selected.kdProv && !state.ready)"));
}
