#![cfg(not(tarpaulin_include))]

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Form, Json,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::Datelike;
use lazy_static::lazy_static;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, create_dir_all};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::AppError;

/// Access level of an application user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Inspektorat,
    Desa,
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "inspektorat" => Ok(Role::Inspektorat),
            "desa" => Ok(Role::Desa),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// User data structure representing a registered application user
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    /// Username (unique identifier for the user)
    pub username: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Argon2 hash of the user's password
    pub password_hash: String,

    pub role: Role,

    /// Home pemda code; the dashboards open on this region
    #[serde(default)]
    pub kd_pemda: Option<String>,

    /// Inactive users cannot sign in
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Login form data
#[derive(Debug, Serialize, Deserialize)]
pub struct UserCredentials {
    pub username: String,

    /// Password in plaintext (only transmitted, never stored)
    pub password: String,

    /// Fiscal year the session works in; the current year when blank
    #[serde(default)]
    pub fiscal_year: Option<String>,
}

/// User session data
///
/// Represents an authenticated user session. Handlers behind
/// [`require_auth`] receive it as a request extension.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub role: Role,
    pub kd_pemda: Option<String>,
    pub fiscal_year: i32,

    /// Time when the session expires
    pub expires_at: SystemTime,
}

/// Profile returned by `GET /api/session`
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionProfile {
    pub username: String,
    pub role: Role,
    #[serde(rename = "kdPemda")]
    pub kd_pemda: Option<String>,
    #[serde(rename = "fiscalYear")]
    pub fiscal_year: i32,
}

lazy_static! {
    /// Active sessions keyed by session id
    static ref SESSIONS: RwLock<HashMap<String, Session>> = RwLock::new(HashMap::new());
}

/// Initialize the database directory
///
/// Creates the directory and an empty users file if they don't exist.
///
/// # Arguments
/// * `database_dir` - Directory holding `users.json`
///
/// # Returns
/// * `std::io::Result<()>` - Success or an IO error
pub fn init_database(database_dir: &Path) -> std::io::Result<()> {
    if !database_dir.exists() {
        create_dir_all(database_dir)?;
    }

    let users_path = database_dir.join("users.json");
    if !users_path.exists() {
        let mut file = File::create(users_path)?;
        file.write_all(b"{}")?;
    }

    Ok(())
}

/// Get all registered users
///
/// # Arguments
/// * `users_file` - Path of `users.json`
///
/// # Returns
/// * `Result<HashMap<String, User>, String>` - Map of usernames to user objects, or an error
///
/// # Errors
/// * Returns an error if the users file cannot be opened, read, or parsed
pub fn get_users(users_file: &Path) -> Result<HashMap<String, User>, String> {
    let mut file = match File::open(users_file) {
        Ok(file) => file,
        Err(_) => return Err("Failed to open users file".to_string()),
    };

    let mut contents = String::new();
    if file.read_to_string(&mut contents).is_err() {
        return Err("Failed to read users file".to_string());
    }

    match serde_json::from_str(&contents) {
        Ok(users) => Ok(users),
        Err(_) => Err("Failed to parse users data".to_string()),
    }
}

/// Save the users map to disk
///
/// # Arguments
/// * `users_file` - Path of `users.json`
/// * `users` - The users map to save
///
/// # Returns
/// * `Result<(), String>` - Success or an error message
pub fn save_users(users_file: &Path, users: &HashMap<String, User>) -> Result<(), String> {
    let json = match serde_json::to_string_pretty(users) {
        Ok(json) => json,
        Err(_) => return Err("Failed to serialize users data".to_string()),
    };

    if fs::write(users_file, json).is_err() {
        return Err("Failed to write users data".to_string());
    }

    Ok(())
}

/// Register a new user
///
/// The password is hashed before storage.
///
/// # Arguments
/// * `users_file` - Path of `users.json`
/// * `username` - Unique username for the new account
/// * `password` - Plain text password (will be hashed)
/// * `role` - Access level
/// * `kd_pemda` - Home pemda code, if the user belongs to one
///
/// # Returns
/// * `Result<(), String>` - Success or an error message
///
/// # Errors
/// * Returns an error if the username is already in use or a field is empty
pub fn register_user(
    users_file: &Path,
    username: &str,
    password: &str,
    role: Role,
    kd_pemda: Option<&str>,
) -> Result<(), String> {
    if username.is_empty() || password.is_empty() {
        return Err("Username and password cannot be empty".to_string());
    }

    let mut users = get_users(users_file)?;
    if users.contains_key(username) {
        return Err("Username already exists".to_string());
    }

    let password_hash = hash_password(password)?;
    let user = User {
        username: username.to_string(),
        name: username.to_string(),
        password_hash,
        role,
        kd_pemda: kd_pemda.map(str::to_string).filter(|k| !k.is_empty()),
        active: true,
    };

    users.insert(username.to_string(), user);
    save_users(users_file, &users)
}

/// Verify user credentials
///
/// # Arguments
/// * `users_file` - Path of `users.json`
/// * `username` - Username to verify
/// * `password` - Password to verify
///
/// # Returns
/// * `Result<Option<User>, String>` - The user when the credentials are valid
///   and the account is active, `None` otherwise
pub fn verify_user(users_file: &Path, username: &str, password: &str) -> Result<Option<User>, String> {
    let users = get_users(users_file)?;

    match users.get(username) {
        Some(user) if user.active => {
            if verify_password(password, &user.password_hash)? {
                Ok(Some(user.clone()))
            } else {
                Ok(None)
            }
        }
        _ => Ok(None),
    }
}

/// Hash a password using Argon2
///
/// # Arguments
/// * `password` - The plaintext password to hash
///
/// # Returns
/// * `Result<String, String>` - The password hash or an error
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    match argon2.hash_password(password.as_bytes(), &salt) {
        Ok(hash) => Ok(hash.to_string()),
        Err(_) => Err("Password hashing failed".to_string()),
    }
}

/// Verify a password against a stored hash
///
/// # Returns
/// * `Result<bool, String>` - True if the password matches, false if not, or an error
///
/// # Errors
/// * Returns an error if the hash is in an invalid format
fn verify_password(password: &str, hash: &str) -> Result<bool, String> {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(hash) => hash,
        Err(_) => return Err("Invalid password hash format".to_string()),
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}

/// Create a new user session
///
/// # Arguments
/// * `user` - The authenticated user
/// * `fiscal_year` - Fiscal year chosen at login
/// * `ttl` - How long the session stays valid
///
/// # Returns
/// * `String` - A unique session ID
pub fn create_session(user: &User, fiscal_year: i32, ttl: Duration) -> String {
    let session_id = Uuid::new_v4().to_string();

    let session = Session {
        username: user.username.clone(),
        role: user.role,
        kd_pemda: user.kd_pemda.clone(),
        fiscal_year,
        expires_at: SystemTime::now() + ttl,
    };

    let mut sessions = match SESSIONS.write() {
        Ok(sessions) => sessions,
        Err(poisoned) => poisoned.into_inner(),
    };
    let now = SystemTime::now();
    sessions.retain(|_, s| s.expires_at > now);
    sessions.insert(session_id.clone(), session);

    session_id
}

/// Validate a session
///
/// An expired session is dropped from the table on lookup.
///
/// # Returns
/// * `Option<Session>` - The session if it exists and has not expired
pub fn validate_session(session_id: &str) -> Option<Session> {
    let session = SESSIONS.read().ok()?.get(session_id).cloned()?;
    if session.expires_at > SystemTime::now() {
        return Some(session);
    }

    remove_session(session_id);
    None
}


pub fn remove_session(session_id: &str) {
    if let Ok(mut sessions) = SESSIONS.write() {
        sessions.remove(session_id);
    }
}

fn fiscal_year_from(input: Option<&str>) -> i32 {
    input
        .and_then(|y| y.trim().parse().ok())
        .unwrap_or_else(|| chrono::Local::now().year())
}

// Web handler functions below

/// Serve the login page HTML
pub async fn serve_login_page() -> Html<&'static str> {
    Html(include_str!("./static/login.html"))
}

/// Serve the dashboard page HTML
pub async fn serve_dashboard_page() -> Html<&'static str> {
    Html(include_str!("./static/dashboard.html"))
}

/// Handle user login requests
///
/// Validates credentials and creates a session if valid.
///
/// # Arguments
/// * `state` - Shared application state (users file, session lifetime)
/// * `jar` - Cookie jar for storing the session cookie
/// * `credentials` - Form data containing username, password and fiscal year
///
/// # Returns
/// * `Response` - Redirect to the dashboard if successful, or error message if not
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(credentials): Form<UserCredentials>,
) -> Response {
    let users_file = state.config.users_file();
    let username = credentials.username.clone();
    let password = credentials.password.clone();

    // argon2 and the users file stay off the async workers
    let verified = tokio::task::spawn_blocking(move || verify_user(&users_file, &username, &password))
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r);

    match verified {
        Ok(Some(user)) => {
            let fiscal_year = fiscal_year_from(credentials.fiscal_year.as_deref());
            let hours = state.config.session_hours;
            let ttl = Duration::from_secs(hours.saturating_mul(60 * 60));
            let session_id = create_session(&user, fiscal_year, ttl);
            info!("{} signed in for fiscal year {}", user.username, fiscal_year);

            let cookie = Cookie::build(("session", session_id))
                .path("/")
                .http_only(true)
                .max_age(time::Duration::hours(hours as i64));
            (jar.add(cookie), Redirect::to("/dashboard")).into_response()
        }
        Ok(None) => {
            warn!("Failed login for {}", credentials.username);
            (StatusCode::UNAUTHORIZED, "Invalid username or password").into_response()
        }
        Err(e) => AppError::Internal(e).into_response(),
    }
}

/// Handle user logout
///
/// Drops the session and clears the cookie.
pub async fn handle_logout(jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get("session") {
        remove_session(cookie.value());
    }

    (jar.remove(Cookie::build("session").path("/")), Redirect::to("/"))
}

/// Authentication middleware
///
/// Passes requests with a valid session through, with the [`Session`]
/// attached as an extension. API calls without one get a 401 JSON body;
/// pages redirect to the login form.
pub async fn require_auth(
    jar: CookieJar,
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    if let Some(session) = jar.get("session").and_then(|c| validate_session(c.value())) {
        request.extensions_mut().insert(session);
        return next.run(request).await;
    }

    if request.uri().path().starts_with("/api/") {
        return AppError::Unauthorized.into_response();
    }
    Redirect::to("/").into_response()
}

/// Profile of the signed-in user
pub async fn session_profile(Extension(session): Extension<Session>) -> Json<SessionProfile> {
    Json(SessionProfile {
        username: session.username,
        role: session.role,
        kd_pemda: session.kd_pemda,
        fiscal_year: session.fiscal_year,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_stored(session_id: &str) -> bool {
        SESSIONS.read().unwrap().contains_key(session_id)
    }

    #[test]
    fn register_then_verify() {
        let dir = tempfile::tempdir().unwrap();
        init_database(dir.path()).unwrap();
        let users = dir.path().join("users.json");

        register_user(&users, "inspektur", "rahasia", Role::Inspektorat, Some("3513")).unwrap();
        assert!(register_user(&users, "inspektur", "lain", Role::Admin, None).is_err());

        let user = verify_user(&users, "inspektur", "rahasia").unwrap().unwrap();
        assert_eq!(user.kd_pemda.as_deref(), Some("3513"));
        assert_eq!(user.role, Role::Inspektorat);
        assert!(verify_user(&users, "inspektur", "salah").unwrap().is_none());
        assert!(verify_user(&users, "nobody", "rahasia").unwrap().is_none());
    }

    #[test]
    fn inactive_users_cannot_sign_in() {
        let dir = tempfile::tempdir().unwrap();
        init_database(dir.path()).unwrap();
        let file = dir.path().join("users.json");
        register_user(&file, "desa1", "pw", Role::Desa, None).unwrap();

        let mut users = get_users(&file).unwrap();
        users.get_mut("desa1").unwrap().active = false;
        save_users(&file, &users).unwrap();

        assert!(verify_user(&file, "desa1", "pw").unwrap().is_none());
    }

    #[test]
    fn sessions_expire() {
        let user = User {
            username: "admin".into(),
            name: "Admin".into(),
            password_hash: String::new(),
            role: Role::Admin,
            kd_pemda: None,
            active: true,
        };
        let live = create_session(&user, 2024, Duration::from_secs(60));
        let dead = create_session(&user, 2024, Duration::ZERO);

        assert_eq!(validate_session(&live).unwrap().fiscal_year, 2024);
        assert!(validate_session(&dead).is_none());
        assert!(!is_stored(&dead));
        assert!(is_stored(&live));

        remove_session(&live);
        assert!(validate_session(&live).is_none());
    }

    #[test]
    fn new_sessions_sweep_expired_ones() {
        let user = User {
            username: "desa1".into(),
            name: String::new(),
            password_hash: String::new(),
            role: Role::Desa,
            kd_pemda: Some("3513".into()),
            active: true,
        };
        let dead = create_session(&user, 2024, Duration::ZERO);
        let live = create_session(&user, 2024, Duration::from_secs(60));
        assert!(!is_stored(&dead));
        assert!(is_stored(&live));
    }

    #[test]
    fn fiscal_year_falls_back_to_current_year() {
        assert_eq!(fiscal_year_from(Some("2023")), 2023);
        assert_eq!(fiscal_year_from(Some("soon")), chrono::Local::now().year());
        assert_eq!(fiscal_year_from(None), chrono::Local::now().year());
    }
}
