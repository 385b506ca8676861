use log::{info, warn};
use std::{env, fmt::Display, path::PathBuf, str::FromStr};

/// Longest session lifetime accepted from the environment (one year)
pub const MAX_SESSION_HOURS: u64 = 24 * 366;

/// Server settings, read once at startup
#[derive(Clone, Debug)]
pub struct Config {
    pub bind: String,
    pub port: u16,

    /// Holds `users.json`, `siskeudes.json` and the `snapshots/` directory
    pub database_dir: PathBuf,

    pub session_hours: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1".to_string(),
            port: 3000,
            database_dir: PathBuf::from("database"),
            session_hours: 8,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup, falling back to defaults for unset keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let session_hours: u64 = try_load(&lookup, "CACM_SESSION_HOURS", "8")?;
        if !(1..=MAX_SESSION_HOURS).contains(&session_hours) {
            warn!("CACM_SESSION_HOURS must be between 1 and {MAX_SESSION_HOURS}, got {session_hours}");
            return Err("Environment misconfigured: CACM_SESSION_HOURS".to_string());
        }

        Ok(Self {
            bind: try_load(&lookup, "CACM_BIND", "127.0.0.1")?,
            port: try_load(&lookup, "CACM_PORT", "3000")?,
            database_dir: try_load(&lookup, "CACM_DATABASE_DIR", "database")?,
            session_hours,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn users_file(&self) -> PathBuf {
        self.database_dir.join("users.json")
    }

    pub fn store_file(&self) -> PathBuf {
        self.database_dir.join("siskeudes.json")
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.database_dir.join("snapshots")
    }
}

fn try_load<T, F>(lookup: &F, key: &str, default: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            format!("Environment misconfigured: {key}")
        })
}
