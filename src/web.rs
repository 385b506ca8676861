#![cfg(not(tarpaulin_include))]

use cacm_desa::app;
use cacm_desa::config::Config;

/// Main entry point for the dashboard server
///
/// Reads the `CACM_*` environment variables (see [`Config`]) and serves the
/// dashboard API until the process is stopped. Set `RUST_LOG=info` to see
/// request logs.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load()?;
    println!(
        "Starting CACM Desa dashboard server, database at {}",
        config.database_dir.display()
    );
    app::run(config).await
}
