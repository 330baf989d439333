//! The homeserver relays readings pushed by the sensor node, merges them with
//! live outdoor weather, and takes device commands from the dashboard.

mod routes;

use homelib::config::RelayConfig;
use homelib::store::StateStore;
use homelib::weather::WeatherFetcher;
use std::env;
use std::sync::Arc;

const CONFIG_ENV: &str = "HOMERELAY_CONFIG";
const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stderrlog::new()
        .module(module_path!())
        .module("homelib")
        .verbosity(log::Level::Info)
        .init()?;

    log::info!("Starting home relay server...");

    let cfg = load_config()?;
    if cfg.weather.api_key.is_none() {
        log::warn!(
            "No weather api key configured (set {API_KEY_ENV}), outdoor values will not update"
        );
    }

    let store = Arc::new(StateStore::new());
    let weather = Arc::new(WeatherFetcher::new(cfg.weather.clone())?);
    let app = routes::app(routes::AppState { store, weather });

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    log::info!("Listening on {}", cfg.listen_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

// Config file path and api key can both come from the environment. The api key
// env var takes precedence over the file.
fn load_config() -> anyhow::Result<RelayConfig> {
    let mut cfg = match env::var(CONFIG_ENV) {
        Ok(path) => {
            log::info!("Reading config from '{path}'");
            RelayConfig::load(path)?
        }
        Err(_) => RelayConfig::new_with_reasonable_defaults(),
    };
    if let Ok(key) = env::var(API_KEY_ENV) {
        if !key.is_empty() {
            cfg.weather.api_key = Some(key);
        }
    }
    cfg.validate()?;
    Ok(cfg)
}
