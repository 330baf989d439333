use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
#[serde(default)]
pub struct RelayConfig {
    pub listen_addr: String,
    pub weather: WeatherConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new_with_reasonable_defaults()
    }
}

impl RelayConfig {
    pub fn new_with_reasonable_defaults() -> Self {
        Self {
            listen_addr: "0.0.0.0:5000".into(),
            weather: WeatherConfig::new_with_reasonable_defaults(),
        }
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: RelayConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| anyhow!("Unable to read config file '{}': {err}", path.display()))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.listen_addr.is_empty() {
            return Err(anyhow!("listen_addr can not be empty"));
        }
        self.weather.validate()
    }
}

// Where to ask for the outdoor conditions. The relay serves a single fixed
// location.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
#[serde(default)]
pub struct WeatherConfig {
    // Without a key every fetch fails and outdoor values stay at their last
    // known value.
    pub api_key: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self::new_with_reasonable_defaults()
    }
}

impl WeatherConfig {
    pub fn new_with_reasonable_defaults() -> Self {
        Self {
            api_key: None,
            latitude: 6.8177,
            longitude: 79.8749,
            base_url: DEFAULT_WEATHER_URL.into(),
            timeout_secs: 5,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(anyhow!(
                "latitude must be between -90 and 90, got {}",
                self.latitude
            ));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(anyhow!(
                "longitude must be between -180 and 180, got {}",
                self.longitude
            ));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be greater than zero"));
        }
        if let Some(key) = &self.api_key {
            if key.is_empty() {
                return Err(anyhow!("api_key can not be empty string"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod relay_config {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = RelayConfig::new_with_reasonable_defaults();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.weather.timeout_secs, 5);
        assert_eq!(cfg.weather.api_key, None);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = RelayConfig::from_toml_str(
            r#"
            listen_addr = "127.0.0.1:8080"

            [weather]
            api_key = "abc123"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:8080");
        assert_eq!(cfg.weather.api_key, Some("abc123".to_string()));
        assert_eq!(cfg.weather.latitude, 6.8177);
        assert_eq!(cfg.weather.base_url, DEFAULT_WEATHER_URL);
    }

    #[test]
    fn empty_toml() {
        assert_eq!(
            RelayConfig::from_toml_str("").unwrap(),
            RelayConfig::new_with_reasonable_defaults()
        );
    }

    #[test]
    fn bad_latitude() {
        let result = RelayConfig::from_toml_str("[weather]\nlatitude = 91.0\n");
        assert_eq!(
            result.unwrap_err().to_string(),
            "latitude must be between -90 and 90, got 91"
        );
    }

    #[test]
    fn zero_timeout() {
        let mut cfg = RelayConfig::default();
        cfg.weather.timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_api_key() {
        let mut cfg = RelayConfig::default();
        cfg.weather.api_key = Some(String::new());
        assert!(cfg.validate().is_err());
    }
}
