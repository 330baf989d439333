use crate::config::WeatherConfig;
use crate::types::EnvironmentReading;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("no weather api key configured")]
    MissingApiKey,
    #[error("weather request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("weather provider returned status {0}")]
    Status(u16),
    #[error("malformed weather response: {0}")]
    Decode(#[from] serde_json::Error),
}

// Source of outdoor conditions. The real implementation talks to the weather
// provider; FakeWeather is used for testing.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch(&self) -> Result<EnvironmentReading, FetchError>;
}

// The part of the provider's response we care about.
#[derive(Deserialize, Debug)]
struct ProviderResponse {
    main: ProviderMain,
}

#[derive(Deserialize, Debug)]
struct ProviderMain {
    // Kelvin
    temp: f64,
    // Percent
    humidity: f64,
}

pub fn kelvin_to_celsius(k: f64) -> f64 {
    k - 273.15
}

pub struct WeatherFetcher {
    client: reqwest::Client,
    config: WeatherConfig,
}

impl WeatherFetcher {
    pub fn new(config: WeatherConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl WeatherSource for WeatherFetcher {
    // One GET per call, no retries. The next status poll simply tries again.
    async fn fetch(&self) -> Result<EnvironmentReading, FetchError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(FetchError::MissingApiKey)?;

        let resp = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("lat", self.config.latitude.to_string()),
                ("lon", self.config.longitude.to_string()),
                ("appid", api_key.to_string()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status().as_u16()));
        }

        let body = resp.bytes().await?;
        let parsed: ProviderResponse = serde_json::from_slice(&body)?;
        Ok(EnvironmentReading {
            temperature: kelvin_to_celsius(parsed.main.temp),
            humidity: parsed.main.humidity,
        })
    }
}

// FakeWeather implements WeatherSource and is used for testing. A None reading
// makes every fetch fail.
pub struct FakeWeather {
    reading: Mutex<Option<EnvironmentReading>>,
}

impl FakeWeather {
    pub fn new(reading: Option<EnvironmentReading>) -> Self {
        Self {
            reading: Mutex::new(reading),
        }
    }

    pub fn failing() -> Self {
        Self::new(None)
    }

    pub fn set(&self, reading: Option<EnvironmentReading>) {
        *self
            .reading
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = reading;
    }
}

#[async_trait]
impl WeatherSource for FakeWeather {
    async fn fetch(&self) -> Result<EnvironmentReading, FetchError> {
        let reading = *self
            .reading
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        reading.ok_or(FetchError::Status(503))
    }
}

#[cfg(test)]
mod weather_fetcher {
    use super::*;
    use axum::Router;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use std::collections::HashMap;

    // Serves `router` on an ephemeral local port and returns the provider url.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/weather")
    }

    fn config(base_url: String) -> WeatherConfig {
        WeatherConfig {
            api_key: Some("secret".into()),
            latitude: 1.5,
            longitude: -2.25,
            base_url,
            timeout_secs: 1,
        }
    }

    #[test]
    fn conversion() {
        assert!((kelvin_to_celsius(273.15)).abs() < 1e-9);
        assert!((kelvin_to_celsius(300.15) - 27.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn success() {
        let router = Router::new().route(
            "/weather",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q.get("lat").map(String::as_str), Some("1.5"));
                assert_eq!(q.get("lon").map(String::as_str), Some("-2.25"));
                assert_eq!(q.get("appid").map(String::as_str), Some("secret"));
                axum::Json(serde_json::json!({
                    "weather": [{"main": "Clouds"}],
                    "main": {"temp": 303.15, "humidity": 74, "pressure": 1008}
                }))
            }),
        );
        let fetcher = WeatherFetcher::new(config(serve(router).await)).unwrap();
        let reading = fetcher.fetch().await.unwrap();
        assert!((reading.temperature - 30.0).abs() < 1e-9);
        assert_eq!(reading.humidity, 74.0);
    }

    #[tokio::test]
    async fn bad_status() {
        let router = Router::new().route(
            "/weather",
            get(|| async { (StatusCode::UNAUTHORIZED, "invalid api key") }),
        );
        let fetcher = WeatherFetcher::new(config(serve(router).await)).unwrap();
        assert!(matches!(fetcher.fetch().await, Err(FetchError::Status(401))));
    }

    #[tokio::test]
    async fn malformed_body() {
        let router = Router::new().route(
            "/weather",
            get(|| async { axum::Json(serde_json::json!({"main": {"temp": "hot"}})) }),
        );
        let fetcher = WeatherFetcher::new(config(serve(router).await)).unwrap();
        assert!(matches!(fetcher.fetch().await, Err(FetchError::Decode(_))));
    }

    #[tokio::test]
    async fn timeout() {
        let router = Router::new().route(
            "/weather",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                "too late"
            }),
        );
        let fetcher = WeatherFetcher::new(config(serve(router).await)).unwrap();
        assert!(matches!(fetcher.fetch().await, Err(FetchError::Request(_))));
    }

    #[tokio::test]
    async fn unreachable() {
        // Nothing listens on port 9 locally.
        let fetcher = WeatherFetcher::new(config("http://127.0.0.1:9/weather".into())).unwrap();
        assert!(matches!(fetcher.fetch().await, Err(FetchError::Request(_))));
    }

    #[tokio::test]
    async fn missing_api_key() {
        let mut cfg = config("http://127.0.0.1:9/weather".into());
        cfg.api_key = None;
        let fetcher = WeatherFetcher::new(cfg).unwrap();
        assert!(matches!(
            fetcher.fetch().await,
            Err(FetchError::MissingApiKey)
        ));
    }

    #[tokio::test]
    async fn fake_weather() {
        let fake = FakeWeather::failing();
        assert!(fake.fetch().await.is_err());
        let reading = EnvironmentReading {
            temperature: 18.0,
            humidity: 55.0,
        };
        fake.set(Some(reading));
        assert_eq!(fake.fetch().await.unwrap(), reading);
    }
}
