use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::accounts::{parse_number, ResolvedCoordinate};
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

/// Free-text address lookup. `Ok(None)` means the service answered but found
/// nothing usable; `Err` is a transport or decoding failure.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, query: &str) -> AppResult<Option<ResolvedCoordinate>>;
}

/// Nominatim-style search endpoint: `?format=json&limit=1&q=<address>`.
pub struct NominatimGeocoder {
    http: Client,
    endpoint: Url,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    lat: Value,
    #[serde(default)]
    lon: Value,
}

impl NominatimGeocoder {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let endpoint = Url::parse(&config.geocoder_endpoint).map_err(|err| {
            AppError::Config(format!("invalid geocoder endpoint: {err}"))
        })?;
        let http = Client::builder()
            .user_agent(config.geocoder_user_agent.as_str())
            .timeout(config.http_timeout())
            .build()?;
        Ok(Self { http, endpoint })
    }

    fn search_url(&self, query: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("format", "json")
            .append_pair("limit", "1")
            .append_pair("q", query);
        url
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, query: &str) -> AppResult<Option<ResolvedCoordinate>> {
        let response = self.http.get(self.search_url(query)).send().await?;
        if !response.status().is_success() {
            debug!(status = %response.status(), "geocoder answered with non-success status");
            return Ok(None);
        }

        let candidates: Vec<Candidate> = response.json().await?;
        let Some(first) = candidates.into_iter().next() else {
            return Ok(None);
        };

        Ok(ResolvedCoordinate::finite(
            parse_number(&first.lat),
            parse_number(&first.lon),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_endpoint(endpoint: &str) -> AppConfig {
        let mut config = AppConfig::from_env();
        config.geocoder_endpoint = endpoint.to_string();
        config
    }

    #[test]
    fn builds_search_url_with_encoded_query() {
        let geocoder =
            NominatimGeocoder::new(&config_with_endpoint("https://geo.example.com/search")).unwrap();
        let url = geocoder.search_url("1 Main St, Springfield & Co");
        assert_eq!(url.path(), "/search");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("format".to_string(), "json".to_string()),
                ("limit".to_string(), "1".to_string()),
                ("q".to_string(), "1 Main St, Springfield & Co".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_invalid_endpoint() {
        assert!(NominatimGeocoder::new(&config_with_endpoint("not a url")).is_err());
    }
}
