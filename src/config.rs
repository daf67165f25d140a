use std::path::PathBuf;
use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

use crate::errors::{AppError, AppResult};

pub const DEFAULT_PAGE_SIZE: u32 = 5_000;
pub const DEFAULT_GEOCODE_DELAY_MS: u64 = 150;
pub const DEFAULT_GEO_CACHE_KEY: &str = "account_geo_cache_v1";
pub const DEFAULT_GEOCODER_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";
pub const DEFAULT_GEOCODER_USER_AGENT: &str = "TerritoryManager/1.0 (+https://example.com)";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    File,
    Sqlite,
    Memory,
}

impl CacheBackend {
    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(CacheBackend::File),
            "sqlite" => Ok(CacheBackend::Sqlite),
            "memory" => Ok(CacheBackend::Memory),
            _ => Err(AppError::Config(format!("invalid cache backend: {value}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    GeoJson,
    Csv,
}

impl OutputFormat {
    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "geojson" | "json" => Ok(OutputFormat::GeoJson),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(AppError::Config(format!("invalid output format: {value}"))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub directory_api_base: Option<String>,
    pub directory_access_token: Option<SecretString>,
    pub directory_entity_set: String,
    pub directory_page_size: u32,
    pub geocoder_endpoint: String,
    pub geocoder_user_agent: String,
    pub geocode_delay_ms: u64,
    pub http_timeout_secs: u64,
    pub geo_cache_key: String,
    pub geo_cache_backend: CacheBackend,
    pub data_dir: PathBuf,
    pub render_zoom: f64,
    pub output_path: PathBuf,
    pub output_format: OutputFormat,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub directory_api_base: Option<String>,
    pub directory_entity_set: String,
    pub directory_page_size: u32,
    pub geocoder_endpoint: String,
    pub geocoder_user_agent: String,
    pub geocode_delay_ms: u64,
    pub http_timeout_secs: u64,
    pub geo_cache_key: String,
    pub geo_cache_backend: CacheBackend,
    pub data_dir: String,
    pub render_zoom: f64,
    pub output_path: String,
    pub output_format: OutputFormat,
    pub has_directory_token: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            directory_api_base: non_empty_var("DIRECTORY_API_BASE"),
            directory_access_token: non_empty_var("DIRECTORY_ACCESS_TOKEN").map(SecretString::from),
            directory_entity_set: non_empty_var("DIRECTORY_ENTITY_SET")
                .unwrap_or_else(|| "accounts".to_string()),
            directory_page_size: parse_u32("DIRECTORY_PAGE_SIZE", DEFAULT_PAGE_SIZE).max(1),
            geocoder_endpoint: non_empty_var("GEOCODER_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_GEOCODER_ENDPOINT.to_string()),
            geocoder_user_agent: non_empty_var("GEOCODER_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_GEOCODER_USER_AGENT.to_string()),
            geocode_delay_ms: parse_u64("GEOCODE_DELAY_MS", DEFAULT_GEOCODE_DELAY_MS),
            http_timeout_secs: parse_u64("HTTP_TIMEOUT_SECS", 10).max(1),
            geo_cache_key: non_empty_var("GEO_CACHE_KEY")
                .unwrap_or_else(|| DEFAULT_GEO_CACHE_KEY.to_string()),
            geo_cache_backend: non_empty_var("GEO_CACHE_BACKEND")
                .and_then(|v| CacheBackend::parse(&v).ok())
                .unwrap_or(CacheBackend::File),
            data_dir: non_empty_var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            render_zoom: parse_f64("RENDER_ZOOM", 2.0),
            output_path: non_empty_var("OUTPUT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("account-map.geojson")),
            output_format: non_empty_var("OUTPUT_FORMAT")
                .and_then(|v| OutputFormat::parse(&v).ok())
                .unwrap_or(OutputFormat::GeoJson),
        }
    }

    pub fn geocode_delay(&self) -> Duration {
        Duration::from_millis(self.geocode_delay_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            directory_api_base: self.directory_api_base.clone(),
            directory_entity_set: self.directory_entity_set.clone(),
            directory_page_size: self.directory_page_size,
            geocoder_endpoint: self.geocoder_endpoint.clone(),
            geocoder_user_agent: self.geocoder_user_agent.clone(),
            geocode_delay_ms: self.geocode_delay_ms,
            http_timeout_secs: self.http_timeout_secs,
            geo_cache_key: self.geo_cache_key.clone(),
            geo_cache_backend: self.geo_cache_backend,
            data_dir: self.data_dir.to_string_lossy().to_string(),
            render_zoom: self.render_zoom,
            output_path: self.output_path.to_string_lossy().to_string(),
            output_format: self.output_format,
            has_directory_token: self.directory_access_token.is_some(),
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn parse_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}
