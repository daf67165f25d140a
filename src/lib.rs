mod accounts;
mod config;
mod directory;
mod encoder;
mod errors;
mod export;
mod geo_cache;
mod geocoder;
mod pipeline;
mod render;
mod resolver;
mod store;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use accounts::{
    parse_revenue, AccountEntity, RawAccountRecord, ResolvedCoordinate, ADDRESS_DELIMITER,
};
pub use config::{AppConfig, CacheBackend, OutputFormat, PublicAppConfig};
pub use directory::{
    extract_records, AccountDirectory, ExtractionStrategy, HttpAccountDirectory, PageRequest,
    PagedFetcher, ENVELOPE_STRATEGIES,
};
pub use encoder::{color_from_revenue, id_hash, radius_from_revenue, HslColor, MAX_RADIUS_METERS};
pub use errors::{AppError, AppResult};
pub use export::ExportConsumer;
pub use geo_cache::{GeoCache, GeoCacheMap};
pub use geocoder::{Geocoder, NominatimGeocoder};
pub use pipeline::{Pipeline, RunSummary};
pub use render::{circle_layer, fit_bounds, Bounds, CircleStyle, MapView, RenderConsumer};
pub use resolver::{GeocodeResolver, Resolution, ResolutionSource, UnresolvedReason};
pub use store::{open_blob_store, BlobStore, FileBlobStore, MemoryBlobStore, SqliteBlobStore};

/// Wired collaborators for one configured environment.
pub struct AppState {
    config: AppConfig,
    pipeline: Pipeline,
}

impl AppState {
    pub fn initialize(config: AppConfig) -> AppResult<Self> {
        let store = open_blob_store(&config)?;
        let directory = Arc::new(HttpAccountDirectory::new(&config)?);
        let geocoder = Arc::new(NominatimGeocoder::new(&config)?);
        let pipeline = Pipeline::new(
            PagedFetcher::new(directory, config.directory_page_size),
            GeocodeResolver::new(geocoder, config.geocode_delay()),
            store,
            config.geo_cache_key.as_str(),
        );
        Ok(Self { config, pipeline })
    }

    pub async fn refresh_map(&self) -> AppResult<(ExportConsumer, RunSummary)> {
        let mut consumer = ExportConsumer::new();
        let summary = self.pipeline.run(&mut consumer, None).await?;
        consumer.write(
            &self.config.output_path,
            self.config.output_format,
            self.config.render_zoom,
        )?;
        Ok((consumer, summary))
    }
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,territory_map=debug"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}

pub async fn run() -> AppResult<RunSummary> {
    init_tracing();
    let config = AppConfig::from_env();
    info!(config = ?config.public_profile(), "starting account map refresh");
    let state = AppState::initialize(config)?;
    let (_, summary) = state.refresh_map().await?;
    Ok(summary)
}
