use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::accounts::AccountEntity;
use crate::directory::PagedFetcher;
use crate::errors::AppResult;
use crate::geo_cache::GeoCache;
use crate::render::RenderConsumer;
use crate::resolver::{GeocodeResolver, Resolution, ResolutionSource};
use crate::store::BlobStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub fetched: usize,
    pub resolved: usize,
    pub direct: usize,
    pub cache_hits: usize,
    pub geocoded: usize,
    pub unresolved: usize,
}

impl RunSummary {
    fn record(&mut self, resolution: &Resolution) {
        match resolution.source() {
            Some(source) => {
                self.resolved += 1;
                match source {
                    ResolutionSource::Direct => self.direct += 1,
                    ResolutionSource::Cache => self.cache_hits += 1,
                    ResolutionSource::Geocoder => self.geocoded += 1,
                }
            }
            None => self.unresolved += 1,
        }
    }
}

/// One sequential ingest: fetch every page, resolve each record in order, and
/// hand the resolved accounts to the consumer.
///
/// The geo cache lives as long as the pipeline. It loads from storage on the
/// first lookup of the first run and later runs reuse the in-memory entries.
pub struct Pipeline {
    fetcher: PagedFetcher,
    resolver: GeocodeResolver,
    cache: Mutex<GeoCache>,
}

impl Pipeline {
    pub fn new(
        fetcher: PagedFetcher,
        resolver: GeocodeResolver,
        cache_store: Arc<dyn BlobStore>,
        cache_key: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            resolver,
            cache: Mutex::new(GeoCache::new(cache_store, cache_key)),
        }
    }

    /// Drops every cached coordinate, in memory and in storage.
    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
        info!("geo cache cleared");
    }

    /// Runs without delivering to a consumer; fetch failures are returned.
    pub async fn collect(
        &self,
        liveness: Option<Arc<AtomicBool>>,
    ) -> AppResult<(Vec<AccountEntity>, RunSummary)> {
        let records = self.fetcher.fetch_all().await?;
        let mut summary = RunSummary {
            fetched: records.len(),
            ..RunSummary::default()
        };

        let mut cache = self.cache.lock().await;
        debug!(cache_loaded = cache.is_loaded(), "resolving records");
        let mut entities = Vec::with_capacity(records.len());
        for record in &records {
            if !is_active(&liveness) {
                debug!(processed = summary.resolved + summary.unresolved, "run cancelled");
                break;
            }
            let resolution = self.resolver.resolve(record, &mut *cache).await;
            summary.record(&resolution);
            if let Some(coordinate) = resolution.coordinate() {
                entities.push(AccountEntity::from_record(record, coordinate));
            }
        }

        info!(
            circles = entities.len(),
            direct = summary.direct,
            cache_hits = summary.cache_hits,
            geocoded = summary.geocoded,
            unresolved = summary.unresolved,
            cached_addresses = cache.len(),
            "created circles"
        );
        Ok((entities, summary))
    }

    /// Full run against a consumer. Only a failed fetch is reported as an
    /// error; results are dropped if the liveness flag went inactive.
    pub async fn run<C: RenderConsumer + ?Sized>(
        &self,
        consumer: &mut C,
        liveness: Option<Arc<AtomicBool>>,
    ) -> AppResult<RunSummary> {
        consumer.set_loading(true);
        let outcome = self.collect(liveness.clone()).await;
        let active = is_active(&liveness);

        let result = match outcome {
            Ok((entities, summary)) => {
                if active {
                    consumer.show_entities(entities);
                }
                Ok(summary)
            }
            Err(err) => {
                error!(?err, "pipeline run failed");
                if active {
                    consumer.show_error(&err);
                }
                Err(err)
            }
        };

        if active {
            consumer.set_loading(false);
        }
        result
    }
}

fn is_active(liveness: &Option<Arc<AtomicBool>>) -> bool {
    liveness
        .as_ref()
        .map(|flag| flag.load(Ordering::SeqCst))
        .unwrap_or(true)
}
