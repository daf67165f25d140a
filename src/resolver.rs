use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::accounts::{RawAccountRecord, ResolvedCoordinate};
use crate::geo_cache::GeoCache;
use crate::geocoder::Geocoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Direct,
    Cache,
    Geocoder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    NoAddress,
    NotFound,
    LookupFailed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Resolved {
        coordinate: ResolvedCoordinate,
        source: ResolutionSource,
    },
    Unresolved(UnresolvedReason),
}

impl Resolution {
    fn resolved(coordinate: ResolvedCoordinate, source: ResolutionSource) -> Self {
        Resolution::Resolved { coordinate, source }
    }

    pub fn coordinate(&self) -> Option<ResolvedCoordinate> {
        match self {
            Resolution::Resolved { coordinate, .. } => Some(*coordinate),
            Resolution::Unresolved(_) => None,
        }
    }

    pub fn source(&self) -> Option<ResolutionSource> {
        match self {
            Resolution::Resolved { source, .. } => Some(*source),
            Resolution::Unresolved(_) => None,
        }
    }
}

/// Turns one account record into a coordinate: stored fields first, then the
/// address cache, then a geocoder call followed by the courtesy delay.
pub struct GeocodeResolver {
    geocoder: Arc<dyn Geocoder>,
    delay: Duration,
}

impl GeocodeResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>, delay: Duration) -> Self {
        Self { geocoder, delay }
    }

    pub async fn resolve(&self, record: &RawAccountRecord, cache: &mut GeoCache) -> Resolution {
        if let Some(coordinate) = record.direct_coordinate() {
            return Resolution::resolved(coordinate, ResolutionSource::Direct);
        }

        let address = record.address();
        if address.is_empty() {
            debug!(account = ?record.id(), "record has neither coordinates nor address");
            return Resolution::Unresolved(UnresolvedReason::NoAddress);
        }

        if let Some(coordinate) = cache.get(&address) {
            return Resolution::resolved(coordinate, ResolutionSource::Cache);
        }

        let outcome = self.geocoder.geocode(&address).await;
        let resolution = match outcome {
            Ok(Some(coordinate)) => {
                cache.set(address.as_str(), coordinate);
                Resolution::resolved(coordinate, ResolutionSource::Geocoder)
            }
            Ok(None) => {
                debug!(%address, "geocoder found no match");
                Resolution::Unresolved(UnresolvedReason::NotFound)
            }
            Err(err) => {
                warn!(?err, %address, "geocode lookup failed");
                Resolution::Unresolved(UnresolvedReason::LookupFailed)
            }
        };

        // Every outbound lookup is followed by the pause, hit or miss.
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        resolution
    }
}
