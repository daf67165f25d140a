use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::accounts::ResolvedCoordinate;
use crate::store::BlobStore;

pub type GeoCacheMap = BTreeMap<String, ResolvedCoordinate>;

/// Address-to-coordinate memo persisted as a single JSON blob.
///
/// The blob is read lazily on first access, so a cache built over a store that
/// an earlier run wrote to picks those entries up without any explicit step.
/// Storage problems never escape: an unreadable blob loads as empty and a
/// failed write leaves the in-memory entries in place.
pub struct GeoCache {
    store: Arc<dyn BlobStore>,
    key: String,
    entries: Option<GeoCacheMap>,
}

impl GeoCache {
    pub fn new(store: Arc<dyn BlobStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            entries: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.entries.is_some()
    }

    /// Reads the persisted mapping, yielding an empty one when the blob is
    /// missing, unreadable, or malformed.
    pub fn load(&self) -> GeoCacheMap {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return GeoCacheMap::new(),
            Err(err) => {
                warn!(target: "geo_cache", ?err, key = %self.key, "geo cache unreadable; starting empty");
                return GeoCacheMap::new();
            }
        };

        match serde_json::from_str::<BTreeMap<String, Value>>(&raw) {
            Ok(raw_entries) => raw_entries
                .into_iter()
                .filter_map(|(address, value)| {
                    serde_json::from_value::<ResolvedCoordinate>(value)
                        .ok()
                        .filter(ResolvedCoordinate::is_finite)
                        .map(|coordinate| (address, coordinate))
                })
                .collect(),
            Err(err) => {
                warn!(target: "geo_cache", ?err, key = %self.key, "geo cache malformed; starting empty");
                GeoCacheMap::new()
            }
        }
    }

    pub fn save(&self, map: &GeoCacheMap) {
        let serialized = match serde_json::to_string(map) {
            Ok(serialized) => serialized,
            Err(err) => {
                warn!(target: "geo_cache", ?err, "failed to serialize geo cache");
                return;
            }
        };
        if let Err(err) = self.store.set(&self.key, &serialized) {
            warn!(target: "geo_cache", ?err, key = %self.key, "failed to persist geo cache");
        }
    }

    pub fn get(&mut self, address: &str) -> Option<ResolvedCoordinate> {
        self.entries().get(address).copied()
    }

    /// Records a coordinate and persists the whole mapping straight away.
    pub fn set(&mut self, address: impl Into<String>, coordinate: ResolvedCoordinate) {
        let address = address.into();
        trace!(target: "geo_cache", %address, lat = coordinate.lat, lng = coordinate.lng, "caching coordinate");
        self.entries().insert(address, coordinate);
        if let Some(entries) = &self.entries {
            self.save(entries);
        }
    }

    pub fn len(&mut self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.entries().is_empty()
    }

    /// Drops every entry, both in memory and in storage.
    pub fn clear(&mut self) {
        self.entries = Some(GeoCacheMap::new());
        if let Err(err) = self.store.remove(&self.key) {
            warn!(target: "geo_cache", ?err, key = %self.key, "failed to remove persisted geo cache");
        }
    }

    fn entries(&mut self) -> &mut GeoCacheMap {
        if self.entries.is_none() {
            let loaded = self.load();
            debug!(target: "geo_cache", entries = loaded.len(), key = %self.key, "geo cache loaded");
            self.entries = Some(loaded);
        }
        self.entries.get_or_insert_with(GeoCacheMap::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{AppError, AppResult};
    use crate::store::MemoryBlobStore;

    const KEY: &str = "account_geo_cache_v1";

    struct ReadOnlyStore {
        inner: MemoryBlobStore,
    }

    impl BlobStore for ReadOnlyStore {
        fn get(&self, key: &str) -> AppResult<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, _key: &str, _value: &str) -> AppResult<()> {
            Err(AppError::Config("quota exceeded".into()))
        }

        fn remove(&self, _key: &str) -> AppResult<()> {
            Err(AppError::Config("quota exceeded".into()))
        }
    }

    fn sample_map() -> GeoCacheMap {
        let mut map = GeoCacheMap::new();
        map.insert(
            "1 Main St, Springfield, IL, 62701, US".into(),
            ResolvedCoordinate::new(39.8, -89.6),
        );
        map.insert("Paris, FR".into(), ResolvedCoordinate::new(48.8566, 2.3522));
        map
    }

    #[test]
    fn save_then_load_reproduces_mapping() {
        let store = Arc::new(MemoryBlobStore::default());
        let cache = GeoCache::new(store.clone(), KEY);
        let map = sample_map();
        cache.save(&map);

        let fresh = GeoCache::new(store, KEY);
        assert_eq!(fresh.load(), map);
        fresh.save(&fresh.load());
        assert_eq!(fresh.load(), map);
    }

    #[test]
    fn malformed_blob_loads_empty() {
        let store = Arc::new(MemoryBlobStore::default());
        store.set(KEY, "{not json").unwrap();
        let cache = GeoCache::new(store.clone(), KEY);
        assert!(cache.load().is_empty());

        store.set(KEY, "[1,2,3]").unwrap();
        assert!(cache.load().is_empty());
    }

    #[test]
    fn reads_blob_written_by_browser_cache() {
        let store = Arc::new(MemoryBlobStore::default());
        store
            .set(
                KEY,
                r#"{"Oslo, NO":{"lat":59.91,"lng":10.75},"Broken":{"lat":null,"lng":null}}"#,
            )
            .unwrap();
        let cache = GeoCache::new(store, KEY);
        let map = cache.load();
        assert_eq!(map.len(), 1);
        assert_eq!(map["Oslo, NO"], ResolvedCoordinate::new(59.91, 10.75));
    }

    #[test]
    fn loads_lazily_and_persists_each_set() {
        let store = Arc::new(MemoryBlobStore::default());
        let mut cache = GeoCache::new(store.clone(), KEY);
        assert!(!cache.is_loaded());
        assert_eq!(cache.get("Paris, FR"), None);
        assert!(cache.is_loaded());

        cache.set("Paris, FR", ResolvedCoordinate::new(48.8566, 2.3522));
        let persisted = store.get(KEY).unwrap().unwrap();
        assert!(persisted.contains("Paris, FR"));

        let mut next_run = GeoCache::new(store, KEY);
        assert_eq!(
            next_run.get("Paris, FR"),
            Some(ResolvedCoordinate::new(48.8566, 2.3522))
        );
    }

    #[test]
    fn failed_writes_keep_memory_entries() {
        let inner = MemoryBlobStore::default();
        let store = Arc::new(ReadOnlyStore { inner });
        let mut cache = GeoCache::new(store, KEY);
        cache.set("Lima, PE", ResolvedCoordinate::new(-12.05, -77.04));
        assert_eq!(
            cache.get("Lima, PE"),
            Some(ResolvedCoordinate::new(-12.05, -77.04))
        );
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_removes_persisted_blob() {
        let store = Arc::new(MemoryBlobStore::default());
        let mut cache = GeoCache::new(store.clone(), KEY);
        cache.set("Paris, FR", ResolvedCoordinate::new(48.8566, 2.3522));
        cache.clear();
        assert_eq!(store.get(KEY).unwrap(), None);
        assert_eq!(cache.len(), 0);

        let mut next_run = GeoCache::new(store, KEY);
        assert!(next_run.is_empty());
    }
}
