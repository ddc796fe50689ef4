use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use tracing::trace;

use crate::error::{VdrError, VdrResult};
use crate::types::{CacheOptions, CachedResource, ResourceType};

/// Read-through cache sitting between the resolver and the ledger adapters.
///
/// One partition per resource type, keyed by fully-qualified id. An entry is
/// replaced wholesale on store; there is no invalidation API beyond the
/// per-call options and [`ResolutionCache::purge`].
pub struct ResolutionCache {
    partitions: RwLock<HashMap<ResourceType, HashMap<String, CachedResource>>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        ResolutionCache {
            partitions: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a cached document, honoring `no_cache` and `min_fresh`.
    pub fn get(
        &self,
        resource_type: ResourceType,
        id: &str,
        options: &CacheOptions,
    ) -> VdrResult<Option<String>> {
        if options.no_cache {
            return Ok(None);
        }

        let partitions = self
            .partitions
            .read()
            .map_err(|_| VdrError::Internal("resolution cache poisoned".to_string()))?;
        let entry = match partitions.get(&resource_type).and_then(|p| p.get(id)) {
            Some(entry) => entry,
            None => return Ok(None),
        };

        if let Some(min_fresh) = options.min_fresh {
            let age = Utc::now()
                .signed_duration_since(entry.cached_at)
                .num_seconds();
            if age > min_fresh {
                trace!(%resource_type, id, age, "cache entry too old");
                return Ok(None);
            }
        }

        Ok(Some(entry.value.to_string()))
    }

    /// Replace the entry for `id` wholesale. Skipped when `no_store` is set.
    pub fn store(
        &self,
        resource_type: ResourceType,
        id: &str,
        document: &str,
        options: &CacheOptions,
    ) -> VdrResult<()> {
        if options.no_store {
            return Ok(());
        }
        let value: serde_json::Value = serde_json::from_str(document)?;

        let mut partitions = self
            .partitions
            .write()
            .map_err(|_| VdrError::Internal("resolution cache poisoned".to_string()))?;
        partitions.entry(resource_type).or_default().insert(
            id.to_string(),
            CachedResource {
                value,
                cached_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Drop a whole partition.
    pub fn purge(&self, resource_type: ResourceType) -> VdrResult<()> {
        let mut partitions = self
            .partitions
            .write()
            .map_err(|_| VdrError::Internal("resolution cache poisoned".to_string()))?;
        partitions.remove(&resource_type);
        Ok(())
    }
}

impl Default for ResolutionCache {
    fn default() -> Self {
        ResolutionCache::new()
    }
}
