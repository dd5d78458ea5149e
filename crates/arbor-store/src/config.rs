use serde::{Deserialize, Serialize};

/// Configuration for [`BulkQuery`](crate::BulkQuery).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkQueryConfig {
    /// Maximum number of queued lookups resolved by one `get_all` call.
    pub batch_size: usize,
}

impl Default for BulkQueryConfig {
    fn default() -> Self {
        Self { batch_size: 5000 }
    }
}

/// Configuration for [`CachingStore`](crate::CachingStore).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached objects before the oldest are evicted.
    pub capacity: usize,
    /// Number of queued prefetch hints that triggers an early fetch.
    pub prefetch_flush_threshold: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100_000,
            prefetch_flush_threshold: 1_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert_eq!(BulkQueryConfig::default().batch_size, 5000);
        let cache = CacheConfig::default();
        assert_eq!(cache.capacity, 100_000);
        assert_eq!(cache.prefetch_flush_threshold, 1_000);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: CacheConfig = serde_json::from_str(r#"{"capacity": 10}"#).unwrap();
        assert_eq!(cfg.capacity, 10);
        assert_eq!(cfg.prefetch_flush_threshold, 1_000);
    }
}
