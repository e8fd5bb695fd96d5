use std::time::Duration;

/// Configuration for a session store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How long boards, hit records, sessions and active-game pointers
    /// live after their last write.
    pub record_ttl: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            record_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}
