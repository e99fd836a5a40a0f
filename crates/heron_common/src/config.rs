use serde::{Deserialize, Serialize};

/// Sync mode for the durability log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Buffered writes only. Tests and throwaway installations.
    None,
    /// fsync after every append; required for the no-reissue guarantee.
    #[default]
    FSync,
}

/// Configuration for the transaction-identity subsystem. All values are
/// fixed at startup, never runtime-tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransamConfig {
    /// Status page size in bytes.
    pub page_size: usize,
    /// Object ids reserved per durability write. Larger batches mean fewer
    /// log appends but more ids burned on a crash.
    pub oid_batch_size: u32,
    /// Durability log sync mode.
    #[serde(default)]
    pub sync_mode: SyncMode,
}

impl Default for TransamConfig {
    fn default() -> Self {
        Self {
            page_size: 8192,
            oid_batch_size: 8192,
            sync_mode: SyncMode::FSync,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransamConfig::default();
        assert_eq!(config.page_size, 8192);
        assert_eq!(config.oid_batch_size, 8192);
        assert_eq!(config.sync_mode, SyncMode::FSync);
    }
}
