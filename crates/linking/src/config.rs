use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::IdCodec;

/// Configuration for the account-linking store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkingConfig {
    /// Store user ids in their native 16-byte form. Disable for backends
    /// that only take text columns.
    pub native_ids: bool,

    /// Seconds an unredeemed linking code stays valid before
    /// `evict_expired` may remove it.
    pub code_ttl_secs: u64,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            native_ids: true,
            code_ttl_secs: 900,
        }
    }
}

impl LinkingConfig {
    /// The id codec selected by this configuration.
    #[must_use]
    pub fn codec(&self) -> IdCodec {
        if self.native_ids {
            IdCodec::Native
        } else {
            IdCodec::Text
        }
    }

    /// Linking-code time-to-live.
    #[must_use]
    pub fn code_ttl(&self) -> Duration {
        Duration::from_secs(self.code_ttl_secs)
    }
}
