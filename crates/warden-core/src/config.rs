//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::ladder::{Ladder, LadderError};

/// What the `admit` convenience wrapper does when the store cannot be
/// consulted. A host picks this once; the engine never hard-codes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailMode {
    /// Allow the request when the store is unavailable.
    Open,
    /// Deny the request when the store is unavailable.
    Closed,
}

/// Validated engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    pub ladder: Ladder,
    pub fail_mode: FailMode,
    /// Bound on compare-and-swap retries for one write before the conflict
    /// surfaces as a store error. Each retry implies another writer made
    /// progress on the same bucket.
    pub max_write_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ladder: Ladder::default(),
            fail_mode: FailMode::Open,
            max_write_retries: 16,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), LadderError> {
        self.ladder.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn invalid_ladder_is_rejected() {
        let config = EngineConfig {
            ladder: Ladder {
                fifth_secs: -5,
                ..Ladder::default()
            },
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
