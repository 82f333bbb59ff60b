//! Campaign configuration.
use serde::{Deserialize, Serialize};

use crate::state::DEFAULT_ROSTER;
use crate::storage::DEFAULT_STORAGE_KEY;
use crate::sync::OutboxPolicy;

/// Settings read once at start-up and handed to the engine.
/// Every field falls back to its default when absent from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// Characters seeded into a fresh campaign.
    pub roster: Vec<String>,
    pub storage_key: String,
    pub outbox: OutboxPolicy,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            roster: DEFAULT_ROSTER.iter().map(ToString::to_string).collect(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            outbox: OutboxPolicy::default(),
        }
    }
}

impl CampaignConfig {
    /// Default roster and storage key, with a five-attempt outbox.
    #[must_use]
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Parse a config file. Omitted fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into a configuration.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
