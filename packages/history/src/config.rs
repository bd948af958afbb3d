use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::HistoryError;

pub const DEFAULT_CONFIG_NAME: &str = "tiledoc.config.json";

/// History engine configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryConfig {
    /// Deepest allowed chain of shared-model cascades inside one entry
    #[serde(default = "default_max_cascade_depth")]
    pub max_cascade_depth: usize,

    /// Drop completed entries whose records carry no patches
    #[serde(default)]
    pub prune_empty_entries: bool,

    /// Buffer size of the history event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_max_cascade_depth() -> usize {
    8
}

fn default_event_capacity() -> usize {
    256
}

impl HistoryConfig {
    /// Load config from a directory
    pub fn load(dir: &Path) -> Result<Self, HistoryError> {
        let config_path = dir.join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: HistoryConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            // Return default config if none exists
            Ok(HistoryConfig::default())
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_cascade_depth: default_max_cascade_depth(),
            prune_empty_entries: false,
            event_capacity: default_event_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "maxCascadeDepth": 3,
            "pruneEmptyEntries": true
        }"#;

        let config: HistoryConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_cascade_depth, 3);
        assert!(config.prune_empty_entries);
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_default_config() {
        let config = HistoryConfig::default();
        assert_eq!(config.max_cascade_depth, 8);
        assert!(!config.prune_empty_entries);
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let dir = std::env::temp_dir().join("tiledoc-config-missing");
        let config = HistoryConfig::load(&dir).unwrap();
        assert_eq!(config, HistoryConfig::default());
    }
}
