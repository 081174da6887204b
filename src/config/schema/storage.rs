use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Key-value state file, relative to the data dir unless absolute.
    pub state_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: "state.json".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Published rule set, relative to the data dir unless absolute.
    pub rules_file: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rules_file: "rules.json".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_file_names() {
        assert_eq!(StorageConfig::default().state_file, "state.json");
        assert_eq!(EngineConfig::default().rules_file, "rules.json");
    }
}
