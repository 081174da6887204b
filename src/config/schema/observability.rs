use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// "error" | "warn" | "info" | "debug" | "trace"
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl LogConfig {
    pub fn tracing_level(&self) -> Option<tracing::Level> {
        self.level.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_levels() {
        let config = LogConfig {
            level: "debug".into(),
        };
        assert_eq!(config.tracing_level(), Some(tracing::Level::DEBUG));
        assert_eq!(LogConfig::default().tracing_level(), Some(tracing::Level::INFO));
    }

    #[test]
    fn rejects_unknown_level() {
        let config = LogConfig {
            level: "chatty".into(),
        };
        assert_eq!(config.tracing_level(), None);
    }
}
