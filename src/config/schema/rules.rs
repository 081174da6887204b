use crate::engine::DEFAULT_MAX_RULES;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Ceiling on installed rules, wildcard included.
    pub max_rules: usize,
    /// Refuse new domain rules at the ceiling. When false the ceiling is
    /// only advisory and the engine decides.
    pub enforce_cap: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            max_rules: DEFAULT_MAX_RULES,
            enforce_cap: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderConfig {
    /// User-Agent prefix the identity suffix is appended to.
    pub base_user_agent: String,
    pub product_token: String,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            base_user_agent: "Mozilla/5.0".into(),
            product_token: "OpenPIMS/2.0".into(),
        }
    }
}
