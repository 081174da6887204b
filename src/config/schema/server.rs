use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// App domain used while logged out and for the first login.
    pub default_app_domain: String,
    pub default_server_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_app_domain: "openpims.de".into(),
            default_server_url: "https://openpims.de".into(),
        }
    }
}
