//! File-backed assembly of the stores, engine, coordinator and handlers.

use crate::background::{Background, OpenTabs};
use crate::config::Config;
use crate::coordinator::RuleCoordinator;
use crate::engine::{JsonFileRuleEngine, RuleEngine};
use crate::error::Result;
use crate::identity::Clock;
use crate::storage::{CredentialStore, JsonFileStore, KvStore, RuleStateStore};
use std::sync::Arc;

/// One process's view of the durable state under the data dir.
pub struct Host {
    pub background: Arc<Background>,
    pub engine: Arc<JsonFileRuleEngine>,
}

impl Host {
    /// Wire everything up. The coordinator starts unconfigured; run
    /// [`Background::on_startup`] or [`Background::on_install`] next.
    pub async fn open(
        config: &Config,
        clock: Arc<dyn Clock>,
        tabs: Arc<dyn OpenTabs>,
    ) -> Result<Self> {
        let kv: Arc<dyn KvStore> = Arc::new(JsonFileStore::new(config.state_path()));
        let engine = Arc::new(JsonFileRuleEngine::new(config.rules_path()));
        let credentials = Arc::new(CredentialStore::new(
            Arc::clone(&kv),
            &config.server.default_app_domain,
            &config.server.default_server_url,
        ));
        let coordinator = RuleCoordinator::open(
            RuleStateStore::new(kv),
            Arc::clone(&engine) as Arc<dyn RuleEngine>,
            clock,
            config.coordinator_options(),
        )
        .await?;
        tracing::debug!(
            "Opened state {} and rule set {}",
            config.state_path().display(),
            config.rules_path().display()
        );
        Ok(Self {
            background: Background::new(credentials, coordinator, tabs),
            engine,
        })
    }

    pub fn coordinator(&self) -> &Arc<RuleCoordinator> {
        self.background.coordinator()
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        self.background.credentials()
    }
}
