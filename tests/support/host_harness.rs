#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use openpims::Config;
use openpims::background::{LoginRequest, Message, Response, StaticTabs};
use openpims::engine::{Rule, RuleEngine};
use openpims::host::Host;
use openpims::identity::{Clock, ManualClock};
use openpims::storage::{DOMAIN_RULES_KEY, GlobalRuleState};

pub const USER_ID: &str = "abc123";
pub const SECRET: &str = "s3cr3t-token-1234567890";
pub const APP_DOMAIN: &str = "openpims.de";
/// 2024-03-18, the day the identity fixtures are pinned to.
pub const DAY: i64 = 19_800;

/// A data dir on disk plus a settable clock; every `open` is a fresh process.
pub struct HostHarness {
    pub dir: TempDir,
    pub config: Config,
    pub clock: Arc<ManualClock>,
}

impl HostHarness {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            config_path: dir.path().join("config.toml"),
            ..Config::default()
        };
        Self {
            dir,
            config,
            clock: Arc::new(ManualClock::at_day(DAY)),
        }
    }

    pub async fn open(&self, tabs: &[&str]) -> Host {
        let tabs = StaticTabs(tabs.iter().map(ToString::to_string).collect());
        Host::open(
            &self.config,
            Arc::clone(&self.clock) as Arc<dyn Clock>,
            Arc::new(tabs),
        )
        .await
        .expect("open host")
    }

    /// Open and run the cold-start pass.
    pub async fn start(&self, tabs: &[&str]) -> Host {
        let host = self.open(tabs).await;
        host.background.on_startup().await.expect("startup");
        host
    }

    pub async fn login(&self, tabs: &[&str]) -> Host {
        let host = self.start(tabs).await;
        let mut changes = host.credentials().subscribe();
        let response = host
            .background
            .handle_message(Message::Login {
                credentials: LoginRequest {
                    user_id: USER_ID.into(),
                    secret: SECRET.into(),
                    app_domain: APP_DOMAIN.into(),
                    email: None,
                    server_url: None,
                },
            })
            .await;
        assert_eq!(response, Response::Ok);
        host.background
            .drain_credential_changes(&mut changes)
            .await
            .expect("apply login");
        host
    }

    /// The published rule set, read back from disk.
    pub async fn published_rules(&self) -> Vec<Rule> {
        let raw = std::fs::read_to_string(self.config.rules_path()).expect("rules file");
        serde_json::from_str(&raw).expect("rules json")
    }

    pub fn state_document(&self) -> serde_json::Value {
        let raw = std::fs::read_to_string(self.config.state_path()).expect("state file");
        serde_json::from_str(&raw).expect("state json")
    }

    pub fn rule_state(&self) -> GlobalRuleState {
        serde_json::from_value(self.state_document()[DOMAIN_RULES_KEY].clone())
            .expect("rule state")
    }
}

pub async fn installed_ids(host: &Host) -> Vec<u32> {
    host.engine
        .list_installed()
        .await
        .expect("list")
        .into_iter()
        .collect()
}
