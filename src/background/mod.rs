//! Host event handlers wiring credentials, navigation and alarms to the
//! rule coordinator.

mod alarms;

pub use alarms::{Alarm, spawn_alarms};

use crate::coordinator::{ObserveOutcome, RuleCoordinator};
use crate::error::Result;
use crate::storage::{CredentialChange, CredentialStore, Credentials};
use crate::utils::web::web_hostname;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;

/// Source of the pages currently open in the host, used by the login flow.
pub trait OpenTabs: Send + Sync {
    fn open_urls(&self) -> Vec<String>;
}

/// Fixed page list.
#[derive(Debug, Clone, Default)]
pub struct StaticTabs(pub Vec<String>);

impl OpenTabs for StaticTabs {
    fn open_urls(&self) -> Vec<String> {
        self.0.clone()
    }
}

/// A navigation about to start. `frame_id` 0 is the top-level frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationEvent {
    pub frame_id: u32,
    pub url: String,
}

impl NavigationEvent {
    pub fn main_frame(url: impl Into<String>) -> Self {
        Self {
            frame_id: 0,
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub user_id: String,
    pub secret: String,
    pub app_domain: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub server_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    GetStatus,
    Login { credentials: LoginRequest },
    Logout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    #[serde(rename = "STATUS_RESPONSE", rename_all = "camelCase")]
    Status {
        is_logged_in: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        credentials: Option<Credentials>,
    },
    Ok,
    Error { message: String },
}

pub struct Background {
    credentials: Arc<CredentialStore>,
    coordinator: Arc<RuleCoordinator>,
    tabs: Arc<dyn OpenTabs>,
}

impl Background {
    pub fn new(
        credentials: Arc<CredentialStore>,
        coordinator: Arc<RuleCoordinator>,
        tabs: Arc<dyn OpenTabs>,
    ) -> Arc<Self> {
        Arc::new(Self {
            credentials,
            coordinator,
            tabs,
        })
    }

    pub fn coordinator(&self) -> &Arc<RuleCoordinator> {
        &self.coordinator
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// First run: build rules for every open page, or the not-configured rule.
    pub async fn on_install(&self) -> Result<()> {
        let credentials = self.credentials.get().await;
        if credentials.is_logged_in {
            self.initialize(&credentials).await
        } else {
            self.coordinator.enter_unconfigured().await
        }
    }

    /// Host restart: rebuild the engine from the durable records.
    pub async fn on_startup(&self) -> Result<()> {
        let credentials = self.credentials.get().await;
        if credentials.is_logged_in {
            self.coordinator
                .refresh_all_for_current_day(&credentials)
                .await?;
            Ok(())
        } else {
            self.coordinator.enter_unconfigured().await
        }
    }

    /// Reacts only when the login state flips. Returns whether anything ran.
    pub async fn on_credentials_changed(&self, change: &CredentialChange) -> Result<bool> {
        if !change.login_state_changed() {
            return Ok(false);
        }
        if change.new.is_logged_in {
            tracing::info!("Logged in; initializing rules");
            let credentials = self.credentials.get().await;
            self.initialize(&credentials).await?;
        } else {
            tracing::info!("Logged out; clearing rules");
            self.coordinator.enter_unconfigured().await?;
        }
        Ok(true)
    }

    /// Apply every change already queued on `changes` without waiting for more.
    pub async fn drain_credential_changes(
        &self,
        changes: &mut broadcast::Receiver<CredentialChange>,
    ) -> Result<()> {
        loop {
            match changes.try_recv() {
                Ok(change) => {
                    self.on_credentials_changed(&change).await?;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!("Missed {skipped} credential change(s)");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return Ok(()),
            }
        }
    }

    /// Follow the credential store until it is dropped.
    pub fn spawn_credential_watcher(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let mut changes = self.credentials.subscribe();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        if let Err(e) = this.on_credentials_changed(&change).await {
                            tracing::error!("Applying credential change failed: {e}");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Missed {skipped} credential change(s)");
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        })
    }

    /// Top-level http(s) navigations get a current rule for their host.
    /// Anything else is ignored and yields `None`.
    pub async fn on_navigation(&self, event: &NavigationEvent) -> Result<Option<ObserveOutcome>> {
        if event.frame_id != 0 {
            return Ok(None);
        }
        let Some(domain) = web_hostname(&event.url) else {
            return Ok(None);
        };
        let credentials = self.credentials.get().await;
        if !credentials.can_derive() {
            return Ok(None);
        }
        match self.coordinator.observe(&domain, &credentials).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) => {
                tracing::error!("Navigation to {domain} left without a domain rule: {e}");
                Err(e)
            }
        }
    }

    pub async fn handle_message(&self, message: Message) -> Response {
        let result = match message {
            Message::GetStatus => {
                let credentials = self.credentials.get().await;
                return Response::Status {
                    is_logged_in: credentials.is_logged_in,
                    credentials: credentials.is_logged_in.then_some(credentials),
                };
            }
            Message::Login { credentials } => self
                .credentials
                .login(
                    &credentials.user_id,
                    &credentials.secret,
                    &credentials.app_domain,
                    credentials.email.as_deref(),
                    credentials.server_url.as_deref(),
                )
                .await
                .map(drop),
            Message::Logout => self.credentials.logout().await.map(drop),
        };
        match result {
            Ok(()) => Response::Ok,
            Err(e) => {
                tracing::error!("Error handling message: {e}");
                Response::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    /// Periodic resync; logged-out hosts are left alone.
    pub async fn on_alarm(&self, alarm: Alarm) -> Result<()> {
        let credentials = self.credentials.get().await;
        if !credentials.is_logged_in {
            return Ok(());
        }
        tracing::debug!("Alarm '{}' fired", alarm.name());
        self.coordinator
            .refresh_all_for_current_day(&credentials)
            .await?;
        Ok(())
    }

    async fn initialize(&self, credentials: &Credentials) -> Result<()> {
        let urls = self.tabs.open_urls();
        self.coordinator
            .initialize_for_all_tabs(credentials, &urls)
            .await?;
        Ok(())
    }
}
