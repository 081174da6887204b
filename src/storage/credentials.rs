use super::kv::KvStore;
use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const CREDENTIALS_KEY: &str = "openpims_credentials";

const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Account the identity is derived for. The secret is wiped on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub user_id: String,
    pub secret: String,
    pub app_domain: String,
    #[serde(default)]
    pub email: String,
    pub server_url: String,
    pub is_logged_in: bool,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("secret", &"[REDACTED]")
            .field("app_domain", &self.app_domain)
            .field("email", &self.email)
            .field("server_url", &self.server_url)
            .field("is_logged_in", &self.is_logged_in)
            .finish()
    }
}

impl Credentials {
    /// Logged-out credentials pointing at `app_domain` / `server_url`.
    pub fn logged_out(app_domain: &str, server_url: &str) -> Self {
        Self {
            user_id: String::new(),
            secret: String::new(),
            app_domain: app_domain.to_string(),
            email: String::new(),
            server_url: server_url.to_string(),
            is_logged_in: false,
        }
    }

    /// Everything identity derivation needs is present.
    pub fn can_derive(&self) -> bool {
        !self.user_id.is_empty() && !self.secret.is_empty() && !self.app_domain.is_empty()
    }
}

/// Partial update merged over the stored credentials.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPatch {
    pub user_id: Option<String>,
    pub secret: Option<String>,
    pub app_domain: Option<String>,
    pub email: Option<String>,
    pub server_url: Option<String>,
    pub is_logged_in: Option<bool>,
}

impl CredentialPatch {
    fn apply_to(self, target: &mut Credentials) {
        if let Some(user_id) = self.user_id {
            target.user_id = user_id;
        }
        if let Some(secret) = self.secret {
            target.secret.zeroize();
            target.secret = secret;
        }
        if let Some(app_domain) = self.app_domain {
            target.app_domain = app_domain;
        }
        if let Some(email) = self.email {
            target.email = email;
        }
        if let Some(server_url) = self.server_url {
            target.server_url = server_url;
        }
        if let Some(is_logged_in) = self.is_logged_in {
            target.is_logged_in = is_logged_in;
        }
    }
}

#[derive(Debug, Clone)]
pub struct CredentialChange {
    pub old: Credentials,
    pub new: Credentials,
}

impl CredentialChange {
    pub fn login_state_changed(&self) -> bool {
        self.old.is_logged_in != self.new.is_logged_in
    }
}

/// Credentials blob persisted separately from the rule state.
pub struct CredentialStore {
    kv: Arc<dyn KvStore>,
    default_app_domain: String,
    default_server_url: String,
    changes: broadcast::Sender<CredentialChange>,
}

impl CredentialStore {
    pub fn new(kv: Arc<dyn KvStore>, default_app_domain: &str, default_server_url: &str) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            kv,
            default_app_domain: default_app_domain.to_string(),
            default_server_url: default_server_url.to_string(),
            changes,
        }
    }

    pub fn defaults(&self) -> Credentials {
        Credentials::logged_out(&self.default_app_domain, &self.default_server_url)
    }

    /// Stored credentials merged over the defaults. An unreadable blob reads
    /// as logged out.
    pub async fn get(&self) -> Credentials {
        let mut credentials = self.defaults();
        match self.kv.get(CREDENTIALS_KEY).await {
            Ok(Some(raw)) => match serde_json::from_value::<CredentialPatch>(raw) {
                Ok(patch) => patch.apply_to(&mut credentials),
                Err(e) => tracing::warn!("Ignoring malformed stored credentials: {e}"),
            },
            Ok(None) => {}
            Err(e) => tracing::error!("Error reading credentials: {e}"),
        }
        credentials
    }

    pub async fn set(&self, patch: CredentialPatch) -> Result<Credentials, StorageError> {
        let old = self.get().await;
        let mut updated = old.clone();
        patch.apply_to(&mut updated);

        let value = serde_json::to_value(&updated).map_err(|e| StorageError::Write {
            key: CREDENTIALS_KEY.to_string(),
            message: e.to_string(),
        })?;
        self.kv.set(CREDENTIALS_KEY, value).await?;

        // No receivers is fine: nobody is listening yet.
        let _ = self.changes.send(CredentialChange {
            old,
            new: updated.clone(),
        });
        Ok(updated)
    }

    pub async fn login(
        &self,
        user_id: &str,
        secret: &str,
        app_domain: &str,
        email: Option<&str>,
        server_url: Option<&str>,
    ) -> Result<Credentials, StorageError> {
        let server_url = server_url
            .filter(|url| !url.is_empty())
            .map_or_else(|| format!("https://{app_domain}"), ToOwned::to_owned);
        self.set(CredentialPatch {
            user_id: Some(user_id.to_string()),
            secret: Some(secret.to_string()),
            app_domain: Some(app_domain.to_string()),
            email: Some(email.unwrap_or_default().to_string()),
            server_url: Some(server_url),
            is_logged_in: Some(true),
        })
        .await
    }

    /// Forget the account; app domain and server url are kept for the next login.
    pub async fn logout(&self) -> Result<Credentials, StorageError> {
        self.set(CredentialPatch {
            user_id: Some(String::new()),
            secret: Some(String::new()),
            email: Some(String::new()),
            is_logged_in: Some(false),
            ..CredentialPatch::default()
        })
        .await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CredentialChange> {
        self.changes.subscribe()
    }
}
