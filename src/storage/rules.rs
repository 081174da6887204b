use super::kv::KvStore;
use crate::engine::{FIRST_DOMAIN_RULE_ID, is_reserved_rule_id};
use crate::error::StorageError;
use crate::identity::IdentityToken;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DOMAIN_RULES_KEY: &str = "openpims_domain_rules";

/// Rule bookkeeping for one observed domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRuleRecord {
    pub rule_id: u32,
    /// UTC day index on which `identity` was derived.
    pub created_day: i64,
    pub identity: IdentityToken,
}

/// Full durable payload under [`DOMAIN_RULES_KEY`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalRuleState {
    #[serde(default)]
    pub domains: BTreeMap<String, DomainRuleRecord>,
    #[serde(default = "default_rule_id_counter")]
    pub rule_id_counter: u32,
}

fn default_rule_id_counter() -> u32 {
    FIRST_DOMAIN_RULE_ID
}

impl Default for GlobalRuleState {
    fn default() -> Self {
        Self {
            domains: BTreeMap::new(),
            rule_id_counter: FIRST_DOMAIN_RULE_ID,
        }
    }
}

impl GlobalRuleState {
    /// Raise the counter above every recorded id, whatever the stored value says.
    fn normalized(mut self) -> Self {
        let floor = self
            .domains
            .values()
            .map(|record| record.rule_id.saturating_add(1))
            .max()
            .unwrap_or(FIRST_DOMAIN_RULE_ID)
            .max(FIRST_DOMAIN_RULE_ID);
        self.rule_id_counter = self.rule_id_counter.max(floor);
        self
    }
}

/// Durable domain -> rule record mapping plus the monotonic id allocator.
///
/// Every operation reads and writes the whole state document. Clones share
/// one write lock, so concurrent read-modify-write cycles never interleave.
#[derive(Clone)]
pub struct RuleStateStore {
    kv: Arc<dyn KvStore>,
    writes: Arc<tokio::sync::Mutex<()>>,
}

impl RuleStateStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            writes: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub async fn load_all(&self) -> Result<GlobalRuleState, StorageError> {
        let Some(raw) = self.kv.get(DOMAIN_RULES_KEY).await? else {
            return Ok(GlobalRuleState::default());
        };
        let state: GlobalRuleState =
            serde_json::from_value(raw).map_err(|e| StorageError::Corrupt {
                key: DOMAIN_RULES_KEY.to_string(),
                message: e.to_string(),
            })?;
        Ok(state.normalized())
    }

    async fn save(&self, state: &GlobalRuleState) -> Result<(), StorageError> {
        let value = serde_json::to_value(state).map_err(|e| StorageError::Write {
            key: DOMAIN_RULES_KEY.to_string(),
            message: e.to_string(),
        })?;
        self.kv.set(DOMAIN_RULES_KEY, value).await
    }

    pub async fn upsert(&self, domain: &str, record: DomainRuleRecord) -> Result<(), StorageError> {
        let _guard = self.writes.lock().await;
        let mut state = self.load_all().await?;
        state.domains.insert(domain.to_string(), record);
        let state = state.normalized();
        self.save(&state).await
    }

    pub async fn get(&self, domain: &str) -> Result<Option<DomainRuleRecord>, StorageError> {
        Ok(self.load_all().await?.domains.remove(domain))
    }

    /// Hand out the next domain rule id. The advanced counter is persisted
    /// before the id is returned.
    pub async fn allocate_next_id(&self) -> Result<u32, StorageError> {
        let _guard = self.writes.lock().await;
        let mut state = self.load_all().await?;
        let mut id = state.rule_id_counter;
        while is_reserved_rule_id(id) {
            id = id
                .checked_add(1)
                .ok_or(StorageError::IdSpaceExhausted(id))?;
        }
        state.rule_id_counter = id
            .checked_add(1)
            .ok_or(StorageError::IdSpaceExhausted(id))?;
        self.save(&state).await?;
        Ok(id)
    }

    /// Drop every domain record. The id counter survives so ids are never
    /// handed out twice across logout/login cycles.
    pub async fn clear_all(&self) -> Result<(), StorageError> {
        self.reset(FIRST_DOMAIN_RULE_ID).await
    }

    /// Drop every domain record and make sure the next id is at least
    /// `floor`. A document that no longer parses is overwritten; its counter
    /// is lost, so `floor` is all that keeps ids from being reused.
    pub async fn reset(&self, floor: u32) -> Result<(), StorageError> {
        let _guard = self.writes.lock().await;
        let counter = match self.load_all().await {
            Ok(state) => state.rule_id_counter,
            Err(StorageError::Corrupt { message, .. }) => {
                tracing::warn!("Discarding malformed rule state ({message}); ids restart at {floor}");
                FIRST_DOMAIN_RULE_ID
            }
            Err(e) => return Err(e),
        };
        self.save(&GlobalRuleState {
            domains: BTreeMap::new(),
            rule_id_counter: counter.max(floor).max(FIRST_DOMAIN_RULE_ID),
        })
        .await
    }

    pub async fn domains_snapshot(
        &self,
    ) -> Result<BTreeMap<String, DomainRuleRecord>, StorageError> {
        Ok(self.load_all().await?.domains)
    }
}
