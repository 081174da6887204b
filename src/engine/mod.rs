pub mod file;
pub mod memory;
pub mod rule;

pub use file::JsonFileRuleEngine;
pub use memory::InMemoryRuleEngine;
pub use rule::{
    DEFAULT_MAX_RULES, DOMAIN_RULE_PRIORITY, FIRST_DOMAIN_RULE_ID, FIXED_RULE_PRIORITY,
    HeaderModification, HeaderOperation, HeaderProfile, IDENTITY_HEADER, NOT_CONFIGURED_RULE_ID,
    ResourceType, Rule, RuleAction, RuleCondition, RuleRole, WILDCARD_RULE_ID,
    is_reserved_rule_id,
};

use crate::error::EngineError;
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EngineError>> + Send + 'a>>;

/// Host header-rewrite engine — bring your own matcher.
///
/// Implementations own request matching and header mutation; the coordinator
/// only ever installs, replaces and removes whole rules by id.
pub trait RuleEngine: Send + Sync {
    /// Adapter name (e.g. "memory", "file")
    fn name(&self) -> &str;

    /// Install `rule`, replacing any rule already installed under its id.
    fn install_or_replace(&self, rule: Rule) -> EngineFuture<'_, ()>;

    /// Remove every listed id. Unknown ids are ignored.
    fn remove_all<'a>(&'a self, rule_ids: &'a [u32]) -> EngineFuture<'a, ()>;

    fn list_installed(&self) -> EngineFuture<'_, BTreeSet<u32>>;

    /// Full installed rule set, ordered by id.
    fn installed_rules(&self) -> EngineFuture<'_, Vec<Rule>>;
}
