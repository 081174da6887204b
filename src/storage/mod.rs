//! Durable state: a key-value backend plus the two documents kept in it,
//! the login credentials and the per-domain rule records.

pub mod credentials;
pub mod kv;
pub mod rules;

pub use credentials::{
    CREDENTIALS_KEY, CredentialChange, CredentialPatch, CredentialStore, Credentials,
};
pub use kv::{JsonFileStore, KvFuture, KvStore, MemoryStore};
pub use rules::{DOMAIN_RULES_KEY, DomainRuleRecord, GlobalRuleState, RuleStateStore};
