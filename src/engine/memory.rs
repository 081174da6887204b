use super::{EngineFuture, Rule, RuleEngine};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// Process-local rule table.
#[derive(Debug, Default)]
pub struct InMemoryRuleEngine {
    rules: Mutex<BTreeMap<u32, Rule>>,
}

impl InMemoryRuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn rules(&self) -> std::sync::MutexGuard<'_, BTreeMap<u32, Rule>> {
        self.rules
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn get(&self, rule_id: u32) -> Option<Rule> {
        self.rules().get(&rule_id).cloned()
    }

    pub fn ids(&self) -> BTreeSet<u32> {
        self.rules().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.rules().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules().is_empty()
    }
}

impl RuleEngine for InMemoryRuleEngine {
    fn name(&self) -> &str {
        "memory"
    }

    fn install_or_replace(&self, rule: Rule) -> EngineFuture<'_, ()> {
        self.rules().insert(rule.id, rule);
        Box::pin(async move { Ok(()) })
    }

    fn remove_all<'a>(&'a self, rule_ids: &'a [u32]) -> EngineFuture<'a, ()> {
        {
            let mut rules = self.rules();
            for id in rule_ids {
                rules.remove(id);
            }
        }
        Box::pin(async move { Ok(()) })
    }

    fn list_installed(&self) -> EngineFuture<'_, BTreeSet<u32>> {
        let ids = self.rules().keys().copied().collect();
        Box::pin(async move { Ok(ids) })
    }

    fn installed_rules(&self) -> EngineFuture<'_, Vec<Rule>> {
        let rules = self.rules().values().cloned().collect();
        Box::pin(async move { Ok(rules) })
    }
}
