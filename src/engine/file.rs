use super::{EngineFuture, Rule, RuleEngine};
use crate::error::EngineError;
use crate::utils::fs::replace_file;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Dynamic rule set published as a JSON array for an external proxy to load.
///
/// The file is the engine's only state: it is rewritten through a synced
/// temp file and renamed into place on every change.
#[derive(Debug)]
pub struct JsonFileRuleEngine {
    path: PathBuf,
    io: tokio::sync::Mutex<()>,
}

impl JsonFileRuleEngine {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<u32, Rule>, String> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(format!("{}: {e}", self.path.display())),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let rules: Vec<Rule> =
            serde_json::from_str(&raw).map_err(|e| format!("{}: {e}", self.path.display()))?;
        Ok(rules.into_iter().map(|rule| (rule.id, rule)).collect())
    }

    async fn store(&self, rules: &BTreeMap<u32, Rule>) -> Result<(), String> {
        let list: Vec<&Rule> = rules.values().collect();
        let json = serde_json::to_string_pretty(&list).map_err(|e| e.to_string())?;
        replace_file(&self.path, json.as_bytes())
            .await
            .map_err(|e| format!("{}: {e}", self.path.display()))
    }
}

impl RuleEngine for JsonFileRuleEngine {
    fn name(&self) -> &str {
        "file"
    }

    fn install_or_replace(&self, rule: Rule) -> EngineFuture<'_, ()> {
        Box::pin(async move {
            let _guard = self.io.lock().await;
            let rule_id = rule.id;
            let install_err = |message: String| EngineError::Install { rule_id, message };
            let mut rules = self.load().await.map_err(install_err)?;
            rules.insert(rule_id, rule);
            self.store(&rules).await.map_err(install_err)
        })
    }

    fn remove_all<'a>(&'a self, rule_ids: &'a [u32]) -> EngineFuture<'a, ()> {
        Box::pin(async move {
            let _guard = self.io.lock().await;
            let mut rules = self.load().await.map_err(EngineError::Remove)?;
            let before = rules.len();
            for id in rule_ids {
                rules.remove(id);
            }
            if rules.len() == before {
                return Ok(());
            }
            self.store(&rules).await.map_err(EngineError::Remove)
        })
    }

    fn list_installed(&self) -> EngineFuture<'_, BTreeSet<u32>> {
        Box::pin(async move {
            let _guard = self.io.lock().await;
            let rules = self.load().await.map_err(EngineError::List)?;
            Ok(rules.into_keys().collect())
        })
    }

    fn installed_rules(&self) -> EngineFuture<'_, Vec<Rule>> {
        Box::pin(async move {
            let _guard = self.io.lock().await;
            let rules = self.load().await.map_err(EngineError::List)?;
            Ok(rules.into_values().collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::HeaderProfile;
    use tempfile::TempDir;

    #[tokio::test]
    async fn rules_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rules.json");
        let profile = HeaderProfile::new("ua", "OpenPIMS/2.0");

        let engine = JsonFileRuleEngine::new(&path);
        engine
            .install_or_replace(profile.wildcard_rule("openpims.de"))
            .await
            .unwrap();
        engine
            .install_or_replace(profile.domain_rule("a.com", 1000, "https://x.openpims.de"))
            .await
            .unwrap();

        let reopened = JsonFileRuleEngine::new(&path);
        assert_eq!(
            reopened.list_installed().await.unwrap(),
            BTreeSet::from([1, 1000])
        );
        let rules = reopened.installed_rules().await.unwrap();
        assert_eq!(rules[1].match_pattern(), "*://a.com/*");
    }

    #[tokio::test]
    async fn published_file_is_a_json_array() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rules.json");
        let engine = JsonFileRuleEngine::new(&path);
        engine
            .install_or_replace(HeaderProfile::new("", "OpenPIMS/2.0").not_configured_rule())
            .await
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.as_array().map(Vec::len), Some(1));
        assert_eq!(raw[0]["id"], serde_json::json!(999_999));
    }

    #[tokio::test]
    async fn corrupt_file_fails_install() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rules.json");
        std::fs::write(&path, "{not json").unwrap();
        let engine = JsonFileRuleEngine::new(&path);
        let err = engine
            .install_or_replace(HeaderProfile::new("", "OpenPIMS/2.0").wildcard_rule("p"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Install { rule_id: 1, .. }));
    }
}
