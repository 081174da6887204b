use serde::{Deserialize, Serialize};

pub const WILDCARD_RULE_ID: u32 = 1;
pub const NOT_CONFIGURED_RULE_ID: u32 = 999_999;
pub const FIRST_DOMAIN_RULE_ID: u32 = 1000;

/// Declared ceiling on installed rules, fixed roles included.
pub const DEFAULT_MAX_RULES: usize = 5000;

pub const FIXED_RULE_PRIORITY: u32 = 1;
pub const DOMAIN_RULE_PRIORITY: u32 = 100;

pub const MATCH_ALL_URLS: &str = "*://*/*";
pub const IDENTITY_HEADER: &str = "User-Agent";

/// Ids that never come out of the domain allocator.
pub fn is_reserved_rule_id(id: u32) -> bool {
    id == WILDCARD_RULE_ID || id == NOT_CONFIGURED_RULE_ID
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleRole {
    Wildcard,
    NotConfigured,
    Domain,
}

impl RuleRole {
    pub fn of(rule_id: u32) -> Self {
        match rule_id {
            WILDCARD_RULE_ID => Self::Wildcard,
            NOT_CONFIGURED_RULE_ID => Self::NotConfigured,
            _ => Self::Domain,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wildcard => "wildcard",
            Self::NotConfigured => "not-configured",
            Self::Domain => "domain",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Font,
    Object,
    Xmlhttprequest,
    Ping,
    Media,
    Websocket,
    Other,
}

impl ResourceType {
    pub const ALL: [Self; 12] = [
        Self::MainFrame,
        Self::SubFrame,
        Self::Stylesheet,
        Self::Script,
        Self::Image,
        Self::Font,
        Self::Object,
        Self::Xmlhttprequest,
        Self::Ping,
        Self::Media,
        Self::Websocket,
        Self::Other,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderOperation {
    Set,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderModification {
    pub header: String,
    pub operation: HeaderOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuleAction {
    #[serde(rename_all = "camelCase")]
    ModifyHeaders {
        request_headers: Vec<HeaderModification>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub url_filter: String,
    pub resource_types: Vec<ResourceType>,
}

/// One declarative header-rewrite rule as the host engine stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl Rule {
    pub fn role(&self) -> RuleRole {
        RuleRole::of(self.id)
    }

    pub fn match_pattern(&self) -> &str {
        &self.condition.url_filter
    }

    /// Value written into [`IDENTITY_HEADER`], if this rule sets it.
    pub fn header_value(&self) -> Option<&str> {
        let RuleAction::ModifyHeaders { request_headers } = &self.action;
        request_headers
            .iter()
            .find(|h| h.header == IDENTITY_HEADER && h.operation == HeaderOperation::Set)
            .and_then(|h| h.value.as_deref())
    }
}

/// How the rewritten header value is composed: `{base} {product} ({url})`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderProfile {
    pub base_user_agent: String,
    pub product_token: String,
}

impl HeaderProfile {
    pub fn new(base_user_agent: impl Into<String>, product_token: impl Into<String>) -> Self {
        Self {
            base_user_agent: base_user_agent.into(),
            product_token: product_token.into(),
        }
    }

    pub fn header_value(&self, identity_url: &str) -> String {
        let product = format!("{} ({identity_url})", self.product_token);
        if self.base_user_agent.is_empty() {
            product
        } else {
            format!("{} {product}", self.base_user_agent)
        }
    }

    fn set_header(&self, identity_url: &str) -> RuleAction {
        RuleAction::ModifyHeaders {
            request_headers: vec![HeaderModification {
                header: IDENTITY_HEADER.to_string(),
                operation: HeaderOperation::Set,
                value: Some(self.header_value(identity_url)),
            }],
        }
    }

    /// Logged-in catch-all: names the consent service, carries no identity.
    pub fn wildcard_rule(&self, app_domain: &str) -> Rule {
        Rule {
            id: WILDCARD_RULE_ID,
            priority: FIXED_RULE_PRIORITY,
            action: self.set_header(&format!("https://{app_domain}")),
            condition: RuleCondition {
                url_filter: MATCH_ALL_URLS.to_string(),
                resource_types: ResourceType::ALL.to_vec(),
            },
        }
    }

    /// Logged-out catch-all: announces the client without any domain.
    pub fn not_configured_rule(&self) -> Rule {
        Rule {
            id: NOT_CONFIGURED_RULE_ID,
            priority: FIXED_RULE_PRIORITY,
            action: self.set_header(""),
            condition: RuleCondition {
                url_filter: MATCH_ALL_URLS.to_string(),
                resource_types: vec![ResourceType::MainFrame],
            },
        }
    }

    pub fn domain_rule(&self, domain: &str, rule_id: u32, identity_url: &str) -> Rule {
        Rule {
            id: rule_id,
            priority: DOMAIN_RULE_PRIORITY,
            action: self.set_header(identity_url),
            condition: RuleCondition {
                url_filter: format!("*://{domain}/*"),
                resource_types: ResourceType::ALL.to_vec(),
            },
        }
    }
}
