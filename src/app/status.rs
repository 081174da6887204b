use openpims::Config;
use openpims::coordinator::{DomainState, RuleCoordinator};
use openpims::engine::Rule;
use openpims::identity::Clock;
use openpims::storage::Credentials;

pub fn render_status(
    config: &Config,
    credentials: &Credentials,
    coordinator: &RuleCoordinator,
    installed: &[Rule],
) -> String {
    let today = coordinator.clock().today();
    let mut lines = vec![
        "◆ OpenPIMS Status".to_string(),
        String::new(),
        format!("Version     {}", env!("CARGO_PKG_VERSION")),
        format!("Data dir    {}", config.data_dir.display()),
        format!("Config      {}", config.config_path.display()),
        format!("Rule set    {}", config.rules_path().display()),
        String::new(),
    ];

    if credentials.is_logged_in {
        lines.push(format!("Account     {}", credentials.user_id));
        if !credentials.email.is_empty() {
            lines.push(format!("Email       {}", credentials.email));
        }
        lines.push(format!("App domain  {}", credentials.app_domain));
        lines.push(format!("Server      {}", credentials.server_url));
    } else {
        lines.push("Account     (logged out)".to_string());
    }

    let tracked = coordinator.tracked_domains();
    let stale = tracked
        .keys()
        .filter(|domain| matches!(coordinator.domain_state(domain), DomainState::Stale(_)))
        .count();
    lines.push(String::new());
    lines.push(format!("Day         {today}"));
    lines.push(format!("Installed   {} rule(s)", installed.len()));
    lines.push(format!(
        "Domains     {} tracked, {stale} stale",
        tracked.len()
    ));
    lines.push(format!(
        "Cap         {} ({})",
        config.rules.max_rules,
        if config.rules.enforce_cap {
            "enforced"
        } else {
            "advisory"
        }
    ));
    lines.join("\n")
}

pub fn render_rules(installed: &[Rule]) -> String {
    if installed.is_empty() {
        return "No rules installed".to_string();
    }
    installed
        .iter()
        .map(|rule| {
            format!(
                "{:>7}  {:<9} p{:<3} {:<32} {}",
                rule.id,
                rule.role().as_str(),
                rule.priority,
                rule.match_pattern(),
                rule.header_value().unwrap_or("-")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use openpims::engine::HeaderProfile;

    #[test]
    fn empty_rule_set_says_so() {
        assert_eq!(render_rules(&[]), "No rules installed");
    }

    #[test]
    fn rule_lines_show_role_and_pattern() {
        let header = HeaderProfile::new("Mozilla/5.0", "OpenPIMS/2.0");
        let rendered = render_rules(&[
            header.wildcard_rule("openpims.de"),
            header.domain_rule("example.com", 1000, "https://abc.openpims.de"),
        ]);
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("wildcard"));
        assert!(lines[1].contains("*://example.com/*"));
        assert!(lines[1].contains("https://abc.openpims.de"));
    }
}
