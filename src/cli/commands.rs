use clap::{Parser, Subcommand};

/// `OpenPIMS` - per-domain, day-rotating identity headers.
#[derive(Parser, Debug)]
#[command(name = "openpims")]
#[command(version)]
#[command(about = "Keep per-domain OpenPIMS identity rules in sync.", long_about = None)]
pub struct Cli {
    /// Log at debug level regardless of config
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store credentials and build rules for the app domain and open pages
    Login {
        #[arg(long)]
        user_id: String,

        /// Shared HMAC secret (token) issued by the server
        #[arg(long)]
        secret: String,

        /// App domain identity hosts live under (default from config)
        #[arg(long)]
        app_domain: Option<String>,

        #[arg(long)]
        email: Option<String>,

        /// Defaults to https://<app-domain>
        #[arg(long)]
        server_url: Option<String>,

        /// Page currently open in the host; repeatable
        #[arg(long = "tab")]
        tabs: Vec<String>,
    },

    /// Fetch credentials from the server's setup endpoint, then log in
    Setup {
        /// Server to ask (default from config)
        #[arg(long)]
        server_url: Option<String>,

        /// Session cookie of a logged-in browser session, e.g. "session=..."
        #[arg(long)]
        cookie: Option<String>,

        /// Page currently open in the host; repeatable
        #[arg(long = "tab")]
        tabs: Vec<String>,
    },

    /// Forget credentials and fall back to the not-configured rule
    Logout,

    /// Show login state, mode and tracked domains
    Status,

    /// Report top-level navigations to these pages
    Visit {
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Resync every stored rule to the current day
    Sync,

    /// List the installed rule set
    Rules,

    /// Print the identity for a domain without touching any rule
    Derive {
        domain: String,

        /// UTC day index (default: today)
        #[arg(long)]
        day: Option<i64>,
    },

    /// Ask the server whether an identity subdomain is valid
    Verify {
        subdomain: String,
    },

    /// Show the consent decisions stored on the server for a domain
    Consent {
        domain: String,
    },

    /// Resync on start, then keep rules current until Ctrl-C
    Daemon,
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands};
    use clap::{CommandFactory, Parser};

    #[test]
    fn cli_definition_has_no_flag_conflicts() {
        Cli::command().debug_assert();
    }

    #[test]
    fn login_collects_repeated_tabs() {
        let cli = Cli::try_parse_from([
            "openpims",
            "login",
            "--user-id",
            "abc123",
            "--secret",
            "s",
            "--tab",
            "https://a.com",
            "--tab",
            "https://b.com",
        ])
        .unwrap();
        let Commands::Login { tabs, app_domain, .. } = cli.command else {
            panic!("expected login");
        };
        assert_eq!(tabs, ["https://a.com", "https://b.com"]);
        assert!(app_domain.is_none());
    }

    #[test]
    fn visit_requires_a_url() {
        assert!(Cli::try_parse_from(["openpims", "visit"]).is_err());
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::try_parse_from(["openpims", "status", "-v"]).unwrap();
        assert!(cli.verbose);
    }
}
