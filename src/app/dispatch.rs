use crate::app::status::{render_rules, render_status};
use crate::cli::commands::{Cli, Commands};
use anyhow::{Context, Result, bail};
use openpims::Config;
use openpims::api::SetupClient;
use openpims::background::{
    LoginRequest, Message, NavigationEvent, OpenTabs, Response, StaticTabs, spawn_alarms,
};
use openpims::engine::RuleEngine;
use openpims::host::Host;
use openpims::identity::{Clock, SystemClock, derive_identity, identity_url};
use std::sync::Arc;
use tracing::info;

/// Open the durable state and run the cold-start pass, as a restarted host would.
async fn start(config: &Config, tabs: Vec<String>) -> Result<Host> {
    let tabs: Arc<dyn OpenTabs> = Arc::new(StaticTabs(tabs));
    let host = Host::open(config, Arc::new(SystemClock), tabs)
        .await
        .context("Failed to open OpenPIMS state")?;
    host.background
        .on_startup()
        .await
        .context("Startup resync failed")?;
    Ok(host)
}

/// Send `message` and apply the credential change it causes before returning.
async fn send(host: &Host, message: Message) -> Result<()> {
    let mut changes = host.credentials().subscribe();
    if let Response::Error { message } = host.background.handle_message(message).await {
        bail!(message);
    }
    host.background
        .drain_credential_changes(&mut changes)
        .await
        .context("Applying credential change failed")?;
    host.coordinator().wait_for_refreshes().await;
    Ok(())
}

async fn login(config: &Config, request: LoginRequest, tabs: Vec<String>) -> Result<()> {
    let host = start(config, tabs).await?;
    let was_logged_in = host.credentials().get().await.is_logged_in;
    let user_id = request.user_id.clone();

    send(&host, Message::Login {
        credentials: request,
    })
    .await?;
    // Login state did not flip, so nothing rebuilt the rules for the new account.
    if was_logged_in {
        host.background.on_install().await?;
    }

    let domains = host.coordinator().tracked_domains().len();
    println!("✓ Logged in as {user_id}; {domains} domain rule(s) installed");
    Ok(())
}

async fn setup(
    config: &Config,
    server_url: Option<String>,
    cookie: Option<String>,
    tabs: Vec<String>,
) -> Result<()> {
    let server_url = server_url.unwrap_or_else(|| config.server.default_server_url.clone());
    if !openpims::api::validate_server_url(&server_url) {
        bail!("Not an http(s) url: {server_url}");
    }
    let mut client = SetupClient::new();
    if let Some(cookie) = cookie {
        client = client.with_session_cookie(cookie);
    }
    let setup = client
        .auto_setup(&server_url)
        .await
        .with_context(|| format!("Automatic setup against {server_url} failed"))?;
    info!("Setup returned account {} on {}", setup.user_id, setup.domain);

    login(
        config,
        LoginRequest {
            user_id: setup.user_id,
            secret: setup.token,
            app_domain: setup.domain,
            email: setup.email,
            server_url: Some(server_url),
        },
        tabs,
    )
    .await
}

async fn visit(config: &Config, urls: Vec<String>) -> Result<()> {
    let host = start(config, Vec::new()).await?;
    for url in urls {
        match host
            .background
            .on_navigation(&NavigationEvent::main_frame(url.as_str()))
            .await
        {
            Ok(Some(outcome)) => println!("{url}: {outcome:?}"),
            Ok(None) => println!("{url}: ignored"),
            Err(e) => println!("{url}: failed ({e})"),
        }
    }
    host.coordinator().wait_for_refreshes().await;
    Ok(())
}

async fn derive(config: &Config, domain: &str, day: Option<i64>) -> Result<()> {
    let host = Host::open(config, Arc::new(SystemClock), Arc::new(StaticTabs::default())).await?;
    let credentials = host.credentials().get().await;
    if !credentials.can_derive() {
        bail!("Not logged in; run `openpims login` or `openpims setup` first");
    }
    let day = day.unwrap_or_else(|| SystemClock.today());
    let token = derive_identity(&credentials.user_id, &credentials.secret, domain, day)?;
    println!("day      {day}");
    println!("identity {token}");
    println!("url      {}", identity_url(&token, &credentials.app_domain));
    Ok(())
}

async fn daemon(config: &Config) -> Result<()> {
    let host = start(config, Vec::new()).await?;
    let mut handles = vec![host.background.spawn_credential_watcher()];
    handles.extend(spawn_alarms(
        &host.background,
        config.alarms.check_interval_minutes,
    ));

    println!("◆ OpenPIMS daemon started");
    println!("   Rule set: {}", host.engine.path().display());
    println!("   Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    for handle in &handles {
        handle.abort();
    }
    for handle in handles {
        let _ = handle.await;
    }
    host.coordinator().wait_for_refreshes().await;
    Ok(())
}

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Login {
            user_id,
            secret,
            app_domain,
            email,
            server_url,
            tabs,
        } => {
            let request = LoginRequest {
                user_id,
                secret,
                app_domain: app_domain.unwrap_or_else(|| config.server.default_app_domain.clone()),
                email,
                server_url,
            };
            login(&config, request, tabs).await
        }

        Commands::Setup {
            server_url,
            cookie,
            tabs,
        } => setup(&config, server_url, cookie, tabs).await,

        Commands::Logout => {
            let host = start(&config, Vec::new()).await?;
            send(&host, Message::Logout).await?;
            println!("✓ Logged out");
            Ok(())
        }

        Commands::Status => {
            let host = Host::open(&config, Arc::new(SystemClock), Arc::new(StaticTabs::default()))
                .await?;
            let credentials = host.credentials().get().await;
            let installed = host.engine.installed_rules().await?;
            println!(
                "{}",
                render_status(&config, &credentials, host.coordinator(), &installed)
            );
            Ok(())
        }

        Commands::Visit { urls } => visit(&config, urls).await,

        Commands::Sync => {
            let host = start(&config, Vec::new()).await?;
            host.coordinator().wait_for_refreshes().await;
            let stray = host.coordinator().audit().await?;
            if !stray.is_empty() {
                bail!(
                    "Rules not allowed in {} mode remain installed: {stray:?}",
                    host.coordinator().mode().as_str()
                );
            }
            println!(
                "✓ {} domain rule(s) current for day {}",
                host.coordinator().tracked_domains().len(),
                SystemClock.today()
            );
            Ok(())
        }

        Commands::Rules => {
            let host = Host::open(&config, Arc::new(SystemClock), Arc::new(StaticTabs::default()))
                .await?;
            let installed = host.engine.installed_rules().await?;
            println!("{}", render_rules(&installed));
            Ok(())
        }

        Commands::Derive { domain, day } => derive(&config, &domain, day).await,

        Commands::Verify { subdomain } => {
            let host = Host::open(&config, Arc::new(SystemClock), Arc::new(StaticTabs::default()))
                .await?;
            let credentials = host.credentials().get().await;
            let valid = SetupClient::new()
                .verify_subdomain(&credentials.server_url, &subdomain, &credentials.app_domain)
                .await;
            let verdict = if valid { "valid" } else { "invalid" };
            println!("{subdomain}.{}: {verdict}", credentials.app_domain);
            Ok(())
        }

        Commands::Consent { domain } => {
            let host = Host::open(&config, Arc::new(SystemClock), Arc::new(StaticTabs::default()))
                .await?;
            let credentials = host.credentials().get().await;
            if !credentials.is_logged_in {
                bail!("Not logged in; run `openpims login` or `openpims setup` first");
            }
            match SetupClient::new()
                .consent_status(&credentials.server_url, &credentials.user_id, &domain)
                .await
            {
                Some(status) => println!("{}", serde_json::to_string_pretty(&status)?),
                None => println!("No consent data for {domain}"),
            }
            Ok(())
        }

        Commands::Daemon => daemon(&config).await,
    }
}
