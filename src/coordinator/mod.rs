//! Per-domain rule lifecycle: create, reuse or refresh in the background,
//! plus the bulk login / cold-start / logout transitions.

mod types;

pub use types::{CoordinatorOptions, DomainState, Mode, ObserveOutcome, SyncSummary};

use crate::engine::{FIRST_DOMAIN_RULE_ID, Rule, RuleEngine, RuleRole};
use crate::error::{CoordinatorError, PimsError, Result, StorageError};
use crate::identity::{Clock, derive_identity, identity_url};
use crate::storage::{Credentials, DomainRuleRecord, RuleStateStore};
use crate::utils::web::web_hostname;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::RwLock;
use tokio::task::JoinSet;

struct CoordinatorState {
    mode: Mode,
    /// Bumped on every mode transition; work started under an older epoch
    /// must not touch the store or the engine.
    epoch: u64,
    tracked: HashMap<String, DomainRuleRecord>,
    creating: HashSet<String>,
    refreshing: HashSet<String>,
}

enum Decision {
    Skip,
    Reuse(u32),
    Create(u64),
    Refresh(u32, u64),
    RefreshPending(u32),
    InFlight,
    AtCapacity,
}

/// Instance-owned rule coordinator. No global statics.
///
/// Per-domain work takes the transition gate shared; the bulk transitions
/// take it exclusively, so a mode switch never interleaves with a creation
/// or refresh half-way through.
pub struct RuleCoordinator {
    store: RuleStateStore,
    engine: Arc<dyn RuleEngine>,
    clock: Arc<dyn Clock>,
    options: CoordinatorOptions,
    state: Mutex<CoordinatorState>,
    refreshes: Mutex<JoinSet<()>>,
    gate: RwLock<()>,
}

impl RuleCoordinator {
    /// Build a coordinator whose tracked map is rebuilt from the durable store.
    /// Starts unconfigured until a bulk transition runs.
    pub async fn open(
        store: RuleStateStore,
        engine: Arc<dyn RuleEngine>,
        clock: Arc<dyn Clock>,
        options: CoordinatorOptions,
    ) -> Result<Arc<Self>> {
        let tracked = load_or_reset(&store, engine.as_ref())
            .await?
            .into_iter()
            .collect();
        Ok(Arc::new(Self {
            store,
            engine,
            clock,
            options,
            state: Mutex::new(CoordinatorState {
                mode: Mode::Unconfigured,
                epoch: 0,
                tracked,
                creating: HashSet::new(),
                refreshing: HashSet::new(),
            }),
            refreshes: Mutex::new(JoinSet::new()),
            gate: RwLock::new(()),
        }))
    }

    fn state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn refresh_tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.refreshes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn mode(&self) -> Mode {
        self.state().mode
    }

    pub fn has_domain_rule(&self, domain: &str) -> bool {
        self.state().tracked.contains_key(domain)
    }

    pub fn domain_state(&self, domain: &str) -> DomainState {
        let today = self.clock.today();
        let created_day = self.state().tracked.get(domain).map(|r| r.created_day);
        DomainState::classify(created_day, today)
    }

    pub fn tracked_domains(&self) -> BTreeMap<String, DomainRuleRecord> {
        self.state()
            .tracked
            .iter()
            .map(|(domain, record)| (domain.clone(), record.clone()))
            .collect()
    }

    pub fn pending_refreshes(&self) -> usize {
        self.state().refreshing.len()
    }

    // ── Per-domain primitive ─────────────────────────────────────

    /// Make sure `domain` has a rule for today without holding up the caller
    /// on a refresh: a stale rule keeps serving while its replacement is
    /// derived in the background.
    pub async fn observe(
        self: &Arc<Self>,
        domain: &str,
        credentials: &Credentials,
    ) -> Result<ObserveOutcome> {
        let _gate = self.gate.read().await;
        self.observe_gated(domain, credentials).await
    }

    async fn observe_gated(
        self: &Arc<Self>,
        domain: &str,
        credentials: &Credentials,
    ) -> Result<ObserveOutcome> {
        let today = self.clock.today();
        match self.decide(domain, today) {
            Decision::Skip => Ok(ObserveOutcome::Skipped),
            Decision::Reuse(rule_id) => Ok(ObserveOutcome::Reused { rule_id }),
            Decision::RefreshPending(rule_id) => Ok(ObserveOutcome::RefreshPending { rule_id }),
            Decision::InFlight => {
                tracing::debug!("Rule for {domain} is already being created");
                Ok(ObserveOutcome::InFlight)
            }
            Decision::AtCapacity => {
                tracing::warn!(
                    "Rule cap of {} reached; {domain} stays on the wildcard rule",
                    self.options.max_rules
                );
                Ok(ObserveOutcome::CapacityReached)
            }
            Decision::Refresh(rule_id, epoch) => {
                tracing::debug!("Rule {rule_id} for {domain} is stale; refreshing in background");
                self.spawn_refresh(domain.to_string(), credentials.clone(), rule_id, epoch);
                Ok(ObserveOutcome::RefreshScheduled { rule_id })
            }
            Decision::Create(epoch) => {
                let result = self.create(domain, credentials, today, epoch).await;
                self.state().creating.remove(domain);
                match result {
                    Ok(rule_id) => {
                        tracing::debug!("Created rule {rule_id} for {domain}");
                        Ok(ObserveOutcome::Created { rule_id })
                    }
                    Err(e) => {
                        tracing::warn!("Rule creation for {domain} failed: {e}");
                        Err(CoordinatorError::Domain {
                            domain: domain.to_string(),
                            source: Box::new(e),
                        }
                        .into())
                    }
                }
            }
        }
    }

    /// Classify `domain` and claim it (creation or refresh marker) in one
    /// critical section, before the first suspension point.
    fn decide(&self, domain: &str, today: i64) -> Decision {
        let mut state = self.state();
        if state.mode == Mode::Unconfigured {
            return Decision::Skip;
        }
        let epoch = state.epoch;
        let existing = state
            .tracked
            .get(domain)
            .map(|r| (r.rule_id, r.created_day));

        match existing {
            Some((rule_id, created_day)) => {
                match DomainState::classify(Some(created_day), today) {
                    DomainState::Stale(_) => {
                        if state.refreshing.insert(domain.to_string()) {
                            Decision::Refresh(rule_id, epoch)
                        } else {
                            Decision::RefreshPending(rule_id)
                        }
                    }
                    _ => Decision::Reuse(rule_id),
                }
            }
            None if state.creating.contains(domain) => Decision::InFlight,
            None => {
                // Wildcard + tracked + in-flight creations.
                let installed = 1 + state.tracked.len() + state.creating.len();
                if self.options.enforce_cap && installed >= self.options.max_rules {
                    return Decision::AtCapacity;
                }
                state.creating.insert(domain.to_string());
                Decision::Create(epoch)
            }
        }
    }

    async fn create(
        &self,
        domain: &str,
        credentials: &Credentials,
        today: i64,
        epoch: u64,
    ) -> Result<u32> {
        let rule_id = self.store.allocate_next_id().await?;
        let identity = derive_identity(&credentials.user_id, &credentials.secret, domain, today)?;
        let record = DomainRuleRecord {
            rule_id,
            created_day: today,
            identity,
        };

        self.ensure_current(domain, epoch)?;
        self.store.upsert(domain, record.clone()).await?;
        let rule = self.domain_rule(domain, &record, &credentials.app_domain);
        self.state().tracked.insert(domain.to_string(), record);

        if let Err(e) = self.install(rule).await {
            // Forget it so the next observation retries; the durable record is
            // reconciled by the next cold-start resync.
            self.state().tracked.remove(domain);
            return Err(e);
        }
        Ok(rule_id)
    }

    fn spawn_refresh(
        self: &Arc<Self>,
        domain: String,
        credentials: Credentials,
        rule_id: u32,
        epoch: u64,
    ) {
        let this = Arc::clone(self);
        let mut tasks = self.refresh_tasks();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            let _gate = this.gate.read().await;
            match this.refresh(&domain, &credentials, rule_id, epoch).await {
                Ok(()) => {}
                Err(PimsError::Coordinator(CoordinatorError::Superseded { .. })) => {
                    tracing::debug!("Dropped refresh of {domain}: mode changed");
                }
                Err(e) => {
                    tracing::warn!("Background refresh of {domain} (rule {rule_id}) failed: {e}");
                }
            }
            let mut state = this.state();
            if state.epoch == epoch {
                state.refreshing.remove(&domain);
            }
        });
    }

    async fn refresh(
        &self,
        domain: &str,
        credentials: &Credentials,
        rule_id: u32,
        epoch: u64,
    ) -> Result<()> {
        self.ensure_current(domain, epoch)?;
        let today = self.clock.today();
        let identity = derive_identity(&credentials.user_id, &credentials.secret, domain, today)?;
        let record = DomainRuleRecord {
            rule_id,
            created_day: today,
            identity,
        };

        self.store.upsert(domain, record.clone()).await?;
        self.install(self.domain_rule(domain, &record, &credentials.app_domain))
            .await?;

        let mut state = self.state();
        if state.epoch == epoch {
            state.tracked.insert(domain.to_string(), record);
        }
        tracing::debug!("Refreshed rule {rule_id} for {domain} to day {today}");
        Ok(())
    }

    /// Wait until every spawned background refresh has finished.
    pub async fn wait_for_refreshes(&self) {
        loop {
            let mut pending = std::mem::take(&mut *self.refresh_tasks());
            if pending.is_empty() {
                return;
            }
            while let Some(joined) = pending.join_next().await {
                if let Err(e) = joined {
                    tracing::error!("Background refresh task aborted: {e}");
                }
            }
        }
    }

    // ── Bulk transitions ─────────────────────────────────────────

    /// Login: wipe everything, enter configured mode and create rules for the
    /// app domain and every open page, one per distinct hostname.
    pub async fn initialize_for_all_tabs(
        self: &Arc<Self>,
        credentials: &Credentials,
        open_urls: &[String],
    ) -> Result<SyncSummary> {
        let _gate = self.gate.write().await;
        tracing::info!("Initializing rules for {} open page(s)", open_urls.len());

        let wildcard = self.options.header.wildcard_rule(&credentials.app_domain);
        let (_, floor) = self
            .switch_rule_set(Mode::Configured, wildcard, HashMap::new(), |_| false)
            .await?;
        self.store.reset(floor).await?;

        let mut seen = HashSet::new();
        let domains = std::iter::once(credentials.app_domain.clone())
            .chain(open_urls.iter().filter_map(|url| web_hostname(url)))
            .filter(|domain| seen.insert(domain.clone()))
            .collect::<Vec<_>>();

        let mut summary = SyncSummary::default();
        for domain in domains {
            match self.observe_gated(&domain, credentials).await {
                Ok(ObserveOutcome::Created { .. }) => summary.created += 1,
                Ok(_) => summary.skipped += 1,
                Err(_) => summary.failed.push(domain),
            }
        }
        tracing::info!(
            "Login sync: {} rule(s) created, {} failed",
            summary.created,
            summary.failed.len()
        );
        Ok(summary)
    }

    /// Cold start while logged in: the engine is rebuilt from the durable
    /// records. Current records are reinstalled verbatim, stale ones get a
    /// background refresh; either way each record is installed exactly once.
    pub async fn refresh_all_for_current_day(
        self: &Arc<Self>,
        credentials: &Credentials,
    ) -> Result<SyncSummary> {
        let _gate = self.gate.write().await;
        let today = self.clock.today();
        let snapshot = load_or_reset(&self.store, self.engine.as_ref()).await?;
        tracing::info!("Resyncing {} stored domain rule(s) for day {today}", snapshot.len());

        let keep = snapshot
            .values()
            .map(|record| record.rule_id)
            .collect::<HashSet<_>>();
        let wildcard = self.options.header.wildcard_rule(&credentials.app_domain);
        let (epoch, _) = self
            .switch_rule_set(
                Mode::Configured,
                wildcard,
                snapshot.clone().into_iter().collect(),
                |id| keep.contains(&id),
            )
            .await?;

        let mut summary = SyncSummary::default();
        for (domain, record) in snapshot {
            if record.created_day < today {
                self.state().refreshing.insert(domain.clone());
                self.spawn_refresh(domain, credentials.clone(), record.rule_id, epoch);
                summary.refresh_scheduled += 1;
                continue;
            }
            let rule = self.domain_rule(&domain, &record, &credentials.app_domain);
            match self.install(rule).await {
                Ok(()) => summary.reinstalled += 1,
                Err(e) => {
                    tracing::warn!("Reinstalling rule {} for {domain} failed: {e}", record.rule_id);
                    self.state().tracked.remove(&domain);
                    summary.failed.push(domain);
                }
            }
        }
        tracing::info!(
            "Startup sync: {} reinstalled, {} refreshing, {} failed",
            summary.reinstalled,
            summary.refresh_scheduled,
            summary.failed.len()
        );
        Ok(summary)
    }

    /// Logout, or no credentials at all: only the not-configured rule remains.
    pub async fn enter_unconfigured(&self) -> Result<()> {
        let _gate = self.gate.write().await;
        tracing::info!("Entering unconfigured mode");

        let not_configured = self.options.header.not_configured_rule();
        let (_, floor) = self
            .switch_rule_set(Mode::Unconfigured, not_configured, HashMap::new(), |_| false)
            .await?;
        self.store.reset(floor).await?;
        Ok(())
    }

    /// Installed ids that the current mode does not allow.
    pub async fn audit(&self) -> Result<Vec<u32>> {
        let installed = self.engine.list_installed().await?;
        let mode = self.mode();
        Ok(installed
            .into_iter()
            .filter(|id| !mode.allows(RuleRole::of(*id)))
            .collect())
    }

    // ── Internals ────────────────────────────────────────────────

    /// Switch mode, invalidate in-flight work and replace the tracked map.
    /// Returns the new epoch and what it replaced.
    fn enter_mode(
        &self,
        mode: Mode,
        tracked: HashMap<String, DomainRuleRecord>,
    ) -> (u64, PreviousMode) {
        let mut state = self.state();
        let previous = PreviousMode {
            mode: std::mem::replace(&mut state.mode, mode),
            tracked: std::mem::replace(&mut state.tracked, tracked),
        };
        state.epoch += 1;
        state.creating.clear();
        state.refreshing.clear();
        (state.epoch, previous)
    }

    /// Move the engine over to `mode`. The mode's fixed rule goes in first;
    /// if that fails, the previous mode and tracked map are put back and the
    /// engine is left as it was. Afterwards every rule the mode does not
    /// allow is removed, as is every domain rule whose id `keep` rejects.
    ///
    /// Returns the new epoch and the lowest id above every domain rule seen,
    /// for resetting the store without reusing ids.
    async fn switch_rule_set(
        &self,
        mode: Mode,
        fixed: Rule,
        tracked: HashMap<String, DomainRuleRecord>,
        keep: impl Fn(u32) -> bool,
    ) -> Result<(u64, u32)> {
        let (epoch, previous) = self.enter_mode(mode, tracked);
        if let Err(e) = self.install(fixed).await {
            tracing::error!(
                "Could not enter {} mode, staying {}: {e}",
                mode.as_str(),
                previous.mode.as_str()
            );
            let mut state = self.state();
            state.mode = previous.mode;
            state.tracked = previous.tracked;
            return Err(e);
        }

        let installed = self.engine.list_installed().await?;
        let floor = id_floor(
            installed
                .iter()
                .copied()
                .chain(previous.tracked.values().map(|record| record.rule_id)),
        );
        let remove = installed
            .into_iter()
            .filter(|&id| {
                let role = RuleRole::of(id);
                !mode.allows(role) || (role == RuleRole::Domain && !keep(id))
            })
            .collect::<Vec<_>>();
        if !remove.is_empty() {
            self.engine.remove_all(&remove).await?;
        }
        Ok((epoch, floor))
    }

    fn ensure_current(&self, domain: &str, epoch: u64) -> Result<()> {
        let state = self.state();
        if state.epoch != epoch || state.mode != Mode::Configured {
            return Err(CoordinatorError::Superseded {
                domain: domain.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Install `rule` if the current mode admits its role.
    async fn install(&self, rule: Rule) -> Result<()> {
        let mode = self.mode();
        let role = rule.role();
        if !mode.allows(role) {
            return Err(PimsError::Coordinator(CoordinatorError::ModeViolation {
                rule_id: rule.id,
                role: role.as_str(),
                mode: mode.as_str(),
            }));
        }
        self.engine.install_or_replace(rule).await?;
        Ok(())
    }

    fn domain_rule(&self, domain: &str, record: &DomainRuleRecord, app_domain: &str) -> Rule {
        self.options.header.domain_rule(
            domain,
            record.rule_id,
            &identity_url(&record.identity, app_domain),
        )
    }
}

struct PreviousMode {
    mode: Mode,
    tracked: HashMap<String, DomainRuleRecord>,
}

/// First id above every domain rule id in `ids`.
fn id_floor(ids: impl IntoIterator<Item = u32>) -> u32 {
    ids.into_iter()
        .filter(|&id| RuleRole::of(id) == RuleRole::Domain)
        .map(|id| id.saturating_add(1))
        .max()
        .unwrap_or(FIRST_DOMAIN_RULE_ID)
        .max(FIRST_DOMAIN_RULE_ID)
}

/// Read the stored records. A malformed document is replaced by an empty
/// one whose counter clears every domain rule the engine still holds.
async fn load_or_reset(
    store: &RuleStateStore,
    engine: &dyn RuleEngine,
) -> Result<BTreeMap<String, DomainRuleRecord>> {
    match store.domains_snapshot().await {
        Ok(snapshot) => Ok(snapshot),
        Err(StorageError::Corrupt { message, .. }) => {
            tracing::error!("Stored rule state is malformed, starting over: {message}");
            let floor = id_floor(engine.list_installed().await?);
            store.reset(floor).await?;
            Ok(BTreeMap::new())
        }
        Err(e) => Err(e.into()),
    }
}
