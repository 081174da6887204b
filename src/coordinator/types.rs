use crate::engine::{DEFAULT_MAX_RULES, HeaderProfile, RuleRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Wildcard plus per-domain rules; the not-configured rule is absent.
    Configured,
    /// Only the not-configured rule.
    Unconfigured,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configured => "configured",
            Self::Unconfigured => "unconfigured",
        }
    }

    /// Which rule families may be installed in this mode.
    pub fn allows(self, role: RuleRole) -> bool {
        match self {
            Self::Configured => matches!(role, RuleRole::Wildcard | RuleRole::Domain),
            Self::Unconfigured => role == RuleRole::NotConfigured,
        }
    }
}

/// Freshness of one domain relative to the current day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainState {
    Untracked,
    Fresh(i64),
    Stale(i64),
}

impl DomainState {
    pub fn classify(created_day: Option<i64>, today: i64) -> Self {
        match created_day {
            None => Self::Untracked,
            // A record from the future (clock stepped back) keeps serving as is.
            Some(day) if day >= today => Self::Fresh(day),
            Some(day) => Self::Stale(day),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveOutcome {
    /// Unconfigured mode: nothing to do.
    Skipped,
    Created { rule_id: u32 },
    Reused { rule_id: u32 },
    /// Stale record: old rule keeps serving, a background refresh was spawned.
    RefreshScheduled { rule_id: u32 },
    /// Stale record whose refresh is already running.
    RefreshPending { rule_id: u32 },
    /// Another observation is creating this domain's rule right now.
    InFlight,
    /// Rule cap reached; the wildcard rule keeps serving this domain.
    CapacityReached,
}

/// Result of a bulk pass. Per-domain failures are counted, not propagated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub created: usize,
    pub reinstalled: usize,
    pub refresh_scheduled: usize,
    pub skipped: usize,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub header: HeaderProfile,
    /// Ceiling on installed rules, fixed roles included.
    pub max_rules: usize,
    pub enforce_cap: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            header: HeaderProfile::new("Mozilla/5.0", "OpenPIMS/2.0"),
            max_rules: DEFAULT_MAX_RULES,
            enforce_cap: true,
        }
    }
}
