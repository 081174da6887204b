use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `OpenPIMS`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; the binary and config loading continue
/// to use `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum PimsError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Identity derivation ─────────────────────────────────────────────
    #[error("identity: {0}")]
    Identity(#[from] IdentityError),

    // ── Durable storage ─────────────────────────────────────────────────
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    // ── Rule engine ─────────────────────────────────────────────────────
    #[error("engine: {0}")]
    Engine(#[from] EngineError),

    // ── Coordinator ─────────────────────────────────────────────────────
    #[error("coordinator: {0}")]
    Coordinator(#[from] CoordinatorError),

    // ── Consent server API ──────────────────────────────────────────────
    #[error("api: {0}")]
    Api(#[from] ApiError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Identity errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("hmac key rejected: {0}")]
    InvalidKey(String),

    #[error("malformed identity token: {0:?}")]
    MalformedToken(String),
}

// ─── Storage errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("read {key} failed: {message}")]
    Read { key: String, message: String },

    #[error("write {key} failed: {message}")]
    Write { key: String, message: String },

    #[error("stored value under {key} is malformed: {message}")]
    Corrupt { key: String, message: String },

    #[error("rule id space exhausted at {0}")]
    IdSpaceExhausted(u32),
}

// ─── Rule engine errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("install of rule {rule_id} failed: {message}")]
    Install { rule_id: u32, message: String },

    #[error("removal of rules failed: {0}")]
    Remove(String),

    #[error("listing installed rules failed: {0}")]
    List(String),
}

// ─── Coordinator errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("rule {rule_id} ({role}) cannot be installed while {mode}")]
    ModeViolation {
        rule_id: u32,
        role: &'static str,
        mode: &'static str,
    },

    #[error("domain {domain} failed: {source}")]
    Domain {
        domain: String,
        #[source]
        source: Box<PimsError>,
    },

    #[error("mode changed while {domain} was in progress")]
    Superseded { domain: String },
}

// ─── Consent server API errors ───────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not logged in on the server; log in on the website first")]
    NotLoggedIn,

    #[error("setup endpoint not found; check the server url")]
    EndpointNotFound,

    #[error("server error ({0}); try again later")]
    Server(u16),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("invalid server response: {0}")]
    InvalidResponse(String),

    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    #[error("connection to server failed: {0}")]
    Connection(String),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, PimsError>;
