//! Error taxonomy: every fallible operation in the core returns
//! a `SyncError` carrying one of these kinds. The CLI boundary wraps these
//! with `anyhow::Context` for human chains and renders the stable envelope
//! from the innermost `SyncError`.

use thiserror::Error;

/// Coarse classification surfaced to the control plane envelope as `code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Resolution,
    Authority,
    Provider,
    Concurrency,
    Io,
    Invariant,
}

impl ErrorKind {
    pub fn as_code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Resolution => "resolution_error",
            ErrorKind::Authority => "conflict",
            ErrorKind::Provider => "provider_error",
            ErrorKind::Concurrency => "concurrent_run",
            ErrorKind::Io => "io_error",
            ErrorKind::Invariant => "invariant_violation",
        }
    }

    /// Process exit code: 0 noop, 2 validation, 3 runtime, 4 conflict, 5 provider.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Validation => 2,
            ErrorKind::Resolution => 2,
            ErrorKind::Authority => 4,
            ErrorKind::Provider => 5,
            ErrorKind::Concurrency => 3,
            ErrorKind::Io => 3,
            ErrorKind::Invariant => 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid timing: {0}")]
    InvalidTiming(String),

    #[error("invalid holiday token: {0}")]
    InvalidHoliday(String),

    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("malformed row: {0}")]
    MalformedRow(String),

    #[error("unresolvable recurrence: {0}")]
    UnresolvableRecurrence(String),

    #[error("partially resolved: {reason} (resolved {resolved_segments} segments)")]
    PartiallyResolved {
        reason: String,
        resolved_segments: usize,
    },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("duplicate identity: {0}")]
    DuplicateIdentity(String),

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("unresolved conflict for identity {0}")]
    Conflict(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("etag precondition failed for {0}")]
    EtagMismatch(String),

    #[error("lock held: {0}")]
    LockHeld(String),

    #[error("a scheduler run is already in progress on this host")]
    ConcurrentRun,

    #[error("io error: {0}")]
    Io(String),

    #[error("blocked action under strict policy: {0}")]
    BlockedAction(String),

    #[error("partial apply detected: {0}")]
    PartialApply(String),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::InvalidTiming(_)
            | SyncError::InvalidHoliday(_)
            | SyncError::UnsupportedProvider(_)
            | SyncError::MalformedRow(_)
            | SyncError::InvalidIdentity(_)
            | SyncError::DuplicateIdentity(_) => ErrorKind::Validation,

            SyncError::UnresolvableRecurrence(_) | SyncError::PartiallyResolved { .. } => {
                ErrorKind::Resolution
            }

            SyncError::Conflict(_) => ErrorKind::Authority,

            SyncError::Provider(_) | SyncError::EtagMismatch(_) => ErrorKind::Provider,

            SyncError::LockHeld(_) | SyncError::ConcurrentRun => ErrorKind::Concurrency,

            SyncError::Io(_) => ErrorKind::Io,

            SyncError::InvariantViolation(_)
            | SyncError::BlockedAction(_)
            | SyncError::PartialApply(_) => ErrorKind::Invariant,
        }
    }

    /// User-actionable hint text for the control-plane envelope.
    pub fn hint(&self) -> Option<String> {
        match self {
            SyncError::InvalidTiming(_) => Some(
                "set either a hard or symbolic value for every required timing field".into(),
            ),
            SyncError::InvalidHoliday(token) => {
                Some(format!("'{token}' is not a recognized holiday token"))
            }
            SyncError::UnresolvableRecurrence(_) => {
                Some("simplify the recurrence rule to a single daily/weekly window".into())
            }
            SyncError::Conflict(_) => {
                Some("resolve manually by editing the authoritative side, then re-run".into())
            }
            SyncError::EtagMismatch(_) => {
                Some("the calendar event changed since last read; re-run preview".into())
            }
            SyncError::ConcurrentRun => {
                Some("wait for the other scheduler run to finish, or check for a stale lock file".into())
            }
            _ => None,
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Io(format!("json error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
