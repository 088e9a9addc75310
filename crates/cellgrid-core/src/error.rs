use thiserror::Error;

/// Unified error type for the core crate.
///
/// Orchestration soft-failures (agent errors during event handling) never
/// surface here — they are logged and swallowed at the supervisor's
/// outermost scope. `CoreError` is what operation calls return to their
/// callers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A caller-supplied value failed validation. No state was changed.
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Transport failure talking to the tower simulator.
    #[error(transparent)]
    Api(#[from] cellgrid_api::ApiError),

    /// Snapshot lookup yielded no such site.
    #[error("site not found: {0}")]
    SiteNotFound(String),

    /// No case with `dispatch_suggested` exists for the site.
    #[error("no unresolved case for site {0}")]
    NoUnresolvedCase(String),

    /// Policy file I/O failed.
    #[error("policy persistence failed: {0}")]
    Io(#[from] std::io::Error),

    /// Policy file serialization failed.
    #[error("policy serialization failed: {0}")]
    PolicyFormat(#[from] toml::ser::Error),
}
