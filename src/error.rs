//! Semantic error kinds for the scrape pipeline.
//!
//! These are the errors the orchestrator itself reasons about and branches
//! on. Transport-level and collaborator-level errors (reqwest, chromiumoxide,
//! sink errors) are collapsed into one of these variants at the boundary
//! where they're caught, the same way the teacher's `CrawlError` wraps
//! arbitrary `anyhow::Error` into a small closed set of kinds.

use thiserror::Error;

/// Closed set of semantic failures the orchestrator can produce.
#[derive(Debug, Error, Clone)]
pub enum ScrapeError {
    /// A required credential or endpoint was missing at startup.
    #[error("configuration missing: {0}")]
    ConfigMissing(String),

    /// The trap detector rejected a URL or a fetched page.
    #[error("trap detected: {0}")]
    TrapDetected(String),

    /// The fetch layer saw a paywall response (status 402).
    #[error("paywall encountered at {0}")]
    Paywall(String),

    /// A network or timeout failure in the fetch layer.
    #[error("fetch transport error: {0}")]
    FetchTransport(String),

    /// An auth wall was detected (401/403, login redirect, password field).
    #[error("auth wall encountered: {0}")]
    AuthWall(String),

    /// The login flow exhausted its attempts.
    #[error("login failed: {0}")]
    LoginFailed(String),

    /// A raw local time string could not be normalized to UTC.
    #[error("normalization failed for {0:?}: {1}")]
    NormalizationFailed(String, String),

    /// The validator produced a low-confidence report after the single retry.
    #[error("validation confidence too low: {0}")]
    ValidationLow(String),

    /// The upsert sink rejected or failed a batch.
    #[error("persist failed: {0}")]
    PersistFailed(String),
}

impl ScrapeError {
    /// Whether this error kind is worth retrying once with altered fetch
    /// options, per the orchestrator's retry lattice.
    #[must_use]
    pub const fn is_retryable_transport(&self) -> bool {
        matches!(self, Self::FetchTransport(_) | Self::AuthWall(_))
    }
}

/// Convenience alias; named to avoid clashing with the `ScrapeResult` entity
/// (organization/locations/classes) defined in [`crate::types`].
pub type CoreResult<T> = Result<T, ScrapeError>;
