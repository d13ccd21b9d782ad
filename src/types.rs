//! Core entity shapes.
//!
//! Identifiers are opaque strings; equality is by value. These are plain
//! `serde`-derived structs, mirroring how the teacher derives
//! `Serialize, Deserialize` on `CrawlQueue`/`CrawlConfig` so state can cross
//! process boundaries (the upsert sink, the cookie file) as JSON.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An opaque reference returned by the upsert sink after a successful
/// upsert. Treated as an equality-comparable opaque string by the core.
pub type Ref = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub name: String,
    pub website_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub organization_ref: Ref,
    pub name: String,
    pub address: Option<String>,
    pub iana_timezone: String,
}

/// A class as extracted, before time normalization: `start`/`end` are raw
/// local-time strings as they appeared on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawClass {
    pub location_ref: Ref,
    pub name: String,
    pub start_local: String,
    pub end_local: Option<String>,
    pub instructor: Option<String>,
    pub spots_total: Option<u32>,
}

/// A class after normalization: start/end are absolute UTC instants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    pub location_ref: Ref,
    pub name: String,
    pub start_instant_utc: chrono::DateTime<chrono::Utc>,
    pub end_instant_utc: Option<chrono::DateTime<chrono::Utc>>,
    pub instructor: Option<String>,
    pub spots_total: Option<u32>,
}

impl Class {
    /// The `(location, start, name)` idempotency key used by the upsert sink.
    #[must_use]
    pub fn idempotency_key(&self) -> (Ref, chrono::DateTime<chrono::Utc>, String) {
        (
            self.location_ref.clone(),
            self.start_instant_utc,
            self.name.clone(),
        )
    }
}

/// Raw extraction output before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub organization: Organization,
    pub locations: Vec<Location>,
    pub classes: Vec<RawClass>,
}

/// Which fetch modality produced a [`FetchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchMethod {
    Light,
    Browser,
}

/// Opaque handles identifying a live browser page/context. The orchestrator
/// treats these as capability tokens passed back into the browser-pool
/// interface; their concrete shape lives in
/// [`crate::browser_pool`].
pub type PageHandle = u64;
pub type ContextHandle = u64;

/// Result of a fetch attempt. When `method = Browser`, both
/// handles are present and the caller owns context disposal.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub body: String,
    pub status_code: u16,
    pub method: FetchMethod,
    pub page_handle: Option<PageHandle>,
    pub context_handle: Option<ContextHandle>,
    /// The response's `Location` header, when present. Fed to the session
    /// manager's login-redirect check (§4.4) on both fetch paths: the light
    /// path reads it straight off the `reqwest::Response`, the browser path
    /// reads it off the main document's CDP `Network.responseReceived`
    /// event (CDP still exposes the header even though the engine itself
    /// follows the redirect).
    pub location_header: Option<String>,
}

/// A hint steering the orchestrator's single permitted retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryHint {
    PaginateForward,
    WaitLonger,
    SwitchToBrowser,
    ReAuthenticate,
}

/// Output of the validator.
#[derive(Debug, Clone)]
pub struct ValidatorReport {
    pub valid: bool,
    pub confidence: f64,
    pub signals: Vec<String>,
    pub retry_hint: Option<RetryHint>,
}

/// HTTP method for a discovered day-worker API pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiMethod {
    Get,
    Post,
}

/// A date-parameterised request template discovered by traffic interception
/// Discovered by traffic interception. `{{date}}` is the substitution placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayApiPattern {
    pub url_template: String,
    pub method: ApiMethod,
    pub date_param: Option<String>,
    pub body_template: Option<String>,
    pub headers: Vec<(String, String)>,
}

/// Navigation plan produced by the (optional) LLM planner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    pub schedule_selector: Option<String>,
    pub next_button_selector: Option<String>,
    pub load_more_selector: Option<String>,
    pub auth_wall_detected: bool,
}

/// Current authentication state as tracked by the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    LoggedIn,
    LoggedOut,
    Unknown,
}

/// Outcome of a single-day replay in the day-worker pool.
#[derive(Debug, Clone)]
pub struct DayReplayResult {
    pub date: String,
    pub success: bool,
    pub status_code: Option<u16>,
    pub body: Option<String>,
    pub error: Option<String>,
}

/// Final result returned by the orchestrator for one URL run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub organization_ref: Ref,
    pub location_refs: Vec<Ref>,
    pub classes_upserted: usize,
}

/// On-disk shape of the persisted cookie store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieStore {
    pub timestamp: i64,
    pub cookies: Vec<serde_json::Value>,
}

impl CookieStore {
    #[must_use]
    pub fn age_hours(&self, now_epoch_ms: i64) -> f64 {
        ((now_epoch_ms - self.timestamp).max(0) as f64) / 3_600_000.0
    }
}

/// Where the cookie store lives on disk by default.
#[must_use]
pub fn default_cookie_path() -> PathBuf {
    PathBuf::from(".cookies.json")
}
