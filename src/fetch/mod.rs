//! Fetch layer: light HTTPS path, browser path, and the
//! decision rule between them. The orchestrator drives everything through
//! [`fetch`]; the submodules are exposed for the day-worker pool and tests
//! that need to force one path or the other.

mod browser;
mod decision;
mod light;

use std::time::Duration;

use crate::browser_pool::BrowserPool;
use crate::compliance::ComplianceGate;
use crate::error::ScrapeError;
use crate::session::SessionManager;
use crate::types::FetchResult;

pub use light::build_client;

/// Fetch `url`, picking the light or browser path per [`decision::fetch`].
/// `compliance` gates the call on robots policy and the per-host page rate
/// limit (§4.1), ahead of either fetch path. `force_browser` skips the light
/// path entirely (used on retry after a light-path false accept).
/// `extra_settle` is forwarded to the browser path's post-idle wait on a
/// "wait longer" retry. `session` receives every response's login-wall
/// signal (§4.4) regardless of which path served it.
pub async fn fetch(
    light_client: &reqwest::Client,
    browser_pool: &BrowserPool,
    compliance: &ComplianceGate,
    session: &SessionManager,
    url: &str,
    force_browser: bool,
    extra_settle: Option<Duration>,
) -> Result<FetchResult, ScrapeError> {
    decision::fetch(light_client, browser_pool, compliance, session, url, force_browser, extra_settle).await
}

/// Fetch `url` via the browser path only, bypassing the light-path decision
/// rule entirely. Used by the day-worker pool for calendar/day navigation
/// once a session is already committed to a rendered page.
pub async fn fetch_browser_only(
    browser_pool: &BrowserPool,
    session: &SessionManager,
    url: &str,
    extra_settle: Option<Duration>,
) -> Result<FetchResult, ScrapeError> {
    browser::fetch(browser_pool, session, url, extra_settle).await
}
