//! Light-vs-browser decision rule: try the light path first
//! unless the caller forces browser mode; a paywall short-circuits with no
//! fallback; a light 200 whose body already carries schedule-shaped tokens
//! is accepted as-is; anything else falls back to the browser path.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::compliance::{is_paywall, ComplianceGate};
use crate::error::ScrapeError;
use crate::session::SessionManager;
use crate::types::FetchResult;

use super::{browser, light};

static TIME_LIKE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b\d{1,2}:\d{2}\s*(am|pm)?\b|\b\d{1,2}\s*(am|pm)\b").unwrap());

static DAY_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(mon|monday|tue|tues|tuesday|wed|weds|wednesday|thu|thur|thurs|thursday|fri|friday|sat|saturday|sun|sunday)\b",
    )
    .unwrap()
});

fn has_schedule_signal(body: &str) -> bool {
    TIME_LIKE_RE.is_match(body) && DAY_NAME_RE.is_match(body)
}

/// Fetch `url`, choosing the light path unless `force_browser` is set or the
/// light path's result doesn't look like a rendered schedule page.
///
/// Compliance preflight (§4.1) is implicit here: a robots-disallowed URL is
/// rejected before either path is tried, and the page-rate-limit permit is
/// held for the whole call, serializing fetches to the same host one at a
/// time regardless of which path eventually serves the request.
pub async fn fetch(
    light_client: &reqwest::Client,
    browser_pool: &crate::browser_pool::BrowserPool,
    compliance: &ComplianceGate,
    session: &SessionManager,
    url: &str,
    force_browser: bool,
    extra_settle: Option<Duration>,
) -> Result<FetchResult, ScrapeError> {
    if !compliance.is_allowed(url).await {
        return Err(ScrapeError::TrapDetected(format!("{url}: disallowed by robots.txt")));
    }
    let _permit = compliance.acquire_page_permit(url).await;

    if !force_browser {
        match light::fetch(light_client, url).await {
            Ok(result) if is_paywall(result.status_code) => {
                return Err(ScrapeError::Paywall(url.to_string()));
            }
            Ok(result) => {
                session.observe_response(result.status_code, result.location_header.as_deref());
                if result.status_code == 200 && has_schedule_signal(&result.body) {
                    return Ok(result);
                }
            }
            Err(_) => {}
        }
    }

    browser::fetch(browser_pool, session, url, extra_settle).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_schedule_signal_in_mixed_copy() {
        let body = "Classes run Monday through Friday, 6:00 AM - 8:00 PM.";
        assert!(has_schedule_signal(body));
    }

    #[test]
    fn rejects_body_missing_day_names() {
        let body = "Open 24 hours, no appointment necessary. Call 555-6:00.";
        assert!(!has_schedule_signal(body));
    }

    #[test]
    fn rejects_body_missing_time_tokens() {
        let body = "We are open Monday through Friday for tours.";
        assert!(!has_schedule_signal(body));
    }
}
