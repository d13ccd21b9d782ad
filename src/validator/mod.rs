//! Validator: cross-checks extracted data against independent page signals
//! and drives the orchestrator's single permitted retry.
//!
//! Five independent checks (spec §4.5), evaluated in a fixed order; overall
//! confidence is their factor product, and the first non-empty retry hint
//! (in check order) wins. The two DOM-dependent checks only run when a live
//! page probe is supplied — the orchestrator only has one on the browser
//! path, matching spec's "(page required)" annotation.

use std::collections::HashSet;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{RetryHint, ScrapeResult, ValidatorReport};

/// DOM access the validator needs beyond the already-captured HTML/
/// `ScrapeResult` — pagination controls and password-field presence both
/// require live evaluation, not just string search.
#[async_trait]
pub trait DomProbe: Send + Sync {
    async fn has_password_input(&self) -> bool;
    async fn has_enabled_pagination_control(&self) -> bool;
}

struct CheckOutcome {
    factor: f64,
    signal: String,
    hint: Option<RetryHint>,
}

impl CheckOutcome {
    fn trigger(factor: f64, signal: impl Into<String>, hint: Option<RetryHint>) -> Option<Self> {
        Some(Self {
            factor,
            signal: signal.into(),
            hint,
        })
    }
}

static BAD_CHARS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[<>{}\[\]\\]").expect("static regex"));

static PAGINATION_WORDS: &[&str] = &["next", "forward", "tomorrow", "next day", "next week", "→", "›", "»"];

static AUTH_KEYWORDS: &[&str] = &[
    "sign in",
    "log in",
    "enter your password",
    "authentication required",
];

/// Run all applicable checks and produce the overall report.
pub async fn validate(
    result: &ScrapeResult,
    raw_html: &str,
    page_probe: Option<&dyn DomProbe>,
) -> ValidatorReport {
    let mut signals = Vec::new();
    let mut confidence = 1.0_f64;
    let mut hint = None;

    let checks = [
        check_count(result),
        check_coherence(result),
        check_duplicates(result),
    ];
    for check in checks.into_iter().flatten() {
        confidence *= check.factor;
        signals.push(check.signal);
        hint = hint.or(check.hint);
    }

    if let Some(probe) = page_probe {
        if let Some(check) = check_pagination(probe).await {
            confidence *= check.factor;
            signals.push(check.signal);
            hint = hint.or(check.hint);
        }
        if let Some(check) = check_auth_wall(probe, raw_html).await {
            confidence *= check.factor;
            signals.push(check.signal);
            hint = hint.or(check.hint);
        }
    } else if let Some(check) = check_auth_wall_html_only(raw_html) {
        confidence *= check.factor;
        signals.push(check.signal);
        hint = hint.or(check.hint);
    }

    ValidatorReport {
        valid: confidence >= 0.5,
        confidence,
        signals,
        retry_hint: hint,
    }
}

fn check_count(result: &ScrapeResult) -> Option<CheckOutcome> {
    let n = result.classes.len();
    if n == 0 {
        CheckOutcome::trigger(0.1, "zero classes extracted", Some(RetryHint::WaitLonger))
    } else if n < 3 {
        CheckOutcome::trigger(
            0.5,
            format!("only {n} classes extracted"),
            Some(RetryHint::PaginateForward),
        )
    } else {
        None
    }
}

fn check_coherence(result: &ScrapeResult) -> Option<CheckOutcome> {
    let total = result.classes.len();
    if total == 0 {
        return None;
    }
    let bad = result
        .classes
        .iter()
        .filter(|c| BAD_CHARS_RE.is_match(&c.name))
        .count();
    if bad == 0 {
        return None;
    }
    let ratio = bad as f64 / total as f64;
    if ratio > 0.3 {
        CheckOutcome::trigger(
            0.2,
            "over 30% of class names contain markup-like characters",
            Some(RetryHint::SwitchToBrowser),
        )
    } else {
        CheckOutcome::trigger(0.7, "some class names contain markup-like characters", None)
    }
}

fn check_duplicates(result: &ScrapeResult) -> Option<CheckOutcome> {
    let total = result.classes.len();
    if total == 0 {
        return None;
    }
    let unique: HashSet<(&str, &str)> = result
        .classes
        .iter()
        .map(|c| (c.name.as_str(), c.start_local.as_str()))
        .collect();
    let ratio = unique.len() as f64 / total as f64;
    if ratio < 0.3 {
        CheckOutcome::trigger(
            0.2,
            "fewer than 30% of classes are unique by (name, start)",
            Some(RetryHint::WaitLonger),
        )
    } else if ratio < 0.5 {
        CheckOutcome::trigger(0.6, "fewer than 50% of classes are unique by (name, start)", None)
    } else {
        None
    }
}

async fn check_pagination(probe: &dyn DomProbe) -> Option<CheckOutcome> {
    if probe.has_enabled_pagination_control().await {
        CheckOutcome::trigger(
            0.7,
            "an enabled pagination control is present",
            Some(RetryHint::PaginateForward),
        )
    } else {
        None
    }
}

async fn check_auth_wall(probe: &dyn DomProbe, raw_html: &str) -> Option<CheckOutcome> {
    if probe.has_password_input().await {
        return CheckOutcome::trigger(0.1, "password input present", Some(RetryHint::ReAuthenticate));
    }
    check_auth_wall_html_only(raw_html)
}

fn check_auth_wall_html_only(raw_html: &str) -> Option<CheckOutcome> {
    let lower = raw_html.to_lowercase();
    let hits = AUTH_KEYWORDS.iter().filter(|kw| lower.contains(**kw)).count();
    if hits >= 2 {
        CheckOutcome::trigger(
            0.4,
            format!("{hits} auth-wall keywords present in html"),
            Some(RetryHint::ReAuthenticate),
        )
    } else {
        None
    }
}

/// Whether `text` contains any pagination-forward vocabulary (spec's fixed
/// word list), case-insensitive. Exposed for reuse by a [`DomProbe`]
/// implementation deciding whether a given element counts.
#[must_use]
pub fn is_pagination_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    PAGINATION_WORDS.iter().any(|w| lower.contains(w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Organization, RawClass};

    fn result_with_classes(names_and_starts: &[(&str, &str)]) -> ScrapeResult {
        ScrapeResult {
            organization: Organization {
                name: "Gym".into(),
                website_url: "https://gym.test".into(),
            },
            locations: vec![],
            classes: names_and_starts
                .iter()
                .map(|(name, start)| RawClass {
                    location_ref: "loc".into(),
                    name: (*name).to_string(),
                    start_local: (*start).to_string(),
                    end_local: None,
                    instructor: None,
                    spots_total: None,
                })
                .collect(),
        }
    }

    struct NoDom;
    #[async_trait]
    impl DomProbe for NoDom {
        async fn has_password_input(&self) -> bool {
            false
        }
        async fn has_enabled_pagination_control(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn zero_checks_failing_yields_full_confidence() {
        let result = result_with_classes(&[("Yoga", "Mon 6pm"), ("Spin", "Tue 7am"), ("Pilates", "Wed 8am")]);
        let report = validate(&result, "<html></html>", Some(&NoDom)).await;
        assert_eq!(report.confidence, 1.0);
        assert!(report.valid);
    }

    #[tokio::test]
    async fn zero_classes_is_exactly_point_one() {
        let result = result_with_classes(&[]);
        let report = validate(&result, "<html></html>", Some(&NoDom)).await;
        assert_eq!(report.confidence, 0.1);
        assert_eq!(report.retry_hint, Some(RetryHint::WaitLonger));
        assert!(!report.valid);
    }

    #[tokio::test]
    async fn low_count_suggests_pagination() {
        let result = result_with_classes(&[("Yoga", "Mon 6pm")]);
        let report = validate(&result, "<html></html>", Some(&NoDom)).await;
        assert_eq!(report.retry_hint, Some(RetryHint::PaginateForward));
    }

    #[tokio::test]
    async fn markup_heavy_names_suggest_browser_switch() {
        let result = result_with_classes(&[
            ("<script>Yoga", "Mon 6pm"),
            ("<b>Spin", "Tue 7am"),
            ("Pilates {bad}", "Wed 8am"),
        ]);
        let report = validate(&result, "<html></html>", Some(&NoDom)).await;
        assert_eq!(report.retry_hint, Some(RetryHint::SwitchToBrowser));
    }

    #[tokio::test]
    async fn password_input_forces_reauthenticate_hint() {
        struct WithPassword;
        #[async_trait]
        impl DomProbe for WithPassword {
            async fn has_password_input(&self) -> bool {
                true
            }
            async fn has_enabled_pagination_control(&self) -> bool {
                false
            }
        }
        let result = result_with_classes(&[("Yoga", "Mon 6pm"), ("Spin", "Tue 7am"), ("Pilates", "Wed 8am")]);
        let report = validate(&result, "<html></html>", Some(&WithPassword)).await;
        assert_eq!(report.retry_hint, Some(RetryHint::ReAuthenticate));
        assert!(report.confidence <= 0.1);
    }

    #[tokio::test]
    async fn auth_keywords_in_html_trigger_without_a_page() {
        let result = result_with_classes(&[("Yoga", "Mon 6pm"), ("Spin", "Tue 7am"), ("Pilates", "Wed 8am")]);
        let html = "Please sign in to view your schedule. Authentication required.";
        let report = validate(&result, html, None).await;
        assert_eq!(report.retry_hint, Some(RetryHint::ReAuthenticate));
    }

    #[test]
    fn pagination_word_list_is_case_insensitive() {
        assert!(is_pagination_text("Next Day »"));
        assert!(is_pagination_text("NEXT WEEK"));
        assert!(!is_pagination_text("previous"));
    }
}
