//! Crawl-trap heuristics.
//!
//! Two independent guards share per-host state: [`TrapDetector::check_url`]
//! rejects suspicious URL shapes before a fetch is even issued, and
//! [`TrapDetector::check_content`] rejects low-signal or repeated fetched
//! content afterwards. State lives in `DashMap`/`DashSet`, the same
//! per-host sharded-map idiom the teacher uses for its `visited` set in
//! `orchestrator.rs` and its domain maps in `rate_limiter.rs`/
//! `circuit_breaker.rs`.

use std::collections::HashMap;

use dashmap::{DashMap, DashSet};
use sha2::{Digest, Sha256};
use url::Url;

/// Result of either trap check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub safe: bool,
    pub reason: Option<String>,
}

impl CheckResult {
    fn ok() -> Self {
        Self {
            safe: true,
            reason: None,
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self {
            safe: false,
            reason: Some(reason.into()),
        }
    }
}

const MAX_QUERY_PARAMS: usize = 8;
const MAX_REPEATED_SEGMENT: usize = 3;
const LONG_SEGMENT_LEN: usize = 20;
const ENTROPY_THRESHOLD: f64 = 4.0;
const SHORT_CONTENT_TOKENS: usize = 100;
const DENSE_CONTENT_TOKENS: usize = 500;
const SCHEDULE_DENSITY_THRESHOLD: f64 = 0.005;
const HASH_PREFIX_LEN: usize = 16;

const GYM_VOCABULARY: &[&str] = &[
    "class", "schedule", "yoga", "pilates", "spin", "crossfit", "cardio", "studio",
    "instructor", "session", "workout", "gym", "fitness", "training", "bootcamp", "strength",
];

/// Per-host crawl-trap state. `max_depth` is a process-wide ceiling (spec
/// §6 `MAX_CRAWL_DEPTH`).
pub struct TrapDetector {
    max_depth: u8,
    visited: DashMap<String, DashSet<String>>,
    content_hashes: DashMap<String, DashSet<String>>,
    depth: DashMap<String, u8>,
}

impl TrapDetector {
    #[must_use]
    pub fn new(max_depth: u8) -> Self {
        Self {
            max_depth,
            visited: DashMap::new(),
            content_hashes: DashMap::new(),
            depth: DashMap::new(),
        }
    }

    /// Reject suspicious URL shapes before a fetch is issued.
    #[must_use]
    pub fn check_url(&self, url: &str) -> CheckResult {
        let Ok(parsed) = Url::parse(url) else {
            return CheckResult::reject("invalid url");
        };
        let Some(host) = parsed.host_str() else {
            return CheckResult::reject("invalid url: no host");
        };

        let current_depth = self.depth.get(host).map_or(0, |d| *d);
        if current_depth >= self.max_depth {
            return CheckResult::reject(format!("max crawl depth {} reached", self.max_depth));
        }

        if self
            .visited
            .get(host)
            .is_some_and(|set| set.contains(url))
        {
            return CheckResult::reject("url already visited");
        }

        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for seg in &segments {
            *counts.entry(seg).or_insert(0) += 1;
        }
        if counts.values().any(|&c| c >= MAX_REPEATED_SEGMENT) {
            return CheckResult::reject("path segment repeats 3 or more times");
        }

        if parsed.query_pairs().count() > MAX_QUERY_PARAMS {
            return CheckResult::reject("more than 8 query parameters");
        }

        for seg in &segments {
            if seg.len() > LONG_SEGMENT_LEN && shannon_entropy(seg) > ENTROPY_THRESHOLD {
                return CheckResult::reject("path segment entropy exceeds threshold");
            }
        }

        CheckResult::ok()
    }

    /// Reject repeated or low-signal fetched content. On pass, records the
    /// content hash, marks `url` visited, and increments the host's depth
    /// counter.
    #[must_use]
    pub fn check_content(&self, url: &str, text: &str, class_count: usize) -> CheckResult {
        let Ok(parsed) = Url::parse(url) else {
            return CheckResult::reject("invalid url");
        };
        let Some(host) = parsed.host_str().map(str::to_string) else {
            return CheckResult::reject("invalid url: no host");
        };

        let hash = content_hash(text);
        if self
            .content_hashes
            .get(&host)
            .is_some_and(|set| set.contains(&hash))
        {
            return CheckResult::reject("duplicate content hash for host");
        }

        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.len() > SHORT_CONTENT_TOKENS {
            let density = schedule_token_density(&tokens);
            if tokens.len() > DENSE_CONTENT_TOKENS
                && density < SCHEDULE_DENSITY_THRESHOLD
                && class_count == 0
            {
                return CheckResult::reject("low schedule-token density with zero classes");
            }
        }

        self.content_hashes
            .entry(host.clone())
            .or_default()
            .insert(hash);
        self.visited.entry(host.clone()).or_default().insert(url.to_string());
        *self.depth.entry(host).or_insert(0) += 1;

        CheckResult::ok()
    }
}

fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().take(HASH_PREFIX_LEN / 2).map(|b| format!("{b:02x}")).collect()
}

fn shannon_entropy(s: &str) -> f64 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *counts.entry(c).or_insert(0) += 1;
    }
    let len = s.chars().count() as f64;
    if len == 0.0 {
        return 0.0;
    }
    counts
        .values()
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum()
}

fn is_time_like(token: &str) -> bool {
    let trimmed = token.trim_matches(|c: char| !c.is_alphanumeric());
    if trimmed.is_empty() {
        return false;
    }
    let lower = trimmed.to_lowercase();
    if lower.ends_with("am") || lower.ends_with("pm") {
        let digits = &lower[..lower.len() - 2];
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit() || c == ':') {
            return true;
        }
    }
    if let Some((h, m)) = trimmed.split_once(':') {
        if h.chars().all(|c| c.is_ascii_digit()) && m.chars().all(|c| c.is_ascii_digit()) {
            return true;
        }
    }
    false
}

fn is_day_name(token: &str) -> bool {
    const DAYS: &[&str] = &[
        "monday", "mon", "tuesday", "tue", "wednesday", "wed", "thursday", "thu", "friday",
        "fri", "saturday", "sat", "sunday", "sun",
    ];
    let lower = token
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    DAYS.contains(&lower.as_str())
}

fn is_gym_term(token: &str) -> bool {
    let lower = token
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    GYM_VOCABULARY.contains(&lower.as_str())
}

fn schedule_token_density(tokens: &[&str]) -> f64 {
    let matches = tokens
        .iter()
        .filter(|t| is_time_like(t) || is_day_name(t) || is_gym_term(t))
        .count();
    matches as f64 / tokens.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_limit_rejects() {
        let det = TrapDetector::new(1);
        det.check_content("https://x.test/a", "Monday 6pm yoga class", 1);
        let result = det.check_url("https://x.test/b");
        assert!(!result.safe);
    }

    #[test]
    fn revisit_is_rejected() {
        let det = TrapDetector::new(5);
        assert!(det.check_url("https://x.test/a").safe);
        assert!(det.check_content("https://x.test/a", "Monday 6pm yoga class", 1).safe);
        assert!(!det.check_url("https://x.test/a").safe);
    }

    #[test]
    fn repeated_segment_rejected() {
        let det = TrapDetector::new(5);
        let result = det.check_url("https://x.test/a/a/a");
        assert!(!result.safe);
    }

    #[test]
    fn too_many_query_params_rejected() {
        let det = TrapDetector::new(5);
        let qs: String = (0..9).map(|i| format!("p{i}={i}&")).collect();
        let result = det.check_url(&format!("https://x.test/page?{qs}"));
        assert!(!result.safe);
    }

    #[test]
    fn high_entropy_segment_rejected() {
        let det = TrapDetector::new(5);
        let result = det.check_url("https://x.test/xQ9z7vR2bN4kP8wL1tY6u");
        assert!(!result.safe);
    }

    #[test]
    fn short_content_always_safe_on_density() {
        let det = TrapDetector::new(5);
        let result = det.check_content("https://x.test/a", "no schedule info here at all", 0);
        assert!(result.safe);
    }

    #[test]
    fn sparse_long_content_with_no_classes_rejected() {
        let det = TrapDetector::new(5);
        let filler = "lorem ipsum dolor sit amet ".repeat(30);
        let result = det.check_content("https://x.test/a", &filler, 0);
        assert!(!result.safe);
    }

    #[test]
    fn duplicate_content_hash_rejected() {
        let det = TrapDetector::new(5);
        let text = "Monday 6pm yoga class schedule instructor";
        assert!(det.check_content("https://x.test/a", text, 1).safe);
        assert!(!det.check_content("https://x.test/b", text, 1).safe);
    }

    #[test]
    fn invalid_url_fails_closed() {
        let det = TrapDetector::new(5);
        assert!(!det.check_url("not a url").safe);
        assert!(!det.check_content("not a url", "text", 1).safe);
    }
}
