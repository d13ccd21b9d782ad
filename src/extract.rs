//! HTML-to-entity extraction (external collaborator) and the scraper
//! factory dispatch that picks among site-specific implementations.
//!
//! The real parsers are out of scope (spec §1): "called via an
//! `extract(html, url) -> ScrapeResult` interface". What belongs to the core
//! is the narrow trait itself and the dispatch mechanism — a linear rule
//! list of `(signatureSet, scraperFactory)` pairs evaluated in priority
//! order with a fixed fallback (spec §9, "avoid dynamic reflection"), the
//! same flavor of explicit rule list the teacher uses for
//! `FailureKind`-driven retry policy in `crawl_types.rs` rather than a trait
//! registry walked by `TypeId`.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ScrapeError;
use crate::types::{Organization, RawClass, ScrapeResult};

/// Narrow extraction contract. Implementations turn a fetched page's HTML
/// into structured (pre-normalization) schedule data.
pub trait GymScraper: Send + Sync {
    fn extract(&self, html: &str, url: &str) -> Result<ScrapeResult, ScrapeError>;
}

type Factory = Arc<dyn Fn() -> Arc<dyn GymScraper> + Send + Sync>;

/// Priority-ordered `(signatures, factory)` rules plus a fixed fallback.
/// `dispatch` is a straight linear scan; the first rule whose signature set
/// contains a substring of `url` wins.
pub struct ScraperFactory {
    rules: Vec<(Vec<String>, Factory)>,
    fallback: Arc<dyn GymScraper>,
}

impl ScraperFactory {
    #[must_use]
    pub fn new(fallback: Arc<dyn GymScraper>) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
        }
    }

    /// Register a site-specific scraper behind a set of URL substrings.
    #[must_use]
    pub fn register(
        mut self,
        signatures: &[&str],
        factory: impl Fn() -> Arc<dyn GymScraper> + Send + Sync + 'static,
    ) -> Self {
        self.rules.push((
            signatures.iter().map(|s| (*s).to_string()).collect(),
            Arc::new(factory),
        ));
        self
    }

    /// Resolve the scraper to use for `url`, in registration order, falling
    /// back to the generic extractor when nothing matches.
    #[must_use]
    pub fn dispatch(&self, url: &str) -> Arc<dyn GymScraper> {
        for (signatures, factory) in &self.rules {
            if signatures.iter().any(|sig| url.contains(sig.as_str())) {
                return factory();
            }
        }
        Arc::clone(&self.fallback)
    }
}

/// Schedule-shaped line: an optional day token, a time token, and whatever
/// text follows as the class name. Lenient on purpose — this is the
/// no-site-specific-parser-registered fallback, not a production parser.
static SCHEDULE_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^\s*(?:(?P<day>mon(?:day)?|tue(?:s(?:day)?)?|wed(?:nesday)?|thu(?:rs(?:day)?)?|fri(?:day)?|sat(?:urday)?|sun(?:day)?|today|tomorrow)\b[\s,:-]*)?(?P<time>\d{1,2}(?::\d{2})?\s*(?:am|pm)?)\s*[-–—:]*\s*(?P<name>[A-Za-z][^\n<>]{1,80})\s*$",
    )
    .expect("static regex")
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("static regex"));

/// The fixed fallback: strips tags, scans line-by-line for
/// `[day] time name` shapes, and groups everything under a single location
/// derived from `url`. `iana_timezone` is left empty to signal "unknown
/// site" — the orchestrator falls back to the run's `gymTimezone` argument
/// when a location's zone is blank.
pub struct GenericScraper;

impl GymScraper for GenericScraper {
    fn extract(&self, html: &str, url: &str) -> Result<ScrapeResult, ScrapeError> {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());

        let organization = Organization {
            name: host.clone(),
            website_url: url.to_string(),
        };

        let location_name = "Default".to_string();
        let locations = vec![crate::types::Location {
            organization_ref: String::new(),
            name: location_name.clone(),
            address: None,
            iana_timezone: String::new(),
        }];

        let text = TAG_RE.replace_all(html, "\n");
        let mut classes = Vec::new();
        for line in text.lines() {
            let Some(caps) = SCHEDULE_LINE_RE.captures(line) else {
                continue;
            };
            let time = caps.name("time").map_or("", |m| m.as_str()).trim();
            let name = caps.name("name").map_or("", |m| m.as_str()).trim();
            if name.is_empty() || time.is_empty() {
                continue;
            }
            let start_local = match caps.name("day") {
                Some(day) => format!("{} {}", day.as_str(), time),
                None => time.to_string(),
            };
            classes.push(RawClass {
                location_ref: location_name.clone(),
                name: name.to_string(),
                start_local,
                end_local: None,
                instructor: None,
                spots_total: None,
            });
        }

        Ok(ScrapeResult {
            organization,
            locations,
            classes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_scraper_extracts_day_time_name_lines() {
        let html = "<html><body>\nMonday 6:00 PM Yoga\nWed 7:00 AM Spin\n</body></html>";
        let result = GenericScraper.extract(html, "https://gym.test/schedule").unwrap();
        assert_eq!(result.organization.website_url, "https://gym.test/schedule");
        assert_eq!(result.classes.len(), 2);
        assert_eq!(result.classes[0].name, "Yoga");
        assert!(result.classes[0].start_local.starts_with("Monday"));
    }

    #[test]
    fn generic_scraper_skips_lines_without_a_time_token() {
        let html = "Welcome to our gym! Open daily.";
        let result = GenericScraper.extract(html, "https://gym.test/").unwrap();
        assert!(result.classes.is_empty());
    }

    #[test]
    fn factory_dispatch_matches_registered_signature_before_fallback() {
        struct Tagged;
        impl GymScraper for Tagged {
            fn extract(&self, _html: &str, _url: &str) -> Result<ScrapeResult, ScrapeError> {
                Ok(ScrapeResult {
                    organization: Organization {
                        name: "tagged".into(),
                        website_url: "https://tagged.test".into(),
                    },
                    locations: vec![],
                    classes: vec![],
                })
            }
        }

        let factory = ScraperFactory::new(Arc::new(GenericScraper))
            .register(&["mindbody.io"], || Arc::new(Tagged));

        let picked = factory.dispatch("https://studio.mindbody.io/schedule");
        let result = picked.extract("", "https://studio.mindbody.io/schedule").unwrap();
        assert_eq!(result.organization.name, "tagged");

        let fallback = factory.dispatch("https://some-other-gym.example/schedule");
        let result = fallback.extract("Mon 6pm Yoga", "https://some-other-gym.example/schedule").unwrap();
        assert_eq!(result.classes.len(), 1);
    }
}
