//! The orchestrator: drives one URL through the nine stages described in
//! spec §4.8, wiring together every other collaborator in [`crate::runtime`].
//! This is the one module allowed to depend on everything else — every
//! other module is written against narrow traits precisely so this is the
//! only place that needs the whole graph in scope.

mod retry;

use std::time::Duration;

use async_trait::async_trait;
use chrono_tz::Tz;
use tracing::warn;

use crate::error::ScrapeError;
use crate::fetch;
use crate::runtime::Runtime;
use crate::sink::LocationRow;
use crate::types::{Class, Location, RawClass, RunOutcome, ScrapeResult};
use crate::validator::{self, DomProbe};

use retry::altered_fetch_options;

const DEFAULT_LOCATION_NAME: &str = "Default";

/// Run the full pipeline for `url`, falling back to `gym_timezone` for any
/// location whose own zone couldn't be determined.
///
/// # Errors
/// Returns the first fatal [`ScrapeError`] encountered: trap rejection,
/// paywall, empty-body fetch, login failure, or a sink rejection.
pub async fn run(runtime: &Runtime, url: &str, gym_timezone: Tz) -> Result<RunOutcome, ScrapeError> {
    // Stage 2: trap pre-check.
    let pre_check = runtime.trap_detector.check_url(url);
    if !pre_check.safe {
        return Err(ScrapeError::TrapDetected(
            pre_check.reason.unwrap_or_else(|| "url rejected".to_string()),
        ));
    }

    // Stage 3: session gate, then fetch. Compliance (robots/rate limit) is
    // implicit inside the light/browser fetch paths themselves.
    runtime.session.wait_for_gate().await?;
    let mut fetch_result = fetch::fetch(
        &runtime.light_client,
        &runtime.browser_pool,
        &runtime.compliance,
        &runtime.session,
        url,
        false,
        None,
    )
    .await?;
    if fetch_result.body.trim().is_empty() {
        return Err(ScrapeError::FetchTransport(format!("{url}: empty response body")));
    }

    // Stage 4: planner-driven navigation, only possible on the browser path.
    if let Some(handle) = fetch_result.page_handle {
        if let Some(page) = runtime.browser_pool.get_page(handle) {
            if let Some(planner) = runtime.planner.as_ref() {
                match planner.plan_page(&page).await {
                    Ok(plan) => {
                        if plan.auth_wall_detected {
                            runtime.session.handle_auth_wall(&page).await?;
                            runtime.browser_pool.dispose_context(handle).await;
                            fetch_result = fetch::fetch(
                                &runtime.light_client,
                                &runtime.browser_pool,
                                &runtime.compliance,
                                &runtime.session,
                                url,
                                true,
                                None,
                            )
                            .await?;
                        } else if let Some(selector) = &plan.load_more_selector {
                            if click_load_more(&page, selector).await {
                                if let Ok(body) = page.content().await {
                                    fetch_result.body = body;
                                }
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "planner call failed, continuing without a plan"),
                }
            }
        }
    }

    // Stage 5: dispatch + extract.
    let scraper = runtime.scraper_factory.dispatch(url);
    let mut raw = scraper.extract(&fetch_result.body, url)?;

    // Stage 6: validate, with exactly one retry on a non-empty hint.
    let page_for_probe = fetch_result.page_handle.and_then(|h| runtime.browser_pool.get_page(h));
    let probe: Option<Box<dyn DomProbe>> = page_for_probe.clone().map(|p| Box::new(PageDomProbe(p)) as Box<dyn DomProbe>);
    let report = validator::validate(&raw, &fetch_result.body, probe.as_deref()).await;

    if !report.valid {
        if let Some(hint) = report.retry_hint {
            warn!(?hint, confidence = report.confidence, "validator rejected first pass, retrying once");
            let options = altered_fetch_options(hint);

            if matches!(hint, crate::types::RetryHint::ReAuthenticate) {
                if let Some(page) = page_for_probe.as_ref() {
                    runtime.session.handle_auth_wall(page).await?;
                }
            }
            if let Some(handle) = fetch_result.page_handle {
                runtime.browser_pool.dispose_context(handle).await;
            }

            let retried = fetch::fetch(
                &runtime.light_client,
                &runtime.browser_pool,
                &runtime.compliance,
                &runtime.session,
                url,
                options.force_browser,
                options.extra_settle,
            )
            .await;

            match retried {
                Ok(retried_result) => {
                    fetch_result = retried_result;
                    raw = scraper.extract(&fetch_result.body, url)?;
                }
                Err(e) => {
                    warn!(error = %e, "retry fetch failed, proceeding with first-pass data");
                }
            }
        } else {
            warn!(confidence = report.confidence, "validator rejected with no retry hint, proceeding anyway");
        }
    }

    // Stage 7: trap content check — warning only.
    let content_check = runtime
        .trap_detector
        .check_content(url, &fetch_result.body, raw.classes.len());
    if !content_check.safe {
        warn!(reason = ?content_check.reason, "trap content check flagged this page");
    }

    if let Some(handle) = fetch_result.page_handle {
        runtime.browser_pool.dispose_context(handle).await;
    }

    // Stages 8-9: normalize, then persist org -> locations -> classes.
    persist(runtime, raw, gym_timezone).await
}

async fn click_load_more(page: &chromiumoxide::page::Page, selector: &str) -> bool {
    let Ok(el) = page.find_element(selector).await else {
        return false;
    };
    if el.click().await.is_err() {
        return false;
    }
    tokio::time::sleep(Duration::from_millis(500)).await;
    true
}

async fn persist(runtime: &Runtime, raw: ScrapeResult, gym_timezone: Tz) -> Result<RunOutcome, ScrapeError> {
    let org_ref = runtime
        .sink
        .upsert_organization(&raw.organization)
        .await
        .map_err(|e| ScrapeError::PersistFailed(e.to_string()))?;

    let mut location_rows = location_rows(&raw.locations, gym_timezone);
    if !location_rows.iter().any(|r| r.name == DEFAULT_LOCATION_NAME) {
        location_rows.push(LocationRow {
            name: DEFAULT_LOCATION_NAME.to_string(),
            address: None,
            iana_timezone: gym_timezone.to_string(),
        });
    }

    let location_map = runtime
        .sink
        .upsert_locations(&org_ref, &location_rows)
        .await
        .map_err(|e| ScrapeError::PersistFailed(e.to_string()))?;

    let mut classes = Vec::with_capacity(raw.classes.len());
    for class in &raw.classes {
        let tz = tz_for_location(&raw.locations, &class.location_ref, gym_timezone);
        match normalize_class(class, tz) {
            Ok(normalized) => classes.push(normalized_with_ref(normalized, class, &raw.locations, &location_map)),
            Err(e) => warn!(class = %class.name, error = %e, "skipping class with unnormalizable start time"),
        }
    }

    let classes_upserted = runtime
        .sink
        .upsert_classes(&classes)
        .await
        .map_err(|e| ScrapeError::PersistFailed(e.to_string()))?;

    Ok(RunOutcome {
        organization_ref: org_ref,
        location_refs: location_map.values().cloned().collect(),
        classes_upserted,
    })
}

fn location_rows(locations: &[Location], gym_timezone: Tz) -> Vec<LocationRow> {
    locations
        .iter()
        .map(|loc| LocationRow {
            name: loc.name.clone(),
            address: loc.address.clone(),
            iana_timezone: if loc.iana_timezone.trim().is_empty() {
                gym_timezone.to_string()
            } else {
                loc.iana_timezone.clone()
            },
        })
        .collect()
}

fn tz_for_location(locations: &[Location], location_name: &str, gym_timezone: Tz) -> Tz {
    locations
        .iter()
        .find(|l| l.name == location_name)
        .and_then(|l| l.iana_timezone.parse::<Tz>().ok())
        .unwrap_or(gym_timezone)
}

struct NormalizedTimes {
    start: chrono::DateTime<chrono::Utc>,
    end: Option<chrono::DateTime<chrono::Utc>>,
}

fn normalize_class(raw: &RawClass, tz: Tz) -> Result<NormalizedTimes, ScrapeError> {
    let start = crate::normalizer::normalize(&raw.start_local, tz, None)?;
    if let Some(warning) = &start.warning {
        warn!(class = %raw.name, %warning, "start time normalized with a warning");
    }
    let end = raw.end_local.as_ref().and_then(|end_local| {
        crate::normalizer::normalize(end_local, tz, Some(start.instant))
            .map_err(|e| warn!(error = %e, "end time did not normalize, leaving unset"))
            .ok()
    });
    Ok(NormalizedTimes {
        start: start.instant,
        end: end.map(|o| o.instant),
    })
}

fn normalized_with_ref(
    times: NormalizedTimes,
    raw: &RawClass,
    locations: &[Location],
    location_map: &std::collections::HashMap<String, String>,
) -> Class {
    let location_ref = locations
        .iter()
        .find(|l| l.name == raw.location_ref)
        .and_then(|l| location_map.get(&l.name))
        .or_else(|| location_map.get(DEFAULT_LOCATION_NAME))
        .cloned()
        .unwrap_or_default();

    Class {
        location_ref,
        name: raw.name.clone(),
        start_instant_utc: times.start,
        end_instant_utc: times.end,
        instructor: raw.instructor.clone(),
        spots_total: raw.spots_total,
    }
}

/// Wraps a live [`chromiumoxide::page::Page`] to satisfy [`DomProbe`] with
/// real DOM queries, rather than the fakes tests use.
struct PageDomProbe(chromiumoxide::page::Page);

#[async_trait]
impl DomProbe for PageDomProbe {
    async fn has_password_input(&self) -> bool {
        crate::session::has_password_input(&self.0).await
    }

    async fn has_enabled_pagination_control(&self) -> bool {
        const SCRIPT: &str = r#"(() => {
            const els = Array.from(document.querySelectorAll('button, a, [role="button"]'));
            return els
                .filter(el => !el.disabled)
                .map(el => [el.innerText, el.getAttribute('aria-label'), el.getAttribute('title')]
                    .filter(Boolean).join(' '))
                .join(' | ');
        })()"#;
        let Ok(result) = self.0.evaluate(SCRIPT).await else {
            return false;
        };
        let Ok(text) = result.into_value::<String>() else {
            return false;
        };
        validator::is_pagination_text(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Organization;
    use std::sync::Arc;

    #[test]
    fn location_rows_fall_back_to_gym_timezone_when_blank() {
        let locations = vec![Location {
            organization_ref: String::new(),
            name: "Main".into(),
            address: None,
            iana_timezone: String::new(),
        }];
        let rows = location_rows(&locations, chrono_tz::America::Denver);
        assert_eq!(rows[0].iana_timezone, "America/Denver");
    }

    #[test]
    fn tz_for_location_falls_back_when_unparseable() {
        let locations = vec![Location {
            organization_ref: String::new(),
            name: "Main".into(),
            address: None,
            iana_timezone: "not-a-zone".into(),
        }];
        let tz = tz_for_location(&locations, "Main", chrono_tz::UTC);
        assert_eq!(tz, chrono_tz::UTC);
    }

    #[test]
    fn tz_for_location_uses_the_matching_locations_own_zone() {
        let locations = vec![Location {
            organization_ref: String::new(),
            name: "Main".into(),
            address: None,
            iana_timezone: "America/Chicago".into(),
        }];
        let tz = tz_for_location(&locations, "Main", chrono_tz::UTC);
        assert_eq!(tz, chrono_tz::America::Chicago);
    }

    #[test]
    fn normalized_with_ref_attaches_default_location_for_orphan_classes() {
        let locations = vec![Location {
            organization_ref: String::new(),
            name: "Main".into(),
            address: None,
            iana_timezone: "UTC".into(),
        }];
        let mut location_map = std::collections::HashMap::new();
        location_map.insert(DEFAULT_LOCATION_NAME.to_string(), "ref-default".to_string());

        let raw = RawClass {
            location_ref: "Unknown Location".into(),
            name: "Yoga".into(),
            start_local: "Mon 6:00 PM".into(),
            end_local: None,
            instructor: None,
            spots_total: None,
        };
        let times = NormalizedTimes {
            start: chrono::Utc::now(),
            end: None,
        };
        let class = normalized_with_ref(times, &raw, &locations, &location_map);
        assert_eq!(class.location_ref, "ref-default");
    }

    #[tokio::test]
    async fn persist_attaches_default_location_and_upserts_in_order() {
        use crate::sink::{InMemorySink, UpsertSink};

        let sink = Arc::new(InMemorySink::new());
        let raw = ScrapeResult {
            organization: Organization {
                name: "Gym".into(),
                website_url: "https://gym.test".into(),
            },
            locations: vec![],
            classes: vec![RawClass {
                location_ref: "Unknown".into(),
                name: "Yoga".into(),
                start_local: "Mon 6:00 PM".into(),
                end_local: None,
                instructor: None,
                spots_total: None,
            }],
        };

        let org_ref = sink.upsert_organization(&raw.organization).await.unwrap();
        let mut rows = location_rows(&raw.locations, chrono_tz::UTC);
        rows.push(LocationRow {
            name: DEFAULT_LOCATION_NAME.to_string(),
            address: None,
            iana_timezone: "UTC".to_string(),
        });
        let location_map = sink.upsert_locations(&org_ref, &rows).await.unwrap();
        assert!(location_map.contains_key(DEFAULT_LOCATION_NAME));
    }
}
