//! Pattern discovery: observe a page's own XHR/fetch traffic and derive a
//! date-parameterised request template from it.
//!
//! Listens to the CDP Network domain's `Network.requestWillBeSent`
//! notification stream rather than `Fetch` domain request interception —
//! the former is a passive event feed with no pause/continue lifecycle, so
//! there is nothing to hang on (design note §9's "must always invoke
//! `request.continue()` equivalence" concern doesn't arise here because we
//! never intercept in the blocking sense, only observe).

use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::EventRequestWillBeSent;
use chromiumoxide::page::Page;
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::Mutex;
use url::Url;

use crate::browser_pool::{BrowserPool, PagePool};
use crate::error::ScrapeError;
use crate::types::{ApiMethod, DayApiPattern};

const DISCOVERY_SETTLE: Duration = Duration::from_secs(2);

const EXCLUDED_HEADERS: &[&str] = &["host", "content-length", "transfer-encoding", "connection", "cookie"];

static ISO_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static regex"));
static US_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}$").expect("static regex"));
static EPOCH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{10,13}$").expect("static regex"));

fn looks_like_date(s: &str) -> bool {
    ISO_DATE_RE.is_match(s) || US_DATE_RE.is_match(s) || EPOCH_RE.is_match(s)
}

#[derive(Debug, Clone)]
struct CapturedRequest {
    url: String,
    method: String,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

/// Borrow a fresh page, navigate to `url`, capture its own traffic, and
/// derive zero or more date-parameterised templates from it.
pub async fn discover_patterns(pool: &BrowserPool, url: &str) -> Result<Vec<DayApiPattern>, ScrapeError> {
    let page = pool
        .borrow_page()
        .await
        .map_err(|e| ScrapeError::FetchTransport(e.to_string()))?;

    let captured = Arc::new(Mutex::new(Vec::new()));
    attach_request_capture(&page, Arc::clone(&captured)).await?;

    page.goto(url)
        .await
        .map_err(|e| ScrapeError::FetchTransport(e.to_string()))?;
    tokio::time::sleep(DISCOVERY_SETTLE).await;

    let requests = captured.lock().await.clone();
    let _ = page.close().await;

    Ok(requests
        .iter()
        .filter_map(build_pattern)
        .filter(is_well_formed)
        .collect())
}

async fn attach_request_capture(
    page: &Page,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
) -> Result<(), ScrapeError> {
    let mut stream = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(|e| ScrapeError::FetchTransport(e.to_string()))?;

    tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            let request = &event.request;
            let headers = serde_json::to_value(&request.headers)
                .ok()
                .and_then(|v| v.as_object().cloned())
                .map(|map| {
                    map.into_iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
                        .collect()
                })
                .unwrap_or_default();

            captured.lock().await.push(CapturedRequest {
                url: request.url.clone(),
                method: request.method.clone(),
                headers,
                body: request.post_data.clone(),
            });
        }
    });

    Ok(())
}

fn build_pattern(req: &CapturedRequest) -> Option<DayApiPattern> {
    let method = match req.method.to_uppercase().as_str() {
        "GET" => ApiMethod::Get,
        "POST" => ApiMethod::Post,
        _ => return None,
    };

    let headers: Vec<(String, String)> = req
        .headers
        .iter()
        .filter(|(k, _)| {
            let lower = k.to_lowercase();
            !EXCLUDED_HEADERS.contains(&lower.as_str()) && !lower.starts_with("sec-fetch-")
        })
        .cloned()
        .collect();

    if let Some((url_template, date_param)) = template_from_url(&req.url) {
        return Some(DayApiPattern {
            url_template,
            method,
            date_param: Some(date_param),
            body_template: None,
            headers,
        });
    }

    if let Some(body) = &req.body {
        if let Some(body_template) = template_from_body(body) {
            return Some(DayApiPattern {
                url_template: req.url.clone(),
                method,
                date_param: None,
                body_template: Some(body_template),
                headers,
            });
        }
    }

    None
}

/// Find a query parameter whose value looks like a date and substitute
/// `{{date}}` for it, preserving the rest of the URL verbatim.
fn template_from_url(raw_url: &str) -> Option<(String, String)> {
    let parsed = Url::parse(raw_url).ok()?;
    for (key, value) in parsed.query_pairs() {
        if looks_like_date(&value) {
            let needle = format!("{key}={value}");
            if raw_url.contains(&needle) {
                let template = raw_url.replacen(&needle, &format!("{key}={{{{date}}}}"), 1);
                return Some((template, key.into_owned()));
            }
        }
    }
    None
}

/// Walk a JSON body depth-first and substitute `{{date}}` for the first
/// string value matching a recognized date shape.
fn template_from_body(body: &str) -> Option<String> {
    let mut value: serde_json::Value = serde_json::from_str(body).ok()?;
    let mut replaced = false;
    substitute_first_date(&mut value, &mut replaced);
    replaced.then(|| value.to_string())
}

fn substitute_first_date(value: &mut serde_json::Value, replaced: &mut bool) {
    if *replaced {
        return;
    }
    match value {
        serde_json::Value::String(s) if looks_like_date(s) => {
            *s = "{{date}}".to_string();
            *replaced = true;
        }
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                substitute_first_date(item, replaced);
                if *replaced {
                    break;
                }
            }
        }
        serde_json::Value::Object(map) => {
            for v in map.values_mut() {
                substitute_first_date(v, replaced);
                if *replaced {
                    break;
                }
            }
        }
        _ => {}
    }
}

/// A `{{date}}` placeholder that can't substitute into a well-formed
/// request is discarded (spec invariant 5). Applied as the final filter in
/// [`discover_patterns`], not just documented as an invariant.
#[must_use]
pub fn is_well_formed(pattern: &DayApiPattern) -> bool {
    let url = pattern.url_template.replace("{{date}}", "2026-02-09");
    Url::parse(&url).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_iso_date_query_param() {
        let (template, param) =
            template_from_url("https://x.test/api/schedule?date=2026-02-09&loc=1").unwrap();
        assert_eq!(template, "https://x.test/api/schedule?date={{date}}&loc=1");
        assert_eq!(param, "date");
    }

    #[test]
    fn templates_us_date_query_param() {
        let (template, _) = template_from_url("https://x.test/api?d=02/09/2026").unwrap();
        assert!(template.contains("{{date}}"));
    }

    #[test]
    fn no_date_param_returns_none() {
        assert!(template_from_url("https://x.test/api?loc=1").is_none());
    }

    #[test]
    fn templates_json_body_date_field() {
        let body = r#"{"filters":{"date":"2026-02-09","locationId":7}}"#;
        let templated = template_from_body(body).unwrap();
        assert!(templated.contains("{{date}}"));
        assert!(!templated.contains("2026-02-09"));
    }

    #[test]
    fn discards_patterns_that_would_not_substitute_cleanly() {
        let pattern = DayApiPattern {
            url_template: "not a url {{date}}".to_string(),
            method: ApiMethod::Get,
            date_param: Some("date".to_string()),
            body_template: None,
            headers: vec![],
        };
        assert!(!is_well_formed(&pattern));
    }

    #[test]
    fn well_formed_pattern_passes() {
        let pattern = DayApiPattern {
            url_template: "https://x.test/api/schedule?date={{date}}".to_string(),
            method: ApiMethod::Get,
            date_param: Some("date".to_string()),
            body_template: None,
            headers: vec![],
        };
        assert!(is_well_formed(&pattern));
    }
}
