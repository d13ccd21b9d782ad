//! Browser fetch path: borrow a page, navigate with
//! "networkidle" semantics, settle late-render widgets, perform a short idle
//! behavior, then capture HTML. The goto/wait/content() sequence follows the
//! teacher's `page_processor.rs::process_single_page`; the networkidle wait
//! and idle-behavior steps have no teacher counterpart (the teacher crawls
//! static-ish pages and never waited out client-side renders) and are new.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    Headers, ResourceType,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::Rng;
use tracing::warn;

use crate::browser_pool::{BrowserPool, PagePool};
use crate::error::ScrapeError;
use crate::session::SessionManager;
use crate::types::{FetchMethod, FetchResult};

const NETWORK_IDLE_QUIET: Duration = Duration::from_millis(500);
const NETWORK_IDLE_MAX_INFLIGHT: i64 = 2;
const NAVIGATION_HARD_TIMEOUT: Duration = Duration::from_secs(30);
const LATE_RENDER_SETTLE: Duration = Duration::from_secs(1);

/// Navigate to `url` in a fresh page and capture its HTML once the network
/// has gone idle. `extra_settle`, when present, is slept after the idle wait
/// (the orchestrator's `wait-longer` retry hint).
pub async fn fetch(
    pool: &BrowserPool,
    session: &SessionManager,
    url: &str,
    extra_settle: Option<Duration>,
) -> Result<FetchResult, ScrapeError> {
    let page = pool
        .borrow_page()
        .await
        .map_err(|e| ScrapeError::FetchTransport(e.to_string()))?;

    if let Err(e) = crate::browser_setup::apply_stealth_measures(&page).await {
        warn!(error = %e, "failed to apply stealth measures, continuing unshimmed");
    }

    let last_document_response = Arc::new(parking_lot::Mutex::new((200_u16, None::<String>)));
    wait_for_load(&page, url, Arc::clone(&last_document_response)).await?;

    // Feed the main document's last observed status/Location into the
    // session manager's login-redirect check (§4.4), the same signal the
    // light path derives straight from its `reqwest::Response`.
    let (status_code, location_header) = last_document_response.lock().clone();
    session.observe_response(status_code, location_header.as_deref());

    // Post-load probe (§4.4): closes the session gate immediately if the
    // page itself is a login wall, ahead of the validator's own check.
    session.check_for_login_wall(&page).await;

    tokio::time::sleep(LATE_RENDER_SETTLE).await;
    if let Some(extra) = extra_settle {
        tokio::time::sleep(extra).await;
    }

    perform_idle_behavior(&page).await;

    let body = page
        .content()
        .await
        .map_err(|e| ScrapeError::FetchTransport(e.to_string()))?;

    let handle = pool.register_page(page);

    Ok(FetchResult {
        body,
        status_code,
        method: FetchMethod::Browser,
        page_handle: Some(handle),
        context_handle: Some(handle),
        location_header,
    })
}

async fn wait_for_load(
    page: &Page,
    url: &str,
    last_document_response: Arc<parking_lot::Mutex<(u16, Option<String>)>>,
) -> Result<(), ScrapeError> {
    let inflight = Arc::new(AtomicI64::new(0));

    spawn_counter::<EventRequestWillBeSent, _>(page, Arc::clone(&inflight), |c| {
        c.fetch_add(1, Ordering::Relaxed);
    })
    .await?;
    spawn_counter::<EventLoadingFinished, _>(page, Arc::clone(&inflight), |c| {
        c.fetch_sub(1, Ordering::Relaxed);
    })
    .await?;
    spawn_counter::<EventLoadingFailed, _>(page, Arc::clone(&inflight), |c| {
        c.fetch_sub(1, Ordering::Relaxed);
    })
    .await?;
    spawn_response_listener(page, last_document_response).await?;

    page.goto(url)
        .await
        .map_err(|e| ScrapeError::FetchTransport(e.to_string()))?;

    tokio::time::timeout(NAVIGATION_HARD_TIMEOUT, wait_for_network_idle(&inflight))
        .await
        .map_err(|_| {
            ScrapeError::FetchTransport(format!("{url}: navigation did not settle within 30s"))
        })
}

/// Attach a `Network.responseReceived` listener that records the most
/// recent main-document response's status and `Location` header. Spec §4.4
/// requires this on "every created page", not just the light path's plain
/// HTTP response.
async fn spawn_response_listener(
    page: &Page,
    last_document_response: Arc<parking_lot::Mutex<(u16, Option<String>)>>,
) -> Result<(), ScrapeError> {
    let mut stream = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(|e| ScrapeError::FetchTransport(e.to_string()))?;
    tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            if event.r#type != ResourceType::Document {
                continue;
            }
            let status = u16::try_from(event.response.status).unwrap_or(200);
            let location = location_header(&event.response.headers);
            *last_document_response.lock() = (status, location);
        }
    });
    Ok(())
}

/// Case-insensitive `Location` header lookup in a CDP `Headers` object
/// (`{"location": "...", ...}`), following the teacher's own
/// `extract_etag_from_headers` idiom for reading CDP response headers.
fn location_header(headers: &Headers) -> Option<String> {
    location_header_from_value(headers.inner())
}

fn location_header_from_value(value: &serde_json::Value) -> Option<String> {
    let obj = value.as_object()?;
    obj.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("location"))
        .and_then(|(_, v)| v.as_str())
        .map(str::to_string)
}

async fn spawn_counter<E, F>(
    page: &Page,
    counter: Arc<AtomicI64>,
    apply: F,
) -> Result<(), ScrapeError>
where
    E: serde::de::DeserializeOwned + Send + Sync + 'static + chromiumoxide::cdp::IntoEventKind,
    F: Fn(&AtomicI64) + Send + 'static,
{
    let mut stream = page
        .event_listener::<E>()
        .await
        .map_err(|e| ScrapeError::FetchTransport(e.to_string()))?;
    tokio::spawn(async move {
        while stream.next().await.is_some() {
            apply(&counter);
        }
    });
    Ok(())
}

async fn wait_for_network_idle(inflight: &AtomicI64) {
    loop {
        if inflight.load(Ordering::Relaxed) <= NETWORK_IDLE_MAX_INFLIGHT {
            let quiet_since = Instant::now();
            loop {
                tokio::time::sleep(Duration::from_millis(50)).await;
                if inflight.load(Ordering::Relaxed) > NETWORK_IDLE_MAX_INFLIGHT {
                    break;
                }
                if quiet_since.elapsed() >= NETWORK_IDLE_QUIET {
                    return;
                }
            }
        } else {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// 2-4 cursor drifts, an optional gentle scroll, then a 0.5-1.5s pause.
async fn perform_idle_behavior(page: &Page) {
    let mut rng = rand::rng();
    let drift_count = rng.random_range(2..=4);

    for _ in 0..drift_count {
        let x = rng.random_range(0..1920);
        let y = rng.random_range(0..1080);
        let js = format!(
            "window.dispatchEvent(new MouseEvent('mousemove', {{clientX: {x}, clientY: {y}}}));"
        );
        let _ = page.evaluate(js.as_str()).await;
        tokio::time::sleep(Duration::from_millis(rng.random_range(80..220))).await;
    }

    if rng.random_bool(0.5) {
        let amount = rng.random_range(100..400);
        let _ = page.evaluate(format!("window.scrollBy(0, {amount});").as_str()).await;
    }

    let pause_ms = rng.random_range(500..1500);
    tokio::time::sleep(Duration::from_millis(pause_ms)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn location_header_matches_case_insensitively() {
        let value = json!({"Content-Type": "text/html", "Location": "/login"});
        assert_eq!(location_header_from_value(&value).as_deref(), Some("/login"));
    }

    #[test]
    fn location_header_absent_returns_none() {
        let value = json!({"content-type": "text/html"});
        assert_eq!(location_header_from_value(&value), None);
    }
}
