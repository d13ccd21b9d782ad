//! Parallel day replay: substitute seven consecutive dates into a
//! discovered pattern and issue them concurrently through the API rate
//! limiter.
//!
//! Concurrency follows the same `FuturesUnordered` idiom the teacher's main
//! crawl loop uses for in-flight page tasks (`orchestrator.rs`); here the
//! bound comes from the API limiter's own semaphore (max concurrency 3)
//! rather than an explicit `Semaphore` at the call site, since the
//! compliance gate already owns that policy.

use chrono::{Duration as ChronoDuration, NaiveDate};
use futures::stream::{FuturesUnordered, StreamExt};

use crate::compliance::ComplianceGate;
use crate::types::{ApiMethod, DayApiPattern, DayReplayResult};

/// Generate 7 consecutive ISO-8601 dates starting at `week_start`, replay
/// `pattern` for each through the API limiter, and return all 7 results.
/// Partial success is expected and acceptable; ordering across days is not
/// guaranteed by the limiter, so results are sorted by date before return.
pub async fn fetch_week_parallel(
    client: &reqwest::Client,
    compliance: &ComplianceGate,
    pattern: &DayApiPattern,
    week_start: NaiveDate,
    cookie_header: Option<&str>,
) -> Vec<DayReplayResult> {
    let dates: Vec<String> = (0..7)
        .map(|i| (week_start + ChronoDuration::days(i)).format("%Y-%m-%d").to_string())
        .collect();

    let mut in_flight: FuturesUnordered<_> = dates
        .into_iter()
        .map(|date| replay_one(client, compliance, pattern, date, cookie_header))
        .collect();

    let mut results = Vec::with_capacity(7);
    while let Some(result) = in_flight.next().await {
        results.push(result);
    }
    results.sort_by(|a, b| a.date.cmp(&b.date));
    results
}

async fn replay_one(
    client: &reqwest::Client,
    compliance: &ComplianceGate,
    pattern: &DayApiPattern,
    date: String,
    cookie_header: Option<&str>,
) -> DayReplayResult {
    let url = pattern.url_template.replace("{{date}}", &date);
    let _permit = compliance.acquire_api_permit(&url).await;

    let mut request = match pattern.method {
        ApiMethod::Get => client.get(&url),
        ApiMethod::Post => client.post(&url),
    };
    for (name, value) in &pattern.headers {
        request = request.header(name, value);
    }
    if let Some(cookie) = cookie_header {
        request = request.header("cookie", cookie);
    }
    if let Some(body_template) = &pattern.body_template {
        request = request.body(body_template.replace("{{date}}", &date));
    }

    match request.send().await {
        Ok(response) => {
            let status_code = response.status().as_u16();
            let success = response.status().is_success();
            let body = response.text().await.ok();
            DayReplayResult {
                date,
                success,
                status_code: Some(status_code),
                body,
                error: None,
            }
        }
        Err(e) => DayReplayResult {
            date,
            success: false,
            status_code: None,
            body: None,
            error: Some(e.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::ComplianceGate;
    use std::time::Duration;

    fn gate() -> ComplianceGate {
        ComplianceGate::new(reqwest::Client::new(), "TestBot/1.0".to_string(), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn replays_seven_days_with_partial_success() {
        let mut server = mockito::Server::new_async().await;
        let _m_ok = server
            .mock("GET", mockito::Matcher::Regex(r"^/api/schedule.*".to_string()))
            .with_status(200)
            .with_body("{}")
            .expect(7)
            .create_async()
            .await;

        let pattern = DayApiPattern {
            url_template: format!("{}/api/schedule?date={{{{date}}}}", server.url()),
            method: ApiMethod::Get,
            date_param: Some("date".to_string()),
            body_template: None,
            headers: vec![],
        };

        let client = reqwest::Client::new();
        let compliance = gate();
        let week_start = NaiveDate::from_ymd_opt(2026, 2, 9).unwrap();

        let results = fetch_week_parallel(&client, &compliance, &pattern, week_start, None).await;

        assert_eq!(results.len(), 7);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(results[0].date, "2026-02-09");
        assert_eq!(results[6].date, "2026-02-15");
    }

    #[tokio::test]
    async fn reports_per_day_failures_without_aborting_the_batch() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let pattern = DayApiPattern {
            url_template: format!("{}/api/schedule?date={{{{date}}}}", server.url()),
            method: ApiMethod::Get,
            date_param: Some("date".to_string()),
            body_template: None,
            headers: vec![],
        };

        let client = reqwest::Client::new();
        let compliance = gate();
        let week_start = NaiveDate::from_ymd_opt(2026, 2, 9).unwrap();

        let results = fetch_week_parallel(&client, &compliance, &pattern, week_start, None).await;

        assert_eq!(results.len(), 7);
        assert!(results.iter().all(|r| !r.success && r.status_code == Some(500)));
    }
}
