//! End-to-end scenarios driven through `gym_scrape_core::run`, exercising
//! wiring the unit tests can't: a full `Runtime` against a mock HTTP server,
//! wired to an `InMemorySink`. Scenarios that require a live browser (SPA
//! shell fallback, auth-wall retry, trap-loop detection, day-worker replay)
//! are covered by the per-module unit tests instead — standing up real
//! Chrome isn't something these tests can depend on.

use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;

use gym_scrape_core::sink::InMemorySink;
use gym_scrape_core::types::default_cookie_path;
use gym_scrape_core::{Config, Runtime};

fn config() -> Config {
    Config {
        supabase_url: "https://x.supabase.co".to_string(),
        supabase_service_role_key: "test-key".to_string(),
        bot_user_agent: Config::DEFAULT_USER_AGENT.to_string(),
        rate_limit: Duration::from_millis(0),
        openai_api_key: None,
        llm_budget_cents: Config::DEFAULT_LLM_BUDGET_CENTS,
        gym_username: None,
        gym_password: None,
        gym_totp_secret: None,
        cookie_ttl: Duration::from_secs(Config::DEFAULT_COOKIE_TTL_HOURS * 3600),
        max_crawl_depth: Config::DEFAULT_MAX_CRAWL_DEPTH,
        cookie_path: default_cookie_path(),
    }
}

#[tokio::test]
async fn happy_path_static_html_is_fetched_extracted_and_persisted() {
    let mut server = mockito::Server::new_async().await;
    let body = "\
        <html><body>\n\
        Monday 6:00 PM Yoga\n\
        Tuesday 7:00 AM Spin\n\
        Wednesday 8:00 AM Pilates\n\
        </body></html>";
    let mock = server
        .mock("GET", "/schedule")
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let url = format!("{}/schedule", server.url());
    let sink = Arc::new(InMemorySink::new());
    let runtime = Runtime::new(config(), sink.clone(), None, None).expect("runtime builds");

    let gym_timezone: Tz = "America/New_York".parse().unwrap();
    let outcome = gym_scrape_core::run(&runtime, &url, gym_timezone)
        .await
        .expect("run succeeds on a well-formed static schedule page");

    mock.assert_async().await;
    assert_eq!(outcome.classes_upserted, 3);
    assert_eq!(sink.class_count(), 3);
    assert!(!outcome.organization_ref.is_empty());
    assert_eq!(outcome.location_refs.len(), 1);
}

#[tokio::test]
async fn paywall_response_aborts_before_any_upsert() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/paid")
        .with_status(402)
        .with_body("subscribe to view this schedule")
        .create_async()
        .await;

    let url = format!("{}/paid", server.url());
    let sink = Arc::new(InMemorySink::new());
    let runtime = Runtime::new(config(), sink.clone(), None, None).expect("runtime builds");

    let err = gym_scrape_core::run(&runtime, &url, chrono_tz::UTC)
        .await
        .expect_err("a 402 response is fatal, not retried");

    mock.assert_async().await;
    assert!(matches!(err, gym_scrape_core::ScrapeError::Paywall(_)));
    assert_eq!(sink.class_count(), 0);
}
