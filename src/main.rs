//! CLI entry point: `gym-scrape <url> [iana-timezone]`.
//!
//! A thin process shell over the library — load configuration, build the
//! runtime, run the orchestrator once, map the result to an exit code. All
//! real logic lives in `gym_scrape_core`.

use std::process::ExitCode;
use std::sync::Arc;

use gym_scrape_core::browser_profile::cleanup_stale_profiles;
use gym_scrape_core::sink::InMemorySink;
use gym_scrape_core::utils::is_valid_url;
use gym_scrape_core::{Config, Runtime};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    if let Err(e) = cleanup_stale_profiles() {
        eprintln!("warning: failed to clean up stale Chrome profiles: {e}");
    }

    let args: Vec<String> = std::env::args().collect();
    let Some(url) = args.get(1) else {
        eprintln!("usage: {} <url> [iana-timezone]", args[0]);
        return ExitCode::FAILURE;
    };
    if !is_valid_url(url) {
        eprintln!("not a fetchable http(s) url: {url}");
        return ExitCode::FAILURE;
    }

    let gym_timezone = match args.get(2) {
        Some(tz) => match tz.parse::<chrono_tz::Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                eprintln!("unrecognized IANA timezone: {tz}");
                return ExitCode::FAILURE;
            }
        },
        None => chrono_tz::UTC,
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Production wiring supplies a real upsert sink backed by
    // `SUPABASE_URL`/`SUPABASE_SERVICE_ROLE_KEY`; this binary ships the
    // in-memory fake so the CLI is runnable without standing up that
    // backend. Swap `InMemorySink` for a concrete Supabase client to
    // persist for real.
    let sink = Arc::new(InMemorySink::new());

    let runtime = match Runtime::new(config, sink, None, None) {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to initialize runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    runtime.browser_pool.install_shutdown_hook();

    let result = gym_scrape_core::run(&runtime, url, gym_timezone).await;
    let _ = runtime.shutdown().await;

    match result {
        Ok(outcome) => {
            println!(
                "organization={} locations={} classes_upserted={}",
                outcome.organization_ref,
                outcome.location_refs.len(),
                outcome.classes_upserted
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("scan failed: {e}");
            ExitCode::FAILURE
        }
    }
}
