//! Process-wide `Runtime`: owns every shared collaborator and is
//! dependency-injected into the orchestrator per run, rather than accessed
//! as ambient globals (spec §9's "explicit ownership" note). One `Runtime`
//! is constructed per process and reused across however many URL runs
//! overlap (spec §5: independent URL runs may run concurrently against the
//! same `Runtime`).

use std::sync::Arc;
use std::time::Duration;

use crate::browser_pool::BrowserPool;
use crate::compliance::ComplianceGate;
use crate::config::Config;
use crate::error::ScrapeError;
use crate::extract::{GenericScraper, ScraperFactory};
use crate::fetch;
use crate::planner::Planner;
use crate::session::{LoginCredentials, SessionManager};
use crate::sink::UpsertSink;
use crate::trap_detector::TrapDetector;

/// Everything the orchestrator needs, built once from [`Config`].
pub struct Runtime {
    pub config: Config,
    pub light_client: reqwest::Client,
    pub browser_pool: Arc<BrowserPool>,
    pub compliance: ComplianceGate,
    pub trap_detector: TrapDetector,
    pub session: SessionManager,
    pub planner: Option<Arc<dyn Planner>>,
    pub sink: Arc<dyn UpsertSink>,
    pub scraper_factory: ScraperFactory,
}

impl Runtime {
    /// Build the runtime. `scraper_factory` defaults to just the generic
    /// fallback when `None`; callers register site-specific scrapers ahead
    /// of time via [`ScraperFactory::register`].
    ///
    /// # Errors
    /// Propagates [`ScrapeError::FetchTransport`] if the light-fetch
    /// client fails to build (invalid default headers, TLS backend
    /// misconfiguration).
    pub fn new(
        config: Config,
        sink: Arc<dyn UpsertSink>,
        planner: Option<Arc<dyn Planner>>,
        scraper_factory: Option<ScraperFactory>,
    ) -> Result<Self, ScrapeError> {
        let light_client = fetch::build_client()?;

        // The robots-lookup client identifies itself transparently with
        // `BOT_USER_AGENT` (spec §6) — unlike the light-fetch client, which
        // impersonates a desktop browser for anti-bot evasion (§4.3). Using
        // the transparent UA here keeps robots.txt honoring honest even
        // though the content-fetch path itself is adversarial.
        let robots_client = reqwest::Client::builder()
            .user_agent(config.bot_user_agent.clone())
            .build()
            .map_err(|e| ScrapeError::FetchTransport(e.to_string()))?;

        let browser_pool = BrowserPool::new(true);
        let compliance = ComplianceGate::new(robots_client, config.bot_user_agent.clone(), config.rate_limit);
        let trap_detector = TrapDetector::new(config.max_crawl_depth);

        let credentials = if config.credentials_configured() {
            Some(LoginCredentials {
                username: config.gym_username.clone().expect("checked by credentials_configured"),
                password: config.gym_password.clone().expect("checked by credentials_configured"),
                totp_secret: config.gym_totp_secret.clone(),
            })
        } else {
            None
        };
        let session = SessionManager::new(credentials, config.cookie_path.clone(), config.cookie_ttl);

        Ok(Self {
            config,
            light_client,
            browser_pool,
            compliance,
            trap_detector,
            session,
            planner,
            sink,
            scraper_factory: scraper_factory
                .unwrap_or_else(|| ScraperFactory::new(Arc::new(GenericScraper))),
        })
    }

    /// Robots-compliant page-level rate limit currently configured
    /// (`RATE_LIMIT_MS`), exposed for callers composing their own fetch
    /// calls outside the orchestrator (e.g. ad-hoc diagnostics).
    #[must_use]
    pub fn page_rate_limit(&self) -> Duration {
        self.config.rate_limit
    }

    /// Tear down the browser engine. Call on process shutdown; safe to
    /// call even if the engine was never started.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.browser_pool.shutdown().await
    }
}
