//! Compliance gate: robots policy + per-domain rate limiting.

mod rate_limiter;
mod robots;

pub use rate_limiter::{DomainPermit, LimiterPolicy, RateLimiterPool};
pub use robots::{is_auth_wall, is_paywall, RobotsCache};

use std::time::Duration;

use url::Url;

/// The single compliance collaborator the orchestrator and day-worker pool
/// go through before issuing any request.
pub struct ComplianceGate {
    robots: RobotsCache,
    page_limiters: RateLimiterPool,
    api_limiters: RateLimiterPool,
}

impl ComplianceGate {
    #[must_use]
    pub fn new(client: reqwest::Client, user_agent: String, page_rate_limit: Duration) -> Self {
        Self {
            robots: RobotsCache::new(client, user_agent),
            page_limiters: RateLimiterPool::new(move || LimiterPolicy::page(page_rate_limit)),
            api_limiters: RateLimiterPool::new(LimiterPolicy::api),
        }
    }

    pub async fn is_allowed(&self, url: &str) -> bool {
        self.robots.is_allowed(url).await
    }

    /// Wait for this URL's host's turn on the page-fetch limiter.
    pub async fn acquire_page_permit(&self, url: &str) -> DomainPermit {
        let host = host_of(url);
        self.page_limiters.acquire(&host).await
    }

    /// Wait for this URL's host's turn on the day-worker API limiter.
    pub async fn acquire_api_permit(&self, url: &str) -> DomainPermit {
        let host = host_of(url);
        self.api_limiters.acquire(&host).await
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}
