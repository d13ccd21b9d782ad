//! Per-host robots.txt cache (RFC 9309).
//!
//! Fetched at most once per host with a 5s timeout; any fetch failure or
//! 4xx/5xx response is treated as unrestricted rather than blocking the run.
//! A concurrent duplicate fetch on first contact for a host is possible and
//! harmless (both callers just parse the same bytes).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use texting_robots::Robot;
use url::Url;

const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RobotsCache {
    client: reqwest::Client,
    user_agent: String,
    cache: DashMap<String, Arc<Option<Robot>>>,
}

impl RobotsCache {
    #[must_use]
    pub fn new(client: reqwest::Client, user_agent: String) -> Self {
        Self {
            client,
            user_agent,
            cache: DashMap::new(),
        }
    }

    /// Whether `url` may be fetched under the cached policy for its host.
    pub async fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let origin = format!("{}://{}", parsed.scheme(), host);

        if let Some(entry) = self.cache.get(&origin) {
            return Self::check(entry.value(), url);
        }

        let robot = self.fetch(&origin).await;
        let allowed = Self::check(&robot, url);
        self.cache.insert(origin, Arc::new(robot));
        allowed
    }

    fn check(robot: &Option<Robot>, url: &str) -> bool {
        robot.as_ref().is_none_or(|r| r.allowed(url))
    }

    async fn fetch(&self, origin: &str) -> Option<Robot> {
        let robots_url = format!("{origin}/robots.txt");
        let response = tokio::time::timeout(
            ROBOTS_FETCH_TIMEOUT,
            self.client.get(&robots_url).send(),
        )
        .await
        .ok()?
        .ok()?;

        if !response.status().is_success() {
            return None;
        }

        let bytes = response.bytes().await.ok()?;
        Robot::new(&self.user_agent, &bytes).ok()
    }
}

/// Status-code classifiers used directly by the fetch decision rule.
#[must_use]
pub const fn is_paywall(status: u16) -> bool {
    status == 402
}

#[must_use]
pub const fn is_auth_wall(status: u16) -> bool {
    status == 401 || status == 403
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classifiers() {
        assert!(is_paywall(402));
        assert!(!is_paywall(200));
        assert!(is_auth_wall(401));
        assert!(is_auth_wall(403));
        assert!(!is_auth_wall(404));
    }

    #[test]
    fn missing_policy_is_unrestricted() {
        assert!(RobotsCache::check(&None, "https://x.test/anything"));
    }
}
