//! Process-wide configuration.
//!
//! Loaded once per process and frozen. Unlike the
//! teacher's `CrawlConfig` (dozens of optional content-pipeline knobs), this
//! config has exactly two required fields and a handful of tunables with
//! spec-mandated defaults, so a typestate builder buys nothing here — a
//! single `from_env` constructor plus a plain setter-style builder (for
//! tests) covers it, same spirit as `CrawlConfig::builder()` minus the
//! compile-time-required-field machinery.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ScrapeError;

/// Frozen process configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upsert sink endpoint (`SUPABASE_URL`). Required.
    pub supabase_url: String,
    /// Upsert sink credential (`SUPABASE_SERVICE_ROLE_KEY`). Required.
    pub supabase_service_role_key: String,
    /// Transparent UA for the light path and robots lookups (`BOT_USER_AGENT`).
    pub bot_user_agent: String,
    /// Page-limiter minimum interval (`RATE_LIMIT_MS`).
    pub rate_limit: Duration,
    /// Enables the LLM planner when present (`OPENAI_API_KEY`).
    pub openai_api_key: Option<String>,
    /// Cumulative planner spend cap in cents (`LLM_BUDGET_CENTS`).
    pub llm_budget_cents: u32,
    /// Login credentials (`GYM_USERNAME`/`GYM_PASSWORD`).
    pub gym_username: Option<String>,
    pub gym_password: Option<String>,
    /// Base32 TOTP seed (`GYM_TOTP_SECRET`).
    pub gym_totp_secret: Option<String>,
    /// Persisted-cookie freshness window (`COOKIE_TTL_HOURS`).
    pub cookie_ttl: Duration,
    /// Trap detector depth threshold (`MAX_CRAWL_DEPTH`).
    pub max_crawl_depth: u8,
    /// Where the cookie store is persisted. Not environment-configurable;
    /// fixed at `.cookies.json`, exposed here for test isolation.
    pub cookie_path: PathBuf,
}

impl Config {
    /// Default transparent UA (the default for `BOT_USER_AGENT`).
    pub const DEFAULT_USER_AGENT: &'static str = "MilesC-GymBot/1.0 (+url)";
    pub const DEFAULT_RATE_LIMIT_MS: u64 = 2000;
    pub const DEFAULT_LLM_BUDGET_CENTS: u32 = 50;
    pub const DEFAULT_COOKIE_TTL_HOURS: u64 = 24;
    pub const DEFAULT_MAX_CRAWL_DEPTH: u8 = 5;

    /// Load configuration from the process environment, applying spec
    /// defaults for everything optional.
    ///
    /// # Errors
    /// Returns [`ScrapeError::ConfigMissing`] if `SUPABASE_URL` or
    /// `SUPABASE_SERVICE_ROLE_KEY` are absent.
    pub fn from_env() -> Result<Self, ScrapeError> {
        let supabase_url = std::env::var("SUPABASE_URL")
            .map_err(|_| ScrapeError::ConfigMissing("SUPABASE_URL".into()))?;
        let supabase_service_role_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .map_err(|_| ScrapeError::ConfigMissing("SUPABASE_SERVICE_ROLE_KEY".into()))?;

        let bot_user_agent = std::env::var("BOT_USER_AGENT")
            .unwrap_or_else(|_| Self::DEFAULT_USER_AGENT.to_string());

        let rate_limit_ms = env_parsed("RATE_LIMIT_MS", Self::DEFAULT_RATE_LIMIT_MS);
        let llm_budget_cents = env_parsed("LLM_BUDGET_CENTS", Self::DEFAULT_LLM_BUDGET_CENTS);
        let cookie_ttl_hours = env_parsed("COOKIE_TTL_HOURS", Self::DEFAULT_COOKIE_TTL_HOURS);
        let max_crawl_depth = env_parsed("MAX_CRAWL_DEPTH", Self::DEFAULT_MAX_CRAWL_DEPTH);

        Ok(Self {
            supabase_url,
            supabase_service_role_key,
            bot_user_agent,
            rate_limit: Duration::from_millis(rate_limit_ms),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            llm_budget_cents,
            gym_username: std::env::var("GYM_USERNAME").ok(),
            gym_password: std::env::var("GYM_PASSWORD").ok(),
            gym_totp_secret: std::env::var("GYM_TOTP_SECRET").ok(),
            cookie_ttl: Duration::from_secs(cookie_ttl_hours * 3600),
            max_crawl_depth,
            cookie_path: crate::types::default_cookie_path(),
        })
    }

    /// Whether the LLM planner collaborator should be constructed at all.
    #[must_use]
    pub fn planner_enabled(&self) -> bool {
        self.openai_api_key.is_some()
    }

    /// Whether login credentials are present for the session manager.
    #[must_use]
    pub fn credentials_configured(&self) -> bool {
        self.gym_username.is_some() && self.gym_password.is_some()
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
/// Test-only builder: avoids touching real process environment variables.
pub struct ConfigBuilder {
    cfg: Config,
}

#[cfg(test)]
impl ConfigBuilder {
    #[must_use]
    pub fn new(supabase_url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            cfg: Config {
                supabase_url: supabase_url.into(),
                supabase_service_role_key: key.into(),
                bot_user_agent: Config::DEFAULT_USER_AGENT.to_string(),
                rate_limit: Duration::from_millis(Config::DEFAULT_RATE_LIMIT_MS),
                openai_api_key: None,
                llm_budget_cents: Config::DEFAULT_LLM_BUDGET_CENTS,
                gym_username: None,
                gym_password: None,
                gym_totp_secret: None,
                cookie_ttl: Duration::from_secs(Config::DEFAULT_COOKIE_TTL_HOURS * 3600),
                max_crawl_depth: Config::DEFAULT_MAX_CRAWL_DEPTH,
                cookie_path: crate::types::default_cookie_path(),
            },
        }
    }

    #[must_use]
    pub fn cookie_path(mut self, path: PathBuf) -> Self {
        self.cfg.cookie_path = path;
        self
    }

    #[must_use]
    pub fn max_crawl_depth(mut self, depth: u8) -> Self {
        self.cfg.max_crawl_depth = depth;
        self
    }

    #[must_use]
    pub fn totp_secret(mut self, secret: impl Into<String>) -> Self {
        self.cfg.gym_totp_secret = Some(secret.into());
        self
    }

    #[must_use]
    pub fn build(self) -> Config {
        self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_defaults() {
        let cfg = ConfigBuilder::new("https://x.supabase.co", "key").build();
        assert_eq!(cfg.bot_user_agent, Config::DEFAULT_USER_AGENT);
        assert_eq!(cfg.max_crawl_depth, 5);
        assert!(!cfg.credentials_configured());
        assert!(!cfg.planner_enabled());
    }
}
