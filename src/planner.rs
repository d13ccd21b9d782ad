//! LLM navigation planner (external collaborator — interface only).
//!
//! Gated by an API key and a cumulative spend cap, per design note §9: the
//! core must function correctly when the planner is absent, falling back to
//! the session manager's common-selector list. Modeled as a narrow trait the
//! same way `BrowserPool`/`UpsertSink` are: the orchestrator holds
//! `Option<Arc<dyn Planner>>` and never imports a concrete LLM client.

use async_trait::async_trait;
use chromiumoxide::page::Page;

use crate::error::ScrapeError;
use crate::types::Plan;

/// Produces a navigation [`Plan`] for a live page. Implementations decide
/// how to call out to an LLM; the core only consumes the resulting plan.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan_page(&self, page: &Page) -> Result<Plan, ScrapeError>;

    /// Cumulative spend so far, in cents, for the budget guard below.
    fn spent_cents(&self) -> u32;
}

/// Wraps a [`Planner`] with the cumulative budget cap from `LLM_BUDGET_CENTS`.
/// Once the cap is exceeded the guard reports the planner as unavailable
/// rather than letting further calls through, so a runaway cost can't creep
/// past the configured ceiling mid-run.
pub struct BudgetedPlanner<P: Planner> {
    inner: P,
    budget_cents: u32,
}

impl<P: Planner> BudgetedPlanner<P> {
    #[must_use]
    pub fn new(inner: P, budget_cents: u32) -> Self {
        Self {
            inner,
            budget_cents,
        }
    }

    #[must_use]
    pub fn within_budget(&self) -> bool {
        self.inner.spent_cents() < self.budget_cents
    }
}

#[async_trait]
impl<P: Planner> Planner for BudgetedPlanner<P> {
    async fn plan_page(&self, page: &Page) -> Result<Plan, ScrapeError> {
        if !self.within_budget() {
            return Err(ScrapeError::FetchTransport(
                "llm planner budget exhausted".to_string(),
            ));
        }
        self.inner.plan_page(page).await
    }

    fn spent_cents(&self) -> u32 {
        self.inner.spent_cents()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakePlanner {
        spent: AtomicU32,
    }

    #[async_trait]
    impl Planner for FakePlanner {
        async fn plan_page(&self, _page: &Page) -> Result<Plan, ScrapeError> {
            self.spent.fetch_add(5, Ordering::Relaxed);
            Ok(Plan::default())
        }

        fn spent_cents(&self) -> u32 {
            self.spent.load(Ordering::Relaxed)
        }
    }

    #[test]
    fn budget_guard_starts_open() {
        let planner = BudgetedPlanner::new(
            FakePlanner {
                spent: AtomicU32::new(0),
            },
            50,
        );
        assert!(planner.within_budget());
    }

    #[test]
    fn budget_guard_closes_once_spend_reaches_cap() {
        let planner = BudgetedPlanner::new(
            FakePlanner {
                spent: AtomicU32::new(50),
            },
            50,
        );
        assert!(!planner.within_budget());
    }
}
