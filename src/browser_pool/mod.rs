//! Browser pool (external collaborator, interface only).
//!
//! The spec asks for exactly two operations from the orchestrator's point of
//! view: `borrowPage()` and a scoped `withPage(fn)`. Unlike the teacher's
//! `BrowserPool` (dynamically scaled to `max(in_use + 2, min_pool_size)`,
//! background scaler + keepalive tasks, idle eviction), there is no signal
//! in the spec calling for more than one warm engine, so this keeps the
//! teacher's wrapper/guard plumbing and single-engine-reuse idea and drops
//! the scaling loops entirely. `PagePool` is the narrow trait the
//! orchestrator is written against, so tests can substitute a fake without
//! touching chromiumoxide.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::types::PageHandle;

/// The narrow interface the orchestrator and day-worker pool consume.
#[async_trait]
pub trait PagePool: Send + Sync {
    /// Borrow an instrumented page. Caller owns disposal.
    async fn borrow_page(&self) -> Result<Page>;
}

/// RAII wrapper for the pool's single live browser engine.
struct PooledBrowserWrapper {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
}

impl PooledBrowserWrapper {
    fn new(browser: Browser, handler: JoinHandle<()>, user_data_dir: PathBuf) -> Self {
        Self {
            browser: Arc::new(browser),
            handler,
            user_data_dir: Some(user_data_dir),
        }
    }

    fn browser_arc(&self) -> Arc<Browser> {
        Arc::clone(&self.browser)
    }

    fn browser_mut(&mut self) -> Option<&mut Browser> {
        Arc::get_mut(&mut self.browser)
    }

    fn cleanup_temp_dir(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!("failed to clean up browser profile {}: {}", path.display(), e);
            }
        }
    }
}

impl Drop for PooledBrowserWrapper {
    fn drop(&mut self) {
        self.handler.abort();
        self.cleanup_temp_dir();
    }
}

/// A single reusable Chrome engine, started lazily on first borrow and kept
/// alive across the process lifetime.
pub struct BrowserPool {
    headless: bool,
    engine: Mutex<Option<PooledBrowserWrapper>>,
    /// Live pages keyed by the opaque handle handed to the orchestrator
    /// (`FetchResult.page_handle`/`context_handle`). A page and its
    /// context share one handle in this single-engine pool: disposing the
    /// context closes the page.
    pages: DashMap<PageHandle, Page>,
    next_handle: AtomicU64,
}

impl BrowserPool {
    #[must_use]
    pub fn new(headless: bool) -> Arc<Self> {
        Arc::new(Self {
            headless,
            engine: Mutex::new(None),
            pages: DashMap::new(),
            next_handle: AtomicU64::new(1),
        })
    }

    /// Register a page the orchestrator will hold onto across await points,
    /// returning the handle it should carry in a [`crate::types::FetchResult`].
    pub fn register_page(&self, page: Page) -> PageHandle {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.pages.insert(handle, page);
        handle
    }

    /// Look up a previously registered page.
    #[must_use]
    pub fn get_page(&self, handle: PageHandle) -> Option<Page> {
        self.pages.get(&handle).map(|p| p.clone())
    }

    /// Dispose of a registered page/context, closing it if still open.
    pub async fn dispose_context(&self, handle: PageHandle) {
        if let Some((_, page)) = self.pages.remove(&handle) {
            if let Err(e) = page.close().await {
                warn!("failed to close page context {handle}: {e}");
            }
        }
    }

    async fn ensure_started(&self) -> Result<Arc<Browser>> {
        let mut guard = self.engine.lock().await;
        if guard.is_none() {
            let profile = crate::browser_profile::create_unique_profile_with_prefix("gym_scrape")
                .context("failed to create browser profile directory")?;
            let user_data_dir = profile.into_path();
            let (browser, handler, _dir) =
                crate::browser_setup::launch_browser(self.headless, Some(user_data_dir.clone()))
                    .await
                    .context("failed to launch browser engine")?;
            info!("browser engine started");
            *guard = Some(PooledBrowserWrapper::new(browser, handler, user_data_dir));
        }
        Ok(guard.as_ref().expect("just initialized").browser_arc())
    }

    /// Scoped borrow: invokes `f` with a fresh page, guaranteeing the page
    /// is closed afterward regardless of `f`'s outcome.
    pub async fn with_page<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Page) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let page = self.borrow_page().await?;
        let result = f(page.clone()).await;
        if let Err(e) = page.close().await {
            warn!("failed to close page cleanly: {e}");
        }
        result
    }

    /// Tear down the engine if running. Safe to call from a process
    /// termination handler; idempotent.
    pub async fn shutdown(&self) -> Result<()> {
        let mut guard = self.engine.lock().await;
        if let Some(mut wrapper) = guard.take() {
            if let Some(browser) = wrapper.browser_mut() {
                if let Err(e) = browser.close().await {
                    warn!("failed to close browser engine: {e}");
                }
                let _ = browser.wait().await;
            }
        }
        Ok(())
    }

    /// Spawn a background task that tears down the engine on SIGINT/ctrl-c.
    pub fn install_shutdown_hook(self: &Arc<Self>) {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = pool.shutdown().await;
            }
        });
    }
}

#[async_trait]
impl PagePool for BrowserPool {
    async fn borrow_page(&self) -> Result<Page> {
        let browser = self.ensure_started().await?;
        let page = browser.new_page("about:blank").await?;
        Ok(page)
    }
}
