//! The session gate: an awaitable latch every fetch parks on, re-closable
//! on demand.
//!
//! Modeled per spec §9 as "a condition-variable pair or a replaceable
//! resolver": a `tokio::sync::watch` channel carrying a tri-state signal
//! plays that role here (the same "cheap broadcast of the latest value"
//! idiom the teacher reaches for with `tokio::sync::Notify` in
//! `circuit_breaker.rs`'s half-open probe gate, generalized to three states
//! because this gate can also fail permanently). Closing constructs a new
//! pending epoch by bumping `epoch`; opening or failing resolves every
//! current waiter at once.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::watch;

use crate::error::ScrapeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateSignal {
    Open,
    Closed,
    Failed,
}

/// Shared gate handle. Cheap to clone (internally `Arc`-backed via the
/// watch channel); every clone observes the same state.
pub struct SessionGate {
    tx: watch::Sender<GateSignal>,
    rx: watch::Receiver<GateSignal>,
    epoch: AtomicU64,
    /// One-shot flag guarding the login task: at most one re-authentication
    /// task is active per epoch (invariant 3 in spec §3). Re-entrant
    /// `close()` calls while a login is already running are suppressed.
    login_in_progress: AtomicBool,
}

impl SessionGate {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(GateSignal::Open);
        Self {
            tx,
            rx,
            epoch: AtomicU64::new(0),
            login_in_progress: AtomicBool::new(false),
        }
    }

    /// Park until the gate opens. Returns a fatal error if the gate was
    /// instead marked permanently failed (login exhaustion) for the epoch
    /// the caller is waiting on.
    pub async fn wait_open(&self) -> Result<(), ScrapeError> {
        let mut rx = self.rx.clone();
        loop {
            match *rx.borrow() {
                GateSignal::Open => return Ok(()),
                GateSignal::Failed => {
                    return Err(ScrapeError::LoginFailed(
                        "session gate failed after exhausting login attempts".to_string(),
                    ));
                }
                GateSignal::Closed => {}
            }
            if rx.changed().await.is_err() {
                return Err(ScrapeError::LoginFailed(
                    "session gate sender dropped".to_string(),
                ));
            }
        }
    }

    /// Close the gate, starting a new epoch. No-op if already closed.
    /// Returns the epoch the caller closed into.
    pub fn close(&self) -> u64 {
        if *self.tx.borrow() != GateSignal::Closed {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            let _ = self.tx.send(GateSignal::Closed);
        }
        self.epoch.load(Ordering::SeqCst)
    }

    /// Attempt to become the sole re-authentication task for the current
    /// epoch. Returns `false` if another task already holds it.
    pub fn try_begin_reauth(&self) -> bool {
        self.login_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Release the re-authentication guard (called regardless of outcome).
    pub fn end_reauth(&self) {
        self.login_in_progress.store(false, Ordering::SeqCst);
    }

    /// Open the gate: releases every parked caller.
    pub fn open(&self) {
        let _ = self.tx.send(GateSignal::Open);
    }

    /// Permanently fail the gate for this epoch: releases every parked
    /// caller with a fatal error. A later `open()` (there won't be one in
    /// practice, since login is exhausted) would still recover it.
    pub fn fail(&self) {
        let _ = self.tx.send(GateSignal::Failed);
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.rx.borrow() == GateSignal::Open
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn open_gate_resolves_immediately() {
        let gate = SessionGate::new();
        gate.wait_open().await.unwrap();
    }

    #[tokio::test]
    async fn closed_gate_parks_until_opened() {
        let gate = Arc::new(SessionGate::new());
        gate.close();

        let waiter_gate = Arc::clone(&gate);
        let waiter = tokio::spawn(async move { waiter_gate.wait_open().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.open();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn failed_gate_releases_waiters_with_an_error() {
        let gate = Arc::new(SessionGate::new());
        gate.close();

        let waiter_gate = Arc::clone(&gate);
        let waiter = tokio::spawn(async move { waiter_gate.wait_open().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.fail();
        assert!(waiter.await.unwrap().is_err());
    }

    #[test]
    fn only_one_reauth_task_per_epoch() {
        let gate = SessionGate::new();
        assert!(gate.try_begin_reauth());
        assert!(!gate.try_begin_reauth());
        gate.end_reauth();
        assert!(gate.try_begin_reauth());
    }

    #[test]
    fn close_bumps_epoch_once_per_transition() {
        let gate = SessionGate::new();
        assert_eq!(gate.epoch(), 0);
        gate.close();
        assert_eq!(gate.epoch(), 1);
        gate.close(); // already closed: no-op
        assert_eq!(gate.epoch(), 1);
        gate.open();
        gate.close();
        assert_eq!(gate.epoch(), 2);
    }
}
