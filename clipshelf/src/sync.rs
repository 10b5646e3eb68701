//! Sync coordinator: one exclusive section at a time plus a debounced indicator
//!
//! State machine:
//!   Idle --try_begin--> Syncing --guard dropped--> Idle
//!
//! A call that arrives while Syncing is dropped, never queued. The busy flag is
//! claimed synchronously when the call is made, before anything is awaited, and
//! released by `ExclusiveGuard::drop`, so it is cleared on success, error, panic
//! and when the caller drops the future mid-flight.
//!
//! The user-facing indicator stays up for at least `min_dwell` measured from
//! the start of the sync. The hide runs on a timer task that is cancelled if
//! another visible sync starts first.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_MIN_DWELL: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Minimum time the indicator stays visible once shown
    pub min_dwell: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { min_dwell: DEFAULT_MIN_DWELL }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Syncing,
}

#[derive(Debug)]
struct SyncState {
    phase: SyncPhase,
    indicator: bool,
    /// Start of the current visible sync
    visible_since: Option<Instant>,
    hide_timer: Option<CancellationToken>,
}

impl SyncState {
    fn cancel_hide_timer(&mut self) {
        if let Some(token) = self.hide_timer.take() {
            token.cancel();
        }
    }
}

/// Cheap to clone; clones share the same state
#[derive(Debug, Clone)]
pub struct SyncCoordinator {
    config: SyncConfig,
    state: Arc<Mutex<SyncState>>,
}

impl Default for SyncCoordinator {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}

impl SyncCoordinator {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(SyncState {
                phase: SyncPhase::Idle,
                indicator: false,
                visible_since: None,
                hide_timer: None,
            })),
        }
    }

    pub fn config(&self) -> SyncConfig {
        self.config
    }

    pub fn phase(&self) -> SyncPhase {
        self.state.lock().phase
    }

    /// True while an exclusive section is running
    pub fn is_busy(&self) -> bool {
        self.phase() == SyncPhase::Syncing
    }

    /// User-facing indicator, debounced by `min_dwell`
    pub fn is_syncing(&self) -> bool {
        self.state.lock().indicator
    }

    /// Claim the exclusive section, or `None` if one is already running.
    /// `visible` controls whether the indicator is shown for this section.
    pub fn try_begin(&self, visible: bool) -> Option<ExclusiveGuard> {
        let mut state = self.state.lock();
        if state.phase == SyncPhase::Syncing {
            return None;
        }

        state.phase = SyncPhase::Syncing;
        if visible {
            state.cancel_hide_timer();
            state.indicator = true;
            state.visible_since = Some(Instant::now());
        }

        Some(ExclusiveGuard {
            coordinator: self.clone(),
            visible,
        })
    }

    /// Run `operation` exclusively with the indicator shown.
    /// Resolves to `None` without polling `operation` when another section is running.
    pub fn with_exclusive_access<F, T>(&self, operation: F) -> impl Future<Output = Option<T>>
    where
        F: Future<Output = T>,
    {
        Self::run_guarded(self.try_begin(true), operation)
    }

    /// Like `with_exclusive_access` but leaves the indicator alone
    pub fn with_silent_access<F, T>(&self, operation: F) -> impl Future<Output = Option<T>>
    where
        F: Future<Output = T>,
    {
        Self::run_guarded(self.try_begin(false), operation)
    }

    fn run_guarded<F, T>(guard: Option<ExclusiveGuard>, operation: F) -> impl Future<Output = Option<T>>
    where
        F: Future<Output = T>,
    {
        async move {
            let Some(_guard) = guard else {
                warn!("Sync already in progress, dropping call");
                return None;
            };
            Some(operation.await)
        }
    }

    fn finish(&self, visible: bool) {
        let mut state = self.state.lock();
        state.phase = SyncPhase::Idle;
        if !visible {
            return;
        }

        let elapsed = state.visible_since.take().map_or(self.config.min_dwell, |start| start.elapsed());
        let remaining = self.config.min_dwell.saturating_sub(elapsed);
        if remaining.is_zero() {
            state.indicator = false;
            return;
        }

        // Outside a runtime there is nothing to run the timer on
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            state.indicator = false;
            return;
        };

        let token = CancellationToken::new();
        state.hide_timer = Some(token.clone());
        let shared = Arc::clone(&self.state);
        handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(remaining) => {
                    let mut state = shared.lock();
                    // A sync that started after the sleep elapsed owns the indicator now
                    if !token.is_cancelled() {
                        state.indicator = false;
                        state.hide_timer = None;
                        debug!("Sync indicator hidden");
                    }
                }
            }
        });
    }
}

/// Holds the exclusive section; dropping it returns the coordinator to `Idle`
#[must_use = "the exclusive section ends when the guard is dropped"]
#[derive(Debug)]
pub struct ExclusiveGuard {
    coordinator: SyncCoordinator,
    visible: bool,
}

impl Drop for ExclusiveGuard {
    fn drop(&mut self) {
        self.coordinator.finish(self.visible);
    }
}
