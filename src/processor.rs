//! Asynchronous logo post-processing.
//!
//! [`LogoProcessor`] runs the compositing step on tokio's blocking pool,
//! keyed by [`LogoKey`]. Only one key is current at a time:
//!
//! 1. [`request`](LogoProcessor::request) makes the new key current and
//!    aborts the superseded task.
//! 2. On completion, a task publishes its result only if its key is still
//!    current. Anything else is a stale result and is dropped.
//!
//! Results are published through a [`tokio::sync::watch`] channel holding
//! the whole [`LogoState`], so readers always see a key and the result
//! produced for that key together.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};

use crate::logo::{LogoKey, LogoSource, ProcessedLogo, composite_logo};

// ============================================================================
// LogoCompositor Trait
// ============================================================================

/// The compositing step run for each request.
///
/// Implementations must not fail: degrade to the unprocessed source instead.
pub trait LogoCompositor: Send + Sync + 'static {
    fn composite(&self, source: &LogoSource, opacity: f32) -> ProcessedLogo;
}

/// Default compositor: uniform opacity on an offscreen surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpacityCompositor;

impl LogoCompositor for OpacityCompositor {
    fn composite(&self, source: &LogoSource, opacity: f32) -> ProcessedLogo {
        composite_logo(source, opacity)
    }
}

// ============================================================================
// LogoState
// ============================================================================

/// Snapshot of the processor: the current key and, once ready, its result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogoState {
    current: Option<LogoKey>,
    processed: Option<ProcessedLogo>,
}

impl LogoState {
    /// The key of the latest request, or `None` when no logo is set.
    pub fn current(&self) -> Option<LogoKey> {
        self.current
    }

    /// The published result for the current key.
    pub fn processed(&self) -> Option<&ProcessedLogo> {
        self.processed.as_ref()
    }

    /// Returns the result if it was produced for `key`.
    pub fn processed_for(&self, key: LogoKey) -> Option<&ProcessedLogo> {
        self.processed.as_ref().filter(|logo| logo.key() == key)
    }

    /// True while the current key has no result yet.
    pub fn is_pending(&self) -> bool {
        match self.current {
            Some(key) => self.processed_for(key).is_none(),
            None => false,
        }
    }
}

// ============================================================================
// ProcessingTicket
// ============================================================================

/// Handle to one processing request.
pub struct ProcessingTicket {
    key: LogoKey,
    task: JoinHandle<bool>,
}

impl ProcessingTicket {
    pub fn key(&self) -> LogoKey {
        self.key
    }

    /// Waits for the request to finish.
    ///
    /// Returns true if its result was published, false if it was superseded.
    pub async fn wait(self) -> bool {
        self.task.await.unwrap_or(false)
    }
}

// ============================================================================
// LogoProcessor
// ============================================================================

/// Keyed, last-request-wins logo compositing.
pub struct LogoProcessor {
    compositor: Arc<dyn LogoCompositor>,
    state: Arc<watch::Sender<LogoState>>,
    runtime: Handle,
    in_flight: Option<AbortHandle>,
}

impl LogoProcessor {
    /// Creates a processor using the default [`OpacityCompositor`].
    pub fn new(runtime: Handle) -> Self {
        Self::with_compositor(runtime, OpacityCompositor)
    }

    pub fn with_compositor(runtime: Handle, compositor: impl LogoCompositor) -> Self {
        let (state, _) = watch::channel(LogoState::default());
        Self {
            compositor: Arc::new(compositor),
            state: Arc::new(state),
            runtime,
            in_flight: None,
        }
    }

    /// Returns a copy of the current state.
    pub fn state(&self) -> LogoState {
        self.state.borrow().clone()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<LogoState> {
        self.state.subscribe()
    }

    /// Requests processing of `logo` at `opacity`.
    ///
    /// With no logo, the state is cleared synchronously and no work is
    /// spawned. Re-requesting the current key is a no-op. Otherwise the new
    /// key becomes current immediately and a ticket for the spawned task is
    /// returned.
    pub fn request(&mut self, logo: Option<&LogoSource>, opacity: f32) -> Option<ProcessingTicket> {
        let Some(logo) = logo else {
            self.abort_in_flight();
            self.state.send_if_modified(|state| {
                let modified = state.current.is_some() || state.processed.is_some();
                *state = LogoState::default();
                modified
            });
            return None;
        };

        let key = LogoKey::new(logo.id(), opacity);
        if self.state.borrow().current == Some(key) {
            return None;
        }

        self.abort_in_flight();
        self.state.send_modify(|state| {
            state.current = Some(key);
            state.processed = None;
        });

        let compositor = Arc::clone(&self.compositor);
        let state = Arc::clone(&self.state);
        let source = logo.clone();
        let runtime = self.runtime.clone();

        let task = self.runtime.spawn(async move {
            let work = runtime.spawn_blocking(move || compositor.composite(&source, opacity));
            let processed = match work.await {
                Ok(processed) => processed,
                Err(err) => {
                    log::warn!("logo processing for {} did not complete: {}", key.logo(), err);
                    return false;
                }
            };
            publish(&state, key, processed)
        });

        self.in_flight = Some(task.abort_handle());
        Some(ProcessingTicket { key, task })
    }

    fn abort_in_flight(&mut self) {
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
    }
}

/// Publishes `processed` if `key` is still current.
fn publish(state: &watch::Sender<LogoState>, key: LogoKey, processed: ProcessedLogo) -> bool {
    let published = state.send_if_modified(|current| {
        if current.current == Some(key) {
            current.processed = Some(processed);
            true
        } else {
            false
        }
    });

    if published {
        log::debug!("published processed {} at opacity {}", key.logo(), key.opacity());
    } else {
        log::debug!("discarded stale result for {} at opacity {}", key.logo(), key.opacity());
    }
    published
}

impl Drop for LogoProcessor {
    fn drop(&mut self) {
        self.abort_in_flight();
    }
}

// ============================================================================
// Tests
// ============================================================================
