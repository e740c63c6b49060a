use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use super::drain::{DrainTracker, WorkGuard};
use crate::provider::{AppContext, ProviderRegistry};
use crate::{LifecycleError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPhase {
    Running,
    Draining,
    Terminating,
    Completed,
    Forced,
}

/// Work to run at the start of shutdown. Receives the overall shutdown deadline.
#[async_trait]
pub trait ShutdownCallback: Send + Sync {
    async fn call(&self, deadline: Instant) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> ShutdownCallback for F
where
    F: Fn(Instant) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn call(&self, deadline: Instant) -> anyhow::Result<()> {
        (self)(deadline).await
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShutdownInfo {
    pub started: bool,
    pub completed: bool,
    pub draining: bool,
    pub forced: bool,
    pub phase: ShutdownPhase,
    pub shutdown_timeout_ms: u64,
    pub drain_timeout_ms: u64,
    pub callback_count: usize,
    pub error_count: usize,
    pub in_flight: usize,
}

#[derive(Default)]
struct ShutdownState {
    started: bool,
    completed: bool,
    draining: bool,
    forced: bool,
    errors: Vec<LifecycleError>,
    /// Registration order is execution order.
    callbacks: Vec<(String, Arc<dyn ShutdownCallback>)>,
}

/// Owns the process-wide shutdown state and runs the graceful protocol:
/// callbacks, drain, provider termination, completion.
pub struct ShutdownCoordinator {
    registry: Arc<ProviderRegistry>,
    app: AppContext,
    shutdown_timeout: Duration,
    drain_timeout: Duration,
    state: RwLock<ShutdownState>,
    tracker: Arc<DrainTracker>,
    phase_tx: watch::Sender<ShutdownPhase>,
    phase_rx: watch::Receiver<ShutdownPhase>,
}

impl ShutdownCoordinator {
    pub fn new(registry: Arc<ProviderRegistry>, app: AppContext) -> Self {
        let (phase_tx, phase_rx) = watch::channel(ShutdownPhase::Running);
        let shutdown_timeout = app.config().shutdown_timeout;
        let drain_timeout = app.config().drain_timeout;
        Self {
            registry,
            app,
            shutdown_timeout,
            drain_timeout,
            state: RwLock::new(ShutdownState::default()),
            tracker: Arc::new(DrainTracker::new()),
            phase_tx,
            phase_rx,
        }
    }

    pub fn phase_receiver(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase_rx.clone()
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.phase_rx.borrow()
    }

    /// Registers a callback, replacing one with the same name in place.
    pub fn register_callback(&self, name: &str, callback: impl ShutdownCallback + 'static) {
        let callback: Arc<dyn ShutdownCallback> = Arc::new(callback);
        let mut state = self.write_state();
        match state.callbacks.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = callback,
            None => state.callbacks.push((name.to_string(), callback)),
        }
        debug!(name, "Registered shutdown callback");
    }

    pub fn unregister_callback(&self, name: &str) -> bool {
        let mut state = self.write_state();
        let before = state.callbacks.len();
        state.callbacks.retain(|(n, _)| n != name);
        let removed = state.callbacks.len() != before;
        if removed {
            debug!(name, "Unregistered shutdown callback");
        }
        removed
    }

    pub fn callback_names(&self) -> Vec<String> {
        self.read_state()
            .callbacks
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.read_state().started
    }

    pub fn is_shutdown_completed(&self) -> bool {
        self.read_state().completed
    }

    /// Whether new external work should be refused.
    pub fn is_draining(&self) -> bool {
        self.read_state().draining
    }

    pub fn is_forced(&self) -> bool {
        self.read_state().forced
    }

    /// Errors collected by the graceful path so far.
    pub fn errors(&self) -> Vec<LifecycleError> {
        self.read_state().errors.clone()
    }

    pub fn info(&self) -> ShutdownInfo {
        let state = self.read_state();
        ShutdownInfo {
            started: state.started,
            completed: state.completed,
            draining: state.draining,
            forced: state.forced,
            phase: self.phase(),
            shutdown_timeout_ms: self.shutdown_timeout.as_millis() as u64,
            drain_timeout_ms: self.drain_timeout.as_millis() as u64,
            callback_count: state.callbacks.len(),
            error_count: state.errors.len(),
            in_flight: self.tracker.in_flight(),
        }
    }

    /// Admits one unit of external work, or `None` once draining has begun.
    pub fn try_begin_work(&self) -> Option<WorkGuard> {
        // count first so a drain that starts concurrently waits for this unit
        let guard = self.tracker.begin();
        if self.is_draining() {
            return None;
        }
        Some(guard)
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.in_flight()
    }

    pub fn enable_drain_mode(&self) {
        {
            let mut state = self.write_state();
            if state.draining {
                return;
            }
            state.draining = true;
        }
        info!("Application entering drain mode");
        let _ = self.phase_tx.send(ShutdownPhase::Draining);
    }

    /// Graceful shutdown using the configured timeout.
    pub async fn graceful_shutdown(&self) -> Result<()> {
        self.shutdown(self.shutdown_timeout).await
    }

    /// Runs the graceful protocol once, bounded by `timeout`.
    ///
    /// Returns [`LifecycleError::AlreadyInProgress`] without side effects if shutdown was
    /// already started, and [`LifecycleError::Shutdown`] if any callback or termination
    /// failed or the deadline cut the sequence short.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        let deadline = deadline_after(timeout);
        {
            let mut state = self.write_state();
            if state.started {
                return Err(LifecycleError::AlreadyInProgress);
            }
            state.started = true;
        }
        info!(timeout_ms = timeout.as_millis() as u64, "Initiating graceful shutdown");

        let mut errors = self.run_callbacks(deadline).await;
        self.drain(deadline).await;
        errors.extend(self.terminate_providers(deadline).await);

        let forced = {
            let mut state = self.write_state();
            state.errors.extend(errors.iter().cloned());
            state.completed = true;
            state.forced
        };
        // a concurrent force() already published the terminal phase
        if !forced {
            let _ = self.phase_tx.send(ShutdownPhase::Completed);
        }

        if errors.is_empty() {
            info!("Graceful shutdown completed");
            Ok(())
        } else {
            warn!(errors = errors.len(), "Graceful shutdown completed with errors");
            Err(LifecycleError::Shutdown { errors })
        }
    }

    /// Marks shutdown forced and completed without draining or terminating anything.
    /// Returns false if shutdown had already completed.
    pub fn force(&self) -> bool {
        {
            let mut state = self.write_state();
            if state.completed {
                return false;
            }
            state.started = true;
            state.forced = true;
            state.completed = true;
        }
        warn!("Force shutdown, skipping drain and provider termination");
        let _ = self.phase_tx.send(ShutdownPhase::Forced);
        true
    }

    /// Forced path: forfeits cleanup and exits the process with status 1.
    pub fn force_shutdown(&self) -> ! {
        self.force();
        std::process::exit(1)
    }

    async fn run_callbacks(&self, deadline: Instant) -> Vec<LifecycleError> {
        let callbacks = self.read_state().callbacks.clone();
        if callbacks.is_empty() {
            return Vec::new();
        }

        info!(count = callbacks.len(), "Executing shutdown callbacks");
        let mut errors = Vec::new();

        for (name, callback) in callbacks {
            if Instant::now() >= deadline {
                warn!(name = %name, "Shutdown deadline passed, skipping callback");
                errors.push(LifecycleError::CallbackSkipped(name));
                continue;
            }

            // a separate task turns a panicking callback into a JoinError
            let mut handle = tokio::spawn(async move { callback.call(deadline).await });

            match timeout_at(deadline, &mut handle).await {
                Ok(Ok(Ok(()))) => debug!(name = %name, "Shutdown callback completed"),
                Ok(Ok(Err(e))) => {
                    error!(name = %name, "Shutdown callback failed: {:#}", e);
                    errors.push(LifecycleError::CallbackFailed {
                        name,
                        message: format!("{e:#}"),
                    });
                }
                Ok(Err(join)) if join.is_panic() => {
                    let message = panic_message(join.into_panic());
                    error!(name = %name, "Shutdown callback panicked: {}", message);
                    errors.push(LifecycleError::CallbackPanic { name, message });
                }
                Ok(Err(join)) => {
                    error!(name = %name, "Shutdown callback was cancelled: {}", join);
                    errors.push(LifecycleError::CallbackFailed {
                        name,
                        message: join.to_string(),
                    });
                }
                Err(_) => {
                    handle.abort();
                    warn!(name = %name, "Shutdown callback exceeded the shutdown deadline");
                    errors.push(LifecycleError::CallbackSkipped(name));
                }
            }
        }

        errors
    }

    async fn drain(&self, deadline: Instant) {
        self.enable_drain_mode();

        let drain_deadline = deadline.min(deadline_after(self.drain_timeout));
        info!(in_flight = self.tracker.in_flight(), "Waiting for in-flight work to complete");

        match timeout_at(drain_deadline, self.tracker.wait_idle()).await {
            Ok(()) => info!("In-flight work drained"),
            Err(_) => warn!(
                in_flight = self.tracker.in_flight(),
                "Drain timeout exceeded, proceeding with shutdown"
            ),
        }
    }

    async fn terminate_providers(&self, deadline: Instant) -> Vec<LifecycleError> {
        let _ = self.phase_tx.send(ShutdownPhase::Terminating);
        let providers = self.registry.terminable().await;
        info!(count = providers.len(), "Terminating service providers");

        let mut errors = Vec::new();
        let mut expired = false;

        for record in providers {
            let id = record.id.as_str();
            if expired || Instant::now() >= deadline {
                expired = true;
                warn!(provider = %id, "Shutdown deadline passed, provider not terminated");
                errors.push(LifecycleError::TerminationSkipped(id.to_string()));
                continue;
            }

            debug!(provider = %id, priority = record.priority, "Terminating provider");
            let provider = record.provider().clone();
            let app = self.app.clone();
            let mut handle = tokio::spawn(async move { provider.terminate(deadline, &app).await });

            match timeout_at(deadline, &mut handle).await {
                Ok(Ok(Ok(()))) => debug!(provider = %id, "Provider terminated"),
                Ok(Ok(Err(e))) => {
                    error!(provider = %id, "Provider termination failed: {:#}", e);
                    errors.push(LifecycleError::termination(id, &e));
                }
                Ok(Err(join)) => {
                    let message = if join.is_panic() {
                        format!("panicked: {}", panic_message(join.into_panic()))
                    } else {
                        join.to_string()
                    };
                    error!(provider = %id, "Provider termination aborted: {}", message);
                    errors.push(LifecycleError::Termination {
                        provider: id.to_string(),
                        message,
                    });
                }
                Err(_) => {
                    handle.abort();
                    warn!(provider = %id, "Provider termination exceeded the shutdown deadline");
                    errors.push(LifecycleError::TerminationSkipped(id.to_string()));
                    expired = true;
                }
            }
        }

        if errors.is_empty() {
            info!("All service providers terminated");
        }
        errors
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ShutdownState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ShutdownState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `now + timeout`, saturating to a far-future instant instead of overflowing.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(86400 * 365 * 30))
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
