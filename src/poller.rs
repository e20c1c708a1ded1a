//! The poll loop.
//!
//! One [`Poller`] owns at most one running loop.  Each loop holds its own
//! [`Snapshot`], fetches immediately on start and then waits one period
//! after every finished cycle, so fetches never overlap.  Stopping cancels
//! the loop's token and bumps the generation counter; a fetch that was
//! already in flight is allowed to finish, but its result is dropped before
//! it can touch the snapshot or reach the sink.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, PollConfig};
use crate::differ::reconcile;
use crate::notify::Notifier;
use crate::store::{RecordStore, WatchTarget};
use crate::types::Snapshot;

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Poller {
    store: Arc<dyn RecordStore>,
    notifier: Arc<Notifier>,
    generation: Arc<AtomicU64>,
    running: Mutex<Option<Running>>,
}

impl Poller {
    pub fn new(store: Arc<dyn RecordStore>, notifier: Notifier) -> Self {
        Self {
            store,
            notifier: Arc::new(notifier),
            generation: Arc::new(AtomicU64::new(0)),
            running: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start polling `target`, replacing any loop that is already running.
    ///
    /// Configuration problems are reported here and no loop is started.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, config: PollConfig, target: WatchTarget) -> Result<(), ConfigError> {
        config.validate()?;
        if let WatchTarget::Entity(id) = &target {
            if *id == config.self_id {
                return Err(ConfigError::TargetIsSelf(id.clone()));
            }
        }

        let mut running = self.lock();
        if let Some(previous) = running.take() {
            info!("Restarting poll loop");
            previous.cancel.cancel();
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let cycle = Cycle {
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            config,
            target,
            cancel: cancel.clone(),
            generation,
            current: Arc::clone(&self.generation),
        };
        let handle = tokio::spawn(cycle.run());
        *running = Some(Running { cancel, handle });
        Ok(())
    }

    /// Stop the loop.  Safe to call from any thread and when already idle.
    pub fn stop(&self) {
        if let Some(previous) = self.lock().take() {
            self.generation.fetch_add(1, Ordering::SeqCst);
            previous.cancel.cancel();
            info!("Poll loop stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State moved into one spawned loop.
struct Cycle {
    store: Arc<dyn RecordStore>,
    notifier: Arc<Notifier>,
    config: PollConfig,
    target: WatchTarget,
    cancel: CancellationToken,
    generation: u64,
    current: Arc<AtomicU64>,
}

impl Cycle {
    fn is_stale(&self) -> bool {
        self.cancel.is_cancelled() || self.current.load(Ordering::SeqCst) != self.generation
    }

    async fn run(self) {
        info!(
            "Polling {:?} every {:?} (generation {})",
            self.target, self.config.period, self.generation
        );
        let mut snapshot = Snapshot::new();
        let mut failures: u32 = 0;

        while !self.is_stale() {
            match self.store.fetch(&self.config, &self.target).await {
                Ok(fresh) => {
                    if self.is_stale() {
                        debug!("Discarding fetch result of stopped generation {}", self.generation);
                        break;
                    }
                    if failures > 0 {
                        info!("Remote store reachable again after {} failed polls", failures);
                        failures = 0;
                    }
                    let (next, events) = reconcile(snapshot, fresh, &self.config.self_id);
                    snapshot = next;
                    if !events.is_empty() {
                        let report = self.notifier.deliver(&events);
                        debug!(
                            "Cycle produced {} events ({} failed), tracking {}",
                            events.len(),
                            report.failed,
                            snapshot.len()
                        );
                    }
                }
                Err(e) => {
                    // Keep the snapshot as-is; an outage must not look like everyone left.
                    failures += 1;
                    if failures == 1 {
                        warn!("Poll failed, keeping last snapshot: {}", e.summary());
                    } else {
                        debug!("Poll failed ({} in a row): {}", failures, e.summary());
                    }
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(self.config.period) => {}
            }
        }
        debug!("Poll loop generation {} exited", self.generation);
    }
}
