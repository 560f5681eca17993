//! Per-module polling tasks.
//!
//! Every built-in module gets its own tokio task with its own interval, so a
//! slow or failing source only ever delays itself. Polls run on the blocking
//! pool because `sysinfo` reads are synchronous.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::event_bus::EventBus;
use super::history::DEFAULT_HISTORY_SIZE;
use super::module::BuiltinModule;
use super::protocol::{DataPayload, RenderConfig, UpdateEvent};
use crate::error::{HudError, Result};

/// State of one `start()`..`stop()` span.
struct Run {
    /// `true` while publishes are allowed. Publishes hold the read side, so
    /// taking the write side waits out any publish already in progress.
    gate: Arc<RwLock<bool>>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct Collector {
    bus: EventBus,
    run: Mutex<Option<Run>>,
    failures: Arc<Mutex<HashMap<String, Arc<AtomicU64>>>>,
}

impl Collector {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            run: Mutex::new(None),
            failures: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Spawn one polling task per module on the current tokio runtime.
    ///
    /// A collector that is already running is stopped first.
    pub fn start(&self, modules: Vec<BuiltinModule>) -> Result<()> {
        let handle = Handle::try_current()
            .map_err(|_| HudError::runtime("collector must be started inside a tokio runtime"))?;

        self.stop();

        let gate = Arc::new(RwLock::new(true));
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let tasks = modules
            .into_iter()
            .map(|module| {
                let failures = self.failure_counter(module.id());
                handle.spawn(poll_task(
                    module,
                    self.bus.clone(),
                    gate.clone(),
                    failures,
                    shutdown_tx.subscribe(),
                ))
            })
            .collect::<Vec<_>>();

        log::info!("Collector started with {} module(s)", tasks.len());

        *self.run.lock() = Some(Run {
            gate,
            shutdown_tx,
            tasks,
        });
        Ok(())
    }

    /// Cancel every polling task. No publish happens after this returns.
    ///
    /// Does not wait for in-flight polls; their results are dropped.
    pub fn stop(&self) {
        let Some(run) = self.run.lock().take() else {
            return;
        };

        *run.gate.write() = false;
        // Only fails when every task already exited.
        let _ = run.shutdown_tx.send(());
        log::info!("Collector stopped ({} task(s))", run.tasks.len());
    }

    pub fn restart(&self, modules: Vec<BuiltinModule>) -> Result<()> {
        self.stop();
        self.start(modules)
    }

    pub fn is_running(&self) -> bool {
        self.run.lock().is_some()
    }

    /// Number of polling tasks that have not exited yet.
    pub fn active_tasks(&self) -> usize {
        self.run
            .lock()
            .as_ref()
            .map(|run| run.tasks.iter().filter(|t| !t.is_finished()).count())
            .unwrap_or(0)
    }

    /// Failed polls (errors, panics and template mismatches) since creation.
    pub fn failure_count(&self, id: &str) -> u64 {
        self.failures
            .lock()
            .get(id)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn failure_counter(&self, id: &str) -> Arc<AtomicU64> {
        self.failures
            .lock()
            .entry(id.to_string())
            .or_default()
            .clone()
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sparkline widgets keep as many points as they draw.
pub(crate) fn history_capacity(render: &RenderConfig) -> usize {
    render
        .props
        .get("maxPoints")
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(DEFAULT_HISTORY_SIZE)
}

/// Task that polls a single module.
///
/// The first tick of a tokio interval completes immediately.
async fn poll_task(
    module: BuiltinModule,
    bus: EventBus,
    gate: Arc<RwLock<bool>>,
    failures: Arc<AtomicU64>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let id = module.id().to_string();
    let render = module.render_config();
    let capacity = history_capacity(&render);

    let mut ticker = interval(module.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_published: Option<DataPayload> = None;

    log::debug!("Polling task '{}' started ({:?})", id, module.interval());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let source = module.clone();
                let payload = match tokio::task::spawn_blocking(move || source.poll()).await {
                    Ok(Ok(payload)) => payload,
                    Ok(Err(e)) => {
                        failures.fetch_add(1, Ordering::Relaxed);
                        log::debug!("Poll failed for '{}': {}", id, e);
                        continue;
                    }
                    Err(e) => {
                        failures.fetch_add(1, Ordering::Relaxed);
                        log::warn!("Poll task for '{}' panicked: {}", id, e);
                        continue;
                    }
                };

                if let Err(reason) = payload.validate_for(&render.template) {
                    failures.fetch_add(1, Ordering::Relaxed);
                    log::warn!(
                        "Dropping payload for '{}': does not match template '{}': {}",
                        id,
                        render.template,
                        reason
                    );
                    continue;
                }

                if last_published.as_ref() == Some(&payload) {
                    continue;
                }

                {
                    let open = gate.read();
                    if !*open {
                        break;
                    }
                    bus.publish_data_with_history(
                        UpdateEvent {
                            id: id.clone(),
                            data: payload.clone(),
                        },
                        capacity,
                    );
                }
                last_published = Some(payload);
            }
            _ = shutdown.recv() => {
                break;
            }
        }
    }

    log::debug!("Polling task '{}' shutting down", id);
}
