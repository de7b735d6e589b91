//! Compute unit pool: worker threads plus a response router.
//!
//! Workers share one task queue and each owns a private control channel used
//! for bootstrap configuration. Responses from every worker go to a single
//! router thread, which matches them to pending tasks by id.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, select};
use dashmap::DashMap;
use tracing::{debug, trace, warn};

use crate::{
    ComputeEntry, ComputeModule, DispatchError, ModuleConfig, RemoteError, TaskEnvelope,
    TaskResponse,
};

/// Settles a single task. Carries the task result or its normalized error.
pub(crate) type TaskOutcome = Result<serde_json::Value, DispatchError>;

/// Broadcast entry for a finished task.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskCompleted {
    /// Id of the finished task.
    pub id: u64,
    /// The normalized error, if the task failed.
    pub error: Option<DispatchError>,
}

/// Bootstrap messages sent on a worker's private channel.
pub(crate) enum ControlMessage {
    Configure {
        config: ModuleConfig,
        ack: Sender<Result<(), RemoteError>>,
    },
}

/// State shared between the dispatcher and the router thread.
#[derive(Default)]
pub(crate) struct Shared {
    /// Per-task reply channels, keyed by task id.
    pub(crate) pending: DashMap<u64, Sender<TaskOutcome>>,
    /// Number of dispatched tasks without a response yet.
    pub(crate) active: AtomicUsize,
    /// Completion subscribers.
    pub(crate) subscribers: Mutex<Vec<Sender<TaskCompleted>>>,
}

impl Shared {
    /// Settle the pending task `response` answers.
    ///
    /// Returns `false` and changes nothing if no task with that id is
    /// pending.
    pub(crate) fn deliver(&self, response: TaskResponse) -> bool {
        let id = response.id;
        let Some((_, reply)) = self.pending.remove(&id) else {
            warn!(id, "dropping response for unknown task");
            return false;
        };

        let _ = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        let outcome = response.into_outcome().map_err(DispatchError::from);
        let error = outcome.as_ref().err().cloned();
        if let Some(err) = &error {
            debug!(id, %err, "task failed");
        } else {
            trace!(id, "task succeeded");
        }
        // The caller may have dropped its handle.
        let _ = reply.send(outcome);

        self.broadcast(TaskCompleted { id, error });
        true
    }

    fn broadcast(&self, event: TaskCompleted) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

/// Running compute units.
pub(crate) struct WorkerPool {
    /// Shared task queue. `None` once shut down.
    task_sender: Option<Sender<TaskEnvelope>>,
    /// One control channel per worker.
    controls: Vec<Sender<ControlMessage>>,
    /// Worker and router threads.
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `worker_count` compute units running modules from `entry`.
    pub(crate) fn spawn(
        entry: &Arc<dyn ComputeEntry>,
        worker_count: usize,
        shared: &Arc<Shared>,
    ) -> Result<Self, DispatchError> {
        let (task_tx, task_rx) = crossbeam_channel::unbounded::<TaskEnvelope>();
        let (response_tx, response_rx) = crossbeam_channel::unbounded::<TaskResponse>();

        let mut pool = Self {
            task_sender: Some(task_tx),
            controls: Vec::with_capacity(worker_count),
            handles: Vec::with_capacity(worker_count + 1),
        };

        for index in 0..worker_count {
            let (control_tx, control_rx) = crossbeam_channel::unbounded();
            let tasks = task_rx.clone();
            let responses = response_tx.clone();
            let module = entry.spawn();

            let handle = thread::Builder::new()
                .name(format!("{}-unit-{index}", entry.name()))
                .spawn(move || run_worker(module, control_rx, tasks, responses))
                .map_err(|e| DispatchError::PoolCreation(e.to_string()))?;
            pool.controls.push(control_tx);
            pool.handles.push(handle);
        }
        // Only workers hold response senders, so the router exits after them.
        drop(response_tx);

        let router_shared = Arc::clone(shared);
        let router = thread::Builder::new()
            .name(format!("{}-router", entry.name()))
            .spawn(move || {
                while let Ok(response) = response_rx.recv() {
                    router_shared.deliver(response);
                }
            })
            .map_err(|e| DispatchError::PoolCreation(e.to_string()))?;
        pool.handles.push(router);

        debug!(entry = entry.name(), worker_count, "compute pool started");
        Ok(pool)
    }

    /// Queue a task for the next idle worker.
    pub(crate) fn submit(&self, envelope: TaskEnvelope) -> Result<(), DispatchError> {
        let sender = self.task_sender.as_ref().ok_or(DispatchError::Disposed)?;
        sender.send(envelope).map_err(|_| DispatchError::Disconnected)
    }

    /// Clones of every worker's control channel.
    ///
    /// Callers wait on acknowledgments through these so the pool itself need
    /// not stay borrowed while a busy unit finishes its task.
    pub(crate) fn controls(&self) -> Vec<Sender<ControlMessage>> {
        self.controls.clone()
    }

    /// Stop accepting work and detach the threads.
    ///
    /// Workers exit once their current task returns; a unit stuck inside a
    /// task does not block the caller.
    pub(crate) fn terminate(&mut self) {
        self.task_sender.take();
        self.controls.clear();
        self.handles.clear();
    }
}

/// Send `config` to every unit and wait for all acknowledgments.
///
/// Returns the first failure after every unit has answered.
pub(crate) fn configure_units(
    controls: &[Sender<ControlMessage>],
    config: &ModuleConfig,
) -> Result<(), DispatchError> {
    let mut acks = Vec::with_capacity(controls.len());
    for control in controls {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        control
            .send(ControlMessage::Configure {
                config: config.clone(),
                ack: ack_tx,
            })
            .map_err(|_| DispatchError::Disconnected)?;
        acks.push(ack_rx);
    }

    let mut outcome = Ok(());
    for ack in acks {
        let result = match ack.recv() {
            Ok(result) => result.map_err(DispatchError::from),
            Err(_) => Err(DispatchError::Disconnected),
        };
        if outcome.is_ok() {
            outcome = result;
        }
    }
    outcome
}

fn run_worker(
    mut module: Box<dyn ComputeModule>,
    control: Receiver<ControlMessage>,
    tasks: Receiver<TaskEnvelope>,
    responses: Sender<TaskResponse>,
) {
    loop {
        select! {
            recv(control) -> message => match message {
                Ok(ControlMessage::Configure { config, ack }) => {
                    let result = guarded(|| module.configure(&config));
                    let _ = ack.send(result);
                }
                Err(_) => break,
            },
            recv(tasks) -> envelope => match envelope {
                Ok(envelope) => {
                    let id = envelope.request().id;
                    let response = match guarded(|| module.execute(&envelope)) {
                        Ok(result) => TaskResponse::success(id, result),
                        Err(error) => TaskResponse::failure(id, error),
                    };
                    if responses.send(response).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
        }
    }
}

/// Run `f`, reporting a panic as a remote error.
fn guarded<T>(f: impl FnOnce() -> Result<T, RemoteError>) -> Result<T, RemoteError> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "compute unit panicked".to_string());
        Err(RemoteError::new("RuntimeError", message))
    })
}
