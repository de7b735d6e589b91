//! The task dispatcher and its handles.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::pool::{self, Shared, TaskOutcome, WorkerPool};
use crate::{
    Capabilities, ComputeEntry, DispatchError, ModuleConfig, TaskCompleted, TaskEnvelope,
    TaskRequest, Transferable,
};

/// Dispatcher construction options.
#[derive(Clone, Debug, Default)]
pub struct DispatcherOptions {
    /// Admission cap. `None` admits any number of tasks.
    pub maximum_active_tasks: Option<usize>,
    /// Number of compute units. `0` picks one per spare CPU core.
    pub worker_count: usize,
    /// Base path forwarded to compute units with every task.
    pub base_reference_path: String,
    /// Overrides capability detection.
    pub capabilities: Option<Capabilities>,
}

/// Where the precompiled compute module comes from.
#[derive(Clone, Debug)]
pub enum ModuleSource {
    /// Read the module from disk during initialization.
    Path(PathBuf),
    /// Module bytes already in memory.
    Bytes(Transferable),
}

/// Options for [`TaskDispatcher::initialize_compute_module`].
#[derive(Clone, Debug)]
pub struct ComputeModuleOptions {
    /// The precompiled module.
    pub module: ModuleSource,
    /// Pure-logic module used when binary modules are unsupported.
    pub fallback_module_path: Option<String>,
}

/// Handle to one admitted task.
#[derive(Debug)]
pub struct TaskHandle {
    id: u64,
    receiver: Receiver<TaskOutcome>,
}

impl TaskHandle {
    /// The task's dispatcher-unique id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the task settles.
    pub fn wait(self) -> Result<serde_json::Value, DispatchError> {
        self.receiver
            .recv()
            .unwrap_or(Err(DispatchError::Disconnected))
    }

    /// Block until the task settles and deserialize its result.
    pub fn wait_as<T: DeserializeOwned>(self) -> Result<T, DispatchError> {
        let value = self.wait()?;
        serde_json::from_value(value).map_err(|e| DispatchError::Serialization(e.to_string()))
    }

    /// Block for at most `timeout`. `None` if the task is still running.
    pub fn wait_timeout(
        &self,
        timeout: Duration,
    ) -> Option<Result<serde_json::Value, DispatchError>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(DispatchError::Disconnected)),
        }
    }

    /// The outcome, if the task has settled.
    pub fn try_result(&self) -> Option<Result<serde_json::Value, DispatchError>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(DispatchError::Disconnected)),
        }
    }
}

enum PoolState {
    Uninitialized,
    Ready(WorkerPool),
    Disposed,
}

/// Schedules background tasks onto a lazily created pool of compute units.
///
/// The pool is created on the first scheduled task or on
/// [`initialize_compute_module`](Self::initialize_compute_module), whichever
/// comes first. Tasks beyond the admission cap are rejected with `Ok(None)`
/// and are never queued.
pub struct TaskDispatcher {
    entry: Arc<dyn ComputeEntry>,
    maximum_active_tasks: Option<usize>,
    worker_count: usize,
    base_reference_path: String,
    capabilities: Capabilities,
    shared: Arc<Shared>,
    state: Mutex<PoolState>,
    next_id: AtomicU64,
    initialization: OnceLock<Result<(), DispatchError>>,
}

impl TaskDispatcher {
    /// Bind a dispatcher to `entry`, admitting at most `maximum_active_tasks`
    /// tasks at once.
    pub fn new(entry: Arc<dyn ComputeEntry>, maximum_active_tasks: Option<usize>) -> Self {
        Self::with_options(
            entry,
            DispatcherOptions {
                maximum_active_tasks,
                ..Default::default()
            },
        )
    }

    /// Bind a dispatcher to `entry` with explicit options.
    pub fn with_options(entry: Arc<dyn ComputeEntry>, options: DispatcherOptions) -> Self {
        let worker_count = if options.worker_count == 0 {
            num_cpus::get().saturating_sub(2).max(1)
        } else {
            options.worker_count
        };
        Self {
            entry,
            maximum_active_tasks: options.maximum_active_tasks,
            worker_count,
            base_reference_path: options.base_reference_path,
            capabilities: options.capabilities.unwrap_or_else(Capabilities::detect),
            shared: Arc::new(Shared::default()),
            state: Mutex::new(PoolState::Uninitialized),
            next_id: AtomicU64::new(0),
            initialization: OnceLock::new(),
        }
    }

    /// Try to schedule a task.
    ///
    /// Returns `Ok(None)` when the dispatcher is at capacity; nothing is sent
    /// and the caller is expected to retry later. `Err` is returned when the
    /// pool cannot be created, the parameters cannot be serialized, or the
    /// dispatcher has been disposed.
    pub fn schedule_task<P: Serialize>(
        &self,
        parameters: &P,
        transferables: Vec<Transferable>,
    ) -> Result<Option<TaskHandle>, DispatchError> {
        let state = self.lock_state();
        if matches!(*state, PoolState::Disposed) {
            return Err(DispatchError::Disposed);
        }
        if !self.try_admit() {
            debug!(
                active = self.active_task_count(),
                "dispatcher at capacity, task rejected"
            );
            return Ok(None);
        }
        let state = match self.ensure_pool(state) {
            Ok(state) => state,
            Err(err) => {
                self.release_slot();
                return Err(err);
            }
        };

        let parameters = match serde_json::to_value(parameters) {
            Ok(value) => value,
            Err(e) => {
                self.release_slot();
                return Err(DispatchError::Serialization(e.to_string()));
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = TaskRequest {
            id,
            base_reference_path: self.base_reference_path.clone(),
            parameters,
            transfer_supported: self.capabilities.transfer_supported,
        };
        let envelope = TaskEnvelope::new(request, transferables);

        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.shared.pending.insert(id, reply_tx);

        let PoolState::Ready(worker_pool) = &*state else {
            self.shared.pending.remove(&id);
            self.release_slot();
            return Err(DispatchError::Disposed);
        };
        if let Err(err) = worker_pool.submit(envelope) {
            self.shared.pending.remove(&id);
            self.release_slot();
            return Err(err);
        }

        debug!(id, active = self.active_task_count(), "task dispatched");
        Ok(Some(TaskHandle {
            id,
            receiver: reply_rx,
        }))
    }

    /// Load and configure the compute module on every unit.
    ///
    /// Only the first call does any work; every call returns that call's
    /// outcome, and concurrent callers wait for it. Later `options` are
    /// ignored.
    pub fn initialize_compute_module(
        &self,
        options: &ComputeModuleOptions,
    ) -> Result<(), DispatchError> {
        self.initialization
            .get_or_init(|| self.run_initialization(options))
            .clone()
    }

    /// Subscribe to completion events for every task settled from now on.
    pub fn subscribe_completions(&self) -> Receiver<TaskCompleted> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Terminate the pool, if any, and drop all pending tasks.
    ///
    /// Pending handles resolve with [`DispatchError::Disconnected`]. Safe to
    /// call more than once.
    pub fn dispose(&self) {
        let mut state = self.lock_state();
        if let PoolState::Ready(pool) = &mut *state {
            pool.terminate();
            info!(entry = self.entry.name(), "compute pool terminated");
        }
        *state = PoolState::Disposed;
        drop(state);

        self.shared.pending.clear();
        self.shared.active.store(0, Ordering::Release);
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of dispatched tasks that have not settled.
    pub fn active_task_count(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    /// The admission cap.
    pub fn maximum_active_tasks(&self) -> Option<usize> {
        self.maximum_active_tasks
    }

    /// Number of compute units the pool runs.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Capabilities the dispatcher was built with.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Returns `true` once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        matches!(*self.lock_state(), PoolState::Disposed)
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_pool<'a>(
        &self,
        mut state: MutexGuard<'a, PoolState>,
    ) -> Result<MutexGuard<'a, PoolState>, DispatchError> {
        if matches!(*state, PoolState::Disposed) {
            return Err(DispatchError::Disposed);
        }
        if matches!(*state, PoolState::Uninitialized) {
            let pool = WorkerPool::spawn(&self.entry, self.worker_count, &self.shared)?;
            *state = PoolState::Ready(pool);
        }
        Ok(state)
    }

    fn try_admit(&self) -> bool {
        let cap = self.maximum_active_tasks.unwrap_or(usize::MAX);
        self.shared
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < cap).then_some(n + 1)
            })
            .is_ok()
    }

    fn release_slot(&self) {
        let _ = self
            .shared
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    fn run_initialization(&self, options: &ComputeModuleOptions) -> Result<(), DispatchError> {
        if !self.capabilities.binary_modules_supported && options.fallback_module_path.is_none() {
            warn!(entry = self.entry.name(), "no usable compute module");
            return Err(DispatchError::UnsupportedEnvironment);
        }

        let config = if self.capabilities.binary_modules_supported {
            let (module_path, binary) = match &options.module {
                ModuleSource::Path(path) => {
                    let bytes = std::fs::read(path).map_err(|e| DispatchError::ModuleRead {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?;
                    (Some(path.display().to_string()), Transferable::from(bytes))
                }
                ModuleSource::Bytes(bytes) => (None, Arc::clone(bytes)),
            };
            let binary = if self.capabilities.transfer_supported {
                binary
            } else {
                Transferable::from(&binary[..])
            };
            ModuleConfig {
                module_path,
                binary: Some(binary),
                fallback_module_path: options.fallback_module_path.clone(),
            }
        } else {
            ModuleConfig {
                module_path: None,
                binary: None,
                fallback_module_path: options.fallback_module_path.clone(),
            }
        };

        let controls = {
            let state = self.ensure_pool(self.lock_state())?;
            let PoolState::Ready(pool) = &*state else {
                return Err(DispatchError::Disposed);
            };
            pool.controls()
        };
        // A unit busy with a task acks late; the state lock must be free by then.
        pool::configure_units(&controls, &config)?;
        info!(
            entry = self.entry.name(),
            workers = controls.len(),
            binary = config.binary.is_some(),
            "compute module initialized"
        );
        Ok(())
    }
}

impl Drop for TaskDispatcher {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ComputeModule, FnEntry, RemoteError};
    use crossbeam_channel::Sender;
    use serde_json::{Value, json};
    use std::io::Write;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Records what it receives and blocks on `gate` when a task asks it to.
    struct Recorder {
        received: Arc<AtomicUsize>,
        envelopes: Sender<TaskEnvelope>,
        configs: Sender<ModuleConfig>,
        gate: Receiver<()>,
    }

    impl ComputeModule for Recorder {
        fn configure(&mut self, config: &ModuleConfig) -> Result<(), RemoteError> {
            let _ = self.configs.send(config.clone());
            if config.fallback_module_path.as_deref() == Some("reject") {
                return Err(RemoteError::new("CompileError", "bad module"));
            }
            Ok(())
        }

        fn execute(&mut self, task: &TaskEnvelope) -> Result<Value, RemoteError> {
            self.received.fetch_add(1, Ordering::SeqCst);
            let _ = self.envelopes.send(task.clone());
            let params = &task.request().parameters;
            if params["block"] == json!(true) {
                let _ = self.gate.recv();
            }
            if let Some(message) = params["fail"].as_str() {
                return Err(RemoteError::new("DeveloperError", message).with_stack("at decode"));
            }
            Ok(json!({ "echo": params["value"].clone() }))
        }
    }

    struct Harness {
        dispatcher: TaskDispatcher,
        received: Arc<AtomicUsize>,
        envelopes: Receiver<TaskEnvelope>,
        configs: Receiver<ModuleConfig>,
        gate: Sender<()>,
    }

    fn harness(maximum_active_tasks: Option<usize>, workers: usize, capabilities: Capabilities) -> Harness {
        let received = Arc::new(AtomicUsize::new(0));
        let (envelope_tx, envelope_rx) = crossbeam_channel::unbounded();
        let (config_tx, config_rx) = crossbeam_channel::unbounded();
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();

        let counter = Arc::clone(&received);
        let entry = FnEntry::new("decoder", move || {
            Box::new(Recorder {
                received: Arc::clone(&counter),
                envelopes: envelope_tx.clone(),
                configs: config_tx.clone(),
                gate: gate_rx.clone(),
            }) as Box<dyn ComputeModule>
        });

        let dispatcher = TaskDispatcher::with_options(
            Arc::new(entry),
            DispatcherOptions {
                maximum_active_tasks,
                worker_count: workers,
                base_reference_path: "https://tiles.example/".to_string(),
                capabilities: Some(capabilities),
            },
        );
        Harness {
            dispatcher,
            received,
            envelopes: envelope_rx,
            configs: config_rx,
            gate: gate_tx,
        }
    }

    fn native() -> Capabilities {
        Capabilities {
            transfer_supported: true,
            binary_modules_supported: true,
        }
    }

    fn module_bytes() -> ComputeModuleOptions {
        ComputeModuleOptions {
            module: ModuleSource::Bytes(Arc::from(vec![0_u8, 97, 115, 109])),
            fallback_module_path: None,
        }
    }

    #[test]
    fn test_schedule_and_wait() {
        let h = harness(None, 2, native());
        let handle = h
            .dispatcher
            .schedule_task(&json!({ "value": 42 }), Vec::new())
            .unwrap()
            .unwrap();
        assert_eq!(handle.wait().unwrap(), json!({ "echo": 42 }));
        assert_eq!(h.dispatcher.active_task_count(), 0);

        let envelope = h.envelopes.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(envelope.request().base_reference_path, "https://tiles.example/");
        assert!(envelope.request().transfer_supported);
    }

    #[test]
    fn test_wait_as_deserializes() {
        #[derive(serde::Deserialize)]
        struct Echo {
            echo: String,
        }
        let h = harness(None, 1, native());
        let handle = h
            .dispatcher
            .schedule_task(&json!({ "value": "mesh" }), Vec::new())
            .unwrap()
            .unwrap();
        assert_eq!(handle.wait_as::<Echo>().unwrap().echo, "mesh");
    }

    #[test]
    fn test_rejects_at_capacity_without_sending() {
        let h = harness(Some(1), 1, native());
        let first = h
            .dispatcher
            .schedule_task(&json!({ "block": true }), Vec::new())
            .unwrap()
            .unwrap();
        assert_eq!(h.dispatcher.active_task_count(), 1);

        let second = h.dispatcher.schedule_task(&json!({ "value": 2 }), Vec::new()).unwrap();
        assert!(second.is_none());
        assert_eq!(h.dispatcher.active_task_count(), 1);

        h.gate.send(()).unwrap();
        assert!(first.wait().is_ok());
        assert_eq!(h.dispatcher.active_task_count(), 0);
        assert_eq!(h.received.load(Ordering::SeqCst), 1);

        // Capacity is available again.
        let third = h.dispatcher.schedule_task(&json!({ "value": 3 }), Vec::new()).unwrap();
        assert_eq!(third.unwrap().wait().unwrap(), json!({ "echo": 3 }));
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let h = harness(Some(0), 1, native());
        assert!(h.dispatcher.schedule_task(&json!({}), Vec::new()).unwrap().is_none());
        assert_eq!(h.received.load(Ordering::SeqCst), 0);
        assert!(matches!(*h.dispatcher.lock_state(), PoolState::Uninitialized));
    }

    #[test]
    fn test_remote_error_is_normalized() {
        let h = harness(None, 1, native());
        let handle = h
            .dispatcher
            .schedule_task(&json!({ "fail": "boom" }), Vec::new())
            .unwrap()
            .unwrap();
        assert_eq!(
            handle.wait(),
            Err(DispatchError::Runtime {
                message: "boom".to_string(),
                stack: Some("at decode".to_string()),
            })
        );
        assert_eq!(h.dispatcher.active_task_count(), 0);
    }

    #[test]
    fn test_completion_broadcast() {
        let h = harness(None, 1, native());
        let completions = h.dispatcher.subscribe_completions();

        let ok = h.dispatcher.schedule_task(&json!({ "value": 1 }), Vec::new()).unwrap().unwrap();
        let ok_id = ok.id();
        ok.wait().unwrap();
        let failed = h.dispatcher.schedule_task(&json!({ "fail": "boom" }), Vec::new()).unwrap().unwrap();
        let failed_id = failed.id();
        let _ = failed.wait();

        let first = completions.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(first, TaskCompleted { id: ok_id, error: None });
        let second = completions.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(second.id, failed_id);
        assert!(matches!(second.error, Some(DispatchError::Runtime { .. })));
    }

    #[test]
    fn test_out_of_order_responses_reach_their_handles() {
        let h = harness(None, 2, native());
        let slow = h
            .dispatcher
            .schedule_task(&json!({ "block": true, "value": "slow" }), Vec::new())
            .unwrap()
            .unwrap();
        let fast = h
            .dispatcher
            .schedule_task(&json!({ "value": "fast" }), Vec::new())
            .unwrap()
            .unwrap();
        assert_ne!(slow.id(), fast.id());

        assert_eq!(fast.wait().unwrap(), json!({ "echo": "fast" }));
        assert!(slow.try_result().is_none());
        h.gate.send(()).unwrap();
        assert_eq!(slow.wait_timeout(TIMEOUT).unwrap().unwrap(), json!({ "echo": "slow" }));
    }

    #[test]
    fn test_buffers_are_transferred_when_supported() {
        let h = harness(None, 1, native());
        let buffer: Transferable = Arc::from(vec![7_u8; 16]);
        let handle = h
            .dispatcher
            .schedule_task(&json!({}), vec![Arc::clone(&buffer)])
            .unwrap()
            .unwrap();
        handle.wait().unwrap();

        let envelope = h.envelopes.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(envelope.transfer_list().len(), 1);
        assert!(Arc::ptr_eq(&envelope.buffers()[0], &buffer));
    }

    #[test]
    fn test_buffers_are_copied_without_transfer_support() {
        let h = harness(
            None,
            1,
            Capabilities {
                transfer_supported: false,
                binary_modules_supported: true,
            },
        );
        // Injected capabilities replace detection, which always reports
        // transfer support in-process.
        assert!(!h.dispatcher.capabilities().transfer_supported);
        assert!(Capabilities::detect().transfer_supported);

        let buffer: Transferable = Arc::from(vec![7_u8; 16]);
        let handle = h
            .dispatcher
            .schedule_task(&json!({}), vec![Arc::clone(&buffer)])
            .unwrap()
            .unwrap();
        handle.wait().unwrap();

        let envelope = h.envelopes.recv_timeout(TIMEOUT).unwrap();
        assert!(envelope.transfer_list().is_empty());
        assert!(!envelope.request().transfer_supported);
        assert_eq!(&envelope.buffers()[0][..], &[7_u8; 16]);
        assert!(!Arc::ptr_eq(&envelope.buffers()[0], &buffer));
    }

    #[test]
    fn test_initialize_configures_every_unit_once() {
        let h = harness(None, 3, native());
        assert_eq!(h.dispatcher.initialize_compute_module(&module_bytes()), Ok(()));
        assert_eq!(h.dispatcher.initialize_compute_module(&module_bytes()), Ok(()));

        for _ in 0..3 {
            let config = h.configs.recv_timeout(TIMEOUT).unwrap();
            assert_eq!(config.binary.as_deref(), Some(&[0_u8, 97, 115, 109][..]));
        }
        assert!(h.configs.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_initialize_reads_module_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\0asm").unwrap();
        let h = harness(None, 1, native());
        let options = ComputeModuleOptions {
            module: ModuleSource::Path(file.path().to_path_buf()),
            fallback_module_path: None,
        };
        assert_eq!(h.dispatcher.initialize_compute_module(&options), Ok(()));

        let config = h.configs.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(config.binary.as_deref(), Some(&b"\0asm"[..]));
        assert_eq!(config.module_path, Some(file.path().display().to_string()));
    }

    #[test]
    fn test_initialize_reports_missing_module() {
        let h = harness(None, 1, native());
        let options = ComputeModuleOptions {
            module: ModuleSource::Path(PathBuf::from("/nonexistent/decoder.wasm")),
            fallback_module_path: None,
        };
        let result = h.dispatcher.initialize_compute_module(&options);
        assert!(matches!(result, Err(DispatchError::ModuleRead { .. })));
        // The failure is remembered.
        assert_eq!(h.dispatcher.initialize_compute_module(&module_bytes()), result);
    }

    #[test]
    fn test_initialize_without_binary_support_uses_fallback() {
        let h = harness(
            None,
            2,
            Capabilities {
                transfer_supported: true,
                binary_modules_supported: false,
            },
        );
        let options = ComputeModuleOptions {
            fallback_module_path: Some("decoder_fallback.js".to_string()),
            ..module_bytes()
        };
        assert_eq!(h.dispatcher.initialize_compute_module(&options), Ok(()));

        let config = h.configs.recv_timeout(TIMEOUT).unwrap();
        assert!(config.binary.is_none());
        assert_eq!(config.fallback_module_path.as_deref(), Some("decoder_fallback.js"));
    }

    #[test]
    fn test_initialize_unsupported_environment() {
        let h = harness(
            None,
            1,
            Capabilities {
                transfer_supported: true,
                binary_modules_supported: false,
            },
        );
        assert_eq!(
            h.dispatcher.initialize_compute_module(&module_bytes()),
            Err(DispatchError::UnsupportedEnvironment)
        );
        // Nothing was sent to any unit.
        assert!(h.configs.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_initialize_surfaces_unit_rejection() {
        let h = harness(None, 2, native());
        let options = ComputeModuleOptions {
            fallback_module_path: Some("reject".to_string()),
            ..module_bytes()
        };
        assert_eq!(
            h.dispatcher.initialize_compute_module(&options),
            Err(DispatchError::Runtime {
                message: "bad module".to_string(),
                stack: None,
            })
        );
    }

    #[test]
    fn test_dispose_without_pool() {
        let h = harness(None, 1, native());
        h.dispatcher.dispose();
        assert!(h.dispatcher.is_disposed());
        h.dispatcher.dispose();

        assert_eq!(
            h.dispatcher.schedule_task(&json!({}), Vec::new()).err(),
            Some(DispatchError::Disposed)
        );
        assert_eq!(
            h.dispatcher.initialize_compute_module(&module_bytes()),
            Err(DispatchError::Disposed)
        );
    }

    #[test]
    fn test_dispose_disconnects_pending_tasks() {
        let h = harness(None, 1, native());
        let pending = h
            .dispatcher
            .schedule_task(&json!({ "block": true }), Vec::new())
            .unwrap()
            .unwrap();
        h.dispatcher.dispose();

        assert_eq!(pending.wait(), Err(DispatchError::Disconnected));
        assert_eq!(h.dispatcher.active_task_count(), 0);
        drop(h.gate);
    }

    #[test]
    fn test_initialization_behind_busy_unit_leaves_dispatcher_responsive() {
        let Harness {
            dispatcher,
            envelopes,
            configs,
            gate,
            ..
        } = harness(None, 1, native());
        let blocked = dispatcher
            .schedule_task(&json!({ "block": true }), Vec::new())
            .unwrap()
            .unwrap();
        // The only unit is now inside the blocking task.
        envelopes.recv_timeout(TIMEOUT).unwrap();

        let (scheduled, disposed) = thread::scope(|scope| {
            let dispatcher = &dispatcher;
            let initializing = scope.spawn(move || dispatcher.initialize_compute_module(&module_bytes()));
            // Let initialization reach the acknowledgment wait.
            thread::sleep(Duration::from_millis(100));
            assert!(configs.try_recv().is_err());

            let (schedule_tx, schedule_rx) = crossbeam_channel::bounded(1);
            scope.spawn(move || {
                let outcome = dispatcher.schedule_task(&json!({ "value": 1 }), Vec::new());
                let _ = schedule_tx.send(outcome.map(|handle| handle.is_some()));
            });
            let scheduled = schedule_rx.recv_timeout(Duration::from_secs(2));

            let (dispose_tx, dispose_rx) = crossbeam_channel::bounded(1);
            scope.spawn(move || {
                dispatcher.dispose();
                let _ = dispose_tx.send(());
            });
            let disposed = dispose_rx.recv_timeout(Duration::from_secs(2));

            // Release the unit so initialization can finish before the scope joins.
            drop(gate);
            let _ = initializing.join();
            (scheduled, disposed)
        });

        assert_eq!(scheduled, Ok(Ok(true)));
        assert_eq!(disposed, Ok(()));
        assert!(dispatcher.is_disposed());
        assert_eq!(blocked.wait(), Err(DispatchError::Disconnected));
    }

    #[test]
    fn test_serialization_failure_releases_slot() {
        struct Unserializable;
        impl Serialize for Unserializable {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("not representable"))
            }
        }

        let h = harness(Some(1), 1, native());
        let result = h.dispatcher.schedule_task(&Unserializable, Vec::new());
        assert!(matches!(result, Err(DispatchError::Serialization(_))));
        assert_eq!(h.dispatcher.active_task_count(), 0);
        assert_eq!(h.received.load(Ordering::SeqCst), 0);
    }
}
