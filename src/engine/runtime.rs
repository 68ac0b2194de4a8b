//! Simulation orchestrator.
//!
//! The engine lives on a dedicated worker thread fed by a bounded channel. Each
//! job carries its own reply channel. The orchestrator tracks the lifecycle
//! `Uninitialized -> Initializing -> Ready -> Loaded <-> Running`, plus
//! `Terminated`, and remembers the fingerprint of the loaded dataset so that
//! identical requests skip the load step. Every spawned worker gets a new
//! generation; replies from an earlier generation are discarded.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::OddsConfig;
use crate::error::{OddsError, OddsResult, OrchestratorError};

use super::protocol::{ErrorStage, RecalculatePayload, RunSimulationPayload, WorkerMessage, WorkerResponse};
use super::{normalize_inputted_times, SimulationDataset, SimulationEngine, SimulationParams, SimulationResult};

/// Builds the engine on the worker thread.
pub type EngineFactory = Arc<dyn Fn() -> Box<dyn SimulationEngine> + Send + Sync>;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum queued jobs on the worker channel.
    pub queue_capacity: usize,
    /// Worker thread name.
    pub thread_name: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            thread_name: "cube-odds-simulation".to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Takes the queue capacity from the crate configuration.
    #[must_use]
    pub fn from_config(config: &OddsConfig) -> Self {
        Self {
            queue_capacity: config.worker_queue_capacity,
            ..Self::default()
        }
    }
}

/// Lifecycle state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrchestratorState {
    /// No worker.
    Uninitialized,
    /// Worker starting; concurrent `initialize` calls wait.
    Initializing,
    /// Engine ready, nothing loaded.
    Ready,
    /// A dataset is loaded.
    Loaded,
    /// A request is in flight.
    Running,
    /// Shut down; only `initialize` revives it.
    Terminated,
}

struct Job {
    request_id: Uuid,
    message: WorkerMessage,
    reply: Sender<WorkerResponse>,
}

struct Worker {
    tx: Sender<Job>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn(config: &OrchestratorConfig, factory: EngineFactory) -> OddsResult<Self> {
        let (tx, rx) = bounded::<Job>(config.queue_capacity.max(1));
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || worker_loop(&rx, &factory))
            .map_err(|e| OrchestratorError::Init {
                message: format!("failed to spawn simulation worker: {e}"),
            })?;
        Ok(Self { tx, handle })
    }

    fn shutdown(self) {
        // Closing the channel lets the worker finish its current job and exit.
        drop(self.tx);
        if self.handle.join().is_err() {
            warn!("simulation worker panicked");
        }
    }
}

#[derive(Debug, Clone)]
struct LoadedDataset {
    fingerprint: String,
    competitors: usize,
    attempts: usize,
}

struct Inner {
    state: OrchestratorState,
    loaded: Option<LoadedDataset>,
    worker: Option<Worker>,
    generation: u64,
    last_init_error: Option<String>,
}

/// Owns the simulation worker and its lifecycle.
///
/// All methods block the calling thread until the worker answers. Overlapping
/// requests are rejected with `OrchestratorError::Busy`.
pub struct SimulationOrchestrator {
    factory: EngineFactory,
    config: OrchestratorConfig,
    inner: Mutex<Inner>,
    settled: Condvar,
}

impl std::fmt::Debug for SimulationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationOrchestrator")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SimulationOrchestrator {
    /// Creates an orchestrator; no thread is started until first use.
    pub fn new<F>(factory: F, config: OrchestratorConfig) -> Self
    where
        F: Fn() -> Box<dyn SimulationEngine> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            config,
            inner: Mutex::new(Inner {
                state: OrchestratorState::Uninitialized,
                loaded: None,
                worker: None,
                generation: 0,
                last_init_error: None,
            }),
            settled: Condvar::new(),
        }
    }

    fn lock(&self) -> OddsResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| OddsError::internal("orchestrator state lock poisoned"))
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> OrchestratorState {
        self.inner
            .lock()
            .map_or(OrchestratorState::Terminated, |inner| inner.state)
    }

    /// Fingerprint of the loaded dataset, if any.
    #[must_use]
    pub fn loaded_fingerprint(&self) -> Option<String> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.loaded.as_ref().map(|l| l.fingerprint.clone()))
    }

    /// Starts the worker and bootstraps the engine.
    ///
    /// Idempotent. Callers arriving while another initialization is in
    /// progress wait for it and share its outcome.
    ///
    /// # Errors
    ///
    /// `OrchestratorError::Init` if the thread cannot start or the engine
    /// bootstrap fails; the state returns to `Uninitialized`.
    pub fn initialize(&self) -> OddsResult<()> {
        let mut inner = self.lock()?;
        let mut waited = false;
        loop {
            match inner.state {
                OrchestratorState::Initializing => {
                    waited = true;
                    inner = self
                        .settled
                        .wait(inner)
                        .map_err(|_| OddsError::internal("orchestrator state lock poisoned"))?;
                }
                OrchestratorState::Uninitialized if waited => {
                    let message = inner
                        .last_init_error
                        .clone()
                        .unwrap_or_else(|| "initialization failed".to_string());
                    return Err(OrchestratorError::Init { message }.into());
                }
                OrchestratorState::Uninitialized | OrchestratorState::Terminated => break,
                OrchestratorState::Ready | OrchestratorState::Loaded | OrchestratorState::Running => {
                    return Ok(());
                }
            }
        }

        inner.state = OrchestratorState::Initializing;
        inner.loaded = None;
        inner.generation += 1;
        let generation = inner.generation;
        info!(thread = %self.config.thread_name, "starting simulation worker");
        let worker = match Worker::spawn(&self.config, Arc::clone(&self.factory)) {
            Ok(worker) => worker,
            Err(err) => {
                inner.state = OrchestratorState::Uninitialized;
                inner.last_init_error = Some(err.to_string());
                self.settled.notify_all();
                return Err(err);
            }
        };
        let tx = worker.tx.clone();
        inner.worker = Some(worker);
        drop(inner);

        let response = send(&tx, WorkerMessage::Initialize {});
        drop(tx);

        let mut inner = self.lock()?;
        if inner.generation != generation || inner.state == OrchestratorState::Terminated {
            self.settled.notify_all();
            return Err(OrchestratorError::Terminated.into());
        }
        let outcome = match response {
            Ok(WorkerResponse::Initialized {}) => {
                inner.state = OrchestratorState::Ready;
                inner.last_init_error = None;
                info!("simulation engine ready");
                Ok(())
            }
            Ok(WorkerResponse::SimulationError { error, .. }) => Err(OrchestratorError::Init { message: error }.into()),
            Ok(other) => Err(OddsError::internal(format!("unexpected reply to INITIALIZE: {other:?}"))),
            Err(err) => Err(err),
        };
        if let Err(err) = &outcome {
            warn!(error = %err, "simulation engine failed to initialize");
            inner.state = OrchestratorState::Uninitialized;
            inner.last_init_error = Some(err.to_string());
            if let Some(worker) = inner.worker.take() {
                worker.shutdown();
            }
        }
        self.settled.notify_all();
        outcome
    }

    /// Runs a simulation, loading `dataset` unless it is already loaded.
    ///
    /// # Errors
    ///
    /// Validation errors for bad input; `OrchestratorError::Load`/`Run` for
    /// engine failures; `Busy` while another request runs; `Terminated` after
    /// [`Self::terminate`].
    pub fn run_simulation(
        &self,
        dataset: &SimulationDataset,
        params: SimulationParams,
    ) -> OddsResult<Vec<SimulationResult>> {
        dataset.validate()?;
        let competitors = dataset.competitor_ids.len();
        let attempts = dataset.event.attempts();
        let params = SimulationParams {
            inputted_times: normalize_inputted_times(&params.inputted_times, competitors, attempts)?,
            ..params
        };

        let mut inner = self.lock()?;
        loop {
            match inner.state {
                OrchestratorState::Terminated => return Err(OrchestratorError::Terminated.into()),
                OrchestratorState::Running => return Err(OrchestratorError::Busy.into()),
                OrchestratorState::Ready | OrchestratorState::Loaded => break,
                OrchestratorState::Uninitialized | OrchestratorState::Initializing => {
                    drop(inner);
                    self.initialize()?;
                    inner = self.lock()?;
                }
            }
        }

        let fingerprint = dataset.fingerprint();
        let reload = inner.loaded.as_ref().map(|l| l.fingerprint.as_str()) != Some(fingerprint.as_str());
        let message = if reload {
            WorkerMessage::RunSimulation(RunSimulationPayload::new(dataset, &params))
        } else {
            WorkerMessage::RecalculateSimulation(RecalculatePayload::from(params))
        };
        let loaded = LoadedDataset {
            fingerprint,
            competitors,
            attempts,
        };
        self.dispatch_locked(inner, message, Some(loaded))
    }

    /// Runs again over the loaded dataset with new parameters.
    ///
    /// # Errors
    ///
    /// `OrchestratorError::NotLoaded` unless a dataset is loaded.
    pub fn recalculate(&self, params: SimulationParams) -> OddsResult<Vec<SimulationResult>> {
        let inner = self.lock()?;
        let loaded = match inner.state {
            OrchestratorState::Terminated => return Err(OrchestratorError::Terminated.into()),
            OrchestratorState::Running => return Err(OrchestratorError::Busy.into()),
            OrchestratorState::Loaded => inner.loaded.clone().ok_or(OrchestratorError::NotLoaded)?,
            _ => return Err(OrchestratorError::NotLoaded.into()),
        };
        let params = SimulationParams {
            inputted_times: normalize_inputted_times(&params.inputted_times, loaded.competitors, loaded.attempts)?,
            ..params
        };
        let message = WorkerMessage::RecalculateSimulation(RecalculatePayload::from(params));
        self.dispatch_locked(inner, message, Some(loaded))
    }

    /// Handles a raw protocol message, always answering with a response.
    ///
    /// Failures are reported as `SIMULATION_ERROR` with the failing stage.
    pub fn handle_message(&self, message: WorkerMessage) -> WorkerResponse {
        match message {
            WorkerMessage::Initialize {} => match self.initialize() {
                Ok(()) => WorkerResponse::Initialized {},
                Err(err) => WorkerResponse::error(ErrorStage::Init, err),
            },
            WorkerMessage::RunSimulation(payload) => {
                let outcome = payload
                    .into_parts()
                    .map_err(OddsError::from)
                    .and_then(|(dataset, params)| self.run_simulation(&dataset, params));
                complete(outcome, ErrorStage::Load)
            }
            WorkerMessage::RecalculateSimulation(payload) => {
                complete(self.recalculate(payload.into()), ErrorStage::Run)
            }
        }
    }

    /// Sends `message` with the state lock held on entry and settles the state
    /// from the worker's answer.
    fn dispatch_locked(
        &self,
        mut inner: MutexGuard<'_, Inner>,
        message: WorkerMessage,
        dataset: Option<LoadedDataset>,
    ) -> OddsResult<Vec<SimulationResult>> {
        let tx = inner
            .worker
            .as_ref()
            .map(|w| w.tx.clone())
            .ok_or(OrchestratorError::Disconnected)?;
        let previous = inner.state;
        let generation = inner.generation;
        inner.state = OrchestratorState::Running;
        drop(inner);

        debug!(kind = message.kind(), "dispatching simulation request");
        let response = send(&tx, message);
        drop(tx);

        let mut inner = self.lock()?;
        if inner.generation != generation || inner.state == OrchestratorState::Terminated {
            debug!(generation, current = inner.generation, "discarding reply from a terminated worker");
            self.settled.notify_all();
            return Err(OrchestratorError::Terminated.into());
        }
        let outcome = match response {
            Ok(WorkerResponse::SimulationComplete { results }) => {
                inner.state = OrchestratorState::Loaded;
                inner.loaded = dataset;
                Ok(results)
            }
            Ok(WorkerResponse::SimulationError { error, stage }) => {
                let err = match stage {
                    ErrorStage::Load => {
                        inner.state = OrchestratorState::Ready;
                        inner.loaded = None;
                        OrchestratorError::Load { message: error }
                    }
                    ErrorStage::Run => {
                        inner.state = OrchestratorState::Loaded;
                        inner.loaded = dataset;
                        OrchestratorError::Run { message: error }
                    }
                    ErrorStage::NotLoaded => {
                        inner.state = OrchestratorState::Ready;
                        inner.loaded = None;
                        OrchestratorError::NotLoaded
                    }
                    ErrorStage::Init => {
                        inner.state = OrchestratorState::Uninitialized;
                        inner.loaded = None;
                        OrchestratorError::Init { message: error }
                    }
                };
                warn!(?stage, error = %err, "simulation request failed");
                Err(err.into())
            }
            Ok(WorkerResponse::Initialized {}) => {
                inner.state = previous;
                Err(OddsError::internal("unexpected INITIALIZED reply to a simulation request"))
            }
            Err(err) => {
                warn!(error = %err, "simulation worker lost");
                inner.state = OrchestratorState::Uninitialized;
                inner.loaded = None;
                if let Some(worker) = inner.worker.take() {
                    drop(inner);
                    worker.shutdown();
                    self.settled.notify_all();
                    return Err(err);
                }
                Err(err)
            }
        };
        self.settled.notify_all();
        outcome
    }

    /// Stops the worker. In-flight requests settle with `Terminated`.
    pub fn terminate(&self) {
        let worker = match self.inner.lock() {
            Ok(mut inner) => {
                if inner.state != OrchestratorState::Terminated {
                    info!("terminating simulation worker");
                }
                inner.state = OrchestratorState::Terminated;
                inner.loaded = None;
                inner.generation += 1;
                inner.worker.take()
            }
            Err(poisoned) => {
                let mut inner = poisoned.into_inner();
                inner.generation += 1;
                inner.worker.take()
            }
        };
        self.settled.notify_all();
        if let Some(worker) = worker {
            worker.shutdown();
        }
    }
}

impl Drop for SimulationOrchestrator {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn complete(outcome: OddsResult<Vec<SimulationResult>>, validation_stage: ErrorStage) -> WorkerResponse {
    match outcome {
        Ok(results) => WorkerResponse::SimulationComplete { results },
        Err(err) => {
            let stage = match &err {
                OddsError::Orchestrator(OrchestratorError::Init { .. }) => ErrorStage::Init,
                OddsError::Orchestrator(OrchestratorError::Load { .. }) => ErrorStage::Load,
                OddsError::Orchestrator(OrchestratorError::NotLoaded) => ErrorStage::NotLoaded,
                OddsError::Validation(_) => validation_stage,
                _ => ErrorStage::Run,
            };
            WorkerResponse::error(stage, err)
        }
    }
}

fn send(tx: &Sender<Job>, message: WorkerMessage) -> OddsResult<WorkerResponse> {
    let (reply, rx) = bounded::<WorkerResponse>(1);
    let job = Job {
        request_id: Uuid::new_v4(),
        message,
        reply,
    };
    match tx.try_send(job) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => return Err(OrchestratorError::Busy.into()),
        Err(TrySendError::Disconnected(_)) => return Err(OrchestratorError::Disconnected.into()),
    }
    rx.recv().map_err(|_| OrchestratorError::Disconnected.into())
}

/// Worker-side engine state.
struct WorkerState {
    factory: EngineFactory,
    engine: Option<Box<dyn SimulationEngine>>,
    loaded: Option<(usize, usize)>,
}

impl WorkerState {
    fn new(factory: EngineFactory) -> Self {
        Self {
            factory,
            engine: None,
            loaded: None,
        }
    }

    fn handle(&mut self, message: WorkerMessage) -> WorkerResponse {
        match message {
            WorkerMessage::Initialize {} => match self.ensure_engine() {
                Ok(_) => WorkerResponse::Initialized {},
                Err(err) => WorkerResponse::error(ErrorStage::Init, err),
            },
            WorkerMessage::RunSimulation(payload) => {
                self.loaded = None;
                let (dataset, params) = match payload.into_parts() {
                    Ok(parts) => parts,
                    Err(err) => return WorkerResponse::error(ErrorStage::Load, err),
                };
                let engine = match self.ensure_engine() {
                    Ok(engine) => engine,
                    Err(err) => return WorkerResponse::error(ErrorStage::Init, err),
                };
                if let Err(err) = engine.load(&dataset) {
                    return WorkerResponse::error(ErrorStage::Load, err);
                }
                let shape = (dataset.competitor_ids.len(), dataset.event.attempts());
                self.loaded = Some(shape);
                self.run(params, shape)
            }
            WorkerMessage::RecalculateSimulation(payload) => match self.loaded {
                Some(shape) => self.run(payload.into(), shape),
                None => WorkerResponse::error(
                    ErrorStage::NotLoaded,
                    "data not loaded; run an initial simulation first",
                ),
            },
        }
    }

    fn ensure_engine(&mut self) -> OddsResult<&mut Box<dyn SimulationEngine>> {
        if self.engine.is_none() {
            let mut engine = (self.factory)();
            engine.initialize()?;
            self.engine = Some(engine);
        }
        self.engine
            .as_mut()
            .ok_or_else(|| OddsError::internal("engine missing after initialization"))
    }

    fn run(&mut self, params: SimulationParams, (competitors, attempts): (usize, usize)) -> WorkerResponse {
        let inputted_times = match normalize_inputted_times(&params.inputted_times, competitors, attempts) {
            Ok(times) => times,
            Err(err) => return WorkerResponse::error(ErrorStage::Run, err),
        };
        let params = SimulationParams { inputted_times, ..params };
        let Some(engine) = self.engine.as_mut() else {
            return WorkerResponse::error(ErrorStage::NotLoaded, "engine not initialized");
        };
        match engine.run(&params) {
            Ok(results) => WorkerResponse::SimulationComplete { results },
            Err(err) => WorkerResponse::error(ErrorStage::Run, err),
        }
    }
}

fn worker_loop(rx: &Receiver<Job>, factory: &EngineFactory) {
    let mut state = WorkerState::new(Arc::clone(factory));
    while let Ok(job) = rx.recv() {
        debug!(request_id = %job.request_id, kind = job.message.kind(), "worker received job");
        let response = state.handle(job.message);
        let _ = job.reply.send(response);
    }
    debug!("simulation worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::Utc;

    use crate::event::EventId;
    use crate::time::DateWindow;

    #[derive(Default)]
    struct Counters {
        inits: AtomicUsize,
        loads: AtomicUsize,
        runs: AtomicUsize,
    }

    struct CountingEngine {
        counters: Arc<Counters>,
        fail_load: bool,
        delay: Duration,
        init_delay: Duration,
    }

    impl SimulationEngine for CountingEngine {
        fn initialize(&mut self) -> OddsResult<()> {
            thread::sleep(self.init_delay);
            self.counters.inits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn load(&mut self, _dataset: &SimulationDataset) -> OddsResult<()> {
            self.counters.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_load {
                return Err(OddsError::internal("no history"));
            }
            Ok(())
        }

        fn run(&mut self, params: &SimulationParams) -> OddsResult<Vec<SimulationResult>> {
            thread::sleep(self.delay);
            self.counters.runs.fetch_add(1, Ordering::SeqCst);
            Ok(params
                .inputted_times
                .iter()
                .map(|_| SimulationResult::default())
                .collect())
        }
    }

    fn orchestrator(fail_load: bool, delay: Duration) -> (SimulationOrchestrator, Arc<Counters>) {
        slow_orchestrator(fail_load, delay, Duration::ZERO)
    }

    fn slow_orchestrator(
        fail_load: bool,
        delay: Duration,
        init_delay: Duration,
    ) -> (SimulationOrchestrator, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let shared = Arc::clone(&counters);
        let orchestrator = SimulationOrchestrator::new(
            move || {
                Box::new(CountingEngine {
                    counters: Arc::clone(&shared),
                    fail_load,
                    delay,
                    init_delay,
                }) as Box<dyn SimulationEngine>
            },
            OrchestratorConfig::default(),
        );
        (orchestrator, counters)
    }

    fn dataset() -> SimulationDataset {
        SimulationDataset::new(
            vec!["A".to_string(), "B".to_string()],
            EventId::Cube3,
            DateWindow::new(Utc::now() - chrono::Duration::days(365), Utc::now()).unwrap(),
            180.0,
        )
    }

    #[test]
    fn initialize_is_idempotent() {
        let (orchestrator, counters) = orchestrator(false, Duration::ZERO);
        assert_eq!(orchestrator.state(), OrchestratorState::Uninitialized);
        orchestrator.initialize().unwrap();
        orchestrator.initialize().unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::Ready);
        assert_eq!(counters.inits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_initializers_share_one_bootstrap() {
        let (orchestrator, counters) = slow_orchestrator(false, Duration::ZERO, Duration::from_millis(200));
        thread::scope(|scope| {
            let callers: Vec<_> = (0..8).map(|_| scope.spawn(|| orchestrator.initialize())).collect();
            for caller in callers {
                caller.join().unwrap().unwrap();
            }
        });
        assert_eq!(counters.inits.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.state(), OrchestratorState::Ready);
    }

    #[test]
    fn identical_dataset_is_loaded_once() {
        let (orchestrator, counters) = orchestrator(false, Duration::ZERO);
        let field = dataset();
        let results = orchestrator
            .run_simulation(&field, SimulationParams::new(10, true))
            .unwrap();
        assert_eq!(results.len(), 2);
        orchestrator
            .run_simulation(&field.clone(), SimulationParams::new(20, false))
            .unwrap();

        assert_eq!(counters.loads.load(Ordering::SeqCst), 1);
        assert_eq!(counters.runs.load(Ordering::SeqCst), 2);
        assert_eq!(orchestrator.state(), OrchestratorState::Loaded);
        assert_eq!(orchestrator.loaded_fingerprint(), Some(field.fingerprint()));
    }

    #[test]
    fn load_failure_resets_to_ready() {
        let (orchestrator, counters) = orchestrator(true, Duration::ZERO);
        let err = orchestrator
            .run_simulation(&dataset(), SimulationParams::new(10, true))
            .unwrap_err();
        assert!(matches!(err, OddsError::Orchestrator(OrchestratorError::Load { .. })));
        assert_eq!(orchestrator.state(), OrchestratorState::Ready);

        let err = orchestrator.recalculate(SimulationParams::new(10, true)).unwrap_err();
        assert!(matches!(err, OddsError::Orchestrator(OrchestratorError::NotLoaded)));
        assert_eq!(counters.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn overlapping_requests_are_rejected() {
        let (orchestrator, _) = orchestrator(false, Duration::from_millis(300));
        orchestrator
            .run_simulation(&dataset(), SimulationParams::new(1, true))
            .unwrap();

        thread::scope(|scope| {
            let first = scope.spawn(|| orchestrator.recalculate(SimulationParams::new(1, true)));
            let deadline = std::time::Instant::now() + Duration::from_secs(2);
            while orchestrator.state() != OrchestratorState::Running && std::time::Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            let err = orchestrator.recalculate(SimulationParams::new(1, true)).unwrap_err();
            assert!(matches!(err, OddsError::Orchestrator(OrchestratorError::Busy)));
            first.join().unwrap().unwrap();
        });
    }

    #[test]
    fn terminated_orchestrator_rejects_runs_until_reinitialized() {
        let (orchestrator, counters) = orchestrator(false, Duration::ZERO);
        orchestrator.initialize().unwrap();
        orchestrator.terminate();
        assert_eq!(orchestrator.state(), OrchestratorState::Terminated);

        let err = orchestrator
            .run_simulation(&dataset(), SimulationParams::new(1, true))
            .unwrap_err();
        assert!(matches!(err, OddsError::Orchestrator(OrchestratorError::Terminated)));

        orchestrator.initialize().unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::Ready);
        assert_eq!(counters.inits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reply_from_a_terminated_worker_is_discarded() {
        let (orchestrator, counters) = orchestrator(false, Duration::from_millis(300));
        let field = dataset();
        orchestrator
            .run_simulation(&field, SimulationParams::new(1, true))
            .unwrap();

        thread::scope(|scope| {
            let stale = scope.spawn(|| orchestrator.recalculate(SimulationParams::new(1, true)));
            let deadline = std::time::Instant::now() + Duration::from_secs(2);
            while orchestrator.state() != OrchestratorState::Running && std::time::Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            orchestrator.terminate();
            orchestrator.initialize().unwrap();

            let err = stale.join().unwrap().unwrap_err();
            assert!(matches!(err, OddsError::Orchestrator(OrchestratorError::Terminated)));
        });

        assert_eq!(orchestrator.state(), OrchestratorState::Ready);
        assert_eq!(orchestrator.loaded_fingerprint(), None);

        orchestrator
            .run_simulation(&field, SimulationParams::new(1, true))
            .unwrap();
        assert_eq!(counters.loads.load(Ordering::SeqCst), 2);
        assert_eq!(orchestrator.loaded_fingerprint(), Some(field.fingerprint()));
    }

    #[test]
    fn worker_state_requires_a_load_before_recalculate() {
        let counters = Arc::new(Counters::default());
        let shared = Arc::clone(&counters);
        let factory: EngineFactory = Arc::new(move || {
            Box::new(CountingEngine {
                counters: Arc::clone(&shared),
                fail_load: false,
                delay: Duration::ZERO,
                init_delay: Duration::ZERO,
            }) as Box<dyn SimulationEngine>
        });
        let mut state = WorkerState::new(factory);

        let response = state.handle(WorkerMessage::RecalculateSimulation(SimulationParams::new(1, true).into()));
        assert!(matches!(
            response,
            WorkerResponse::SimulationError {
                stage: ErrorStage::NotLoaded,
                ..
            }
        ));

        let payload = RunSimulationPayload::new(&dataset(), &SimulationParams::new(1, true));
        let response = state.handle(WorkerMessage::RunSimulation(payload));
        assert!(matches!(response, WorkerResponse::SimulationComplete { ref results } if results.len() == 2));

        let bad_shape = SimulationParams::new(1, true).with_inputted_times(vec![vec![0; 5]]);
        let response = state.handle(WorkerMessage::RecalculateSimulation(bad_shape.into()));
        assert!(matches!(response, WorkerResponse::SimulationError { stage: ErrorStage::Run, .. }));
        assert_eq!(counters.inits.load(Ordering::SeqCst), 1);
    }
}
