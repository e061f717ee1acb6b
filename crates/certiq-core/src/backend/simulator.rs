//! State-vector simulator backend.
//!
//! Executes the gate set of [`crate::circuit::Gate`] exactly on a complex
//! amplitude vector, then samples shots from the final distribution. Jobs run
//! on their own thread and stay in a bounded in-memory registry until their
//! result is released, so a checkpointed sampling run can be recovered through
//! [`Backend::retrieve_job`].
//!
//! With a job store ([`SimulatorBackend::with_job_store`]) every finished
//! result is also written to `<store>/certiq_job_<id>.json`, which lets a new
//! process recover a run whose jobs completed before it was collected.

use std::collections::{HashMap, VecDeque};
use std::f64::consts::FRAC_1_SQRT_2;
use std::io::ErrorKind;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};

use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Backend, BackendConfiguration, ExperimentResult, Job, JobResult, JobStatus};
use crate::circuit::{Gate, QuantumCircuit};
use crate::error::{Result, RngError};

/// Largest register the simulator accepts.
pub const MAX_SIMULATED_QUBITS: usize = 16;

/// Jobs kept in memory before the oldest unreleased ones are dropped.
pub const MAX_RETAINED_JOBS: usize = 1024;

/// Classical noise applied at readout.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NoiseModel {
    /// Probability that each measured bit is flipped independently.
    pub readout_error: f64,
}

impl NoiseModel {
    pub fn readout(p: f64) -> Self {
        Self { readout_error: p }
    }

    /// Mermin correlator this noise model produces on ideal circuits.
    ///
    /// Only rounds with an odd number of Y measurements can be lost, and they
    /// are lost exactly when readout noise flips the parity.
    pub fn expected_correlator(&self) -> f64 {
        let p = self.readout_error;
        let parity_flip = 3.0 * p * (1.0 - p).powi(2) + p.powi(3);
        4.0 - 8.0 * parity_flip
    }
}

/// Built-in device profiles: (name, readout error).
///
/// Readout errors are chosen so that [`NoiseModel::expected_correlator`]
/// matches the profiled correlator of the device of the same name.
const PROFILES: &[(&str, f64)] = &[("ibmq_ourense", 0.0383), ("ibmq_valencia", 0.0467)];

/// Names of the built-in device profiles.
pub fn profile_names() -> Vec<&'static str> {
    PROFILES.iter().map(|(name, _)| *name).collect()
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Submitted jobs in submission order, capped at `capacity`.
struct JobRegistry {
    jobs: HashMap<String, Arc<SimulatorJob>>,
    order: VecDeque<String>,
    capacity: usize,
}

impl JobRegistry {
    fn new(capacity: usize) -> Self {
        Self {
            jobs: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn insert(&mut self, job: Arc<SimulatorJob>) {
        while self.order.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.jobs.remove(&oldest);
            log::debug!("Simulator registry full, dropped job {oldest}");
        }
        self.order.push_back(job.job_id.clone());
        self.jobs.insert(job.job_id.clone(), job);
    }

    fn remove(&mut self, job_id: &str) {
        if self.jobs.remove(job_id).is_some() {
            self.order.retain(|id| id != job_id);
        }
    }
}

fn job_file(store: &Path, job_id: &str) -> PathBuf {
    store.join(format!("certiq_job_{job_id}.json"))
}

fn store_result(store: &Path, result: &JobResult) -> Result<()> {
    std::fs::create_dir_all(store)?;
    let path = job_file(store, &result.job_id);
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_string(result)?)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// In-process quantum backend.
pub struct SimulatorBackend {
    config: BackendConfiguration,
    noise: NoiseModel,
    seed: Option<u64>,
    submitted: AtomicU64,
    jobs: Arc<Mutex<JobRegistry>>,
    job_store: Option<PathBuf>,
}

impl Default for SimulatorBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatorBackend {
    /// Noiseless simulator.
    pub fn new() -> Self {
        Self::with_configuration(BackendConfiguration {
            name: "statevector_simulator".to_string(),
            num_qubits: 8,
            max_shots: 8192,
            max_experiments: 300,
            simulator: true,
        })
    }

    pub fn with_configuration(config: BackendConfiguration) -> Self {
        Self {
            config,
            noise: NoiseModel::default(),
            seed: None,
            submitted: AtomicU64::new(0),
            jobs: Arc::new(Mutex::new(JobRegistry::new(MAX_RETAINED_JOBS))),
            job_store: None,
        }
    }

    /// Simulator mimicking a profiled device, or `None` for unknown names.
    pub fn profile(name: &str) -> Option<Self> {
        let &(profile_name, readout) = PROFILES.iter().find(|(n, _)| *n == name)?;
        let backend = Self::with_configuration(BackendConfiguration {
            name: profile_name.to_string(),
            num_qubits: 5,
            max_shots: 8192,
            max_experiments: 75,
            simulator: true,
        })
        .with_noise(NoiseModel::readout(readout));
        Some(backend)
    }

    pub fn with_noise(mut self, noise: NoiseModel) -> Self {
        self.noise = noise;
        self
    }

    /// Fix the sampling seed. Job `k` uses `seed + k`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_limits(mut self, max_shots: usize, max_experiments: usize) -> Self {
        self.config.max_shots = max_shots;
        self.config.max_experiments = max_experiments;
        self
    }

    /// Persist finished results under `dir` so other processes can retrieve them.
    pub fn with_job_store(mut self, dir: impl Into<PathBuf>) -> Self {
        self.job_store = Some(dir.into());
        self
    }

    /// Keep at most `capacity` unreleased jobs in memory.
    pub fn with_job_capacity(self, capacity: usize) -> Self {
        *lock(&self.jobs) = JobRegistry::new(capacity);
        self
    }

    pub fn noise(&self) -> NoiseModel {
        self.noise
    }

    pub fn job_store(&self) -> Option<&Path> {
        self.job_store.as_deref()
    }

    /// Number of jobs currently held in memory.
    pub fn job_count(&self) -> usize {
        lock(&self.jobs).jobs.len()
    }

    fn load_stored_job(&self, store: &Path, job_id: &str) -> Result<Arc<SimulatorJob>> {
        // Ids come from checkpoint files; only uuids map to store paths.
        if Uuid::parse_str(job_id).is_err() {
            return Err(RngError::JobNotFound(job_id.to_string()));
        }
        let path = job_file(store, job_id);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RngError::JobNotFound(job_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let result: JobResult = serde_json::from_str(&text)?;
        if result.job_id != job_id || result.backend_name != self.config.name {
            return Err(RngError::backend(
                &self.config.name,
                format!(
                    "stored job {} belongs to job {} on {}",
                    path.display(),
                    result.job_id,
                    result.backend_name
                ),
            ));
        }
        let job = Arc::new(SimulatorJob::new(
            job_id.to_string(),
            &self.config.name,
            Arc::downgrade(&self.jobs),
            Some(store.to_path_buf()),
        ));
        job.set(JobState::Done(result));
        lock(&self.jobs).insert(Arc::clone(&job));
        log::info!("Reloaded simulator job {job_id} from {}", path.display());
        Ok(job)
    }

    fn validate(&self, circuits: &[QuantumCircuit], shots: usize) -> Result<()> {
        let name = &self.config.name;
        if circuits.is_empty() {
            return Err(RngError::backend(name, "no circuits submitted"));
        }
        if shots == 0 || shots > self.config.max_shots {
            return Err(RngError::backend(
                name,
                format!("shots must be in 1..={}, got {shots}", self.config.max_shots),
            ));
        }
        if circuits.len() > self.config.max_experiments {
            return Err(RngError::backend(
                name,
                format!(
                    "{} circuits exceed max_experiments={}",
                    circuits.len(),
                    self.config.max_experiments
                ),
            ));
        }
        let limit = self.config.num_qubits.min(MAX_SIMULATED_QUBITS);
        for qc in circuits {
            if qc.num_qubits() > limit {
                return Err(RngError::backend(
                    name,
                    format!("circuit {} needs {} qubits, backend has {limit}", qc.name(), qc.num_qubits()),
                ));
            }
            if qc.max_qubit_index().is_some_and(|q| q >= qc.num_qubits()) {
                return Err(RngError::backend(
                    name,
                    format!("circuit {} references a qubit outside its register", qc.name()),
                ));
            }
            if !qc.is_measured() {
                return Err(RngError::backend(
                    name,
                    format!("circuit {} has no final measurement", qc.name()),
                ));
            }
        }
        Ok(())
    }
}

impl Backend for SimulatorBackend {
    fn configuration(&self) -> &BackendConfiguration {
        &self.config
    }

    fn run(&self, circuits: &[QuantumCircuit], shots: usize) -> Result<Arc<dyn Job>> {
        self.validate(circuits, shots)?;

        let index = self.submitted.fetch_add(1, Ordering::Relaxed);
        let seed = match self.seed {
            Some(s) => s.wrapping_add(index),
            None => rand::random::<u64>(),
        };
        let job = Arc::new(SimulatorJob::new(
            Uuid::new_v4().to_string(),
            &self.config.name,
            Arc::downgrade(&self.jobs),
            self.job_store.clone(),
        ));
        lock(&self.jobs).insert(Arc::clone(&job));

        log::debug!(
            "Simulator {} accepted job {} ({} circuits x {shots} shots)",
            self.config.name,
            job.job_id,
            circuits.len()
        );

        let circuits = circuits.to_vec();
        let noise = self.noise;
        spawn_worker(Arc::clone(&job), move || {
            let mut rng = StdRng::seed_from_u64(seed);
            circuits
                .iter()
                .map(|qc| execute(qc, shots, noise, &mut rng))
                .collect()
        });

        Ok(job as Arc<dyn Job>)
    }

    fn retrieve_job(&self, job_id: &str) -> Result<Arc<dyn Job>> {
        if let Some(job) = lock(&self.jobs).jobs.get(job_id) {
            return Ok(Arc::clone(job) as Arc<dyn Job>);
        }
        match &self.job_store {
            Some(store) => Ok(self.load_stored_job(store, job_id)? as Arc<dyn Job>),
            None => Err(RngError::JobNotFound(job_id.to_string())),
        }
    }

    fn supports_checkpoint(&self) -> bool {
        true
    }
}

/// Run `work` on its own thread and publish its outcome on `job`.
///
/// A panic inside `work` marks the job failed instead of leaving waiters
/// blocked forever.
fn spawn_worker<F>(job: Arc<SimulatorJob>, work: F)
where
    F: FnOnce() -> Vec<ExperimentResult> + Send + 'static,
{
    std::thread::spawn(move || {
        job.set(JobState::Running);
        match catch_unwind(AssertUnwindSafe(work)) {
            Ok(experiments) => {
                let result = JobResult {
                    job_id: job.job_id.clone(),
                    backend_name: job.backend_name.clone(),
                    experiments,
                };
                if let Some(store) = &job.store {
                    if let Err(e) = store_result(store, &result) {
                        log::warn!("Unable to store job {} in {}: {e}", job.job_id, store.display());
                    }
                }
                job.set(JobState::Done(result));
            }
            Err(_) => {
                log::error!("Simulator worker for job {} panicked", job.job_id);
                job.set(JobState::Failed("simulator worker panicked".to_string()));
            }
        }
    });
}

enum JobState {
    Queued,
    Running,
    Done(JobResult),
    Failed(String),
}

/// Job executing on a simulator worker thread.
pub struct SimulatorJob {
    job_id: String,
    backend_name: String,
    state: Mutex<JobState>,
    finished: Condvar,
    registry: Weak<Mutex<JobRegistry>>,
    store: Option<PathBuf>,
}

impl SimulatorJob {
    fn new(
        job_id: String,
        backend_name: &str,
        registry: Weak<Mutex<JobRegistry>>,
        store: Option<PathBuf>,
    ) -> Self {
        Self {
            job_id,
            backend_name: backend_name.to_string(),
            state: Mutex::new(JobState::Queued),
            finished: Condvar::new(),
            registry,
            store,
        }
    }

    fn set(&self, state: JobState) {
        *lock(&self.state) = state;
        self.finished.notify_all();
    }
}

impl Job for SimulatorJob {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn backend_name(&self) -> &str {
        &self.backend_name
    }

    fn status(&self) -> JobStatus {
        match *lock(&self.state) {
            JobState::Queued => JobStatus::Queued,
            JobState::Running => JobStatus::Running,
            JobState::Done(_) => JobStatus::Done,
            JobState::Failed(_) => JobStatus::Error,
        }
    }

    fn result(&self) -> Result<JobResult> {
        let mut state = lock(&self.state);
        loop {
            match &*state {
                JobState::Done(result) => return Ok(result.clone()),
                JobState::Failed(message) => return Err(RngError::job(&self.job_id, message.clone())),
                JobState::Queued | JobState::Running => {}
            }
            state = self
                .finished
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn release(&self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove(&self.job_id);
        }
        if let Some(store) = &self.store {
            let path = job_file(store, &self.job_id);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => log::warn!("Unable to delete stored job {}: {e}", path.display()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// State-vector execution
// ---------------------------------------------------------------------------

fn apply_gate(state: &mut [Complex64], gate: Gate) {
    match gate {
        Gate::H(q) => {
            let m = 1usize << q;
            for i in 0..state.len() {
                if i & m == 0 {
                    let a = state[i];
                    let b = state[i | m];
                    state[i] = (a + b) * FRAC_1_SQRT_2;
                    state[i | m] = (a - b) * FRAC_1_SQRT_2;
                }
            }
        }
        Gate::Cx(c, t) => {
            let cm = 1usize << c;
            let tm = 1usize << t;
            for i in 0..state.len() {
                if i & cm != 0 && i & tm == 0 {
                    state.swap(i, i | tm);
                }
            }
        }
        Gate::S(q) | Gate::Sdg(q) => {
            let m = 1usize << q;
            let phase = if matches!(gate, Gate::S(_)) {
                Complex64::i()
            } else {
                -Complex64::i()
            };
            for (i, amp) in state.iter_mut().enumerate() {
                if i & m != 0 {
                    *amp *= phase;
                }
            }
        }
        Gate::Barrier | Gate::MeasureAll => {}
    }
}

/// Final-state probabilities of a circuit, indexed by basis state (qubit 0 = LSB).
pub fn probabilities(qc: &QuantumCircuit) -> Vec<f64> {
    let mut state = vec![Complex64::new(0.0, 0.0); 1usize << qc.num_qubits()];
    state[0] = Complex64::new(1.0, 0.0);
    for &gate in qc.gates() {
        apply_gate(&mut state, gate);
    }
    state.iter().map(|a| a.norm_sqr()).collect()
}

fn execute(qc: &QuantumCircuit, shots: usize, noise: NoiseModel, rng: &mut StdRng) -> ExperimentResult {
    let n = qc.num_qubits();
    let probs = probabilities(qc);
    let mut cumulative = Vec::with_capacity(probs.len());
    let mut acc = 0.0;
    for p in &probs {
        acc += p;
        cumulative.push(acc);
    }

    let memory = (0..shots)
        .map(|_| {
            let r: f64 = rng.random::<f64>() * acc;
            let mut outcome = cumulative.partition_point(|&c| c <= r).min(probs.len() - 1);
            if noise.readout_error > 0.0 {
                for q in 0..n {
                    if rng.random::<f64>() < noise.readout_error {
                        outcome ^= 1 << q;
                    }
                }
            }
            (0..n)
                .rev()
                .map(|q| if outcome >> q & 1 == 1 { '1' } else { '0' })
                .collect::<String>()
        })
        .collect();

    ExperimentResult {
        name: qc.name().to_string(),
        shots,
        memory,
    }
}
