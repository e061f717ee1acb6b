//! Backend and job abstractions.
//!
//! A [`Backend`] executes measured circuits and hands back a [`Job`]. Jobs
//! resolve to a [`JobResult`] holding per-shot measurement memory. Real
//! provider backends plug in by implementing these two traits; the crate
//! ships a state-vector [`SimulatorBackend`].

pub mod manager;
pub mod simulator;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::circuit::QuantumCircuit;
use crate::error::{Result, RngError};

pub use manager::{JobManager, ManagedJobSet};
pub use simulator::{NoiseModel, SimulatorBackend};

/// Static limits and identity of a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfiguration {
    /// Backend name (e.g. `"ibmq_valencia"`).
    pub name: String,
    /// Number of qubits available.
    pub num_qubits: usize,
    /// Maximum shots per circuit.
    pub max_shots: usize,
    /// Maximum circuits accepted in a single job.
    pub max_experiments: usize,
    /// Whether this is a simulator.
    pub simulator: bool,
}

/// Lifecycle of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl JobStatus {
    /// True once the job can no longer change state.
    pub fn is_final(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Measurement memory of one executed circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentResult {
    /// Circuit name.
    pub name: String,
    /// Shots executed.
    pub shots: usize,
    /// One classical-register bitstring per shot, qubit 0 rightmost.
    pub memory: Vec<String>,
}

/// Results of one job (or several combined).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub backend_name: String,
    pub experiments: Vec<ExperimentResult>,
}

impl JobResult {
    /// Concatenate experiments of several results, preserving order.
    ///
    /// The combined result takes the id of the first part, or `combined_id`
    /// when given.
    pub fn combine(parts: Vec<JobResult>, combined_id: Option<&str>) -> Result<JobResult> {
        let first = parts
            .first()
            .ok_or_else(|| RngError::invalid_argument("no job results to combine"))?;
        let job_id = combined_id.map_or_else(|| first.job_id.clone(), str::to_string);
        let backend_name = first.backend_name.clone();
        let experiments = parts.into_iter().flat_map(|p| p.experiments).collect();
        Ok(JobResult {
            job_id,
            backend_name,
            experiments,
        })
    }

    /// Memory of experiment `index`.
    pub fn memory(&self, index: usize) -> Option<&[String]> {
        self.experiments.get(index).map(|e| e.memory.as_slice())
    }
}

/// A submitted unit of work.
pub trait Job: Send + Sync {
    /// Unique identifier assigned by the backend.
    fn job_id(&self) -> &str;

    /// Name of the backend the job runs on.
    fn backend_name(&self) -> &str;

    /// Current status, without blocking.
    fn status(&self) -> JobStatus;

    /// Block until the job finishes and return its result.
    fn result(&self) -> Result<JobResult>;

    /// The caller has collected the result; the backend may forget the job.
    fn release(&self) {}
}

/// Something that can execute measured circuits.
pub trait Backend: Send + Sync {
    /// Static configuration.
    fn configuration(&self) -> &BackendConfiguration;

    /// Submit circuits, each executed `shots` times with memory enabled.
    fn run(&self, circuits: &[QuantumCircuit], shots: usize) -> Result<Arc<dyn Job>>;

    /// Look up a previously submitted job.
    fn retrieve_job(&self, job_id: &str) -> Result<Arc<dyn Job>>;

    /// Whether jobs outlive the submitting call so a sampling run can be
    /// checkpointed and recovered.
    fn supports_checkpoint(&self) -> bool {
        false
    }

    /// Convenience: name from configuration.
    fn name(&self) -> &str {
        &self.configuration().name
    }
}
