//! Sampling Mermin circuits on a backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{Backend, JobManager};
use crate::bits::is_bit_string;
use crate::checkpoint::Checkpoint;
use crate::circuit::{Label, MERMIN_QUBITS, circuits_for_wsr};
use crate::error::{Result, RngError};
use crate::job::GeneratorJob;
use crate::wsr::{OsWsr, SharedWsr, WsrGenerator};

/// How a raw-bit request is spread over circuits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPlan {
    pub num_circuits: usize,
    pub shots: usize,
}

impl SamplingPlan {
    /// Fewest circuits that deliver `num_raw_bits` within `max_shots` per
    /// circuit, with shots spread evenly across them.
    pub fn new(num_raw_bits: usize, max_shots: usize) -> Result<Self> {
        if num_raw_bits == 0 {
            return Err(RngError::invalid_argument("num_raw_bits must be positive"));
        }
        if max_shots == 0 {
            return Err(RngError::invalid_argument("backend reports max_shots of 0"));
        }
        let per_qubit = num_raw_bits.div_ceil(MERMIN_QUBITS);
        if per_qubit <= max_shots {
            return Ok(Self {
                num_circuits: 1,
                shots: per_qubit,
            });
        }
        let num_circuits = per_qubit.div_ceil(max_shots);
        Ok(Self {
            num_circuits,
            shots: per_qubit.div_ceil(num_circuits),
        })
    }

    /// Raw bits the plan yields; at least the requested amount.
    pub fn num_raw_bits(&self) -> usize {
        self.num_circuits * self.shots * MERMIN_QUBITS
    }
}

/// Generates certified raw bits by playing the Mermin game on a backend.
#[derive(Clone)]
pub struct Generator {
    backend: Arc<dyn Backend>,
    job_manager: JobManager,
    wsr_generator: SharedWsr,
    checkpoint_dir: Option<PathBuf>,
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("backend", &self.backend.name())
            .field("checkpoint_dir", &self.checkpoint_dir)
            .finish()
    }
}

impl Generator {
    /// Generator drawing its WSR from the OS CSPRNG.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            job_manager: JobManager::new(),
            wsr_generator: Arc::new(OsWsr),
            checkpoint_dir: None,
        }
    }

    pub fn with_wsr_generator(mut self, wsr_generator: impl WsrGenerator + 'static) -> Self {
        self.wsr_generator = Arc::new(wsr_generator);
        self
    }

    pub fn with_shared_wsr(mut self, wsr_generator: SharedWsr) -> Self {
        self.wsr_generator = wsr_generator;
        self
    }

    /// Write a checkpoint for every run into `dir`, so it can be resumed
    /// with [`Generator::recover`].
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    /// Toggle checkpointing into the current directory.
    pub fn save_local(mut self, enabled: bool) -> Self {
        self.checkpoint_dir = enabled.then(|| PathBuf::from("."));
        self
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn wsr_generator(&self) -> &SharedWsr {
        &self.wsr_generator
    }

    /// Submit enough Mermin circuits to produce at least `num_raw_bits`.
    pub fn sample(&self, num_raw_bits: usize) -> Result<GeneratorJob> {
        let config = self.backend.configuration();
        let plan = SamplingPlan::new(num_raw_bits, config.max_shots)?;
        log::debug!(
            "Sampling {num_raw_bits} raw bits on {}: {} circuit(s) x {} shots",
            config.name,
            plan.num_circuits,
            plan.shots
        );

        let num_wsr = MERMIN_QUBITS * plan.num_circuits;
        let initial_wsr = self.wsr_generator.generate(num_wsr)?;
        if initial_wsr.len() != num_wsr || !is_bit_string(&initial_wsr) {
            return Err(RngError::invalid_argument(format!(
                "WSR generator must return {num_wsr} bits of 0/1, got {} values",
                initial_wsr.len()
            )));
        }
        let wsr: Vec<Label> = initial_wsr
            .chunks_exact(MERMIN_QUBITS)
            .map(|c| [c[0], c[1], c[2]])
            .collect();

        let circuits = circuits_for_wsr(&wsr);
        let job_set = self
            .job_manager
            .run(self.backend.as_ref(), &circuits, plan.shots)?;

        let checkpoint = match &self.checkpoint_dir {
            Some(dir) if self.backend.supports_checkpoint() => {
                let cp = Checkpoint::new(
                    self.backend.name(),
                    num_raw_bits,
                    wsr.clone(),
                    plan.shots,
                    job_set.job_set_id(),
                    job_set.job_ids(),
                );
                Some(cp.save(dir)?)
            }
            Some(_) => {
                log::warn!(
                    "Backend {} cannot resume jobs; skipping checkpoint",
                    self.backend.name()
                );
                None
            }
            None => None,
        };

        Ok(GeneratorJob {
            initial_wsr,
            wsr,
            job_set,
            shots: plan.shots,
            checkpoint,
        })
    }

    /// Resume a checkpointed run on `backend`.
    pub fn recover(path: &Path, backend: Arc<dyn Backend>) -> Result<GeneratorJob> {
        if !backend.supports_checkpoint() {
            return Err(RngError::NotAuthorized(format!(
                "backend {} does not support recovering jobs",
                backend.name()
            )));
        }
        let cp = Checkpoint::load(path)?;
        if cp.backend != backend.name() {
            return Err(RngError::invalid_argument(format!(
                "checkpoint was written for backend {}, not {}",
                cp.backend,
                backend.name()
            )));
        }
        let job_set =
            JobManager::new().retrieve_job_set(backend.as_ref(), &cp.job_set_id, &cp.job_ids)?;
        log::info!(
            "Recovered job set {} ({} circuit(s) x {} shots) from {}",
            cp.job_set_id,
            cp.wsr.len(),
            cp.shots,
            path.display()
        );
        Ok(GeneratorJob {
            initial_wsr: Vec::new(),
            wsr: cp.wsr,
            job_set,
            shots: cp.shots,
            checkpoint: Some(path.to_path_buf()),
        })
    }
}
