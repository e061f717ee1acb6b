//! Splitting circuit batches across jobs.
//!
//! Backends cap the number of circuits per job. [`JobManager::run`] chunks a
//! batch to fit, submits one job per chunk and returns a [`ManagedJobSet`]
//! whose combined result lists experiments in submission order.

use std::sync::Arc;

use uuid::Uuid;

use super::{Backend, Job, JobResult, JobStatus};
use crate::circuit::QuantumCircuit;
use crate::error::{Result, RngError};

/// Submits circuit batches as one or more jobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobManager;

impl JobManager {
    pub fn new() -> Self {
        Self
    }

    /// Submit `circuits` in chunks of at most `max_experiments`.
    pub fn run(
        &self,
        backend: &dyn Backend,
        circuits: &[QuantumCircuit],
        shots: usize,
    ) -> Result<ManagedJobSet> {
        if circuits.is_empty() {
            return Err(RngError::invalid_argument("no circuits to run"));
        }
        let chunk = backend.configuration().max_experiments.max(1);
        let jobs = circuits
            .chunks(chunk)
            .map(|part| backend.run(part, shots))
            .collect::<Result<Vec<_>>>()?;

        let set = ManagedJobSet {
            job_set_id: Uuid::new_v4().to_string(),
            jobs,
        };
        log::info!(
            "Jobs submitted to {}. Job set ID is {} ({} job(s)).",
            backend.name(),
            set.job_set_id,
            set.jobs.len()
        );
        Ok(set)
    }

    /// Rebuild a job set from the ids recorded at submission time.
    pub fn retrieve_job_set(
        &self,
        backend: &dyn Backend,
        job_set_id: &str,
        job_ids: &[String],
    ) -> Result<ManagedJobSet> {
        if job_ids.is_empty() {
            return Err(RngError::JobNotFound(job_set_id.to_string()));
        }
        let jobs = job_ids
            .iter()
            .map(|id| backend.retrieve_job(id))
            .collect::<Result<Vec<_>>>()?;
        Ok(ManagedJobSet {
            job_set_id: job_set_id.to_string(),
            jobs,
        })
    }
}

/// Jobs belonging to one logical submission.
#[derive(Clone)]
pub struct ManagedJobSet {
    job_set_id: String,
    jobs: Vec<Arc<dyn Job>>,
}

impl std::fmt::Debug for ManagedJobSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedJobSet")
            .field("job_set_id", &self.job_set_id)
            .field("job_ids", &self.job_ids())
            .finish()
    }
}

impl ManagedJobSet {
    pub fn job_set_id(&self) -> &str {
        &self.job_set_id
    }

    pub fn job_ids(&self) -> Vec<String> {
        self.jobs.iter().map(|j| j.job_id().to_string()).collect()
    }

    pub fn jobs(&self) -> &[Arc<dyn Job>] {
        &self.jobs
    }

    /// Backend name of the first job.
    pub fn backend_name(&self) -> &str {
        self.jobs.first().map_or("", |j| j.backend_name())
    }

    /// Per-job statuses, without blocking.
    pub fn statuses(&self) -> Vec<JobStatus> {
        self.jobs.iter().map(|j| j.status()).collect()
    }

    /// Block on every job and combine their results in submission order.
    pub fn results(&self) -> Result<JobResult> {
        let parts = self
            .jobs
            .iter()
            .map(|j| j.result())
            .collect::<Result<Vec<_>>>()?;
        JobResult::combine(parts, Some(&self.job_set_id))
    }

    /// Release every job once its result has been consumed.
    pub fn release(&self) {
        for job in &self.jobs {
            job.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatorBackend;
    use crate::circuit::{circuits_for_wsr, mermin_circuit};

    #[test]
    fn test_run_splits_by_max_experiments() {
        let backend = SimulatorBackend::new().with_limits(100, 3).with_seed(1);
        let wsr: Vec<_> = (0..7u8).map(|v| [v >> 2 & 1, v >> 1 & 1, v & 1]).collect();
        let circuits = circuits_for_wsr(&wsr);
        let set = JobManager::new().run(&backend, &circuits, 5).unwrap();
        assert_eq!(set.jobs().len(), 3);
        let result = set.results().unwrap();
        assert_eq!(result.job_id, set.job_set_id());
        let names: Vec<_> = result.experiments.iter().map(|e| e.name.clone()).collect();
        let expected: Vec<_> = circuits.iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, expected);
        assert!(set.statuses().iter().all(|s| *s == JobStatus::Done));
    }

    #[test]
    fn test_run_rejects_empty_batch() {
        let backend = SimulatorBackend::new();
        assert!(JobManager::new().run(&backend, &[], 1).is_err());
    }

    #[test]
    fn test_retrieve_job_set() {
        let backend = SimulatorBackend::new().with_limits(100, 1);
        let circuits = vec![mermin_circuit([0, 0, 0]), mermin_circuit([1, 1, 1])];
        let set = JobManager::new().run(&backend, &circuits, 2).unwrap();
        let again = JobManager::new()
            .retrieve_job_set(&backend, set.job_set_id(), &set.job_ids())
            .unwrap();
        assert_eq!(again.job_ids(), set.job_ids());
        assert_eq!(again.results().unwrap(), set.results().unwrap());
    }

    #[test]
    fn test_retrieve_unknown_job_fails() {
        let backend = SimulatorBackend::new();
        let err = JobManager::new()
            .retrieve_job_set(&backend, "set", &["missing".to_string()])
            .unwrap_err();
        assert!(matches!(err, RngError::JobNotFound(_)));
    }
}
