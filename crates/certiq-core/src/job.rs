//! Handle to a sampling run in flight.

use std::path::{Path, PathBuf};

use crate::backend::{JobResult, ManagedJobSet};
use crate::circuit::{Label, MERMIN_QUBITS};
use crate::error::{Result, RngError};
use crate::result::GeneratorResult;

/// Jobs submitted by [`Generator::sample`](crate::Generator::sample).
#[derive(Debug, Clone)]
pub struct GeneratorJob {
    pub(crate) initial_wsr: Vec<u8>,
    pub(crate) wsr: Vec<Label>,
    pub(crate) job_set: ManagedJobSet,
    pub(crate) shots: usize,
    pub(crate) checkpoint: Option<PathBuf>,
}

impl GeneratorJob {
    /// WSR bits drawn for this run. Empty for a recovered run.
    pub fn initial_wsr(&self) -> &[u8] {
        &self.initial_wsr
    }

    /// One triple per circuit.
    pub fn wsr(&self) -> &[Label] {
        &self.wsr
    }

    pub fn job_set(&self) -> &ManagedJobSet {
        &self.job_set
    }

    pub fn shots(&self) -> usize {
        self.shots
    }

    pub fn num_circuits(&self) -> usize {
        self.wsr.len()
    }

    pub fn checkpoint_path(&self) -> Option<&Path> {
        self.checkpoint.as_deref()
    }

    /// Wait for every job, then score the run.
    ///
    /// A checkpoint attached to this run is deleted once the results are in;
    /// failure to delete it is logged and otherwise ignored. The backend is
    /// then told it may forget the jobs.
    pub fn block_until_ready(&self) -> Result<GeneratorResult> {
        log::info!(
            "Waiting for jobs of set {} to finish.",
            self.job_set.job_set_id()
        );
        let job_result = self.job_set.results()?;
        log::info!("All jobs finished, transforming job results.");

        let raw_bits_list = self.transform(&job_result)?;
        let wsr = self.expanded_wsr();

        if let Some(path) = &self.checkpoint {
            if let Err(e) = std::fs::remove_file(path) {
                log::warn!("Unable to delete checkpoint {}: {e}", path.display());
            }
        }
        self.job_set.release();

        GeneratorResult::new(job_result.backend_name, wsr, raw_bits_list)
    }

    /// Each WSR triple repeated once per shot of its circuit.
    fn expanded_wsr(&self) -> Vec<Label> {
        self.wsr
            .iter()
            .flat_map(|&label| std::iter::repeat_n(label, self.shots))
            .collect()
    }

    /// Per-shot triples with index `i` holding qubit `i`.
    fn transform(&self, job_result: &JobResult) -> Result<Vec<Label>> {
        if job_result.experiments.len() != self.wsr.len() {
            return Err(RngError::job(
                &job_result.job_id,
                format!(
                    "expected {} experiments, got {}",
                    self.wsr.len(),
                    job_result.experiments.len()
                ),
            ));
        }
        let mut out = Vec::with_capacity(self.wsr.len() * self.shots);
        for experiment in &job_result.experiments {
            if experiment.memory.len() != self.shots {
                return Err(RngError::job(
                    &job_result.job_id,
                    format!(
                        "experiment {} returned {} shots, expected {}",
                        experiment.name,
                        experiment.memory.len(),
                        self.shots
                    ),
                ));
            }
            for bitstring in &experiment.memory {
                out.push(parse_memory(bitstring).ok_or_else(|| {
                    RngError::job(
                        &job_result.job_id,
                        format!("malformed memory entry '{bitstring}'"),
                    )
                })?);
            }
        }
        Ok(out)
    }
}

/// Parse a register bitstring (qubit 0 rightmost) into qubit order.
fn parse_memory(bitstring: &str) -> Option<Label> {
    let bytes = bitstring.as_bytes();
    if bytes.len() != MERMIN_QUBITS {
        return None;
    }
    let mut label = [0u8; MERMIN_QUBITS];
    for (slot, &b) in label.iter_mut().zip(bytes.iter().rev()) {
        *slot = match b {
            b'0' => 0,
            b'1' => 1,
            _ => return None,
        };
    }
    Some(label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory_reverses() {
        assert_eq!(parse_memory("001"), Some([1, 0, 0]));
        assert_eq!(parse_memory("110"), Some([0, 1, 1]));
        assert_eq!(parse_memory("01"), None);
        assert_eq!(parse_memory("0x1"), None);
    }
}
