//! Integration tests for certiq-core.
//!
//! These tests drive the full pipeline on the simulator:
//! WSR → Mermin circuits → jobs → correlator → extractor parameters → bits.

use std::sync::Arc;

use certiq_core::{
    Backend, BackendConfiguration, Checkpoint, ExtractorConfig, Extractor, Generator, HashWsr, Job,
    LocalExtractor, QuantumCircuit, RngError, SimulatorBackend,
};

fn seeded(name: &str, seed: u64) -> Arc<SimulatorBackend> {
    let backend = if name == "statevector_simulator" {
        SimulatorBackend::new()
    } else {
        SimulatorBackend::profile(name).unwrap()
    };
    Arc::new(backend.with_seed(seed))
}

#[test]
fn sample_returns_at_least_requested_bits() {
    let backend = seeded("ibmq_valencia", 1);
    let generator = Generator::new(backend).with_wsr_generator(HashWsr::new(b"count"));
    let result = generator.sample(100).unwrap().block_until_ready().unwrap();
    assert!(result.raw_bits.len() >= 100);
    assert_eq!(result.wsr.len(), result.raw_bits_list.len());
    assert_eq!(result.extractor_bits().len(), 2 * result.raw_bits_list.len());
    assert_eq!(result.backend_name, "ibmq_valencia");
}

#[test]
fn num_circuits_and_shots_follow_backend_limits() {
    let backend = Arc::new(SimulatorBackend::new().with_seed(2).with_limits(10, 5));
    let generator = Generator::new(backend).with_wsr_generator(HashWsr::new(b"limits"));
    for (n, circuits, shots) in [
        (1, 1, 1),
        (30, 1, 10),
        (31, 2, 6),
        (29, 1, 10),
        (60, 2, 10),
        (61, 3, 7),
        (149, 5, 10),
    ] {
        let job = generator.sample(n).unwrap();
        assert_eq!(job.num_circuits(), circuits, "n={n}");
        assert_eq!(job.shots(), shots, "n={n}");
        assert_eq!(job.initial_wsr().len(), 3 * circuits);
        let result = job.block_until_ready().unwrap();
        assert!(result.raw_bits.len() >= n, "n={n}");
        assert_eq!(result.raw_bits_list.len(), circuits * shots);
    }
}

#[test]
fn large_requests_are_split_across_jobs() {
    let backend = Arc::new(SimulatorBackend::new().with_seed(3).with_limits(10, 5));
    let generator = Generator::new(backend).with_wsr_generator(HashWsr::new(b"split"));
    // ceil(1000 / 3) = 334 shots per qubit -> 34 circuits -> 7 jobs of at most 5.
    let job = generator.sample(1000).unwrap();
    assert_eq!(job.num_circuits(), 34);
    assert_eq!(job.job_set().jobs().len(), 7);
    let result = job.block_until_ready().unwrap();
    assert_eq!(result.raw_bits_list.len(), 34 * 10);
}

#[test]
fn custom_wsr_generator_is_used() {
    let backend = seeded("statevector_simulator", 4);
    let generator = Generator::new(backend).with_wsr_generator(|n: usize| vec![1u8; n]);
    let job = generator.sample(30).unwrap();
    assert!(job.wsr().iter().all(|w| *w == [1, 1, 1]));
    let result = job.block_until_ready().unwrap();
    assert!(result.wsr.iter().all(|w| *w == [1, 1, 1]));
    // Three Y measurements on a noiseless device always win.
    assert_eq!(result.mermin_correlator, 4.0);
}

#[test]
fn bad_wsr_generator_is_rejected() {
    let backend = seeded("statevector_simulator", 5);
    let short = Generator::new(backend.clone()).with_wsr_generator(|n: usize| vec![0u8; n - 1]);
    assert!(matches!(short.sample(30), Err(RngError::InvalidArgument(_))));
    let non_binary = Generator::new(backend).with_wsr_generator(|n: usize| vec![2u8; n]);
    assert!(matches!(non_binary.sample(30), Err(RngError::InvalidArgument(_))));
}

#[test]
fn zero_bits_is_rejected() {
    let generator = Generator::new(seeded("statevector_simulator", 6));
    assert!(matches!(generator.sample(0), Err(RngError::InvalidArgument(_))));
}

#[test]
fn save_and_recover_checkpoint() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = seeded("ibmq_ourense", 7);
    let generator = Generator::new(backend.clone())
        .with_wsr_generator(HashWsr::new(b"recover"))
        .with_checkpoint_dir(tmp.path());
    let job = generator.sample(90).unwrap();
    let path = job.checkpoint_path().unwrap().to_path_buf();
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("certiq_ibmq_ourense_90_"));

    let saved = Checkpoint::load(&path).unwrap();
    assert_eq!(saved.job_ids, job.job_set().job_ids());
    assert_eq!(saved.wsr, job.wsr());
    assert_eq!(saved.shots, job.shots());

    let recovered = Generator::recover(&path, backend).unwrap();
    assert!(recovered.initial_wsr().is_empty());
    assert_eq!(recovered.wsr(), job.wsr());
    let a = recovered.block_until_ready().unwrap();
    assert!(!path.exists(), "checkpoint should be deleted after recovery");

    // The first handle sees the same jobs; its checkpoint is already gone.
    let b = job.block_until_ready().unwrap();
    assert_eq!(a.raw_bits, b.raw_bits);
    assert_eq!(a.wsr, b.wsr);
}

#[test]
fn recover_from_job_store_on_fresh_backend() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(
        SimulatorBackend::profile("ibmq_ourense")
            .unwrap()
            .with_seed(13)
            .with_job_store(tmp.path()),
    );
    let generator = Generator::new(backend)
        .with_wsr_generator(HashWsr::new(b"store"))
        .with_checkpoint_dir(tmp.path());
    let job = generator.sample(90).unwrap();
    let path = job.checkpoint_path().unwrap().to_path_buf();
    let collected = job.job_set().results().unwrap();

    // Without the store a fresh backend has never heard of these jobs.
    let bare = seeded("ibmq_ourense", 13);
    assert!(matches!(
        Generator::recover(&path, bare),
        Err(RngError::JobNotFound(_))
    ));

    let fresh = Arc::new(SimulatorBackend::profile("ibmq_ourense").unwrap().with_job_store(tmp.path()));
    let recovered = Generator::recover(&path, fresh.clone()).unwrap();
    assert_eq!(recovered.job_set().results().unwrap().experiments, collected.experiments);
    let result = recovered.block_until_ready().unwrap();
    assert_eq!(result.raw_bits_list.len(), job.num_circuits() * job.shots());
    assert!(!path.exists());
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    assert_eq!(fresh.job_count(), 0);
}

#[test]
fn collected_runs_are_released() {
    let backend = seeded("statevector_simulator", 14);
    let generator = Generator::new(backend.clone()).with_wsr_generator(HashWsr::new(b"release"));
    for _ in 0..50 {
        generator.sample(300).unwrap().block_until_ready().unwrap();
    }
    assert_eq!(backend.job_count(), 0);
}

#[test]
fn seeded_wsr_draws_are_independent() {
    let backend = Arc::new(SimulatorBackend::new().with_seed(15).with_limits(10, 300));
    let generator = Generator::new(backend).with_wsr_generator(HashWsr::new(b"fresh"));
    let a = generator.sample(300).unwrap();
    let b = generator.sample(300).unwrap();
    assert_ne!(a.initial_wsr(), b.initial_wsr());
}

#[test]
fn recover_rejects_other_backend() {
    let tmp = tempfile::tempdir().unwrap();
    let generator = Generator::new(seeded("ibmq_ourense", 8)).with_checkpoint_dir(tmp.path());
    let job = generator.sample(30).unwrap();
    let path = job.checkpoint_path().unwrap().to_path_buf();
    let err = Generator::recover(&path, seeded("ibmq_valencia", 8)).unwrap_err();
    assert!(matches!(err, RngError::InvalidArgument(_)));
}

/// Backend whose jobs cannot outlive the submitting process.
struct Ephemeral(SimulatorBackend);

impl Backend for Ephemeral {
    fn configuration(&self) -> &BackendConfiguration {
        self.0.configuration()
    }

    fn run(&self, circuits: &[QuantumCircuit], shots: usize) -> certiq_core::Result<Arc<dyn Job>> {
        self.0.run(circuits, shots)
    }

    fn retrieve_job(&self, job_id: &str) -> certiq_core::Result<Arc<dyn Job>> {
        Err(RngError::JobNotFound(job_id.to_string()))
    }
}

#[test]
fn checkpoint_requires_backend_support() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(Ephemeral(SimulatorBackend::new().with_seed(9)));
    let generator = Generator::new(backend.clone()).with_checkpoint_dir(tmp.path());
    let job = generator.sample(30).unwrap();
    assert!(job.checkpoint_path().is_none());
    job.block_until_ready().unwrap();

    let cp = Checkpoint::new(
        "statevector_simulator",
        30,
        vec![[0, 0, 1]],
        10,
        "set",
        vec!["job".to_string()],
    );
    let path = cp.save(tmp.path()).unwrap();
    assert!(matches!(
        Generator::recover(&path, backend),
        Err(RngError::NotAuthorized(_))
    ));
}

#[test]
fn noisy_profile_correlator_is_near_expected() {
    let backend = seeded("ibmq_valencia", 10);
    let generator = Generator::new(backend).with_wsr_generator(HashWsr::new(b"noise"));
    let result = generator.sample(60_000).unwrap().block_until_ready().unwrap();
    let c = result.mermin_correlator;
    assert!(c > 2.5 && c < 3.5, "correlator {c}");
}

#[test]
fn end_to_end_extraction() {
    let backend = seeded("ibmq_ourense", 11);
    let generator = Generator::new(backend).with_wsr_generator(HashWsr::new(b"e2e"));
    let result = generator.sample(30_000).unwrap().block_until_ready().unwrap();
    let params = result
        .extractor_params(&ExtractorConfig::default(), generator.wsr_generator().as_ref())
        .unwrap();
    let bits = LocalExtractor::new().extract(&params).unwrap();
    assert_eq!(bits.len(), params.ext1_output_num_bits);
    let ones = bits.iter().filter(|&&b| b == 1).count() as f64;
    let frac = ones / bits.len() as f64;
    assert!((0.4..0.6).contains(&frac), "ones fraction {frac}");
}

#[test]
#[ignore] // Run with: cargo test -- --ignored
fn end_to_end_with_privacy_amplification() {
    let backend = seeded("statevector_simulator", 12);
    let generator = Generator::new(backend).with_wsr_generator(HashWsr::new(b"pa"));
    let result = generator.sample(60_000).unwrap().block_until_ready().unwrap();
    let config = ExtractorConfig {
        trusted_backend: false,
        privacy_amplification: true,
        ..Default::default()
    };
    let params = result
        .extractor_params(&config, generator.wsr_generator().as_ref())
        .unwrap();
    assert!(params.ext2_wsr_multiplier >= 2);
    let bits = LocalExtractor::new().extract_bytes(&params).unwrap();
    assert_eq!(bits.len(), params.output_num_bits().div_ceil(8));
}
