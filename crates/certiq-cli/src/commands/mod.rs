pub mod backends;
pub mod extract;
pub mod params;
pub mod report;
pub mod sample;
pub mod server;

use std::path::{Path, PathBuf};

use clap::Args;

use certiq_core::{PipelineConfig, Result};

/// Flags shared by every command that runs the pipeline.
#[derive(Args, Debug, Default, Clone)]
pub struct PipelineArgs {
    /// Backend: statevector_simulator or a device profile (see `certiq backends`)
    #[arg(long)]
    pub backend: Option<String>,

    /// Raw bits to sample per run
    #[arg(long = "raw-bits")]
    pub raw_bits: Option<usize>,

    /// Simulator sampling seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Seed for a reproducible WSR (default: OS CSPRNG)
    #[arg(long)]
    pub wsr_seed: Option<String>,

    /// Override the simulator readout error
    #[arg(long)]
    pub readout_error: Option<f64>,

    /// Write a checkpoint per run into this directory
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Randomness rate of the WSR as a Santha-Vazirani source
    #[arg(long)]
    pub rate_sv: Option<f64>,

    /// Correlator to certify against
    #[arg(long)]
    pub expected_correlator: Option<f64>,

    /// Certify the measured correlator instead of the profiled one
    #[arg(long)]
    pub untrusted: bool,

    /// Size output for quantum-proof security
    #[arg(long)]
    pub quantum_proof: bool,

    /// Run privacy amplification after the two-source extractor
    #[arg(long)]
    pub privacy: bool,
}

impl PipelineArgs {
    /// Apply the flags that were given on top of `config`.
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(name) = &self.backend {
            config.backend.name = name.clone();
        }
        if let Some(n) = self.raw_bits {
            config.generator.num_raw_bits = n;
        }
        if self.seed.is_some() {
            config.backend.seed = self.seed;
        }
        if self.readout_error.is_some() {
            config.backend.readout_error = self.readout_error;
        }
        if self.wsr_seed.is_some() {
            config.generator.wsr_seed = self.wsr_seed.clone();
        }
        if let Some(dir) = &self.checkpoint_dir {
            config.generator.save_local = true;
            config.generator.checkpoint_dir = dir.clone();
        }
        if let Some(rate) = self.rate_sv {
            config.extractor.rate_sv = rate;
        }
        if self.expected_correlator.is_some() {
            config.extractor.expected_correlator = self.expected_correlator;
        }
        if self.untrusted {
            config.extractor.trusted_backend = false;
        }
        if self.quantum_proof {
            config.extractor.quantum_proof = true;
        }
        if self.privacy {
            config.extractor.privacy_amplification = true;
        }
    }
}

/// Load the config file (or defaults) and apply command-line overrides.
pub fn load_config(path: Option<&Path>, args: &PipelineArgs) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(p) => PipelineConfig::load(p)?,
        None => PipelineConfig::default(),
    };
    args.apply(&mut config);
    config.extractor.validate()?;
    log::debug!("effective config: {config:?}");
    Ok(config)
}

/// Write `text` to `path`, or stdout when no path is given.
pub fn emit(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(p) => {
            std::fs::write(p, text)?;
            eprintln!("Wrote {}", p.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}
