//! # certiq-core
//!
//! **Randomness you can certify, from a quantum device you do not have to trust.**
//!
//! `certiq-core` plays the three-qubit Mermin game on a quantum backend, scores
//! the measured outcomes against the classical bound and turns the certified
//! min-entropy into uniform bits with a two-source extractor.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use certiq_core::{ExtractorConfig, Extractor, Generator, LocalExtractor, SimulatorBackend};
//!
//! let backend = SimulatorBackend::profile("ibmq_valencia").unwrap();
//! let generator = Generator::new(Arc::new(backend));
//!
//! let job = generator.sample(30_000).unwrap();
//! let result = job.block_until_ready().unwrap();
//! println!("Mermin correlator: {:.3}", result.mermin_correlator);
//!
//! let params = result
//!     .extractor_params(&ExtractorConfig::default(), generator.wsr_generator().as_ref())
//!     .unwrap();
//! let bits = LocalExtractor::new().extract(&params).unwrap();
//! println!("{} certified random bits", bits.len());
//! ```
//!
//! ## Architecture
//!
//! WSR → Mermin circuits → Backend jobs → Raw bits + correlator → Extractor → Output
//!
//! - The weak source of randomness (WSR) picks one of eight measurement
//!   settings per circuit. See [`wsr`].
//! - A correlator above 2 cannot be produced classically; its distance from 4
//!   bounds how much an adversary can know about the raw bits. See [`bounds`].
//! - [`Extractor`] implementations turn raw bits plus fresh WSR into uniform
//!   output. [`LocalExtractor`] runs in-process.

pub mod backend;
pub mod bits;
pub mod bounds;
pub mod checkpoint;
pub mod circuit;
pub mod config;
pub mod constants;
pub mod error;
pub mod extractor;
pub mod generator;
pub mod job;
pub mod pipeline;
pub mod result;
pub mod wsr;

pub use backend::{
    Backend, BackendConfiguration, Job, JobManager, JobResult, JobStatus, ManagedJobSet,
    NoiseModel, SimulatorBackend,
};
pub use checkpoint::Checkpoint;
pub use circuit::{Label, QuantumCircuit, mermin_circuit};
pub use config::{BackendSelection, ExtractorConfig, GeneratorConfig, PipelineConfig};
pub use error::{Result, RngError};
pub use extractor::{Extractor, ExtractorParams, LocalExtractor};
pub use generator::{Generator, SamplingPlan};
pub use job::GeneratorJob;
pub use pipeline::{Pipeline, PipelineOutput};
pub use result::{GeneratorResult, bell_value};
pub use wsr::{HashWsr, OsWsr, SharedWsr, WsrGenerator, generate_wsr};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
