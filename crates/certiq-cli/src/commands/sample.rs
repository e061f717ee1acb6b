use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use certiq_core::{Generator, GeneratorResult, Pipeline, PipelineConfig, Result};

use super::PipelineArgs;

pub fn run(
    config_path: Option<&Path>,
    args: &PipelineArgs,
    recover: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let mut config = super::load_config(config_path, args)?;
    if let Some(path) = recover {
        use_checkpoint_dir_of(&mut config, path);
    }
    let pipeline = Pipeline::from_config(&config)?;
    let generator = pipeline.generator();

    let t0 = Instant::now();
    let job = match recover {
        Some(path) => Generator::recover(path, Arc::clone(generator.backend()))?,
        None => generator.sample(config.generator.num_raw_bits)?,
    };
    println!(
        "Submitted {} circuit(s) x {} shots to {} (job set {})",
        job.num_circuits(),
        job.shots(),
        pipeline.backend_name(),
        job.job_set().job_set_id()
    );
    if let Some(path) = job.checkpoint_path() {
        println!("Checkpoint: {}", path.display());
    }
    let result = job.block_until_ready()?;
    print_summary(&result, t0.elapsed().as_secs_f64());

    if let Some(path) = output {
        super::emit(Some(path), &serde_json::to_string_pretty(&result)?)?;
    }
    Ok(())
}

/// Finished simulator jobs are stored next to their checkpoint, so a
/// recovery without `--checkpoint-dir` reads them from the checkpoint's
/// directory.
fn use_checkpoint_dir_of(config: &mut PipelineConfig, checkpoint: &Path) {
    if config.generator.save_local {
        return;
    }
    config.generator.save_local = true;
    config.generator.checkpoint_dir = match checkpoint.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => ".".into(),
    };
}

fn print_summary(result: &GeneratorResult, secs: f64) {
    println!();
    println!("  Backend:             {}", result.backend_name);
    println!("  Shots:               {}", result.num_shots());
    println!("  Raw bits:            {}", result.raw_bits.len());
    println!("  Losing probability:  {:.5}", result.losing_probability);
    println!("  Winning probability: {:.5}", result.winning_probability);
    println!(
        "  Mermin correlator:   {:.4}  (classical <= 2, quantum <= 4)",
        result.mermin_correlator
    );
    println!("  Elapsed:             {secs:.2}s");
}
