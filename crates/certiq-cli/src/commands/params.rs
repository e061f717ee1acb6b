use std::path::Path;

use certiq_core::{Pipeline, Result};

use super::PipelineArgs;

pub fn run(config_path: Option<&Path>, args: &PipelineArgs, output: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path, args)?;
    let pipeline = Pipeline::from_config(&config)?;
    let result = pipeline.sample(config.generator.num_raw_bits)?;
    let params = pipeline.params(&result)?;
    eprintln!(
        "correlator {:.4} (certified {:.4}), n={} m={} c={} -> {} output bits",
        result.mermin_correlator,
        params.certified_correlator,
        params.ext1_input_num_bits,
        params.ext1_output_num_bits,
        params.ext2_wsr_multiplier,
        params.output_num_bits()
    );
    super::emit(output, &serde_json::to_string(&params)?)
}
