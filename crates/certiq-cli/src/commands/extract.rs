use std::io::Write;
use std::path::Path;

use certiq_core::bits::{bits_to_bytes, bits_to_string, hex_encode};
use certiq_core::{Extractor, ExtractorParams, LocalExtractor, Pipeline, Result};

use super::PipelineArgs;

pub fn run(
    config_path: Option<&Path>,
    args: &PipelineArgs,
    params_path: Option<&Path>,
    format: &str,
    output: Option<&Path>,
) -> Result<()> {
    let bits = match params_path {
        Some(path) => {
            let params: ExtractorParams = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            LocalExtractor::new().extract(&params)?
        }
        None => {
            let config = super::load_config(config_path, args)?;
            let pipeline = Pipeline::from_config(&config)?;
            pipeline.run(config.generator.num_raw_bits)?.bits
        }
    };
    eprintln!("{} bits extracted", bits.len());

    match format {
        "bits" => super::emit(output, &bits_to_string(&bits)),
        "raw" => write_raw(output, &bits_to_bytes(&bits)),
        _ => super::emit(output, &hex_encode(&bits_to_bytes(&bits))),
    }
}

fn write_raw(output: Option<&Path>, bytes: &[u8]) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, bytes)?,
        None => {
            let mut out = std::io::stdout().lock();
            out.write_all(bytes)?;
            out.flush()?;
        }
    }
    Ok(())
}
