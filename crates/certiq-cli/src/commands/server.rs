use std::path::Path;

use certiq_core::{Pipeline, Result, RngError};

use super::PipelineArgs;

pub fn run(config_path: Option<&Path>, args: &PipelineArgs, host: &str, port: u16) -> Result<()> {
    let config = super::load_config(config_path, args)?;
    let pipeline = Pipeline::from_config(&config)?;

    let base = format!("http://{host}:{port}");
    println!("certiq server v{}", certiq_core::VERSION);
    println!("   {base}");
    println!(
        "   backend {} ({} raw bits per run, {} backend)",
        pipeline.backend_name(),
        pipeline.num_raw_bits(),
        if config.extractor.trusted_backend { "trusted" } else { "untrusted" }
    );
    println!();
    println!("   Endpoints:");
    println!("     GET  /                API index");
    println!("     GET  /api/v1/random   Fresh certified random data");
    println!("     POST /api/v1/extract  Extract from JSON extractor parameters");
    println!("     GET  /health          Health check");
    println!();
    println!("   Examples:");
    println!("     curl '{base}/api/v1/random?length=32&type=uint8'");
    println!("     certiq params --raw-bits 30000 --output p.json && \\");
    println!("       curl -X POST -H 'Content-Type: application/json' -d @p.json {base}/api/v1/extract");
    println!();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(certiq_server::run_server(pipeline, host, port))
        .map_err(RngError::from)
}
