//! CLI for certiq: sample Mermin circuits, certify the correlator, extract.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::PipelineArgs;

#[derive(Parser)]
#[command(name = "certiq")]
#[command(about = "certiq — certified quantum random numbers from Bell tests")]
#[command(version = certiq_core::VERSION)]
struct Cli {
    /// JSON pipeline configuration; flags override its fields
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG wins.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available backends with their limits and profiled correlators
    Backends,

    /// Sample raw bits and report the Mermin correlator
    Sample {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Resume a checkpointed run instead of submitting new circuits
        #[arg(long)]
        recover: Option<PathBuf>,

        /// Write the full result as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Sample and derive extractor parameters (JSON)
    Params {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Where to write the parameters (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Extract certified random output
    Extract {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Extract from a parameters file written by `params` instead of sampling
        #[arg(long)]
        params: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "hex", value_parser = ["hex", "bits", "raw"])]
        format: String,

        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run the statistical test battery on extracted output
    Report {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Extracted bits to collect
        #[arg(long, default_value = "100000")]
        bits: usize,

        /// Also test the raw extractor input
        #[arg(long)]
        raw: bool,

        /// Write results as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Serve certified random data over HTTP
    Server {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port
        #[arg(long, default_value = "8042")]
        port: u16,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = cli.config.as_deref();

    let outcome = match cli.command {
        Commands::Backends => commands::backends::run(),
        Commands::Sample {
            pipeline,
            recover,
            output,
        } => commands::sample::run(config, &pipeline, recover.as_deref(), output.as_deref()),
        Commands::Params { pipeline, output } => {
            commands::params::run(config, &pipeline, output.as_deref())
        }
        Commands::Extract {
            pipeline,
            params,
            format,
            output,
        } => commands::extract::run(
            config,
            &pipeline,
            params.as_deref(),
            &format,
            output.as_deref(),
        ),
        Commands::Report {
            pipeline,
            bits,
            raw,
            output,
        } => commands::report::run(config, &pipeline, bits, raw, output.as_deref()),
        Commands::Server {
            pipeline,
            host,
            port,
        } => commands::server::run(config, &pipeline, &host, port),
    };

    if let Err(e) = outcome {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
