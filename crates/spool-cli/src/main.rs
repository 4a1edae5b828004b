//! spool CLI: replay a file or stdin through a rewindable stream.

use clap::{Parser, Subcommand};
use serde_json::Value;
use spool_core::config::SpoolConfig;
use spool_io::BufferingReadStream;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spool")]
#[command(about = "Read a source once, replay it many times, spilling to disk past a threshold", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the input through a buffering stream and replay it
    Replay {
        /// Input file (stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Number of passes over the input, the first one included
        #[arg(short, long, default_value_t = 2)]
        passes: usize,

        /// In-memory threshold in bytes (overrides config)
        #[arg(long)]
        threshold: Option<usize>,

        /// Directory for the spill file (overrides config)
        #[arg(long)]
        temp_dir: Option<PathBuf>,

        /// JSON config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Read size per call in bytes
        #[arg(long, default_value_t = 8192)]
        chunk: usize,
    },

    /// Print the effective configuration as JSON
    Config {
        /// JSON config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Command-line settings that win over the config file and the environment.
#[derive(Debug, Default)]
struct Overrides {
    threshold: Option<usize>,
    temp_dir: Option<PathBuf>,
}

/// One read of the whole input.
#[derive(Debug)]
struct Pass {
    bytes: u64,
    digest: blake3::Hash,
}

/// Outcome of a `replay` run.
#[derive(Debug)]
struct ReplayReport {
    passes: Vec<Pass>,
    extent: u64,
    spilled: bool,
}

impl ReplayReport {
    fn consistent(&self) -> bool {
        self.passes
            .windows(2)
            .all(|w| w[0].bytes == w[1].bytes && w[0].digest == w[1].digest)
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            input,
            passes,
            threshold,
            temp_dir,
            config,
            chunk,
        } => {
            let overrides = Overrides {
                threshold,
                temp_dir,
            };
            match run_replay(input.as_deref(), passes, chunk, config.as_deref(), &overrides) {
                Ok(true) => {}
                Ok(false) => {
                    eprintln!("Error: replayed content differs from the first pass");
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Config { config } => {
            if let Err(e) = show_config(config.as_deref()) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run_replay(
    input: Option<&Path>,
    passes: usize,
    chunk: usize,
    config_path: Option<&Path>,
    overrides: &Overrides,
) -> Result<bool, Box<dyn std::error::Error>> {
    let config = effective_config(config_path, overrides)?;
    let source: Box<dyn Read> = match input {
        Some(path) => Box::new(File::open(path)?),
        None => Box::new(io::stdin().lock()),
    };

    let report = replay(source, passes, chunk, &config)?;
    for (i, pass) in report.passes.iter().enumerate() {
        println!("pass {}: {} bytes  blake3 {}", i + 1, pass.bytes, pass.digest.to_hex());
    }
    println!("tier: {}", if report.spilled { "disk" } else { "memory" });
    println!("extent: {} bytes", report.extent);
    println!("replay consistent: {}", report.consistent());
    Ok(report.consistent())
}

/// Read `source` to the end `passes` times through one stream, hashing each
/// pass. Every pass after the first is served from the buffer.
fn replay<R: Read>(
    source: R,
    passes: usize,
    chunk: usize,
    config: &SpoolConfig,
) -> Result<ReplayReport, Box<dyn std::error::Error>> {
    let mut stream = BufferingReadStream::builder(source).config(config).build()?;
    let mut buf = vec![0u8; chunk.max(1)];
    let mut results = Vec::with_capacity(passes.max(1));

    for pass in 0..passes.max(1) {
        stream.seek(SeekFrom::Start(0))?;
        let mut hasher = blake3::Hasher::new();
        let mut total = 0u64;
        loop {
            let n = stream.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            total += n as u64;
        }
        tracing::info!(pass, bytes = total, tier = ?stream.tier(), "pass complete");
        results.push(Pass {
            bytes: total,
            digest: hasher.finalize(),
        });
    }

    let report = ReplayReport {
        passes: results,
        extent: stream.buffered_len(),
        spilled: !stream.is_in_memory(),
    };
    stream.close()?;
    Ok(report)
}

fn show_config(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = effective_config(config_path, &Overrides::default())?;
    println!("{}", config.to_json_pretty()?);
    Ok(())
}

/// Environment, then config file, then command-line flags.
fn effective_config(
    config_path: Option<&Path>,
    overrides: &Overrides,
) -> Result<SpoolConfig, Box<dyn std::error::Error>> {
    let mut config = SpoolConfig::from_env();
    if let Some(path) = config_path {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("read {}: {}", path.display(), e))?;
        config = layer_file(&config, &text)?;
    }
    apply_overrides(&mut config, overrides);
    config.validate()?;
    Ok(config)
}

/// Overlay the keys present in a JSON config document on `base`; absent keys
/// keep the value `base` already has.
fn layer_file(base: &SpoolConfig, text: &str) -> Result<SpoolConfig, Box<dyn std::error::Error>> {
    let mut merged = serde_json::to_value(base)?;
    let doc: Value = serde_json::from_str(text)?;
    match (&mut merged, doc) {
        (Value::Object(into), Value::Object(from)) => into.extend(from),
        _ => return Err("config file must contain a JSON object".into()),
    }
    Ok(serde_json::from_value(merged)?)
}

fn apply_overrides(config: &mut SpoolConfig, overrides: &Overrides) {
    if let Some(threshold) = overrides.threshold {
        config.memory_threshold = threshold;
    }
    if let Some(dir) = &overrides.temp_dir {
        config.temp_dir = Some(dir.clone());
    }
}
