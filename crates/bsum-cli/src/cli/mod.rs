//! CLI for bsum.

mod commands;

use anyhow::Result;
use bsum_core::config;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use commands::{run_bench, run_hash};

/// Top-level CLI: hash `--in` into `--out`, or run a subcommand.
#[derive(Debug, Parser)]
#[command(name = "bsum")]
#[command(about = "Per-block CRC-32 checksums of a file, computed in parallel", long_about = None)]
pub struct Cli {
    /// File to hash.
    #[arg(short = 'i', long = "in", value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// File to write one checksum line per block to.
    #[arg(short = 'o', long = "out", value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Block size in bytes [default: 512, or `block_size` from config.toml].
    #[arg(short = 'b', long = "blk", value_name = "BYTES")]
    pub block_size: Option<usize>,

    /// Number of checksum threads [default: 4, or `threads` from config.toml].
    #[arg(short = 't', long = "nthread", value_name = "N")]
    pub threads: Option<usize>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Hash a file with several thread counts and compare throughput.
    Bench {
        /// File to hash.
        path: PathBuf,

        /// Block size in bytes [default: from config.toml].
        #[arg(short = 'b', long = "blk", value_name = "BYTES")]
        block_size: Option<usize>,

        /// Comma-separated thread counts to try (default 1,2,4,8).
        #[arg(long, value_delimiter = ',', value_name = "N,N,...")]
        threads: Vec<usize>,
    },
}

impl Cli {
    /// Parse arguments and run. Returns the process exit code.
    pub fn run_from_args() -> Result<i32> {
        let cli = match Cli::try_parse() {
            Ok(cli) => cli,
            Err(err) => {
                let _ = err.print();
                return Ok(parse_error_exit_code(&err));
            }
        };
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            Some(CliCommand::Bench {
                path,
                block_size,
                threads,
            }) => {
                run_bench(&cfg, &path, block_size, &threads)?;
                Ok(0)
            }
            None => match (cli.input, cli.output) {
                (Some(input), Some(output)) => {
                    run_hash(&cfg, &input, &output, cli.block_size, cli.threads)
                }
                _ => {
                    Cli::command().print_help()?;
                    println!();
                    Ok(0)
                }
            },
        }
    }
}

/// Help and version exit 0; malformed options exit 1.
fn parse_error_exit_code(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}
