//! `bsum -i <in> -o <out>` – hash a file into per-block checksum lines.

use anyhow::Result;
use bsum_core::config::BsumConfig;
use bsum_core::pipeline::{Pipeline, PipelineSettings, RunOutcome};
use std::path::Path;

/// Run the pipeline; flags override config values. Returns the exit code.
pub fn run_hash(
    cfg: &BsumConfig,
    input: &Path,
    output: &Path,
    block_size: Option<usize>,
    threads: Option<usize>,
) -> Result<i32> {
    let settings = PipelineSettings::new(
        block_size.unwrap_or(cfg.block_size),
        threads.unwrap_or(cfg.threads),
    )?
    .with_poll_interval(std::time::Duration::from_millis(cfg.poll_interval_ms))
    .with_write_buffer(cfg.write_buffer_bytes);

    let report = Pipeline::new(settings).run_files_with(input, output, |s| {
        println!(
            "Hashing started with block size: {}, on {} threads",
            s.block_size(),
            s.threads()
        );
    })?;
    println!(
        "Time elapsed: {} milliseconds",
        report.elapsed.as_secs_f64() * 1000.0
    );

    match report.outcome {
        RunOutcome::Completed => {
            tracing::info!(
                lines = report.lines_written,
                "hashed {} into {}",
                input.display(),
                output.display()
            );
            Ok(0)
        }
        RunOutcome::Stopped(reason) => {
            eprintln!("bsum error: {}", reason);
            eprintln!(
                "{} of {} block checksums were written to {}",
                report.lines_written,
                report.blocks_read,
                output.display()
            );
            Ok(1)
        }
    }
}
