//! Benchmark mode: hash one file with different thread counts and report throughput.
//!
//! Each run writes to a scratch file; all runs must produce identical output,
//! which doubles as a check that worker scheduling never leaks into the result.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::pipeline::{Pipeline, PipelineSettings, RunOutcome};

/// Thread counts tried when the caller does not give any.
pub const DEFAULT_THREAD_COUNTS: [usize; 4] = [1, 2, 4, 8];

/// Result of one benchmark run (one thread count).
#[derive(Debug, Clone)]
pub struct BenchResult {
    pub threads: usize,
    pub blocks: u64,
    pub bytes_hashed: u64,
    pub elapsed_secs: f64,
    pub throughput_mib_s: f64,
}

/// Hash `path` once per entry of `thread_counts` with blocks of `block_size`.
/// Fails if any run stops early or if two runs disagree on the output.
pub fn run_bench(path: &Path, block_size: usize, thread_counts: &[usize]) -> Result<Vec<BenchResult>> {
    let bytes_hashed = fs::metadata(path)
        .with_context(|| format!("stat {}", path.display()))?
        .len();
    let temp_dir = tempfile::tempdir().context("create temp dir for bench")?;

    let mut results = Vec::with_capacity(thread_counts.len());
    let mut reference: Option<(usize, Vec<u8>)> = None;

    for &threads in thread_counts {
        let settings = PipelineSettings::new(block_size, threads)?;
        let out_path = temp_dir.path().join(format!("bench-{}.txt", threads));
        let report = Pipeline::new(settings).run_files(path, &out_path)?;
        if let RunOutcome::Stopped(reason) = &report.outcome {
            anyhow::bail!("bench run with {} threads failed: {}", threads, reason);
        }

        let output = fs::read(&out_path).with_context(|| format!("read {}", out_path.display()))?;
        if let Some((ref_threads, ref_output)) = reference.as_ref() {
            if *ref_output != output {
                anyhow::bail!(
                    "output with {} threads differs from output with {} threads",
                    threads,
                    ref_threads
                );
            }
        }
        if reference.is_none() {
            reference = Some((threads, output));
        }

        let elapsed_secs = report.elapsed.as_secs_f64();
        let throughput_mib_s = if elapsed_secs > 0.0 && bytes_hashed > 0 {
            (bytes_hashed as f64 / 1_048_576.0) / elapsed_secs
        } else {
            0.0
        };
        tracing::debug!(threads, elapsed_secs, throughput_mib_s, "bench run done");

        results.push(BenchResult {
            threads,
            blocks: report.lines_written,
            bytes_hashed,
            elapsed_secs,
            throughput_mib_s,
        });
    }

    Ok(results)
}

/// Picks the thread count with the best throughput; ties go to fewer threads.
pub fn recommend_thread_count(results: &[BenchResult]) -> Option<usize> {
    results
        .iter()
        .max_by(|a, b| {
            a.throughput_mib_s
                .partial_cmp(&b.throughput_mib_s)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.threads.cmp(&a.threads))
        })
        .map(|r| r.threads)
}
