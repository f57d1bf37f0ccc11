//! `bsum bench <path>` – compare thread counts on one file.

use anyhow::Result;
use bsum_core::bench::{self, BenchResult, DEFAULT_THREAD_COUNTS};
use bsum_core::config::BsumConfig;
use std::path::Path;

fn print_bench_results(results: &[BenchResult]) {
    println!(
        "  {:>7}  {:>10}  {:>8}  {:>8}",
        "Threads", "Blocks", "Time(s)", "MiB/s"
    );
    println!(
        "  {}  {}  {}  {}",
        "-------", "----------", "--------", "--------"
    );
    for r in results {
        println!(
            "  {:>7}  {:>10}  {:>8.3}  {:>8.2}",
            r.threads, r.blocks, r.elapsed_secs, r.throughput_mib_s
        );
    }
}

pub fn run_bench(
    cfg: &BsumConfig,
    path: &Path,
    block_size: Option<usize>,
    threads: &[usize],
) -> Result<()> {
    let thread_counts: &[usize] = if threads.is_empty() {
        &DEFAULT_THREAD_COUNTS
    } else {
        threads
    };
    let results = bench::run_bench(path, block_size.unwrap_or(cfg.block_size), thread_counts)?;
    print_bench_results(&results);
    if let Some(rec) = bench::recommend_thread_count(&results) {
        println!("Recommended thread count: {}", rec);
    }
    Ok(())
}
