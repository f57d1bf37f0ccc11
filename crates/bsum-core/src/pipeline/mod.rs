//! The block checksum pipeline.
//!
//! One reader (the driver, which also coordinates batches), a fixed pool of
//! checksum workers and one writer thread. The reader fills a batch of up to
//! `threads` blocks, the coordinator fans it out to the pool and waits for the
//! whole batch, then queues the checksums to the writer in block order before
//! the next batch is read. Any failure raises the run's stop latch; remaining
//! work drains and the run reports how far it got.

mod coordinator;
mod pool;
mod writer;

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::block::read_block;
use crate::checksum::{BlockChecksum, Crc32};
use crate::config::{self, BsumConfig};
use crate::control::{RunState, Stage, StopReason};

use coordinator::{BatchCoordinator, BatchOutcome};
use pool::WorkerPool;
use writer::ChecksumWriter;

/// Invalid pipeline parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("block size must be greater than zero")]
    ZeroBlockSize,
    #[error("thread count must be greater than zero")]
    ZeroThreads,
}

/// Validated parameters of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    block_size: usize,
    threads: usize,
    poll_interval: Duration,
    write_buffer_bytes: Option<usize>,
}

impl PipelineSettings {
    pub fn new(block_size: usize, threads: usize) -> Result<Self, SettingsError> {
        if block_size == 0 {
            return Err(SettingsError::ZeroBlockSize);
        }
        if threads == 0 {
            return Err(SettingsError::ZeroThreads);
        }
        Ok(Self {
            block_size,
            threads,
            poll_interval: Duration::from_millis(config::DEFAULT_POLL_INTERVAL_MS),
            write_buffer_bytes: None,
        })
    }

    /// Settings from the config file values.
    pub fn from_config(cfg: &BsumConfig) -> Result<Self, SettingsError> {
        Ok(Self::new(cfg.block_size, cfg.threads)?
            .with_poll_interval(Duration::from_millis(cfg.poll_interval_ms))
            .with_write_buffer(cfg.write_buffer_bytes))
    }

    /// How long a waiting batch sleeps between stop-latch checks. Zero is
    /// raised to 1ms.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_write_buffer(mut self, bytes: Option<usize>) -> Self {
        self.write_buffer_bytes = bytes;
        self
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Worker thread count, which is also the batch length.
    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// All input was hashed and written.
    Completed,
    /// A stage failed; output holds the batches finished before the failure.
    Stopped(StopReason),
}

/// Summary of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Blocks read from the input (including ones later dropped).
    pub blocks_read: u64,
    /// Batches whose checksums were queued to the writer.
    pub batches_written: u64,
    /// Lines written and flushed to the output.
    pub lines_written: u64,
    pub elapsed: Duration,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

/// A configured pipeline. Reusable: every `run` gets fresh threads and a
/// fresh stop latch.
pub struct Pipeline<C = Crc32> {
    settings: PipelineSettings,
    checksum: Arc<C>,
}

impl Pipeline<Crc32> {
    /// Pipeline hashing blocks with CRC-32.
    pub fn new(settings: PipelineSettings) -> Self {
        Self::with_checksum(settings, Crc32)
    }
}

impl<C: BlockChecksum> Pipeline<C> {
    pub fn with_checksum(settings: PipelineSettings, checksum: C) -> Self {
        Self {
            settings,
            checksum: Arc::new(checksum),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Hash the file at `input` into `output`.
    ///
    /// Fails without starting the pipeline if either file cannot be opened;
    /// the output is only created once the input is open. Failures during the
    /// run are not errors here: they are reported in the returned
    /// [`RunReport`].
    pub fn run_files(&self, input: &Path, output: &Path) -> Result<RunReport> {
        self.run_files_with(input, output, |_| {})
    }

    /// Like [`run_files`](Self::run_files), calling `on_started` once both
    /// files are open and before the first block is read.
    pub fn run_files_with<F>(&self, input: &Path, output: &Path, on_started: F) -> Result<RunReport>
    where
        F: FnOnce(&PipelineSettings),
    {
        let start = Instant::now();
        let in_file = File::open(input)
            .with_context(|| format!("cannot open file {}", input.display()))?;
        let out_file = File::create(output)
            .with_context(|| format!("cannot open file {}", output.display()))?;
        on_started(&self.settings);
        self.run_from(start, in_file, out_file)
    }

    /// Hash everything readable from `input` into `output`.
    pub fn run<R, W>(&self, input: R, output: W) -> Result<RunReport>
    where
        R: Read,
        W: Write + Send + 'static,
    {
        self.run_from(Instant::now(), input, output)
    }

    fn run_from<R, W>(&self, start: Instant, mut input: R, output: W) -> Result<RunReport>
    where
        R: Read,
        W: Write + Send + 'static,
    {
        let block_size = self.settings.block_size;
        let threads = self.settings.threads;
        tracing::info!(block_size, threads, "hashing started");

        let state = Arc::new(RunState::new());
        let mut pool = WorkerPool::spawn(threads, Arc::clone(&self.checksum), Arc::clone(&state))?;
        let writer = ChecksumWriter::spawn(
            output,
            self.settings.write_buffer_bytes,
            Arc::clone(&state),
        )?;

        let mut blocks_read = 0u64;
        let mut batches_written = 0u64;
        {
            let coordinator =
                BatchCoordinator::new(&pool, &writer, &state, self.settings.poll_interval);
            let mut exhausted = false;
            while !exhausted && !state.is_stopped() {
                let mut batch = Vec::with_capacity(threads);
                while batch.len() < threads && !state.is_stopped() {
                    match read_block(&mut input, block_size, blocks_read) {
                        Ok(Some(block)) => {
                            blocks_read += 1;
                            let short = block.size() < block_size;
                            batch.push(block);
                            if short {
                                exhausted = true;
                                break;
                            }
                        }
                        Ok(None) => {
                            exhausted = true;
                            break;
                        }
                        Err(e) => {
                            state.fail(
                                StopReason::recognized(Stage::Read, e.to_string())
                                    .at_block(blocks_read),
                            );
                            break;
                        }
                    }
                }
                if batch.is_empty() || state.is_stopped() {
                    break;
                }
                match coordinator.dispatch(batch) {
                    BatchOutcome::Queued(n) => {
                        batches_written += 1;
                        tracing::debug!(batch = batches_written, blocks = n, "batch queued");
                    }
                    BatchOutcome::Dropped => break,
                }
            }
        }

        // Drain: let queued work finish, then flush and close the output.
        pool.shutdown();
        let lines_written = writer.finish();
        let elapsed = start.elapsed();

        let outcome = match state.reason() {
            Some(reason) => RunOutcome::Stopped(reason.clone()),
            None => RunOutcome::Completed,
        };
        tracing::info!(
            blocks_read,
            lines_written,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            success = outcome == RunOutcome::Completed,
            "hashing finished"
        );
        Ok(RunReport {
            blocks_read,
            batches_written,
            lines_written,
            elapsed,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::crc32;
    use std::io::Cursor;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn settings_reject_zero() {
        assert_eq!(PipelineSettings::new(0, 4), Err(SettingsError::ZeroBlockSize));
        assert_eq!(PipelineSettings::new(512, 0), Err(SettingsError::ZeroThreads));
        let s = PipelineSettings::new(512, 4).unwrap();
        assert_eq!(s.block_size(), 512);
        assert_eq!(s.threads(), 4);
        assert_eq!(s.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn settings_from_config() {
        let cfg = BsumConfig {
            block_size: 64,
            threads: 3,
            poll_interval_ms: 0,
            write_buffer_bytes: Some(128),
        };
        let s = PipelineSettings::from_config(&cfg).unwrap();
        assert_eq!(s.block_size(), 64);
        assert_eq!(s.threads(), 3);
        assert_eq!(s.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn run_counts_blocks_and_batches() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10 * 16 + 5).collect();
        let sink = SharedBuf::default();
        let pipeline = Pipeline::new(PipelineSettings::new(16, 4).unwrap());
        let report = pipeline.run(Cursor::new(data.clone()), sink.clone()).unwrap();
        assert!(report.is_success());
        assert_eq!(report.blocks_read, 11);
        assert_eq!(report.batches_written, 3);
        assert_eq!(report.lines_written, 11);
        let expected: String = data
            .chunks(16)
            .map(|c| format!("{:08x}\n", crc32(c)))
            .collect();
        assert_eq!(sink.text(), expected);
    }

    #[test]
    fn empty_input_writes_nothing() {
        let sink = SharedBuf::default();
        let pipeline = Pipeline::new(PipelineSettings::new(512, 4).unwrap());
        let report = pipeline.run(std::io::empty(), sink.clone()).unwrap();
        assert!(report.is_success());
        assert_eq!(report.blocks_read, 0);
        assert_eq!(report.batches_written, 0);
        assert!(sink.text().is_empty());
    }

    #[test]
    fn run_files_reports_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let pipeline = Pipeline::new(PipelineSettings::new(512, 2).unwrap());
        let mut started = false;
        let err = pipeline
            .run_files_with(&dir.path().join("missing.bin"), &out, |_| started = true)
            .unwrap_err();
        assert!(err.to_string().contains("cannot open file"));
        assert!(!out.exists(), "output must not be created when input fails");
        assert!(!started, "start hook must not run when a file cannot be opened");
    }

    #[test]
    fn run_files_calls_start_hook_after_open() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.bin");
        let out = dir.path().join("out.txt");
        std::fs::write(&input, [1u8; 40]).unwrap();
        let pipeline = Pipeline::new(PipelineSettings::new(16, 2).unwrap());
        let mut seen = None;
        let report = pipeline
            .run_files_with(&input, &out, |s| {
                seen = Some((s.block_size(), s.threads(), out.exists()))
            })
            .unwrap();
        assert_eq!(seen, Some((16, 2, true)));
        assert_eq!(report.lines_written, 3);
    }
}
