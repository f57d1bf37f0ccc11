//! Dedicated output thread: appends checksums in submission order.

use anyhow::{Context, Result};
use std::io::{self, BufWriter, Write};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::control::{RunState, Stage, StopReason};

/// Checksums of one completed batch, starting at block `first_index`.
struct BatchLines {
    first_index: u64,
    checksums: Vec<u32>,
}

/// Single-threaded writer for checksum lines. Batches are written strictly
/// in the order they were submitted, which is what keeps the output in block
/// order.
///
/// The stop latch is checked when a batch is submitted, not when the writer
/// thread dequeues it: a batch accepted before a failure elsewhere is still
/// written in full. The writer thread only stops writing after its own
/// write fails.
pub(crate) struct ChecksumWriter {
    tx: Option<mpsc::Sender<BatchLines>>,
    handle: Option<JoinHandle<u64>>,
    state: Arc<RunState>,
}

impl ChecksumWriter {
    /// Start the writer thread over `out`. `buffer_bytes` of `None` uses the
    /// `BufWriter` default capacity.
    pub(crate) fn spawn<W>(out: W, buffer_bytes: Option<usize>, state: Arc<RunState>) -> Result<Self>
    where
        W: Write + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<BatchLines>();
        let thread_state = Arc::clone(&state);
        let handle = std::thread::Builder::new()
            .name("bsum-writer".to_string())
            .spawn(move || {
                let out = match buffer_bytes {
                    Some(cap) => BufWriter::with_capacity(cap, out),
                    None => BufWriter::new(out),
                };
                write_loop(out, rx, &thread_state)
            })
            .context("spawn writer thread")?;
        Ok(ChecksumWriter {
            tx: Some(tx),
            handle: Some(handle),
            state,
        })
    }

    /// Queue the checksums of a completed batch for output.
    ///
    /// Returns `Ok(false)` without queueing anything if the run is already
    /// stopped.
    pub(crate) fn submit_batch(&self, first_index: u64, checksums: Vec<u32>) -> Result<bool> {
        if self.state.is_stopped() {
            return Ok(false);
        }
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("writer is shut down"))?;
        tx.send(BatchLines {
            first_index,
            checksums,
        })
        .map_err(|_| anyhow::anyhow!("writer thread has exited"))?;
        Ok(true)
    }

    /// Close the queue, wait for the writer to drain and flush it.
    /// Returns the number of lines that reached the output.
    pub(crate) fn finish(mut self) -> u64 {
        self.join()
    }

    fn join(&mut self) -> u64 {
        drop(self.tx.take());
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(lines)) => lines,
            Some(Err(_)) => {
                tracing::error!("writer thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for ChecksumWriter {
    fn drop(&mut self) {
        self.join();
    }
}

/// Writes every dequeued batch and flushes after each one; a line only counts
/// once the flush behind it succeeded.
fn write_loop<W: Write>(
    mut out: BufWriter<W>,
    rx: mpsc::Receiver<BatchLines>,
    state: &RunState,
) -> u64 {
    let mut lines = 0u64;
    let mut broken = false;
    for batch in rx {
        if broken {
            continue;
        }
        let mut pending = 0u64;
        for (offset, checksum) in batch.checksums.iter().enumerate() {
            if let Err(e) = write_line(&mut out, *checksum) {
                let index = batch.first_index + offset as u64;
                state.fail(StopReason::recognized(Stage::Write, e.to_string()).at_block(index));
                broken = true;
                break;
            }
            pending += 1;
        }
        match out.flush() {
            Ok(()) => lines += pending,
            Err(e) => {
                state.fail(StopReason::recognized(Stage::Write, format!("flush: {}", e)));
                broken = true;
            }
        }
    }
    lines
}

/// Append one output line: 8 lowercase hex digits and a newline.
pub(crate) fn write_line<W: Write + ?Sized>(out: &mut W, checksum: u32) -> io::Result<()> {
    writeln!(out, "{:08x}", checksum)
}
