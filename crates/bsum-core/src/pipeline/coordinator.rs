//! Batch coordinator: fan a batch out to the worker pool, wait for all of it,
//! then fan it back in to the writer in original order.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use super::pool::WorkerPool;
use super::writer::ChecksumWriter;
use crate::block::Block;
use crate::control::{RunState, Stage, StopReason};

/// What happened to a dispatched batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BatchOutcome {
    /// All checksums were queued to the writer (count).
    Queued(usize),
    /// The run stopped before the batch completed; nothing of it was written.
    Dropped,
}

pub(crate) struct BatchCoordinator<'a> {
    pool: &'a WorkerPool,
    writer: &'a ChecksumWriter,
    state: &'a RunState,
    poll_interval: Duration,
}

impl<'a> BatchCoordinator<'a> {
    pub(crate) fn new(
        pool: &'a WorkerPool,
        writer: &'a ChecksumWriter,
        state: &'a RunState,
        poll_interval: Duration,
    ) -> Self {
        Self {
            pool,
            writer,
            state,
            poll_interval,
        }
    }

    /// Hash `batch` on the pool and queue its checksums for output.
    ///
    /// Blocks until every block of the batch reported completion or the run
    /// was stopped. A batch is written whole or not at all: if the stop latch
    /// is raised before the batch completes, the batch is dropped.
    pub(crate) fn dispatch(&self, batch: Vec<Block>) -> BatchOutcome {
        let len = batch.len();
        let Some(first_index) = batch.first().map(Block::index) else {
            return BatchOutcome::Queued(0);
        };
        if self.state.is_stopped() {
            return BatchOutcome::Dropped;
        }

        let (done_tx, done_rx) = mpsc::channel();
        for block in batch {
            if let Err(e) = self.pool.submit(block, done_tx.clone()) {
                self.state.fail(StopReason::unrecognized(Stage::Pipeline, e.to_string()));
                return BatchOutcome::Dropped;
            }
        }
        drop(done_tx);

        let mut slots: Vec<Option<Block>> = (0..len).map(|_| None).collect();
        let mut completed = 0usize;
        while completed < len && !self.state.is_stopped() {
            match done_rx.recv_timeout(self.poll_interval) {
                Ok(block) => {
                    let slot = (block.index() - first_index) as usize;
                    slots[slot] = Some(block);
                    completed += 1;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    if !self.state.is_stopped() {
                        self.state.fail(StopReason::unrecognized(
                            Stage::Pipeline,
                            format!("workers exited with {} of {} blocks done", completed, len),
                        ));
                    }
                    break;
                }
            }
        }

        if self.state.is_stopped() {
            tracing::warn!(
                first_block = first_index,
                blocks = len,
                completed,
                "run stopped; dropping unfinished batch"
            );
            return BatchOutcome::Dropped;
        }

        let checksums: Option<Vec<u32>> = slots
            .iter()
            .map(|slot| slot.as_ref().and_then(Block::checksum))
            .collect();
        let Some(checksums) = checksums else {
            self.state.fail(
                StopReason::unrecognized(Stage::Pipeline, "batch completed with missing checksums")
                    .at_block(first_index),
            );
            return BatchOutcome::Dropped;
        };

        match self.writer.submit_batch(first_index, checksums) {
            Ok(true) => {}
            Ok(false) => return BatchOutcome::Dropped,
            Err(e) => {
                self.state.fail(StopReason::unrecognized(Stage::Write, e.to_string()));
                return BatchOutcome::Dropped;
            }
        }
        tracing::trace!(first_block = first_index, blocks = len, "batch queued for output");
        BatchOutcome::Queued(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{crc32, ChecksumError};
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn batch(first: u64, n: u64) -> Vec<Block> {
        (first..first + n)
            .map(|i| Block::new(i, vec![i as u8; 32]))
            .collect()
    }

    fn expected(first: u64, n: u64) -> String {
        (first..first + n)
            .map(|i| format!("{:08x}\n", crc32(&[i as u8; 32])))
            .collect()
    }

    /// Checksum that finishes later blocks first, to shuffle completion order.
    fn slow_for_low_bytes(data: &[u8]) -> Result<u32, ChecksumError> {
        let delay = 40u64.saturating_sub(u64::from(data[0]) * 10);
        std::thread::sleep(Duration::from_millis(delay));
        Ok(crc32(data))
    }

    #[test]
    fn batch_is_written_in_block_order() {
        let state = Arc::new(RunState::new());
        let sink = SharedBuf::default();
        let pool = WorkerPool::spawn(4, Arc::new(slow_for_low_bytes), Arc::clone(&state)).unwrap();
        let writer = ChecksumWriter::spawn(sink.clone(), None, Arc::clone(&state)).unwrap();
        {
            let coordinator = BatchCoordinator::new(&pool, &writer, &state, Duration::from_millis(1));
            assert_eq!(coordinator.dispatch(batch(0, 4)), BatchOutcome::Queued(4));
            assert_eq!(coordinator.dispatch(batch(4, 2)), BatchOutcome::Queued(2));
        }
        assert_eq!(writer.finish(), 6);
        let text = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text, expected(0, 6));
    }

    #[test]
    fn failed_block_drops_whole_batch() {
        let state = Arc::new(RunState::new());
        let sink = SharedBuf::default();
        let fail_on_two = |data: &[u8]| -> Result<u32, ChecksumError> {
            if data[0] == 2 {
                Err(ChecksumError::failed(data.len(), "injected"))
            } else {
                Ok(crc32(data))
            }
        };
        let pool = WorkerPool::spawn(2, Arc::new(fail_on_two), Arc::clone(&state)).unwrap();
        let writer = ChecksumWriter::spawn(sink.clone(), None, Arc::clone(&state)).unwrap();
        {
            let coordinator = BatchCoordinator::new(&pool, &writer, &state, Duration::from_millis(1));
            assert_eq!(coordinator.dispatch(batch(0, 2)), BatchOutcome::Queued(2));
            assert_eq!(coordinator.dispatch(batch(2, 2)), BatchOutcome::Dropped);
            assert_eq!(coordinator.dispatch(batch(4, 2)), BatchOutcome::Dropped);
        }
        writer.finish();
        let text = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text, expected(0, 2));
        assert_eq!(state.reason().unwrap().block, Some(2));
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let state = Arc::new(RunState::new());
        let pool = WorkerPool::spawn(1, Arc::new(crate::checksum::Crc32), Arc::clone(&state)).unwrap();
        let writer = ChecksumWriter::spawn(io::sink(), None, Arc::clone(&state)).unwrap();
        let coordinator = BatchCoordinator::new(&pool, &writer, &state, Duration::from_millis(1));
        assert_eq!(coordinator.dispatch(Vec::new()), BatchOutcome::Queued(0));
    }
}
