//! Fixed-size pool of checksum worker threads.

use anyhow::{Context, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::block::Block;
use crate::checksum::BlockChecksum;
use crate::control::{RunState, Stage, StopReason};

/// A block to hash plus where to report it once hashed.
struct Task {
    block: Block,
    done: mpsc::Sender<Block>,
}

/// N worker threads sharing one task queue. Tasks are picked up by whichever
/// worker is idle, so completion order within a batch is arbitrary.
pub(crate) struct WorkerPool {
    tx: Option<mpsc::Sender<Task>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub(crate) fn spawn<C: BlockChecksum>(
        threads: usize,
        checksum: Arc<C>,
        state: Arc<RunState>,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Task>();
        let rx = Arc::new(Mutex::new(rx));
        let mut pool = WorkerPool {
            tx: Some(tx),
            handles: Vec::with_capacity(threads),
        };
        for id in 0..threads {
            let rx = Arc::clone(&rx);
            let checksum = Arc::clone(&checksum);
            let state = Arc::clone(&state);
            let handle = std::thread::Builder::new()
                .name(format!("bsum-worker-{}", id))
                .spawn(move || loop {
                    let task = match rx.lock() {
                        Ok(queue) => queue.recv(),
                        Err(_) => break,
                    };
                    let Ok(task) = task else { break };
                    compute(task, checksum.as_ref(), &state);
                })
                .with_context(|| format!("spawn checksum worker {}", id))?;
            pool.handles.push(handle);
        }
        Ok(pool)
    }

    /// Queue `block` for hashing; the hashed block is sent on `done`.
    pub(crate) fn submit(&self, block: Block, done: mpsc::Sender<Block>) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("worker pool is shut down"))?;
        tx.send(Task { block, done })
            .map_err(|_| anyhow::anyhow!("all checksum workers have exited"))
    }

    /// Close the queue and wait for every worker to drain it.
    pub(crate) fn shutdown(&mut self) {
        drop(self.tx.take());
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("checksum worker panicked outside of a task");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Hash one block. Skipped entirely once the run is stopped; otherwise the
/// block is reported on `done` exactly once, even when hashing failed.
fn compute<C: BlockChecksum + ?Sized>(task: Task, checksum: &C, state: &RunState) {
    if state.is_stopped() {
        return;
    }
    let Task { mut block, done } = task;
    let index = block.index();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| checksum.checksum(block.data())));
    match outcome {
        Ok(Ok(value)) => block.set_checksum(value),
        Ok(Err(err)) => {
            state.fail(StopReason::recognized(Stage::Checksum, err.to_string()).at_block(index));
        }
        Err(payload) => {
            state.fail(
                StopReason::unrecognized(Stage::Checksum, panic_message(payload.as_ref()))
                    .at_block(index),
            );
        }
    }
    let _ = done.send(block);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
