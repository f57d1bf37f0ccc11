//! Run-scoped stop latch shared by every pipeline stage.
//!
//! A pipeline run owns one [`RunState`]; the reader, each checksum worker and
//! the writer hold it through an `Arc` and poll it before every unit of work.
//! The first failure anywhere raises the latch; it is never lowered again
//! during the run.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

/// Pipeline stage where a failure was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Read,
    Checksum,
    Write,
    /// Thread management inside the pipeline (e.g. a worker exited early).
    Pipeline,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Read => "read",
            Stage::Checksum => "checksum",
            Stage::Write => "write",
            Stage::Pipeline => "pipeline",
        };
        f.write_str(s)
    }
}

/// Why a run stopped early.
///
/// `recognized` separates typed errors (I/O errors, [`ChecksumError`]) from
/// unrecognized ones such as a panic caught inside a worker.
///
/// [`ChecksumError`]: crate::checksum::ChecksumError
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReason {
    pub stage: Stage,
    pub block: Option<u64>,
    pub message: String,
    pub recognized: bool,
}

impl StopReason {
    pub fn recognized(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            block: None,
            message: message.into(),
            recognized: true,
        }
    }

    pub fn unrecognized(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            block: None,
            message: message.into(),
            recognized: false,
        }
    }

    pub fn at_block(mut self, index: u64) -> Self {
        self.block = Some(index);
        self
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.recognized {
            write!(f, "{} error has occurred: \"{}\"", self.stage, self.message)?;
        } else {
            write!(f, "undefined {} error has occurred ({})", self.stage, self.message)?;
        }
        if let Some(block) = self.block {
            write!(f, " at block {}", block)?;
        }
        Ok(())
    }
}

/// Shared state of one pipeline run: the stop latch and the first failure.
#[derive(Debug, Default)]
pub struct RunState {
    stop: AtomicBool,
    reason: OnceLock<StopReason>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once any stage has failed.
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Record a failure, log it and raise the latch. Only the first failure is
    /// kept as the run's reason; later ones are still logged.
    /// Returns true if this call raised the latch.
    pub fn fail(&self, reason: StopReason) -> bool {
        if reason.recognized {
            tracing::error!(stage = %reason.stage, block = ?reason.block, "{}", reason);
        } else {
            tracing::error!(stage = %reason.stage, block = ?reason.block, unrecognized = true, "{}", reason);
        }
        let first = !self.stop.swap(true, Ordering::AcqRel);
        if first {
            let _ = self.reason.set(reason);
        }
        first
    }

    /// The first recorded failure, if any.
    pub fn reason(&self) -> Option<&StopReason> {
        self.reason.get()
    }
}
