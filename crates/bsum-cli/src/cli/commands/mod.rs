//! CLI command handlers.

mod bench;
mod hash;

pub use bench::run_bench;
pub use hash::run_hash;
