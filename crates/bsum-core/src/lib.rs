pub mod config;
pub mod logging;

pub mod bench;
pub mod block;
pub mod checksum;
pub mod control;
pub mod pipeline;
