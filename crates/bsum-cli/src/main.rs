use bsum_core::logging;

mod cli;

use crate::cli::Cli;

fn main() {
    // Initialize logging as early as possible; fall back to stderr if the
    // state dir is unusable.
    if let Err(err) = logging::init_logging() {
        logging::init_logging_stderr();
        tracing::warn!("log file unavailable, logging to stderr: {:#}", err);
    }

    let code = match Cli::run_from_args() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("bsum error: {:#}", err);
            1
        }
    };
    std::process::exit(code);
}
