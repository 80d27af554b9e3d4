use hdm_core::{config, logging};

mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    // Config comes first so the log destination can be configured; fall back
    // to stderr if the log file is unwritable.
    let cfg = match config::load_or_init() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("hdm error: {:#}", err);
            std::process::exit(1);
        }
    };
    if logging::init_logging(cfg.log_file.as_deref()).is_err() {
        logging::init_logging_stderr();
    }

    if let Err(err) = CliCommand::run_from_args(cfg).await {
        eprintln!("hdm error: {:#}", err);
        std::process::exit(1);
    }
}
