//! Command implementations for the `hdm` binary.

mod add;
mod hosters;
mod run;
mod seed;
mod status;

pub use add::run_add;
pub use hosters::run_hosters;
pub use run::run_engine;
pub use seed::run_seed;
pub use status::run_status;
