pub mod config;
pub mod logging;

pub mod client;
pub mod engine;
pub mod ledger;
pub mod orchestrator;
pub mod processor;
pub mod queue;
pub mod quota;
pub mod store;
pub mod trigger;
