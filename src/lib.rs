pub mod agent;
pub mod cli;
pub mod collab;
pub mod config;
pub mod correlation;
pub mod orchestrator;
pub mod probe;
pub mod radio;
pub mod report;
pub mod scheduler;
pub mod session;
pub mod util;
