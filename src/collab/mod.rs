pub mod command;
pub mod types;

use crate::{
    probe::{Location, ProbeValue},
    radio::RadioCellRecord,
};
use anyhow::Result;
use std::sync::Arc;

pub use types::{CommandReply, MeasureRequest, SendReply, SendRequest};

/// Returned errors may wrap a [`crate::probe::ProbeFailure`] to pick the
/// failure kind; any other error counts as a transport failure.
pub trait LocationSource: Send + Sync {
    fn read(&self) -> Result<Location>;
}

pub trait CellSource: Send + Sync {
    fn read(&self) -> Result<RadioCellRecord>;
}

/// Download, upload, ping and DNS. Implementations bound their own runtime.
pub trait Measurement: Send + Sync {
    fn run(&self) -> Result<ProbeValue>;
}

/// Fire-and-forget message issue. Confirmations arrive later on the
/// completion channel handed to the agent, keyed by the returned id.
pub trait MessageTransport: Send + Sync {
    fn send(&self, payload: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct ProbeBackends {
    pub location: Arc<dyn LocationSource>,
    pub cell: Arc<dyn CellSource>,
    pub download: Arc<dyn Measurement>,
    pub upload: Arc<dyn Measurement>,
    pub ping: Arc<dyn Measurement>,
    pub dns: Arc<dyn Measurement>,
    pub transport: Arc<dyn MessageTransport>,
}

impl std::fmt::Debug for ProbeBackends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeBackends").finish_non_exhaustive()
    }
}
