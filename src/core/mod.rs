pub mod archiver;
pub mod backup;
pub mod config;
pub mod docker;
pub mod error;
pub mod escalation;
pub mod lifecycle;
pub mod mounts;
pub mod pipeline;

#[cfg(test)]
mod testing;

pub use archiver::{Archiver, BorgCli};
pub use docker::{DockerEngine, Engine};
pub use error::{BasementError, Result};
pub use escalation::Escalation;
pub use pipeline::{Action, Operation, Pipeline};
