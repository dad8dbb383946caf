/// Stop / operate / restart bracket
///
/// Containers sharing storage with the target are stopped before the
/// operation and started again afterwards, whether the operation worked or
/// not. Only the operation's own result is reported; stop and restart
/// failures are logged and skipped.

use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::core::config::BackupRequest;
use crate::core::docker::{ContainerDetails, Engine};
use crate::core::error::Result;
use crate::core::mounts::linked;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    DiscoverLinks,
    Stopping,
    Operating,
    Restarting,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::DiscoverLinks => "discover-links",
            Phase::Stopping => "stopping",
            Phase::Operating => "operating",
            Phase::Restarting => "restarting",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

pub struct Lifecycle<'a> {
    engine: &'a dyn Engine,
    control_socket: &'a Path,
    excluded: &'a [&'a str],
    phase: Phase,
}

impl<'a> Lifecycle<'a> {
    /// `excluded` names containers never stopped, whatever they share
    pub fn new(engine: &'a dyn Engine, control_socket: &'a Path, excluded: &'a [&'a str]) -> Self {
        Self {
            engine,
            control_socket,
            excluded,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = %self.phase, to = %phase, "lifecycle");
        self.phase = phase;
    }

    /// Run `operation` with every container linked to `target` stopped
    pub async fn run<T, F>(
        &mut self,
        request: &BackupRequest,
        target: &ContainerDetails,
        operation: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.enter(Phase::DiscoverLinks);
        let linked = if request.no_stop {
            info!(container = %request.container, "no-stop set, leaving containers running");
            Vec::new()
        } else {
            linked(self.engine, target, self.control_socket, self.excluded).await?
        };

        self.enter(Phase::Stopping);
        for container in &linked {
            info!(container = %container.name, "stopping");
            if let Err(e) = self.engine.stop(&container.id).await {
                warn!(container = %container.name, "failed to stop: {}", e);
            }
        }

        self.enter(Phase::Operating);
        let outcome = operation();
        if outcome.is_err() {
            self.enter(Phase::Failed);
        }

        self.enter(Phase::Restarting);
        for container in &linked {
            info!(container = %container.name, "restarting");
            if let Err(e) = self.engine.start(&container.id).await {
                warn!(container = %container.name, "failed to restart: {}", e);
            }
        }

        self.enter(if outcome.is_ok() { Phase::Done } else { Phase::Failed });
        outcome
    }
}
