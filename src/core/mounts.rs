/// Mount aggregation and linked-container discovery
///
/// Both work on a snapshot of engine state. Nothing is locked: containers
/// can start, stop or change mounts between two calls.

use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use crate::core::docker::{ContainerDetails, Engine, Storage};
use crate::core::error::EngineError;

/// A host path made visible inside a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountBinding {
    pub source: String,
    pub destination: String,
    pub read_only: bool,
}

impl MountBinding {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Engine bind syntax, `src:dst[:ro]`
    pub fn to_bind(&self) -> String {
        if self.read_only {
            format!("{}:{}:ro", self.source, self.destination)
        } else {
            format!("{}:{}", self.source, self.destination)
        }
    }

    /// Whether `path` lives at or below this binding's destination
    pub fn covers(&self, path: &Path) -> bool {
        path.starts_with(&self.destination)
    }
}

/// Bindings of a container, destinations prefixed with `prefix`
///
/// Records without a source or destination are skipped. Duplicates are kept.
pub fn bindings(container: &ContainerDetails, prefix: &str) -> Vec<MountBinding> {
    match &container.storage {
        Storage::Mounts(records) => records
            .iter()
            .filter_map(|m| match (&m.source, &m.destination) {
                (Some(src), Some(dst)) => {
                    Some(MountBinding::new(src, format!("{}{}", prefix, dst)))
                }
                _ => None,
            })
            .collect(),
        Storage::LegacyVolumes(volumes) => volumes
            .iter()
            .map(|(dst, src)| MountBinding::new(src, format!("{}{}", prefix, dst)))
            .collect(),
    }
}

fn sources(container: &ContainerDetails, control_socket: &Path) -> HashSet<String> {
    bindings(container, "")
        .into_iter()
        .map(|b| b.source)
        .filter(|src| Path::new(src) != control_socket)
        .collect()
}

/// Whether `candidate` shares storage with `target`
///
/// The control socket is mounted by nearly everything that manages
/// containers and is ignored.
pub fn is_linked(
    candidate: &ContainerDetails,
    target: &ContainerDetails,
    control_socket: &Path,
) -> bool {
    if !candidate.running || candidate.is_child() {
        return false;
    }

    let target_sources = sources(target, control_socket);
    sources(candidate, control_socket)
        .iter()
        .any(|src| target_sources.contains(src))
}

/// Running containers sharing at least one mount source with `target`
///
/// The target itself is included when running. Containers matching one of
/// `excluded` (ids, id prefixes or names) are never linked: that is how the
/// child and the container that launched it keep themselves running.
pub async fn linked(
    engine: &dyn Engine,
    target: &ContainerDetails,
    control_socket: &Path,
    excluded: &[&str],
) -> Result<Vec<ContainerDetails>, EngineError> {
    let running = engine.list_running().await?;

    let linked: Vec<ContainerDetails> = running
        .into_iter()
        .filter(|c| !is_excluded(c, excluded))
        .filter(|c| is_linked(c, target, control_socket))
        .collect();

    debug!(
        target = %target.name,
        linked = ?linked.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        "linked containers"
    );

    Ok(linked)
}

/// Hostname inside a container is a short id prefix of the full id
fn is_excluded(container: &ContainerDetails, excluded: &[&str]) -> bool {
    excluded
        .iter()
        .filter(|r| !r.is_empty())
        .any(|r| container.id.starts_with(r) || container.name == *r)
}
