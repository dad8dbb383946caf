/// Error taxonomy for backup and restore operations
///
/// Configuration and existence errors abort before anything is mutated.
/// Stop/restart failures never show up here: the lifecycle logs them.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Archival tool verbs, used to classify tool failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Init,
    Create,
    Prune,
    List,
    Delete,
    Extract,
    Info,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Init => "init",
            Verb::Create => "create",
            Verb::Prune => "prune",
            Verb::List => "list",
            Verb::Delete => "delete",
            Verb::Extract => "extract",
            Verb::Info => "info",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the container engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No such container: {0}")]
    NotFound(String),

    #[error("Docker API error: {0}")]
    Api(#[from] bollard::errors::Error),

    #[error("Docker returned an incomplete response: {0}")]
    Incomplete(String),
}

#[derive(Error, Debug)]
pub enum BasementError {
    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("No repository at {}", .0.display())]
    NoRepository(PathBuf),

    #[error("Archive not found: {0}")]
    ArchiveNotFound(String),

    #[error("{verb} failed ({})", describe_exit(.code))]
    Operation { verb: Verb, code: Option<i32> },

    #[error("Could not run {program}: {source}")]
    ToolUnavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Child container {name} exited with code {code}")]
    ChildFailed { name: String, code: i64 },

    #[error("Invalid prune spec '{0}'")]
    InvalidPruneSpec(String),

    #[error("Cannot find our own container: {0} is not set")]
    SelfUnknown(&'static str),

    #[error("{0} can only run inside the backup child container")]
    NotEscalated(&'static str),

    #[error("{failed} of {total} backups failed")]
    BatchFailed { failed: usize, total: usize },

    #[error(transparent)]
    Engine(EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EngineError> for BasementError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(reference) => BasementError::ContainerNotFound(reference),
            other => BasementError::Engine(other),
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, BasementError>;
