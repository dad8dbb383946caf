/// Scripted engine used by unit tests

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::core::docker::{ChildSpec, ContainerDetails, Engine, MountRecord, Storage};
use crate::core::error::EngineError;

/// Ordered record of engine and archiver calls shared between fakes
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }
}

/// A running container with the given (source, destination) mounts
pub fn container(name: &str, mounts: &[(&str, &str)]) -> ContainerDetails {
    ContainerDetails {
        id: format!("{}0123456789abcdef", name),
        name: name.to_string(),
        image: "basement:latest".to_string(),
        labels: HashMap::new(),
        storage: Storage::Mounts(
            mounts
                .iter()
                .map(|(src, dst)| MountRecord {
                    source: Some(src.to_string()),
                    destination: Some(dst.to_string()),
                })
                .collect(),
        ),
        running: true,
    }
}

pub fn labeled(mut details: ContainerDetails, labels: &[(&str, &str)]) -> ContainerDetails {
    for (k, v) in labels {
        details.labels.insert(k.to_string(), v.to_string());
    }
    details
}

#[derive(Default)]
pub struct FakeEngine {
    containers: Mutex<Vec<ContainerDetails>>,
    created: Mutex<Vec<ChildSpec>>,
    failing: HashSet<String>,
    log_chunks: Vec<String>,
    exit_code: i64,
    pub journal: Journal,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(self, details: ContainerDetails) -> Self {
        self.containers.lock().unwrap().push(details);
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Make `op:name` (e.g. `stop:db`, `create:*`) fail
    pub fn failing(mut self, call: &str) -> Self {
        self.failing.insert(call.to_string());
        self
    }

    pub fn with_logs(mut self, chunks: &[&str]) -> Self {
        self.log_chunks = chunks.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_exit_code(mut self, code: i64) -> Self {
        self.exit_code = code;
        self
    }

    pub fn created(&self) -> Vec<ChildSpec> {
        self.created.lock().unwrap().clone()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.name == name && c.running)
    }

    fn find(&self, reference: &str) -> Option<ContainerDetails> {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.name == reference || (!reference.is_empty() && c.id.starts_with(reference)))
            .cloned()
    }

    fn call(&self, op: &str, reference: &str) -> Result<String, EngineError> {
        let name = self
            .find(reference)
            .map(|c| c.name)
            .unwrap_or_else(|| reference.to_string());
        self.journal.push(format!("{}:{}", op, name));

        if self.failing.contains(&format!("{}:{}", op, name))
            || self.failing.contains(&format!("{}:*", op))
        {
            return Err(EngineError::Incomplete(format!("scripted {} failure for {}", op, name)));
        }
        Ok(name)
    }

    fn set_running(&self, name: &str, running: bool) {
        for c in self.containers.lock().unwrap().iter_mut() {
            if c.name == name {
                c.running = running;
            }
        }
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn inspect(&self, reference: &str) -> Result<ContainerDetails, EngineError> {
        self.find(reference)
            .ok_or_else(|| EngineError::NotFound(reference.to_string()))
    }

    async fn list_running(&self) -> Result<Vec<ContainerDetails>, EngineError> {
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.running)
            .cloned()
            .collect())
    }

    async fn list_labeled(&self, label: &str) -> Result<Vec<ContainerDetails>, EngineError> {
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.labels.contains_key(label))
            .cloned()
            .collect())
    }

    async fn create(&self, spec: &ChildSpec) -> Result<String, EngineError> {
        self.call("create", &spec.name)?;
        self.created.lock().unwrap().push(spec.clone());

        let child = ContainerDetails {
            id: format!("{}-id", spec.name),
            name: spec.name.clone(),
            image: spec.image.clone(),
            labels: spec.labels.clone(),
            ..Default::default()
        };
        let id = child.id.clone();
        self.containers.lock().unwrap().push(child);
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<(), EngineError> {
        let name = self.call("start", id)?;
        self.set_running(&name, true);
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<(), EngineError> {
        let name = self.call("stop", id)?;
        self.set_running(&name, false);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), EngineError> {
        let name = self.call("remove", id)?;
        self.containers.lock().unwrap().retain(|c| c.name != name);
        Ok(())
    }

    fn logs<'a>(&'a self, id: &'a str) -> BoxStream<'a, Result<Vec<u8>, EngineError>> {
        self.journal.push(format!("logs:{}", id));
        stream::iter(
            self.log_chunks
                .iter()
                .map(|c| Ok(c.as_bytes().to_vec()))
                .collect::<Vec<_>>(),
        )
        .boxed()
    }

    async fn wait(&self, id: &str) -> Result<i64, EngineError> {
        self.journal.push(format!("wait:{}", id));
        Ok(self.exit_code)
    }
}
