/// Docker integration
///
/// Read-only inspection plus the handful of lifecycle calls basement needs:
/// create, start, stop and remove containers, follow their logs and wait
/// for them to exit. Everything above this module talks to the `Engine`
/// trait so tests can script the engine state.

use anyhow::Context;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::models::{ContainerInspectResponse, ContainerSummary, HostConfig, MountPoint};
use bollard::Docker;
use futures::stream::{BoxStream, StreamExt};
use std::collections::{BTreeMap, HashMap};

use crate::core::error::EngineError;
use crate::core::mounts::MountBinding;
use crate::utils::{is_truthy, trim_container_name, LABEL_CHILD};

/// One mount as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    pub source: Option<String>,
    pub destination: Option<String>,
}

/// Storage owned by a container
///
/// Old engines only report a `Volumes` map (container path to host path);
/// newer ones report structured mount records. Both aggregate the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    Mounts(Vec<MountRecord>),
    LegacyVolumes(BTreeMap<String, String>),
}

impl Default for Storage {
    fn default() -> Self {
        Storage::Mounts(Vec::new())
    }
}

/// Container metadata snapshot
#[derive(Debug, Clone, Default)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub image: String,
    pub labels: HashMap<String, String>,
    pub storage: Storage,
    pub running: bool,
}

impl ContainerDetails {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(|s| s.as_str())
    }

    /// Whether this is an ephemeral child spawned by basement
    pub fn is_child(&self) -> bool {
        self.label(LABEL_CHILD).map(is_truthy).unwrap_or(false)
    }
}

/// Everything needed to create the ephemeral child
#[derive(Debug, Clone, Default)]
pub struct ChildSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub env: Vec<(String, String)>,
    pub bindings: Vec<MountBinding>,
    pub labels: HashMap<String, String>,
}

/// Container engine control API
#[async_trait]
pub trait Engine: Send + Sync {
    async fn inspect(&self, reference: &str) -> Result<ContainerDetails, EngineError>;

    /// Running containers only
    async fn list_running(&self) -> Result<Vec<ContainerDetails>, EngineError>;

    /// All containers carrying `label`, whatever its value and state
    async fn list_labeled(&self, label: &str) -> Result<Vec<ContainerDetails>, EngineError>;

    async fn create(&self, spec: &ChildSpec) -> Result<String, EngineError>;

    async fn start(&self, id: &str) -> Result<(), EngineError>;

    async fn stop(&self, id: &str) -> Result<(), EngineError>;

    async fn remove(&self, id: &str) -> Result<(), EngineError>;

    /// Follow stdout and stderr until the container exits
    fn logs<'a>(&'a self, id: &'a str) -> BoxStream<'a, Result<Vec<u8>, EngineError>>;

    /// Block until the container exits and return its exit code
    async fn wait(&self, id: &str) -> Result<i64, EngineError>;
}

#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect using DOCKER_HOST or the local socket
    pub fn connect() -> anyhow::Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon. Is Docker running?")?;

        Ok(Self { docker })
    }

    /// Check if Docker daemon is accessible
    pub async fn check_docker(&self) -> bool {
        self.docker.ping().await.is_ok()
    }

    fn map_error(reference: &str, err: bollard::errors::Error) -> EngineError {
        match err {
            bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
                EngineError::NotFound(reference.to_string())
            }
            other => EngineError::Api(other),
        }
    }

    async fn list(
        &self,
        all: bool,
        filters: HashMap<String, Vec<String>>,
    ) -> Result<Vec<ContainerDetails>, EngineError> {
        let options = Some(ListContainersOptions {
            all,
            filters,
            ..Default::default()
        });

        let containers = self.docker.list_containers(options).await?;

        Ok(containers.into_iter().map(summary_to_details).collect())
    }
}

fn mount_records(mounts: Option<Vec<MountPoint>>) -> Storage {
    Storage::Mounts(
        mounts
            .unwrap_or_default()
            .into_iter()
            .map(|m| MountRecord {
                source: m.source,
                destination: m.destination,
            })
            .collect(),
    )
}

/// Convert an inspect response to ContainerDetails
fn inspect_to_details(inspect: ContainerInspectResponse) -> ContainerDetails {
    let (image, labels) = inspect
        .config
        .map(|c| (c.image.unwrap_or_default(), c.labels.unwrap_or_default()))
        .unwrap_or_default();

    ContainerDetails {
        id: inspect.id.unwrap_or_default(),
        name: trim_container_name(inspect.name.as_deref().unwrap_or_default()).to_string(),
        image,
        labels,
        storage: mount_records(inspect.mounts),
        running: inspect.state.and_then(|s| s.running).unwrap_or(false),
    }
}

/// Convert a list entry to ContainerDetails
fn summary_to_details(summary: ContainerSummary) -> ContainerDetails {
    let name = summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|n| trim_container_name(n).to_string())
        .unwrap_or_else(|| "unknown".to_string());

    ContainerDetails {
        id: summary.id.unwrap_or_default(),
        name,
        image: summary.image.unwrap_or_default(),
        labels: summary.labels.unwrap_or_default(),
        storage: mount_records(summary.mounts),
        running: summary.state.as_deref() == Some("running"),
    }
}

#[async_trait]
impl Engine for DockerEngine {
    async fn inspect(&self, reference: &str) -> Result<ContainerDetails, EngineError> {
        let inspect = self
            .docker
            .inspect_container(reference, None::<InspectContainerOptions>)
            .await
            .map_err(|e| Self::map_error(reference, e))?;

        Ok(inspect_to_details(inspect))
    }

    async fn list_running(&self) -> Result<Vec<ContainerDetails>, EngineError> {
        let mut filters = HashMap::new();
        filters.insert("status".to_string(), vec!["running".to_string()]);

        self.list(false, filters).await
    }

    async fn list_labeled(&self, label: &str) -> Result<Vec<ContainerDetails>, EngineError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![label.to_string()]);

        self.list(true, filters).await
    }

    async fn create(&self, spec: &ChildSpec) -> Result<String, EngineError> {
        let volumes: HashMap<String, HashMap<(), ()>> = spec
            .bindings
            .iter()
            .map(|b| (b.destination.clone(), HashMap::new()))
            .collect();

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            env: Some(spec.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()),
            labels: Some(spec.labels.clone()),
            volumes: Some(volumes),
            host_config: Some(HostConfig {
                binds: Some(spec.bindings.iter().map(MountBinding::to_bind).collect()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = Some(CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        });

        let response = self.docker.create_container(options, config).await?;
        Ok(response.id)
    }

    async fn start(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Self::map_error(id, e))
    }

    async fn stop(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .stop_container(id, None)
            .await
            .map_err(|e| Self::map_error(id, e))
    }

    async fn remove(&self, id: &str) -> Result<(), EngineError> {
        let options = Some(RemoveContainerOptions {
            force: true,
            v: false,
            ..Default::default()
        });

        self.docker
            .remove_container(id, options)
            .await
            .map_err(|e| Self::map_error(id, e))
    }

    fn logs<'a>(&'a self, id: &'a str) -> BoxStream<'a, Result<Vec<u8>, EngineError>> {
        let options = Some(LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        });

        self.docker
            .logs(id, options)
            .map(|chunk| {
                chunk
                    .map(|output| output.into_bytes().to_vec())
                    .map_err(EngineError::from)
            })
            .boxed()
    }

    async fn wait(&self, id: &str) -> Result<i64, EngineError> {
        let mut stream = Box::pin(
            self.docker
                .wait_container(id, None::<WaitContainerOptions<String>>),
        );

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // Non-zero exits come back as an error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(Self::map_error(id, e)),
            None => Err(EngineError::Incomplete(format!("no exit status for {}", id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{ContainerConfig, ContainerState};

    #[test]
    fn test_inspect_to_details() {
        let mut labels = HashMap::new();
        labels.insert("basement.backup-name".to_string(), "mysite".to_string());

        let inspect = ContainerInspectResponse {
            id: Some("0123456789abcdef".to_string()),
            name: Some("/web".to_string()),
            config: Some(ContainerConfig {
                image: Some("nginx:latest".to_string()),
                labels: Some(labels),
                ..Default::default()
            }),
            mounts: Some(vec![MountPoint {
                source: Some("/var/lib/docker/volumes/web/_data".to_string()),
                destination: Some("/usr/share/nginx/html".to_string()),
                ..Default::default()
            }]),
            state: Some(ContainerState {
                running: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };

        let details = inspect_to_details(inspect);

        assert_eq!(details.name, "web");
        assert_eq!(details.image, "nginx:latest");
        assert_eq!(details.label("basement.backup-name"), Some("mysite"));
        assert!(details.running);
        assert_eq!(
            details.storage,
            Storage::Mounts(vec![MountRecord {
                source: Some("/var/lib/docker/volumes/web/_data".to_string()),
                destination: Some("/usr/share/nginx/html".to_string()),
            }])
        );
    }

    #[test]
    fn test_summary_to_details() {
        let summary = ContainerSummary {
            id: Some("abc".to_string()),
            names: Some(vec!["/db".to_string()]),
            state: Some("exited".to_string()),
            ..Default::default()
        };

        let details = summary_to_details(summary);

        assert_eq!(details.name, "db");
        assert!(!details.running);
        assert_eq!(details.storage, Storage::Mounts(vec![]));
    }

    #[test]
    fn test_child_label() {
        let mut details = ContainerDetails::default();
        assert!(!details.is_child());

        details.labels.insert(LABEL_CHILD.to_string(), "true".to_string());
        assert!(details.is_child());
    }
}
