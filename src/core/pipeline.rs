/// Ordered composition of one invocation
///
/// resolve → escalate (outside the child) or bracket + operate (inside it).
/// `backup-all` runs the same steps once per selected container and keeps
/// going when one of them fails.

use tracing::{error, info};

use crate::core::archiver::Archiver;
use crate::core::backup::BackupManager;
use crate::core::config::{ArchiveMode, BackupRequest, RequestArgs, Resolver};
use crate::core::docker::{ContainerDetails, Engine};
use crate::core::error::{BasementError, Result};
use crate::core::escalation::{Escalation, Launcher};
use crate::core::lifecycle::Lifecycle;
use crate::core::mounts::bindings;
use crate::utils::{console, is_truthy, Settings, ENV_HOSTNAME, LABEL_AUTO_BACKUP};

/// What to do with a single container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Backup,
    Restore { no_remove: bool },
    Delete,
    Prune,
    List,
    Info,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Backup => "backup",
            Action::Restore { .. } => "restore",
            Action::Delete => "delete",
            Action::Prune => "prune",
            Action::List => "list",
            Action::Info => "info",
        }
    }

    fn archive_mode(&self) -> ArchiveMode {
        match self {
            Action::Backup => ArchiveMode::Generate,
            Action::Restore { .. } | Action::Delete | Action::Info => ArchiveMode::AsGiven,
            Action::Prune | Action::List => ArchiveMode::Unused,
        }
    }

    /// Whether linked containers are stopped around the action
    fn touches_volumes(&self) -> bool {
        matches!(self, Action::Backup | Action::Restore { .. })
    }
}

#[derive(Debug, Clone)]
pub enum Operation {
    Single { action: Action, args: RequestArgs },
    BackupAll,
}

pub struct Pipeline<'a> {
    engine: &'a dyn Engine,
    archiver: &'a dyn Archiver,
    settings: &'a Settings,
    escalation: Escalation,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        engine: &'a dyn Engine,
        archiver: &'a dyn Archiver,
        settings: &'a Settings,
        escalation: Escalation,
    ) -> Self {
        Self {
            engine,
            archiver,
            settings,
            escalation,
        }
    }

    /// Run `operation`; `command_line` is replayed in the child when escalating
    pub async fn run(&self, operation: &Operation, command_line: Vec<String>) -> Result<()> {
        match operation {
            Operation::Single { action, args } => {
                self.run_single(*action, args, command_line).await
            }
            Operation::BackupAll => self.backup_all().await,
        }
    }

    async fn run_single(
        &self,
        action: Action,
        args: &RequestArgs,
        command_line: Vec<String>,
    ) -> Result<()> {
        let (request, target) = Resolver::new(self.engine, self.settings)
            .resolve(args, action.archive_mode())
            .await?;

        if !self.escalation.is_escalated() {
            let self_ref = self
                .escalation
                .self_ref
                .as_deref()
                .ok_or(BasementError::SelfUnknown(ENV_HOSTNAME))?;
            info!(
                action = action.name(),
                container = %target.name,
                "escalating to child container"
            );
            return Launcher::new(self.engine, self.settings, self_ref)
                .run(&target, command_line)
                .await;
        }

        self.operate(action, &request, &target).await
    }

    /// Perform `action` in this process, with the target's volumes mounted
    pub async fn operate(
        &self,
        action: Action,
        request: &BackupRequest,
        target: &ContainerDetails,
    ) -> Result<()> {
        if !self.escalation.is_escalated() {
            return Err(BasementError::NotEscalated(action.name()));
        }

        let manager = BackupManager::new(self.archiver, &self.settings.backup_root);
        let volumes = bindings(target, &self.settings.backup_root.display().to_string());

        if action.touches_volumes() {
            let excluded = self.escalation.excluded();
            let mut lifecycle =
                Lifecycle::new(self.engine, &self.settings.control_socket, &excluded);
            return lifecycle
                .run(request, target, || match action {
                    Action::Restore { no_remove } => {
                        manager.restore(request, &volumes, !no_remove)
                    }
                    _ => manager.backup(request, &volumes),
                })
                .await;
        }

        match action {
            Action::Delete => manager.delete(request),
            Action::Prune => manager.prune(request),
            Action::List => manager.list(request),
            _ => {
                let details = manager.info(request)?;
                print!("{}", details);
                Ok(())
            }
        }
    }

    /// Back up every container with a truthy auto-backup label
    pub async fn backup_all(&self) -> Result<()> {
        let selected: Vec<ContainerDetails> = self
            .engine
            .list_labeled(LABEL_AUTO_BACKUP)
            .await?
            .into_iter()
            .filter(|c| !c.is_child())
            .filter(|c| c.label(LABEL_AUTO_BACKUP).map(is_truthy).unwrap_or(false))
            .collect();

        info!(count = selected.len(), "backing up labeled containers");

        let total = selected.len();
        let mut failed = 0;
        for container in &selected {
            let args = RequestArgs {
                container: container.name.clone(),
                ..Default::default()
            };
            let command_line = vec![Action::Backup.name().to_string(), container.name.clone()];

            if let Err(e) = self.run_single(Action::Backup, &args, command_line).await {
                error!(container = %container.name, "backup failed: {}", e);
                console::failure(&format!("{}: {}", container.name, e));
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(BasementError::BatchFailed { failed, total });
        }
        Ok(())
    }
}
