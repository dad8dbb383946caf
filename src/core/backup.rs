/// Backup and restore sequences
///
/// Built on the archival tool verbs. These run inside the child container,
/// where the target's volumes are mounted below the backup root.
///
/// Backup:  ensure repository → create → prune (when retention is resolved)
/// Restore: repository exists → archive exists → empty volumes → extract

use std::path::Path;
use tracing::{info, warn};

use crate::core::archiver::{Archiver, PruneSpec, Repository};
use crate::core::config::BackupRequest;
use crate::core::error::{BasementError, Result};
use crate::core::mounts::MountBinding;
use crate::utils::{console, empty_directory};

pub struct BackupManager<'a> {
    archiver: &'a dyn Archiver,
    backup_root: &'a Path,
}

impl<'a> BackupManager<'a> {
    pub fn new(archiver: &'a dyn Archiver, backup_root: &'a Path) -> Self {
        Self {
            archiver,
            backup_root,
        }
    }

    /// Initialize the repository unless it already exists
    ///
    /// Returns whether an init was performed.
    pub fn ensure_initialized(&self, repo: &Repository) -> Result<bool> {
        if repo.exists() {
            return Ok(false);
        }

        info!(
            repository = %repo.path.display(),
            encryption = repo.encryption().as_str(),
            "initializing repository"
        );
        self.archiver.init(repo)?;
        Ok(true)
    }

    fn require_repository(&self, repo: &Repository) -> Result<()> {
        if repo.exists() {
            Ok(())
        } else {
            Err(BasementError::NoRepository(repo.path.clone()))
        }
    }

    fn require_archive<'r>(&self, request: &'r BackupRequest) -> Result<&'r str> {
        request
            .archive
            .as_deref()
            .ok_or_else(|| BasementError::ArchiveNotFound("no archive given".to_string()))
    }

    /// Full backup sequence for one container
    pub fn backup(&self, request: &BackupRequest, target: &[MountBinding]) -> Result<()> {
        let archive = self.require_archive(request)?;
        self.ensure_initialized(&request.repository)?;

        if target.is_empty() {
            warn!(container = %request.container, "container has no volumes, nothing to back up");
            console::warning(&format!("{} has no volumes, nothing to back up", request.container));
        } else {
            info!(archive = %request.repository.archive_id(archive), "creating archive");
            self.archiver.create(&request.repository, archive, self.backup_root)?;
            console::success(&format!("Created {}", archive));
        }

        if let Some(spec) = &request.prune {
            self.prune_with(request, spec)?;
        }

        Ok(())
    }

    fn prune_with(&self, request: &BackupRequest, spec: &PruneSpec) -> Result<()> {
        info!(prefix = %request.prefix, %spec, "pruning repository");
        self.archiver.prune(&request.repository, &request.prefix, spec)
    }

    /// Prune on demand; retention flags are required
    pub fn prune(&self, request: &BackupRequest) -> Result<()> {
        self.require_repository(&request.repository)?;

        let spec = request
            .prune
            .as_ref()
            .ok_or_else(|| BasementError::InvalidPruneSpec(String::new()))?;
        self.prune_with(request, spec)
    }

    pub fn list(&self, request: &BackupRequest) -> Result<()> {
        self.require_repository(&request.repository)?;
        self.archiver.list(&request.repository)
    }

    /// Repository summary, or archive details when one is named
    pub fn info(&self, request: &BackupRequest) -> Result<String> {
        self.require_repository(&request.repository)?;
        match request.archive.as_deref() {
            Some(archive) => self.archiver.info(&request.repository, archive),
            None => self.archiver.repository_info(&request.repository),
        }
    }

    pub fn delete(&self, request: &BackupRequest) -> Result<()> {
        let archive = self.require_archive(request)?;
        self.require_repository(&request.repository)?;

        self.archiver.delete(&request.repository, archive)?;
        console::success(&format!("Deleted {}", archive));
        Ok(())
    }

    fn archive_exists(&self, repo: &Repository, archive: &str) -> Result<()> {
        match self.archiver.info(repo, archive) {
            Ok(_) => Ok(()),
            Err(BasementError::Operation { .. }) => {
                Err(BasementError::ArchiveNotFound(repo.archive_id(archive)))
            }
            Err(e) => Err(e),
        }
    }

    /// Empty every directory volume, leaving the mount points in place
    ///
    /// File volumes are left alone: extraction overwrites them. A volume
    /// mounted inside another one is emptied along with its parent.
    pub fn clear_destinations(&self, target: &[MountBinding]) -> Result<()> {
        let mount_points: Vec<&Path> = target.iter().map(|b| Path::new(&b.destination)).collect();

        for destination in &mount_points {
            let nested = mount_points
                .iter()
                .any(|m| m != destination && destination.starts_with(m));
            if nested || !destination.is_dir() {
                continue;
            }

            let removed = empty_directory(destination, &mount_points)?;
            info!(destination = %destination.display(), removed, "emptied volume");
        }
        Ok(())
    }

    /// Full restore sequence for one container
    pub fn restore(
        &self,
        request: &BackupRequest,
        target: &[MountBinding],
        remove: bool,
    ) -> Result<()> {
        let archive = self.require_archive(request)?;
        self.require_repository(&request.repository)?;
        self.archive_exists(&request.repository, archive)?;

        if remove {
            self.clear_destinations(target)?;
        } else {
            info!("keeping existing volume contents");
        }

        info!(archive = %request.repository.archive_id(archive), "extracting archive");
        self.archiver.extract(&request.repository, archive, self.backup_root)?;
        console::success(&format!("Restored {}", archive));
        Ok(())
    }
}
