/// Request resolution
///
/// Merges command line arguments, the target container's labels and
/// computed defaults into one immutable `BackupRequest`.

use chrono::{DateTime, Local};
use tracing::info;

use crate::core::archiver::{PruneSpec, Repository};
use crate::core::docker::{ContainerDetails, Engine};
use crate::core::error::Result;
use crate::utils::{
    console, format_archive_timestamp, is_truthy, short_id, Settings, LABEL_AUTO_PRUNE,
    LABEL_BACKUP_NAME, LABEL_NO_STOP, LABEL_PASSPHRASE, LABEL_PREFIX,
};

/// Request fields as given on the command line
#[derive(Debug, Clone, Default)]
pub struct RequestArgs {
    pub container: String,
    pub archive: Option<String>,
    pub prefix: Option<String>,
    pub passphrase: Option<String>,
    pub no_stop: bool,
    pub backup_name: Option<String>,
    pub prune: Option<String>,
}

/// Whether the operation works on a single archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveMode {
    /// Use the given archive or name a new one (backup)
    Generate,
    /// Use the given archive, if any; `<backup-name>::<archive>` picks the repository
    AsGiven,
    /// Operation works on the whole repository
    Unused,
}

/// Fully resolved request, never mutated after resolution
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub container: String,
    pub container_id: String,
    pub backup_name: String,
    pub repository: Repository,
    pub archive: Option<String>,
    pub prefix: String,
    pub no_stop: bool,
    pub prune: Option<PruneSpec>,
}

impl BackupRequest {
    /// `repository::archive`, when the request names an archive
    pub fn archive_id(&self) -> Option<String> {
        self.archive.as_deref().map(|a| self.repository.archive_id(a))
    }
}

/// CLI value, else label value, else default
///
/// Empty CLI values count as absent.
pub fn resolve_field(
    cli: Option<&str>,
    label: Option<&str>,
    default: impl FnOnce() -> String,
) -> String {
    cli.filter(|v| !v.is_empty())
        .or(label)
        .map(|v| v.to_string())
        .unwrap_or_else(default)
}

/// Optional variant of `resolve_field` for fields without a default
fn resolve_optional(cli: Option<&str>, label: Option<&str>) -> Option<String> {
    cli.filter(|v| !v.is_empty()).or(label).map(|v| v.to_string())
}

/// The no-stop label can only turn stopping off, never back on
pub fn resolve_no_stop(cli: bool, label: Option<&str>) -> bool {
    cli || label.map(is_truthy).unwrap_or(false)
}

/// Split `backup_name::archive`
fn split_archive(archive: &str) -> (Option<&str>, &str) {
    match archive.split_once("::") {
        Some((name, archive)) if !name.is_empty() => (Some(name), archive),
        Some((_, archive)) => (None, archive),
        None => (None, archive),
    }
}

pub struct Resolver<'a> {
    engine: &'a dyn Engine,
    settings: &'a Settings,
}

impl<'a> Resolver<'a> {
    pub fn new(engine: &'a dyn Engine, settings: &'a Settings) -> Self {
        Self { engine, settings }
    }

    pub async fn resolve(
        &self,
        args: &RequestArgs,
        mode: ArchiveMode,
    ) -> Result<(BackupRequest, ContainerDetails)> {
        self.resolve_at(args, mode, Local::now()).await
    }

    /// Resolve using `now` for default archive names
    pub async fn resolve_at(
        &self,
        args: &RequestArgs,
        mode: ArchiveMode,
        now: DateTime<Local>,
    ) -> Result<(BackupRequest, ContainerDetails)> {
        let target = self.engine.inspect(&args.container).await?;
        let request = self.build(args, mode, &target, now)?;

        info!(
            container = %request.container,
            backup_name = %request.backup_name,
            "resolved repository {}",
            request.repository.path.display()
        );
        console::repository(&request.repository.path);

        Ok((request, target))
    }

    fn build(
        &self,
        args: &RequestArgs,
        mode: ArchiveMode,
        target: &ContainerDetails,
        now: DateTime<Local>,
    ) -> Result<BackupRequest> {
        let (archive_backup_name, archive) = match (mode, args.archive.as_deref()) {
            (ArchiveMode::AsGiven, Some(a)) => {
                let (name, archive) = split_archive(a);
                (name, Some(archive))
            }
            (_, archive) => (None, archive),
        };

        let backup_name = resolve_field(
            args.backup_name.as_deref().or(archive_backup_name),
            target.label(LABEL_BACKUP_NAME),
            || format!("{}-{}", args.container, short_id(&target.id)),
        );

        let prefix = resolve_field(args.prefix.as_deref(), target.label(LABEL_PREFIX), || {
            self.settings.default_prefix.clone()
        });

        let passphrase =
            resolve_optional(args.passphrase.as_deref(), target.label(LABEL_PASSPHRASE));

        let prune = resolve_optional(args.prune.as_deref(), target.label(LABEL_AUTO_PRUNE))
            .map(|spec| spec.parse::<PruneSpec>())
            .transpose()?;

        let archive = match mode {
            ArchiveMode::Generate => Some(
                archive
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| format!("{}_{}", prefix, format_archive_timestamp(now))),
            ),
            ArchiveMode::AsGiven => archive.map(|a| a.to_string()),
            ArchiveMode::Unused => None,
        };

        Ok(BackupRequest {
            container: args.container.clone(),
            container_id: target.id.clone(),
            repository: Repository::new(self.settings.repository_path(&backup_name), passphrase),
            backup_name,
            archive,
            prefix,
            no_stop: resolve_no_stop(args.no_stop, target.label(LABEL_NO_STOP)),
            prune,
        })
    }
}
