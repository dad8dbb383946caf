/// CLI argument parsing

use clap::{Args, Parser, Subcommand};

use crate::core::config::RequestArgs;
use crate::core::pipeline::{Action, Operation};

// Build timestamp injected at compile time
pub const VERSION_WITH_BUILD: &str =
    concat!(env!("CARGO_PKG_VERSION"), " (built: ", env!("BUILD_TIMESTAMP"), ")");

#[derive(Parser)]
#[command(name = "basement")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every container command
#[derive(Args, Debug, Clone, Default)]
pub struct ContainerArgs {
    /// Target container name or id
    pub container: String,

    /// Leave linked containers running
    #[arg(long)]
    pub no_stop: bool,

    /// Repository name (default: basement.backup-name label, else <container>-<short id>)
    #[arg(long)]
    pub backup_name: Option<String>,

    /// Archive name prefix (default: basement.prefix label, else "bs")
    #[arg(long)]
    pub prefix: Option<String>,

    /// Repository passphrase (default: basement.passphrase label)
    #[arg(long)]
    pub passphrase: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Archive the container's volumes
    Backup {
        #[command(flatten)]
        target: ContainerArgs,

        /// Archive name (default: <prefix>_<timestamp>)
        archive: Option<String>,

        /// Prune afterwards, e.g. "--keep-daily 7" or "default"
        #[arg(long, allow_hyphen_values = true)]
        prune: Option<String>,
    },

    /// Restore the container's volumes from an archive
    Restore {
        #[command(flatten)]
        target: ContainerArgs,

        /// Archive name, optionally as <backup-name>::<archive>
        archive: String,

        /// Keep existing volume contents instead of emptying them first
        #[arg(long)]
        no_remove: bool,
    },

    /// Delete an archive
    Delete {
        #[command(flatten)]
        target: ContainerArgs,

        /// Archive name, optionally as <backup-name>::<archive>
        archive: String,
    },

    /// Prune archives with the given retention flags
    Prune {
        #[command(flatten)]
        target: ContainerArgs,

        /// Retention flags, e.g. --keep-daily 7 --keep-weekly 4, or "default"
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        spec: Vec<String>,
    },

    /// List archives
    List {
        #[command(flatten)]
        target: ContainerArgs,
    },

    /// Show repository or archive details
    Info {
        #[command(flatten)]
        target: ContainerArgs,

        /// Archive name (default: whole repository)
        archive: Option<String>,
    },

    /// Back up every container labeled basement.auto-backup
    BackupAll,
}

fn request(target: ContainerArgs, archive: Option<String>, prune: Option<String>) -> RequestArgs {
    RequestArgs {
        container: target.container,
        archive,
        prefix: target.prefix,
        passphrase: target.passphrase,
        no_stop: target.no_stop,
        backup_name: target.backup_name,
        prune,
    }
}

impl Commands {
    pub fn into_operation(self) -> Operation {
        let (action, args) = match self {
            Commands::Backup { target, archive, prune } => {
                (Action::Backup, request(target, archive, prune))
            }
            Commands::Restore { target, archive, no_remove } => {
                (Action::Restore { no_remove }, request(target, Some(archive), None))
            }
            Commands::Delete { target, archive } => {
                (Action::Delete, request(target, Some(archive), None))
            }
            Commands::Prune { target, spec } => {
                (Action::Prune, request(target, None, Some(spec.join(" "))))
            }
            Commands::List { target } => (Action::List, request(target, None, None)),
            Commands::Info { target, archive } => (Action::Info, request(target, archive, None)),
            Commands::BackupAll => return Operation::BackupAll,
        };
        Operation::Single { action, args }
    }
}
