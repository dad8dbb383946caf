/// Label, environment and default-value definitions
///
/// Everything basement reads from a target container or hands to the
/// archival tool is named here so the resolver and launcher agree on it.

pub const LABEL_BACKUP_NAME: &str = "basement.backup-name";
pub const LABEL_PREFIX: &str = "basement.prefix";
pub const LABEL_PASSPHRASE: &str = "basement.passphrase";
pub const LABEL_AUTO_PRUNE: &str = "basement.auto-prune";
pub const LABEL_NO_STOP: &str = "basement.no-stop";
pub const LABEL_AUTO_BACKUP: &str = "basement.auto-backup";

/// Set on every ephemeral child so it never counts as a linked container
pub const LABEL_CHILD: &str = "basement.child";

/// Present in the environment of the ephemeral child only
pub const ENV_IS_CHILD: &str = "BASEMENT_IS_CHILD";

/// Docker sets the container id as hostname, which is how we find ourselves
pub const ENV_HOSTNAME: &str = "HOSTNAME";

/// Set on the child to the container that launched it
pub const ENV_PARENT: &str = "BASEMENT_PARENT";

pub const ENV_CONFIG: &str = "BASEMENT_CONFIG";
pub const ENV_LOG: &str = "BASEMENT_LOG";

/// Archival tool environment
pub const ENV_PASSPHRASE: &str = "BORG_PASSPHRASE";
pub const ENV_RELOCATED_OK: &str = "BORG_RELOCATED_REPO_ACCESS_IS_OK";
pub const ENV_UNENCRYPTED_OK: &str = "BORG_UNKNOWN_UNENCRYPTED_REPO_ACCESS_IS_OK";

/// Name prefix of the ephemeral child containers
pub const CHILD_NAME_PREFIX: &str = "basement-child";

/// Length of the container id fragment used in default backup names
pub const SHORT_ID_LEN: usize = 8;

/// Archive timestamp format, `bs_2020-01-01@00.00.00`
pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d@%H.%M.%S";

/// Retention used when a prune spec is given as `default`
pub const DEFAULT_PRUNE_POLICY: &[&str] = &[
    "--keep-daily",
    "14",
    "--keep-weekly",
    "4",
    "--keep-monthly",
    "3",
];

/// Retention flags the archival tool understands
pub const PRUNE_KEEP_FLAGS: &[&str] = &[
    "--keep-within",
    "--keep-last",
    "--keep-secondly",
    "--keep-minutely",
    "--keep-hourly",
    "--keep-daily",
    "--keep-weekly",
    "--keep-monthly",
    "--keep-yearly",
];

/// Values accepted as "on" for boolean labels
pub const TRUTHY_LABEL_VALUES: &[&str] = &["", "1", "true", "yes", "on"];
