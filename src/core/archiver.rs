/// Archival tool integration
///
/// Each verb is one subprocess. The passphrase and prompt-suppression flags
/// are handed to that subprocess only; the process environment is never
/// touched.

use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use tracing::debug;

use crate::core::error::{BasementError, Result, Verb};
use crate::utils::{
    DEFAULT_PRUNE_POLICY, ENV_PASSPHRASE, ENV_RELOCATED_OK, ENV_UNENCRYPTED_OK, PRUNE_KEEP_FLAGS,
};

/// Repository encryption mode passed to `init`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    Repokey,
    None,
}

impl Encryption {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encryption::Repokey => "repokey",
            Encryption::None => "none",
        }
    }
}

/// A repository location and the secret needed to open it
#[derive(Clone, PartialEq, Eq)]
pub struct Repository {
    pub path: PathBuf,
    passphrase: Option<String>,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.path)
            .field("encrypted", &self.passphrase.is_some())
            .finish()
    }
}

impl Repository {
    pub fn new(path: impl Into<PathBuf>, passphrase: Option<String>) -> Self {
        Self {
            path: path.into(),
            passphrase,
        }
    }

    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref()
    }

    pub fn encryption(&self) -> Encryption {
        if self.passphrase.is_some() {
            Encryption::Repokey
        } else {
            Encryption::None
        }
    }

    /// Full archive identifier, `repository::archive`
    pub fn archive_id(&self, archive: &str) -> String {
        format!("{}::{}", self.path.display(), archive)
    }
}

/// Retention flags for `prune`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneSpec(Vec<String>);

impl PruneSpec {
    pub fn args(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for PruneSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

impl FromStr for PruneSpec {
    type Err = BasementError;

    /// Accepts `default`, or `--keep-<unit> N` pairs (also `--keep-<unit>=N`)
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || BasementError::InvalidPruneSpec(s.to_string());

        if s.trim().eq_ignore_ascii_case("default") {
            return Ok(Self(DEFAULT_PRUNE_POLICY.iter().map(|a| a.to_string()).collect()));
        }

        let tokens: Vec<&str> = s
            .split_whitespace()
            .flat_map(|t| match t.split_once('=') {
                Some((flag, value)) => vec![flag, value],
                None => vec![t],
            })
            .collect();

        if tokens.is_empty() || tokens.len() % 2 != 0 {
            return Err(invalid());
        }

        let count = Regex::new(r"^\d+$").expect("static regex");
        let interval = Regex::new(r"^\d+[HdwmY]$").expect("static regex");

        for pair in tokens.chunks(2) {
            let (flag, value) = (pair[0], pair[1]);
            if !PRUNE_KEEP_FLAGS.contains(&flag) {
                return Err(invalid());
            }
            let valid = if flag == "--keep-within" {
                interval.is_match(value)
            } else {
                count.is_match(value)
            };
            if !valid {
                return Err(invalid());
            }
        }

        Ok(Self(tokens.into_iter().map(|t| t.to_string()).collect()))
    }
}

/// Typed pass-through to the archival tool
#[cfg_attr(test, mockall::automock)]
pub trait Archiver: Send + Sync {
    fn init(&self, repo: &Repository) -> Result<()>;

    /// Archive the contents of `source`
    fn create(&self, repo: &Repository, archive: &str, source: &Path) -> Result<()>;

    /// Apply `spec` to the archives named `<prefix>_*` only
    fn prune(&self, repo: &Repository, prefix: &str, spec: &PruneSpec) -> Result<()>;

    fn list(&self, repo: &Repository) -> Result<()>;

    fn delete(&self, repo: &Repository, archive: &str) -> Result<()>;

    fn info(&self, repo: &Repository, archive: &str) -> Result<String>;

    fn repository_info(&self, repo: &Repository) -> Result<String>;

    /// Extract into `destination`
    fn extract(&self, repo: &Repository, archive: &str, destination: &Path) -> Result<()>;
}

/// Archiver backed by the `borg` command line
#[derive(Debug, Clone)]
pub struct BorgCli {
    program: String,
    leading_args: Vec<String>,
}

impl BorgCli {
    /// `command` is the executable optionally followed by global options,
    /// e.g. `borg --lock-wait 600`
    pub fn new(command: &str) -> Self {
        let mut parts = command.split_whitespace().map(|s| s.to_string());
        let program = parts.next().unwrap_or_else(|| "borg".to_string());
        Self {
            program,
            leading_args: parts.collect(),
        }
    }

    fn command(&self, verb: Verb, repo: &Repository) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg(verb.as_str())
            .env(ENV_RELOCATED_OK, "yes")
            .env(ENV_UNENCRYPTED_OK, "yes");

        match repo.passphrase() {
            Some(passphrase) => cmd.env(ENV_PASSPHRASE, passphrase),
            None => cmd.env_remove(ENV_PASSPHRASE),
        };

        cmd
    }

    fn spawn_error(&self, source: std::io::Error) -> BasementError {
        BasementError::ToolUnavailable {
            program: self.program.clone(),
            source,
        }
    }

    /// Log program and arguments, never the environment
    fn trace(&self, verb: Verb, cmd: &Command) {
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy()).collect();
        debug!(program = %self.program, ?args, "running {}", verb);
    }

    /// Run with inherited stdio so progress reaches the user
    fn run(&self, verb: Verb, mut cmd: Command) -> Result<()> {
        self.trace(verb, &cmd);

        let status = cmd.status().map_err(|e| self.spawn_error(e))?;
        if !status.success() {
            return Err(BasementError::Operation { verb, code: status.code() });
        }
        Ok(())
    }

    /// Run and return stdout; stderr is passed through
    fn capture(&self, verb: Verb, mut cmd: Command) -> Result<String> {
        self.trace(verb, &cmd);

        let output = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(BasementError::Operation { verb, code: output.status.code() });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Archiver for BorgCli {
    fn init(&self, repo: &Repository) -> Result<()> {
        let mut cmd = self.command(Verb::Init, repo);
        cmd.arg(format!("--encryption={}", repo.encryption().as_str()))
            .arg(&repo.path);
        self.run(Verb::Init, cmd)
    }

    fn create(&self, repo: &Repository, archive: &str, source: &Path) -> Result<()> {
        let mut cmd = self.command(Verb::Create, repo);
        cmd.arg("--stats")
            .arg(repo.archive_id(archive))
            .arg(".")
            .current_dir(source);
        self.run(Verb::Create, cmd)
    }

    fn prune(&self, repo: &Repository, prefix: &str, spec: &PruneSpec) -> Result<()> {
        let mut cmd = self.command(Verb::Prune, repo);
        cmd.arg("--list")
            .arg("--glob-archives")
            .arg(format!("{}_*", prefix))
            .args(spec.args())
            .arg(&repo.path);
        self.run(Verb::Prune, cmd)
    }

    fn list(&self, repo: &Repository) -> Result<()> {
        let mut cmd = self.command(Verb::List, repo);
        cmd.arg(&repo.path);
        self.run(Verb::List, cmd)
    }

    fn delete(&self, repo: &Repository, archive: &str) -> Result<()> {
        let mut cmd = self.command(Verb::Delete, repo);
        cmd.arg(repo.archive_id(archive));
        self.run(Verb::Delete, cmd)
    }

    fn info(&self, repo: &Repository, archive: &str) -> Result<String> {
        let mut cmd = self.command(Verb::Info, repo);
        cmd.arg(repo.archive_id(archive));
        self.capture(Verb::Info, cmd)
    }

    fn repository_info(&self, repo: &Repository) -> Result<String> {
        let mut cmd = self.command(Verb::Info, repo);
        cmd.arg(&repo.path);
        self.capture(Verb::Info, cmd)
    }

    fn extract(&self, repo: &Repository, archive: &str, destination: &Path) -> Result<()> {
        let mut cmd = self.command(Verb::Extract, repo);
        cmd.arg(repo.archive_id(archive)).current_dir(destination);
        self.run(Verb::Extract, cmd)
    }
}
