/// Capability escalation through an ephemeral sibling container
///
/// The invoking container cannot see the target's volumes. The launcher
/// creates a disposable container from our own image with our own mounts,
/// the target's mounts under the backup root, and the same command line,
/// then relays its output until it exits. The child is removed whatever
/// happens once it has been created.

use chrono::Utc;
use futures::StreamExt;
use std::collections::HashMap;
use std::io::Write;
use tracing::{debug, info, warn};

use crate::core::docker::{ChildSpec, ContainerDetails, Engine};
use crate::core::error::{BasementError, Result};
use crate::core::mounts::{bindings, MountBinding};
use crate::utils::{
    console, is_truthy, Settings, CHILD_NAME_PREFIX, ENV_CONFIG, ENV_HOSTNAME, ENV_IS_CHILD,
    ENV_LOG, ENV_PARENT, ENV_RELOCATED_OK, ENV_UNENCRYPTED_OK, LABEL_CHILD,
};

/// Where this process runs: the original invocation or the child
#[derive(Debug, Clone, Default)]
pub struct Escalation {
    pub is_child: bool,
    /// Our own container, as `$HOSTNAME`
    pub self_ref: Option<String>,
    /// The invoking container, when running as the child
    pub parent: Option<String>,
}

impl Escalation {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Read the escalation state through `var`
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let present = |key: &str| var(key).filter(|v| !v.is_empty());
        Self {
            is_child: present(ENV_IS_CHILD).map(|v| is_truthy(&v)).unwrap_or(false),
            self_ref: present(ENV_HOSTNAME),
            parent: present(ENV_PARENT),
        }
    }

    pub fn is_escalated(&self) -> bool {
        self.is_child
    }

    /// Containers that must never be stopped: ourselves and our invoker
    pub fn excluded(&self) -> Vec<&str> {
        self.self_ref
            .iter()
            .chain(self.parent.iter())
            .map(String::as_str)
            .collect()
    }
}

pub struct Launcher<'a> {
    engine: &'a dyn Engine,
    settings: &'a Settings,
    self_ref: &'a str,
}

impl<'a> Launcher<'a> {
    pub fn new(engine: &'a dyn Engine, settings: &'a Settings, self_ref: &'a str) -> Self {
        Self {
            engine,
            settings,
            self_ref,
        }
    }

    /// Cache and timezone bindings the archival tool needs
    fn auxiliary_bindings(&self, own: &[MountBinding]) -> Vec<MountBinding> {
        let mut extra = Vec::new();

        let cache = &self.settings.cache_dir;
        if !own.iter().any(|b| b.covers(cache)) {
            let cache = cache.display().to_string();
            extra.push(MountBinding::new(cache.clone(), cache));
        }

        // Host paths: the invoker cannot check them, so they are bound as given
        for file in &self.settings.timezone_files {
            if !own.iter().any(|b| b.covers(file)) {
                let file = file.display().to_string();
                extra.push(MountBinding::new(file.clone(), file).read_only());
            }
        }

        extra
    }

    /// Describe the child for `target` running `command`
    pub async fn child_spec(
        &self,
        target: &ContainerDetails,
        command: Vec<String>,
    ) -> Result<ChildSpec> {
        let own = self.engine.inspect(self.self_ref).await?;

        let mut all = bindings(&own, "");
        all.extend(self.auxiliary_bindings(&all));
        all.extend(bindings(target, &self.settings.backup_root.display().to_string()));

        let mut env = vec![
            (ENV_IS_CHILD.to_string(), "true".to_string()),
            (ENV_PARENT.to_string(), self.self_ref.to_string()),
            (ENV_RELOCATED_OK.to_string(), "yes".to_string()),
            (ENV_UNENCRYPTED_OK.to_string(), "yes".to_string()),
        ];
        for key in [ENV_LOG, ENV_CONFIG] {
            if let Ok(value) = std::env::var(key) {
                env.push((key.to_string(), value));
            }
        }

        let mut labels = HashMap::new();
        labels.insert(LABEL_CHILD.to_string(), "true".to_string());

        Ok(ChildSpec {
            name: format!("{}-{}", CHILD_NAME_PREFIX, Utc::now().timestamp_millis()),
            image: own.image,
            command,
            env,
            bindings: all,
            labels,
        })
    }

    /// Run `command` in a child for `target`, relaying output to stdout
    pub async fn run(&self, target: &ContainerDetails, command: Vec<String>) -> Result<()> {
        let mut stdout = std::io::stdout();
        self.run_with_output(target, command, &mut stdout).await
    }

    pub async fn run_with_output<W: Write>(
        &self,
        target: &ContainerDetails,
        command: Vec<String>,
        out: &mut W,
    ) -> Result<()> {
        let spec = self.child_spec(target, command).await?;

        let target_bindings = bindings(target, &self.settings.backup_root.display().to_string());
        console::volumes(&target.name, &target_bindings, &self.settings.backup_root);

        let binds: Vec<String> = spec.bindings.iter().map(MountBinding::to_bind).collect();
        debug!(name = %spec.name, ?binds, "creating child");
        let id = self.engine.create(&spec).await?;

        let outcome = self.supervise(&id, &spec.name, out).await;

        // Release on every path, success or not
        match self.engine.remove(&id).await {
            Ok(()) => debug!(name = %spec.name, "child removed"),
            Err(e) => warn!(name = %spec.name, "failed to remove child: {}", e),
        }

        outcome
    }

    async fn supervise<W: Write>(&self, id: &str, name: &str, out: &mut W) -> Result<()> {
        self.engine.start(id).await?;
        info!(child = %name, "child started");

        let mut logs = self.engine.logs(id);
        while let Some(chunk) = logs.next().await {
            out.write_all(&chunk?)?;
            out.flush()?;
        }
        drop(logs);

        let code = self.engine.wait(id).await?;
        if code != 0 {
            return Err(BasementError::ChildFailed {
                name: name.to_string(),
                code,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{container, FakeEngine, Journal};
    use std::path::PathBuf;

    fn settings() -> Settings {
        Settings {
            timezone_files: vec![],
            ..Default::default()
        }
    }

    fn engine(journal: &Journal) -> FakeEngine {
        let mut me = container(
            "me",
            &[("/var/run/docker.sock", "/var/run/docker.sock"), ("/srv/repos", "/repositories")],
        );
        me.image = "basement:1".to_string();
        FakeEngine::new()
            .with_journal(journal.clone())
            .with_container(me)
            .with_container(container(
                "web",
                &[("/vol/web", "/data"), ("/etc/site.conf", "/etc/nginx.conf")],
            ))
    }

    #[tokio::test]
    async fn test_child_spec_unions_bindings() {
        let journal = Journal::default();
        let engine = engine(&journal);
        let settings = settings();
        let launcher = Launcher::new(&engine, &settings, "me");
        let target = engine.inspect("web").await.unwrap();

        let spec = launcher
            .child_spec(&target, vec!["backup".to_string(), "web".to_string()])
            .await
            .unwrap();

        let binds: Vec<String> = spec.bindings.iter().map(MountBinding::to_bind).collect();
        assert_eq!(
            binds,
            vec![
                "/var/run/docker.sock:/var/run/docker.sock",
                "/srv/repos:/repositories",
                "/root/.cache/borg:/root/.cache/borg",
                "/vol/web:/backup/data",
                "/etc/site.conf:/backup/etc/nginx.conf",
            ]
        );
        assert_eq!(spec.image, "basement:1");
        assert_eq!(spec.command, vec!["backup", "web"]);
        assert!(spec.name.starts_with("basement-child-"));
        assert_eq!(spec.labels.get("basement.child").map(String::as_str), Some("true"));
        assert!(spec.env.contains(&("BASEMENT_IS_CHILD".to_string(), "true".to_string())));
        assert!(spec.env.contains(&("BASEMENT_PARENT".to_string(), "me".to_string())));
    }

    fn vars(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn test_escalation_from_vars() {
        let child = Escalation::from_vars(vars(&[
            ("BASEMENT_IS_CHILD", "true"),
            ("HOSTNAME", "kid0123"),
            ("BASEMENT_PARENT", "me0123"),
        ]));
        assert!(child.is_escalated());
        assert_eq!(child.excluded(), vec!["kid0123", "me0123"]);

        for off in ["false", "0", "no", ""] {
            let invoker = Escalation::from_vars(move |key: &str| {
                (key == "BASEMENT_IS_CHILD").then(|| off.to_string())
            });
            assert!(!invoker.is_escalated(), "{:?} must not escalate", off);
        }

        let invoker = Escalation::from_vars(vars(&[("HOSTNAME", "me0123")]));
        assert!(!invoker.is_escalated());
        assert_eq!(invoker.excluded(), vec!["me0123"]);
    }

    #[tokio::test]
    async fn test_cache_not_duplicated_when_mounted() {
        let journal = Journal::default();
        let me = container("me", &[("/host/cache", "/root/.cache")]);
        let engine = FakeEngine::new().with_journal(journal).with_container(me);
        let settings = settings();
        let launcher = Launcher::new(&engine, &settings, "me");

        let spec = launcher.child_spec(&container("t", &[]), vec![]).await.unwrap();

        assert_eq!(spec.bindings, vec![MountBinding::new("/host/cache", "/root/.cache")]);
    }

    #[tokio::test]
    async fn test_timezone_files_are_read_only() {
        let engine = FakeEngine::new().with_container(container("me", &[]));
        let settings = Settings::default();
        let launcher = Launcher::new(&engine, &settings, "me");

        let spec = launcher.child_spec(&container("t", &[]), vec![]).await.unwrap();

        let tz: Vec<_> = spec.bindings.iter().filter(|b| b.read_only).collect();
        assert_eq!(tz, vec![&MountBinding::new("/etc/localtime", "/etc/localtime").read_only()]);
    }

    #[tokio::test]
    async fn test_timezone_file_already_mounted_is_skipped() {
        let me = container("me", &[("/etc/localtime", "/etc/localtime")]);
        let engine = FakeEngine::new().with_container(me);
        let settings = Settings {
            timezone_files: vec![PathBuf::from("/etc/localtime")],
            ..Default::default()
        };
        let launcher = Launcher::new(&engine, &settings, "me");

        let spec = launcher.child_spec(&container("t", &[]), vec![]).await.unwrap();

        assert!(spec.bindings.iter().all(|b| !b.read_only));
        assert_eq!(spec.bindings.iter().filter(|b| b.source == "/etc/localtime").count(), 1);
    }

    #[tokio::test]
    async fn test_run_streams_and_removes() {
        let journal = Journal::default();
        let engine = engine(&journal).with_logs(&["line one\n", "line two\n"]);
        let settings = settings();
        let launcher = Launcher::new(&engine, &settings, "me");
        let target = engine.inspect("web").await.unwrap();

        let mut out = Vec::new();
        launcher
            .run_with_output(&target, vec!["backup".to_string(), "web".to_string()], &mut out)
            .await
            .unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "line one\nline two\n");

        let created = engine.created();
        assert_eq!(created.len(), 1);
        let name = &created[0].name;
        assert!(
            journal.position(&format!("start:{}", name))
                < journal.position(&format!("remove:{}", name))
        );
        assert_eq!(journal.count(&format!("remove:{}", name)), 1);
    }

    #[tokio::test]
    async fn test_failed_child_is_still_removed() {
        let journal = Journal::default();
        let engine = engine(&journal).with_exit_code(2);
        let settings = settings();
        let launcher = Launcher::new(&engine, &settings, "me");
        let target = engine.inspect("web").await.unwrap();

        let err = launcher
            .run_with_output(&target, vec![], &mut Vec::new())
            .await
            .unwrap_err();

        assert!(matches!(err, BasementError::ChildFailed { code: 2, .. }));
        let name = &engine.created()[0].name;
        assert_eq!(journal.count(&format!("remove:{}", name)), 1);
    }

    #[tokio::test]
    async fn test_start_failure_still_removes() {
        let journal = Journal::default();
        let engine = engine(&journal).failing("start:*");
        let settings = settings();
        let launcher = Launcher::new(&engine, &settings, "me");
        let target = engine.inspect("web").await.unwrap();

        assert!(launcher.run_with_output(&target, vec![], &mut Vec::new()).await.is_err());

        let name = &engine.created()[0].name;
        assert_eq!(journal.count(&format!("remove:{}", name)), 1);
    }
}
