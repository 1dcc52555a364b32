use super::{ProcessSpec, Runtime, SpawnedProcess};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::service::IoAttachments;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

/// Default host reported for locally spawned processes.
pub const DEFAULT_LOCAL_HOST: &str = "127.0.0.1";

/// Synchronous mutex for fields that are never held across await points.
type SyncMutex<T> = parking_lot::Mutex<T>;

/// A child process owned by the runtime.
struct ManagedProcess {
    name: String,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    child: Child,
}

/// Snapshot of a process owned by a [`LocalRuntime`].
#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub name: String,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

/// Runs services as child processes of the current process.
///
/// Children are spawned in their own process group with `kill_on_drop`, so
/// dropping the runtime (or calling [`shutdown`](Self::shutdown)) tears them
/// down. Stdio streams without an attachment are connected to `/dev/null`.
pub struct LocalRuntime {
    host: String,
    /// How long to watch a fresh process for an immediate exit. Zero disables
    /// the check.
    startup_grace: Duration,
    children: SyncMutex<Vec<ManagedProcess>>,
}

impl LocalRuntime {
    pub fn new() -> Self {
        Self {
            host: DEFAULT_LOCAL_HOST.to_string(),
            startup_grace: Duration::ZERO,
            children: SyncMutex::new(Vec::new()),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Live processes owned by this runtime, in spawn order.
    pub fn processes(&self) -> Vec<ProcessInfo> {
        let mut children = self.children.lock();
        reap_exited(&mut children);
        children
            .iter()
            .map(|p| ProcessInfo {
                name: p.name.clone(),
                pid: p.pid,
                started_at: p.started_at,
            })
            .collect()
    }

    /// Kill every owned process and wait for it to exit.
    ///
    /// Returns the number of processes that were shut down.
    pub async fn shutdown(&self) -> usize {
        let children = {
            let mut children = self.children.lock();
            reap_exited(&mut children);
            std::mem::take(&mut *children)
        };
        let count = children.len();

        for mut process in children {
            if let Err(e) = process.child.kill().await {
                tracing::warn!(
                    "Failed to kill process for '{}' (pid {:?}): {}",
                    process.name,
                    process.pid,
                    e
                );
            } else {
                tracing::debug!("Stopped process for '{}'", process.name);
            }
        }

        count
    }

    /// Watch a fresh child for `startup_grace`, failing if it exits.
    async fn check_early_exit(
        &self,
        ctx: &Context,
        name: &str,
        child: &mut Child,
    ) -> Result<()> {
        if self.startup_grace.is_zero() {
            return Ok(());
        }

        let exited = tokio::select! {
            _ = ctx.cancelled() => None,
            status = child.wait() => Some(match status {
                Ok(status) => format!("process exited during startup ({})", status),
                Err(e) => format!("failed to wait on process: {}", e),
            }),
            _ = tokio::time::sleep(self.startup_grace) => return Ok(()),
        };

        match exited {
            Some(detail) => Err(Error::ServiceStartFailed(name.to_string(), detail)),
            None => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(
                        "Failed to kill process for '{}' after cancellation: {}",
                        name,
                        e
                    );
                }
                Err(Error::Cancelled(name.to_string()))
            }
        }
    }
}

impl Default for LocalRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop processes that have already exited on their own.
fn reap_exited(children: &mut Vec<ManagedProcess>) {
    children.retain_mut(|process| match process.child.try_wait() {
        Ok(None) => true,
        Ok(Some(status)) => {
            tracing::debug!("Process for '{}' exited ({})", process.name, status);
            false
        }
        Err(e) => {
            tracing::warn!("Failed to poll process for '{}': {}", process.name, e);
            true
        }
    });
}

fn stdio_for(attached: bool) -> Stdio {
    if attached {
        Stdio::piped()
    } else {
        Stdio::null()
    }
}

#[async_trait]
impl Runtime for LocalRuntime {
    fn name(&self) -> &str {
        "local"
    }

    async fn spawn(
        &self,
        ctx: &Context,
        spec: ProcessSpec,
        io: IoAttachments,
    ) -> Result<SpawnedProcess> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled(spec.name));
        }

        tracing::debug!(
            "Spawning process for '{}': {} {:?} (cwd: {:?})",
            spec.name,
            spec.command,
            spec.args,
            spec.cwd
        );

        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(stdio_for(io.stdin.is_some()))
            .stdout(stdio_for(io.stdout.is_some()))
            .stderr(stdio_for(io.stderr.is_some()))
            .kill_on_drop(true);

        if let Some(ref cwd) = spec.cwd {
            cmd.current_dir(cwd);
        }

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            tracing::error!(
                "Failed to spawn process for '{}': {} (cwd: {:?})",
                spec.name,
                e,
                spec.cwd
            );
            Error::ServiceStartFailed(spec.name.clone(), e.to_string())
        })?;

        if let (Some(forward), Some(stdin)) = (io.stdin, child.stdin.take()) {
            forward(Box::new(stdin));
        }
        if let (Some(forward), Some(stdout)) = (io.stdout, child.stdout.take()) {
            forward(Box::new(stdout));
        }
        if let (Some(forward), Some(stderr)) = (io.stderr, child.stderr.take()) {
            forward(Box::new(stderr));
        }

        self.check_early_exit(ctx, &spec.name, &mut child).await?;

        let pid = child.id();
        tracing::info!("Started process for '{}' (pid {:?})", spec.name, pid);

        self.children.lock().push(ManagedProcess {
            name: spec.name,
            pid,
            started_at: Utc::now(),
            child,
        });

        Ok(SpawnedProcess {
            host: self.host.clone(),
            pid,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::context::ClientMetadata;
    use crate::service::OutputStream;
    use tokio::io::AsyncReadExt;

    fn ctx() -> Context {
        Context::new(ClientMetadata::new("runtime-test").unwrap())
    }

    #[tokio::test]
    async fn test_spawn_and_shutdown() {
        let runtime = LocalRuntime::new().with_host("svc.local");
        let spawned = runtime
            .spawn(
                &ctx(),
                ProcessSpec::new("sleeper", "sleep").arg("30"),
                IoAttachments::default(),
            )
            .await
            .unwrap();

        assert_eq!(spawned.host, "svc.local");
        assert!(spawned.pid.is_some());

        let processes = runtime.processes();
        assert_eq!(processes.len(), 1);
        assert_eq!(processes[0].name, "sleeper");

        assert_eq!(runtime.shutdown().await, 1);
        assert!(runtime.processes().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_missing_command_fails() {
        let runtime = LocalRuntime::new();
        let err = runtime
            .spawn(
                &ctx(),
                ProcessSpec::new("ghost", "/definitely/not/a/real/binary"),
                IoAttachments::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ServiceStartFailed(ref name, _) if name == "ghost"));
        assert!(runtime.processes().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_with_cancelled_context_fails_fast() {
        let runtime = LocalRuntime::new();
        let ctx = ctx();
        ctx.cancel();
        let err = runtime
            .spawn(
                &ctx,
                ProcessSpec::new("sleeper", "sleep").arg("30"),
                IoAttachments::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_early_exit_is_a_start_failure() {
        let runtime = LocalRuntime::new().with_startup_grace(Duration::from_secs(5));
        let err = runtime
            .spawn(&ctx(), ProcessSpec::new("quitter", "false"), IoAttachments::default())
            .await
            .unwrap_err();
        match err {
            Error::ServiceStartFailed(name, detail) => {
                assert_eq!(name, "quitter");
                assert!(detail.contains("exited during startup"), "{}", detail);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(runtime.processes().is_empty());
    }

    #[tokio::test]
    async fn test_exited_processes_are_pruned() {
        let runtime = LocalRuntime::new();
        runtime
            .spawn(
                &ctx(),
                ProcessSpec::new("short", "sh").arg("-c").arg("exit 0"),
                IoAttachments::default(),
            )
            .await
            .unwrap();
        runtime
            .spawn(
                &ctx(),
                ProcessSpec::new("sleeper", "sleep").arg("30"),
                IoAttachments::default(),
            )
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(10), async {
            while runtime.processes().len() > 1 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        let processes = runtime.processes();
        assert_eq!(processes[0].name, "sleeper");
        assert_eq!(runtime.shutdown().await, 1);
    }

    #[tokio::test]
    async fn test_stdout_attachment_receives_output() {
        let runtime = LocalRuntime::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let io = IoAttachments {
            stdout: Some(Box::new(move |mut stream: OutputStream| {
                tokio::spawn(async move {
                    let mut out = String::new();
                    let _ = stream.read_to_string(&mut out).await;
                    let _ = tx.send(out);
                });
            })),
            ..Default::default()
        };

        runtime
            .spawn(
                &ctx(),
                ProcessSpec::new("echo", "sh")
                    .arg("-c")
                    .arg("echo \"hello $GREETING\"")
                    .env("GREETING", "world"),
                io,
            )
            .await
            .unwrap();

        let out = tokio::time::timeout(Duration::from_secs(10), rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.trim(), "hello world");
        runtime.shutdown().await;
    }
}
