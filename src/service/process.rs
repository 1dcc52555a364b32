use super::{RunningService, StartOptions, Startable};
use crate::context::Context;
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::registry::{ServiceBinding, Services};
use crate::runtime::{ProcessSpec, Runtime};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A service backed by a single OS process.
///
/// The definition is plain data: its [`digest`](Startable::digest) is the
/// sha256 of its canonical JSON form, so two equal definitions are the same
/// service and any change (command, args, env, ports, dependencies) yields a
/// new one. `startup_timeout` is an execution bound, not part of the identity.
///
/// Dependencies are started through the registry before the process itself,
/// so a dependency shared by several services is started once per client. The
/// process sees each dependency as `<ALIAS>_HOST` (and `<ALIAS>_PORT` for the
/// first declared port).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessService {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub dependencies: Vec<ProcessDependency>,
    #[serde(skip)]
    pub startup_timeout: Option<Duration>,
}

/// A dependency of a [`ProcessService`] and the alias it is exposed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDependency {
    pub alias: String,
    pub service: ProcessService,
}

impl ProcessService {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            ports: Vec::new(),
            dependencies: Vec::new(),
            startup_timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.ports.push(port);
        self
    }

    pub fn depends_on(mut self, alias: impl Into<String>, service: ProcessService) -> Self {
        self.dependencies.push(ProcessDependency {
            alias: alias.into(),
            service,
        });
        self
    }

    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = Some(timeout);
        self
    }

    /// What the runtime should run, before dependency variables are added.
    pub fn process_spec(&self) -> ProcessSpec {
        ProcessSpec {
            name: self.name.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            cwd: self.cwd.clone(),
        }
    }

    async fn run_attempt(
        &self,
        ctx: &Context,
        runtime: &Arc<dyn Runtime>,
        services: &Services,
        opts: StartOptions,
    ) -> Result<RunningService> {
        let key = services.key_for(ctx, self)?;
        let mut spec = self.process_spec();

        if !self.dependencies.is_empty() {
            let bindings: Vec<ServiceBinding> = self
                .dependencies
                .iter()
                .map(|dep| ServiceBinding::new(dep.alias.clone(), Arc::new(dep.service.clone())))
                .collect();

            let started = services.start_bindings(ctx, &bindings).await?;
            for (alias, running) in started.services() {
                spec.env
                    .insert(dependency_env_var(alias, "HOST"), running.host.clone());
                if let Some(port) = running.ports.first() {
                    spec.env
                        .insert(dependency_env_var(alias, "PORT"), port.to_string());
                }
            }
        }

        let spawned = runtime.spawn(ctx, spec, opts.io).await?;
        Ok(RunningService::new(key, spawned.host).with_ports(self.ports.clone()))
    }
}

/// `db-primary` + `HOST` -> `DB_PRIMARY_HOST`
pub fn dependency_env_var(alias: &str, suffix: &str) -> String {
    let alias: String = alias
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}", alias, suffix)
}

#[async_trait]
impl Startable for ProcessService {
    fn digest(&self) -> Result<Digest> {
        let canonical = serde_json::to_vec(self).map_err(|e| {
            Error::Identity(format!("cannot serialize service '{}': {}", self.name, e))
        })?;
        Ok(Digest::from_bytes(canonical))
    }

    #[tracing::instrument(skip_all, fields(service.name = %self.name))]
    async fn start(
        &self,
        ctx: &Context,
        runtime: &Arc<dyn Runtime>,
        services: &Services,
        opts: StartOptions,
    ) -> Result<RunningService> {
        let attempt = async {
            match self.startup_timeout {
                Some(limit) => {
                    tokio::time::timeout(limit, self.run_attempt(ctx, runtime, services, opts))
                        .await
                        .unwrap_or_else(|_| Err(Error::Timeout(self.name.clone())))
                }
                None => self.run_attempt(ctx, runtime, services, opts).await,
            }
        };

        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(Error::Cancelled(self.name.clone())),
            result = attempt => result,
        }
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}
