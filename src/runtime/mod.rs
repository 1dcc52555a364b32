//! Runtimes that actually create service processes.
//!
//! The registry never calls a runtime itself: it holds one handle and passes
//! it through to whichever [`Startable`](crate::service::Startable) performs a
//! start attempt. [`LocalRuntime`] runs plain OS processes and is the runtime
//! used by the `psvc` binary.

mod local;

pub use local::*;

use crate::context::Context;
use crate::error::Result;
use crate::service::IoAttachments;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Service name, used for logging and error messages only.
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl ProcessSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Result of a successful spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnedProcess {
    /// Address other processes use to reach this one.
    pub host: String,
    pub pid: Option<u32>,
}

/// Process-creating backend handed to startables.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Short name for logs (e.g. "local").
    fn name(&self) -> &str;

    /// Spawn a process and wire its stdio to `io`.
    ///
    /// The runtime owns the spawned process from here on; it stays alive until
    /// the runtime shuts it down.
    async fn spawn(
        &self,
        ctx: &Context,
        spec: ProcessSpec,
        io: IoAttachments,
    ) -> Result<SpawnedProcess>;
}
