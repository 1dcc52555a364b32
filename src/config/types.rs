//! Core configuration types.
//!
//! This module contains the root [`Config`] struct and the per-service
//! [`ServiceConfig`] for `pipeline-services.yaml`.

use super::parse_duration;
use crate::context::ClientMetadata;
use crate::error::{Error, Result};
use crate::runtime::DEFAULT_LOCAL_HOST;
use crate::service::ProcessService;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default bound on a single service start (2 minutes)
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(120);

/// Root configuration structure for pipeline-services.yaml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Client the services are started for. Generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Host reported for locally spawned services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Default bound on one service start, e.g. "30s" or "2m".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_timeout: Option<String>,

    /// How long a fresh process must stay up to count as started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_grace: Option<String>,

    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,

    /// Directory relative `cwd` values are resolved against. Set by the parser
    /// to the config file's directory.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// One entry under `services:`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    pub command: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<u16>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_timeout: Option<String>,
}

impl Config {
    /// Client metadata from `client_id`, or a freshly generated client.
    pub fn client_metadata(&self) -> Result<ClientMetadata> {
        match self.client_id {
            Some(ref id) => ClientMetadata::new(id.clone()),
            None => Ok(ClientMetadata::generate()),
        }
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_LOCAL_HOST)
    }

    pub fn default_startup_timeout(&self) -> Result<Duration> {
        match self.startup_timeout {
            Some(ref s) => parse_duration(s),
            None => Ok(DEFAULT_STARTUP_TIMEOUT),
        }
    }

    pub fn startup_grace(&self) -> Result<Duration> {
        match self.startup_grace {
            Some(ref s) => parse_duration(s),
            None => Ok(Duration::ZERO),
        }
    }

    /// Names of all configured services, sorted.
    pub fn service_names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    /// Build the startable definition for `name`, with its dependencies
    /// nested inside it.
    ///
    /// # Errors
    ///
    /// - [`Error::ServiceNotFound`] for unknown names (including dependencies)
    /// - [`Error::CircularDependency`] if `name` transitively depends on itself
    /// - [`Error::Validation`] for unparseable timeouts
    pub fn service_definition(&self, name: &str) -> Result<ProcessService> {
        let default_timeout = self.default_startup_timeout()?;
        let mut stack = Vec::new();
        self.build_definition(name, default_timeout, &mut stack)
    }

    fn build_definition(
        &self,
        name: &str,
        default_timeout: Duration,
        stack: &mut Vec<String>,
    ) -> Result<ProcessService> {
        if let Some(pos) = stack.iter().position(|n| n == name) {
            let mut cycle = stack[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(Error::CircularDependency(cycle));
        }

        let service = self
            .services
            .get(name)
            .ok_or_else(|| Error::ServiceNotFound(name.to_string()))?;

        let timeout = match service.startup_timeout {
            Some(ref s) => parse_duration(s)?,
            None => default_timeout,
        };

        let mut definition = ProcessService::new(name, service.command.clone())
            .args(service.args.iter().cloned())
            .startup_timeout(timeout);
        definition.env = service.env.clone();
        definition.ports = service.ports.clone();
        if let Some(ref cwd) = service.cwd {
            definition.cwd = Some(self.resolve_cwd(cwd));
        }

        stack.push(name.to_string());
        for dep in &service.depends_on {
            let dep_definition = self.build_definition(dep, default_timeout, stack)?;
            definition = definition.depends_on(dep.clone(), dep_definition);
        }
        stack.pop();

        Ok(definition)
    }

    /// Group `names` into start levels, leaves first.
    ///
    /// A name always lands in a later level than every name it depends on,
    /// directly or through other services, so starting level by level lets
    /// each requested service run its own attempt. Names within a level
    /// share no dependency path. Duplicates are dropped.
    ///
    /// # Errors
    ///
    /// Same as [`Config::service_definition`] for unknown names and cycles.
    pub fn start_levels(&self, names: &[String]) -> Result<Vec<Vec<String>>> {
        let mut depths = HashMap::new();
        let mut levels: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for name in names {
            let depth = self.dependency_depth(name, &mut depths, &mut Vec::new())?;
            let level = levels.entry(depth).or_default();
            if !level.contains(name) {
                level.push(name.clone());
            }
        }
        Ok(levels.into_values().collect())
    }

    /// Length of the longest dependency chain below `name`.
    fn dependency_depth(
        &self,
        name: &str,
        depths: &mut HashMap<String, usize>,
        stack: &mut Vec<String>,
    ) -> Result<usize> {
        if let Some(&depth) = depths.get(name) {
            return Ok(depth);
        }
        if let Some(pos) = stack.iter().position(|n| n == name) {
            let mut cycle = stack[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(Error::CircularDependency(cycle));
        }

        let service = self
            .services
            .get(name)
            .ok_or_else(|| Error::ServiceNotFound(name.to_string()))?;

        stack.push(name.to_string());
        let mut depth = 0;
        for dep in &service.depends_on {
            depth = depth.max(self.dependency_depth(dep, depths, stack)? + 1);
        }
        stack.pop();

        depths.insert(name.to_string(), depth);
        Ok(depth)
    }

    fn resolve_cwd(&self, cwd: &str) -> PathBuf {
        let cwd_path = Path::new(cwd);
        match self.base_dir {
            Some(ref base) if cwd_path.is_relative() => base.join(cwd_path),
            _ => cwd_path.to_path_buf(),
        }
    }
}
