use super::Services;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::service::{RunningService, StartOptions, Startable};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A service a pipeline step depends on, and the alias the step uses for it.
#[derive(Clone)]
pub struct ServiceBinding {
    pub alias: String,
    pub service: Arc<dyn Startable>,
}

impl ServiceBinding {
    pub fn new(alias: impl Into<String>, service: Arc<dyn Startable>) -> Self {
        Self {
            alias: alias.into(),
            service,
        }
    }
}

impl fmt::Debug for ServiceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBinding")
            .field("alias", &self.alias)
            .field("service", &self.service.name())
            .finish()
    }
}

/// Services started for a set of bindings, in binding order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartedBindings {
    services: Vec<(String, RunningService)>,
}

impl StartedBindings {
    pub fn services(&self) -> impl Iterator<Item = (&str, &RunningService)> {
        self.services.iter().map(|(alias, svc)| (alias.as_str(), svc))
    }

    pub fn get(&self, alias: &str) -> Option<&RunningService> {
        self.services
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, svc)| svc)
    }

    /// Alias to host mapping, e.g. for injecting `<ALIAS>_HOST` variables.
    pub fn hosts(&self) -> BTreeMap<String, String> {
        self.services
            .iter()
            .map(|(alias, svc)| (alias.clone(), svc.host.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl Services {
    /// Start every binding concurrently.
    ///
    /// Each binding goes through [`Services::start`], so bindings that share a
    /// key share one attempt. If exactly one binding fails its error is
    /// returned as is; several failures are reported as [`Error::Multiple`].
    /// Bindings that did start stay running and cached either way.
    pub async fn start_bindings(
        &self,
        ctx: &Context,
        bindings: &[ServiceBinding],
    ) -> Result<StartedBindings> {
        self.start_bindings_with(ctx, bindings, |_| StartOptions::default())
            .await
    }

    /// Like [`Services::start_bindings`], with per-binding start options.
    ///
    /// `opts` is only consulted for bindings that end up running their own
    /// attempt; a binding whose key is already cached ignores its options.
    pub async fn start_bindings_with<F>(
        &self,
        ctx: &Context,
        bindings: &[ServiceBinding],
        opts: F,
    ) -> Result<StartedBindings>
    where
        F: Fn(&ServiceBinding) -> StartOptions,
    {
        let opts = &opts;
        let attempts = bindings.iter().map(|binding| async move {
            self.start_with(ctx, binding.service.as_ref(), opts(binding))
                .await
                .map(|running| (binding.alias.clone(), running))
        });

        let mut services = Vec::with_capacity(bindings.len());
        let mut errors = Vec::new();
        for result in futures::future::join_all(attempts).await {
            match result {
                Ok(started) => services.push(started),
                Err(e) => errors.push(e),
            }
        }

        match errors.len() {
            0 => Ok(StartedBindings { services }),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Multiple(errors)),
        }
    }
}
