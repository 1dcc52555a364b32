use super::{RunningService, StartOptions};
use crate::context::Context;
use crate::digest::Digest;
use crate::error::Result;
use crate::registry::Services;
use crate::runtime::Runtime;
use async_trait::async_trait;
use std::sync::Arc;

/// A service definition the registry knows how to bring up.
///
/// Implement this trait to plug a new kind of service into [`Services`]. The
/// registry only relies on two things: a stable content-derived identity, and
/// an operation that performs the (possibly slow, possibly failing) start.
///
/// # Contract
///
/// - [`digest`](Self::digest) must return the same value for the same
///   definition. It is evaluated before any locking; an error fails the
///   request without registering anything.
/// - [`start`](Self::start) is called at most once at a time per
///   [`ServiceKey`](super::ServiceKey), while the registry holds that key's
///   attempt lock. It should honour `ctx`'s cancellation token. Its error is
///   returned to the caller verbatim.
/// - `services` is the registry performing this start; use it to start
///   dependencies, not to start `self` (that would wait on its own lock).
#[async_trait]
pub trait Startable: Send + Sync {
    /// Content-derived identity of this definition.
    fn digest(&self) -> Result<Digest>;

    /// Bring the service up and describe where it can be reached.
    #[must_use = "ignoring this result means the service may not have started successfully"]
    async fn start(
        &self,
        ctx: &Context,
        runtime: &Arc<dyn Runtime>,
        services: &Services,
        opts: StartOptions,
    ) -> Result<RunningService>;

    /// Human-readable name for logs. Defaults to the digest's host hash.
    fn name(&self) -> String {
        self.digest()
            .map(|d| d.host_hash())
            .unwrap_or_else(|_| "<unknown>".to_string())
    }
}
