//! The service registry: single-flight start and snapshot lookup per key.
//!
//! See [`Services`] for the locking protocol.

mod bindings;
mod cell;

pub use bindings::*;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::lock_order::{assert_no_locks_held, track_lock_acquisition, track_lock_release, LockId};
use crate::runtime::Runtime;
use crate::service::{RunningService, ServiceKey, StartOptions, Startable};
use cell::ServiceCell;
use std::collections::HashMap;
use std::sync::Arc;

/// Type alias for the key to cell map
type CellRegistry = HashMap<ServiceKey, Arc<ServiceCell>>;

/// Registry of services started on behalf of pipeline clients.
///
/// One `Services` value is created per engine session and shared (by
/// reference or `Arc`) with every component that starts or looks up
/// services. It guarantees, per [`ServiceKey`]:
///
/// - at most one start attempt is in flight at any time
/// - a successful start is cached and reused without invoking the startable again
/// - a failed start caches nothing, so the next caller makes a fresh attempt
///
/// Operations on different keys never wait on each other.
///
/// # Locking Protocol
///
/// 1. `cells` (parking_lot Mutex): taken only to find or insert a cell, O(1)
///    work, released before the cell is touched.
/// 2. Cell attempt lock (tokio Mutex): held across the startable's `start`.
///    Callers for the same key queue here.
/// 3. Cell value lock (parking_lot RwLock): brief reads of the cached
///    descriptor. [`get`](Self::get) takes only this lock, so lookups never
///    wait for an in-flight attempt.
///
/// # Failure Semantics
///
/// A failed attempt is reported to the one caller whose attempt it was, with
/// the startable's error unchanged. Callers queued behind it do not see that
/// error; the first of them to acquire the attempt lock starts afresh.
/// Dropping a `start` future mid-attempt releases the lock with nothing
/// cached, which behaves exactly like a failed attempt.
///
/// # Example
///
/// ```no_run
/// use pipeline_services::{ClientMetadata, Context, LocalRuntime, ProcessService, Services};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), pipeline_services::Error> {
/// let services = Services::new(Arc::new(LocalRuntime::new()));
/// let ctx = Context::new(ClientMetadata::new("build-42")?);
///
/// let redis = ProcessService::new("redis", "redis-server").port(6379);
/// let running = services.start(&ctx, &redis).await?;
/// println!("redis reachable at {:?}", running.addresses());
///
/// // Later lookups never start anything
/// assert_eq!(services.get(&ctx, &redis)?, running);
/// # Ok(())
/// # }
/// ```
pub struct Services {
    runtime: Arc<dyn Runtime>,
    cells: parking_lot::Mutex<CellRegistry>,
}

impl Services {
    /// Create an empty registry that hands `runtime` to every startable.
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        Self {
            runtime,
            cells: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Runtime handle threaded through to startables.
    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.runtime
    }

    /// Resolve the registry key for `svc` as requested by `ctx`'s client.
    pub fn key_for(&self, ctx: &Context, svc: &dyn Startable) -> Result<ServiceKey> {
        let client_id = ctx.client_id()?;
        let digest = svc.digest()?;
        Ok(ServiceKey::new(digest, client_id))
    }

    /// Number of keys that have ever been started (successfully or not).
    pub fn len(&self) -> usize {
        track_lock_acquisition(LockId::Registry);
        let len = self.cells.lock().len();
        track_lock_release(LockId::Registry);
        len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every cached running service.
    pub fn running(&self) -> Vec<RunningService> {
        track_lock_acquisition(LockId::Registry);
        let cells: Vec<Arc<ServiceCell>> = self.cells.lock().values().cloned().collect();
        track_lock_release(LockId::Registry);

        cells.iter().filter_map(|cell| cell.cached()).collect()
    }

    /// Look up the cell for `key`, inserting an empty one if needed.
    ///
    /// Concurrent callers for the same new key all receive the same cell.
    fn cell(&self, key: &ServiceKey) -> Arc<ServiceCell> {
        track_lock_acquisition(LockId::Registry);
        let cell = Arc::clone(
            self.cells
                .lock()
                .entry(key.clone())
                .or_insert_with(|| Arc::new(ServiceCell::new())),
        );
        track_lock_release(LockId::Registry);
        cell
    }

    fn existing_cell(&self, key: &ServiceKey) -> Option<Arc<ServiceCell>> {
        track_lock_acquisition(LockId::Registry);
        let cell = self.cells.lock().get(key).cloned();
        track_lock_release(LockId::Registry);
        cell
    }

    /// Return the running service for `svc` if a start has succeeded.
    ///
    /// This is a snapshot read. It never starts anything and never waits for
    /// an in-flight attempt: while the first start for a key is still running,
    /// it fails with [`Error::ServiceNotRunning`].
    pub fn get(&self, ctx: &Context, svc: &dyn Startable) -> Result<RunningService> {
        let key = self.key_for(ctx, svc)?;
        self.get_by_key(&key)
    }

    /// Like [`get`](Self::get), for an already resolved key.
    pub fn get_by_key(&self, key: &ServiceKey) -> Result<RunningService> {
        self.existing_cell(key)
            .and_then(|cell| cell.cached())
            .ok_or_else(|| Error::ServiceNotRunning(key.digest.host_hash()))
    }

    /// Start `svc`, or reuse the result of an earlier successful start.
    pub async fn start(&self, ctx: &Context, svc: &dyn Startable) -> Result<RunningService> {
        self.start_with(ctx, svc, StartOptions::default()).await
    }

    /// Start `svc` with explicit behaviour flags and stdio attachments.
    ///
    /// `opts` is handed to the startable only if this call performs the
    /// attempt; it is dropped unused when a cached service is returned.
    ///
    /// # Errors
    ///
    /// - identity resolution errors (no client in `ctx`, digest failure),
    ///   before any cell is created
    /// - [`Error::Cancelled`] if `ctx` is cancelled while queued behind
    ///   another attempt for the same key
    /// - whatever the startable's own attempt returned, unchanged
    pub async fn start_with(
        &self,
        ctx: &Context,
        svc: &dyn Startable,
        opts: StartOptions,
    ) -> Result<RunningService> {
        let key = self.key_for(ctx, svc)?;
        let cell = self.cell(&key);

        assert_no_locks_held("cell attempt");
        let _attempt = tokio::select! {
            biased;
            guard = cell.lock_attempt() => guard,
            _ = ctx.cancelled() => return Err(Error::Cancelled(svc.name())),
        };

        if let Some(running) = cell.cached() {
            tracing::debug!("Service {} already running, reusing", key);
            return Ok(running);
        }

        tracing::debug!("Starting service {}", key);
        let running = svc.start(ctx, &self.runtime, self, opts).await?;
        cell.store(running.clone());
        tracing::debug!("Service {} started at {}", key, running.host);

        Ok(running)
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("runtime", &self.runtime.name())
            .field("cells", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Digest;
    use crate::runtime::LocalRuntime;

    fn services() -> Services {
        Services::new(Arc::new(LocalRuntime::new()))
    }

    fn key(content: &str, client: &str) -> ServiceKey {
        ServiceKey::new(Digest::from_string(content), client)
    }

    #[test]
    fn test_cell_is_created_once_per_key() {
        let services = services();
        let a = services.cell(&key("db", "c1"));
        let b = services.cell(&key("db", "c1"));
        let c = services.cell(&key("db", "c2"));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(services.len(), 2);
    }

    #[test]
    fn test_concurrent_cell_creation_converges() {
        let services = Arc::new(services());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let services = Arc::clone(&services);
                std::thread::spawn(move || services.cell(&key("db", "c1")))
            })
            .collect();

        let cells: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for cell in &cells[1..] {
            assert!(Arc::ptr_eq(&cells[0], cell));
        }
        assert_eq!(services.len(), 1);
    }

    #[test]
    fn test_get_by_key_does_not_create_cells() {
        let services = services();
        let err = services.get_by_key(&key("db", "c1")).unwrap_err();
        assert!(matches!(err, Error::ServiceNotRunning(_)));
        assert!(services.is_empty());
    }

    #[test]
    fn test_get_by_key_returns_cached_value() {
        let services = services();
        let k = key("db", "c1");
        let running = RunningService::new(k.clone(), "db-host");
        services.cell(&k).store(running.clone());

        assert_eq!(services.get_by_key(&k).unwrap(), running);
        assert!(services.get_by_key(&key("db", "c2")).is_err());
        assert_eq!(services.running(), vec![running]);
    }

    #[test]
    fn test_not_running_error_names_host_hash() {
        let services = services();
        let k = key("db", "c1");
        let err = services.get_by_key(&k).unwrap_err();
        assert!(err.to_string().contains(&k.digest.host_hash()));
    }

    #[test]
    fn test_debug_shows_runtime_and_cell_count() {
        let services = services();
        services.cell(&key("db", "c1"));
        assert_eq!(
            format!("{:?}", services),
            "Services { runtime: \"local\", cells: 1 }"
        );
    }
}
