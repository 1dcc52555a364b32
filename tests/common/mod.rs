//! Shared fakes for registry tests.
#![allow(dead_code)]

use async_trait::async_trait;
use pipeline_services::{
    ClientMetadata, Context, Digest, Error, LocalRuntime, Result, Runtime, RunningService,
    Services, StartOptions, Startable,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Outcome a [`FakeStartable`] hands back from one start attempt.
pub enum Outcome {
    Succeed(String),
    Fail(String),
}

/// A startable whose attempts block until the test scripts an outcome.
///
/// Every call to `start` counts as one attempt, then waits for the next
/// outcome pushed with [`succeed`](Self::succeed) or [`fail`](Self::fail).
pub struct FakeStartable {
    content: String,
    bad_digest: bool,
    starts: AtomicUsize,
    interactive_starts: AtomicUsize,
    outcomes_tx: mpsc::UnboundedSender<Outcome>,
    outcomes_rx: Mutex<mpsc::UnboundedReceiver<Outcome>>,
}

impl FakeStartable {
    pub fn new(content: &str) -> Arc<Self> {
        Arc::new(Self::build(content, false))
    }

    /// A startable whose identity cannot be computed.
    pub fn with_bad_digest(content: &str) -> Arc<Self> {
        Arc::new(Self::build(content, true))
    }

    fn build(content: &str, bad_digest: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            content: content.to_string(),
            bad_digest,
            starts: AtomicUsize::new(0),
            interactive_starts: AtomicUsize::new(0),
            outcomes_tx: tx,
            outcomes_rx: Mutex::new(rx),
        }
    }

    pub fn succeed(&self, host: &str) {
        self.outcomes_tx
            .send(Outcome::Succeed(host.to_string()))
            .expect("receiver lives as long as the fake");
    }

    pub fn fail(&self, reason: &str) {
        self.outcomes_tx
            .send(Outcome::Fail(reason.to_string()))
            .expect("receiver lives as long as the fake");
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Attempts that were handed interactive start options.
    pub fn interactive_starts(&self) -> usize {
        self.interactive_starts.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` attempts have begun.
    pub async fn wait_for_starts(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.starts() < n {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {} start attempt(s), saw {}", n, self.starts()));
    }
}

#[async_trait]
impl Startable for FakeStartable {
    fn digest(&self) -> Result<Digest> {
        if self.bad_digest {
            return Err(Error::Identity(format!("cannot hash '{}'", self.content)));
        }
        Ok(Digest::from_string(&self.content))
    }

    async fn start(
        &self,
        ctx: &Context,
        _runtime: &Arc<dyn Runtime>,
        services: &Services,
        opts: StartOptions,
    ) -> Result<RunningService> {
        let key = services.key_for(ctx, self)?;
        self.starts.fetch_add(1, Ordering::SeqCst);
        if opts.interactive {
            self.interactive_starts.fetch_add(1, Ordering::SeqCst);
        }

        let outcome = self.outcomes_rx.lock().await.recv().await;
        match outcome {
            Some(Outcome::Succeed(host)) => Ok(RunningService::new(key, host)),
            Some(Outcome::Fail(reason)) => {
                Err(Error::ServiceStartFailed(self.content.clone(), reason))
            }
            None => Err(Error::Runtime("outcome channel closed".to_string())),
        }
    }

    fn name(&self) -> String {
        self.content.clone()
    }
}

pub fn registry() -> Arc<Services> {
    Arc::new(Services::new(Arc::new(LocalRuntime::new())))
}

pub fn ctx_for(client: &str) -> Context {
    Context::new(ClientMetadata::new(client).expect("valid client id"))
}

/// Let spawned tasks run until they park on something.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
