use crate::digest::Digest;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};

/// Identity of one service instance in the registry.
///
/// Equality is purely structural. The same definition (equal `digest`)
/// requested by two clients yields two keys and two independent lifecycles;
/// requested twice by one client, it yields the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceKey {
    pub digest: Digest,
    pub client_id: String,
}

impl ServiceKey {
    pub fn new(digest: Digest, client_id: impl Into<String>) -> Self {
        Self {
            digest,
            client_id: client_id.into(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.digest.host_hash(), self.client_id)
    }
}

/// Descriptor of a service that has been confirmed up.
///
/// Produced once per successful start attempt and never mutated afterwards.
/// Every caller that reuses a cached start receives an equal clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningService {
    pub key: ServiceKey,
    /// Reachable address or hostname of the running instance.
    pub host: String,
    /// Ports the service declared it listens on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<u16>,
}

impl RunningService {
    pub fn new(key: ServiceKey, host: impl Into<String>) -> Self {
        Self {
            key,
            host: host.into(),
            ports: Vec::new(),
        }
    }

    pub fn with_ports(mut self, ports: Vec<u16>) -> Self {
        self.ports = ports;
        self
    }

    /// `host:port` for each declared port.
    pub fn addresses(&self) -> Vec<String> {
        self.ports
            .iter()
            .map(|port| format!("{}:{}", self.host, port))
            .collect()
    }
}

impl fmt::Display for RunningService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.key, self.host)?;
        if !self.ports.is_empty() {
            let ports: Vec<String> = self.ports.iter().map(|p| p.to_string()).collect();
            write!(f, " [{}]", ports.join(", "))?;
        }
        Ok(())
    }
}

/// Boxed stream handed to an output attachment.
pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed sink handed to an input attachment.
pub type InputStream = Box<dyn AsyncWrite + Send + Unpin>;

/// Callback receiving a started process's stdout or stderr.
pub type OutputForwarder = Box<dyn FnOnce(OutputStream) + Send>;

/// Callback receiving a started process's stdin.
pub type InputForwarder = Box<dyn FnOnce(InputStream) + Send>;

/// Callbacks for attaching to the standard streams of a started process.
///
/// Streams without an attachment are discarded by the runtime.
#[derive(Default)]
pub struct IoAttachments {
    pub stdin: Option<InputForwarder>,
    pub stdout: Option<OutputForwarder>,
    pub stderr: Option<OutputForwarder>,
}

impl IoAttachments {
    pub fn is_empty(&self) -> bool {
        self.stdin.is_none() && self.stdout.is_none() && self.stderr.is_none()
    }
}

impl fmt::Debug for IoAttachments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoAttachments")
            .field("stdin", &self.stdin.is_some())
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish()
    }
}

/// Behaviour flags and stream attachments for one start call.
///
/// The registry never inspects these; they are handed to the startable that
/// performs the attempt, and dropped unused when a cached service is reused.
#[derive(Debug, Default)]
pub struct StartOptions {
    /// Whether the caller intends to interact with the service's stdio.
    pub interactive: bool,
    pub io: IoAttachments,
}

impl StartOptions {
    pub fn interactive(io: IoAttachments) -> Self {
        Self {
            interactive: true,
            io,
        }
    }
}
