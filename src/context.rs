//! Per-request context: who is asking, and whether they still care.
//!
//! Every start or lookup is scoped to a client. The same service definition
//! requested by two clients yields two independent services, so the client id
//! is half of a [`ServiceKey`](crate::service::ServiceKey).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Identity of the session or tenant issuing requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub client_id: String,
}

impl ClientMetadata {
    /// Create client metadata from a validated id.
    pub fn new(client_id: impl Into<String>) -> Result<Self> {
        let client_id = client_id.into();
        Self::validate_id(&client_id)?;
        Ok(Self { client_id })
    }

    /// Create client metadata with a freshly generated id.
    pub fn generate() -> Self {
        Self {
            client_id: Self::generate_id(),
        }
    }

    /// Generate a new random client ID with 128 bits of entropy
    pub fn generate_id() -> String {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let high: u64 = rng.gen();
        let low: u64 = rng.gen();

        format!("client-{:016x}{:016x}", high, low)
    }

    /// Validate client ID format
    pub fn validate_id(id: &str) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidClientId {
            id: id.to_string(),
            reason: reason.to_string(),
        };

        if id.is_empty() {
            return Err(invalid("client ID cannot be empty"));
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(invalid(
                "only alphanumeric characters, '-' and '_' are allowed",
            ));
        }

        if id.len() > 64 {
            return Err(invalid("too long (max 64 characters)"));
        }

        Ok(())
    }
}

/// Request context threaded through every registry operation.
///
/// Cloning is cheap and clones share the same cancellation token. Use
/// [`Context::child`] to derive a context that can be cancelled on its own
/// without affecting the parent.
#[derive(Debug, Clone, Default)]
pub struct Context {
    client: Option<ClientMetadata>,
    cancellation: CancellationToken,
}

impl Context {
    /// Context for the given client with a fresh cancellation token.
    pub fn new(client: ClientMetadata) -> Self {
        Self {
            client: Some(client),
            cancellation: CancellationToken::new(),
        }
    }

    /// Context with no client attached.
    ///
    /// Registry operations fail with [`Error::MissingClientMetadata`] until a
    /// client is attached with [`Context::with_client`].
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, client: ClientMetadata) -> Self {
        self.client = Some(client);
        self
    }

    /// Derive a context whose token is cancelled with this one, but can also
    /// be cancelled independently.
    pub fn child(&self) -> Self {
        Self {
            client: self.client.clone(),
            cancellation: self.cancellation.child_token(),
        }
    }

    pub fn client(&self) -> Result<&ClientMetadata> {
        self.client.as_ref().ok_or(Error::MissingClientMetadata)
    }

    pub fn client_id(&self) -> Result<&str> {
        self.client().map(|c| c.client_id.as_str())
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once this context is cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_format() {
        let id = ClientMetadata::generate_id();
        assert!(id.starts_with("client-"));
        assert_eq!(id.len(), "client-".len() + 32);
        assert!(ClientMetadata::validate_id(&id).is_ok());
        assert_ne!(id, ClientMetadata::generate_id());
    }

    #[test]
    fn test_validate_id_rejects_bad_input() {
        assert!(ClientMetadata::new("").is_err());
        assert!(ClientMetadata::new("has space").is_err());
        assert!(ClientMetadata::new("slash/ed").is_err());
        assert!(ClientMetadata::new("x".repeat(65)).is_err());
        assert!(ClientMetadata::new("client_1-ok").is_ok());
    }

    #[test]
    fn test_background_has_no_client() {
        let ctx = Context::background();
        assert!(matches!(ctx.client_id(), Err(Error::MissingClientMetadata)));

        let ctx = ctx.with_client(ClientMetadata::new("c1").unwrap());
        assert_eq!(ctx.client_id().unwrap(), "c1");
    }

    #[test]
    fn test_child_cancellation_is_one_way() {
        let parent = Context::new(ClientMetadata::new("c1").unwrap());
        let child = parent.child();
        assert_eq!(child.client_id().unwrap(), "c1");

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let ctx = Context::new(ClientMetadata::generate());
        let waiter = ctx.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        ctx.cancel();
        handle.await.unwrap();
        assert!(ctx.is_cancelled());
    }
}
