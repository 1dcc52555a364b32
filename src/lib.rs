//! # Pipeline Services
//!
//! A registry for the long-running helper services (databases, caches, mock
//! servers) that pipeline steps depend on.
//!
//! ## Features
//!
//! - **Single-flight starts**: concurrent requests for the same service and
//!   client share one start attempt
//! - **Retry on failure**: a failed start caches nothing, so the next request
//!   starts afresh
//! - **Per-client isolation**: the same definition requested by two clients
//!   yields two services
//! - **Non-blocking lookups**: [`Services::get`] never waits on a start
//! - **Cancellation**: waiting callers give up when their [`Context`] is cancelled
//!
//! ## Quick Start
//!
//! ```no_run
//! use pipeline_services::{Context, LocalRuntime, Parser, Services};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), pipeline_services::Error> {
//! let parser = Parser::new();
//! let config = parser.load_config("pipeline-services.yaml")?;
//! config.validate()?;
//!
//! let runtime = Arc::new(LocalRuntime::new().with_host(config.host()));
//! let services = Services::new(runtime.clone());
//! let ctx = Context::new(config.client_metadata()?);
//!
//! let db = config.service_definition("db")?;
//! let running = services.start(&ctx, &db).await?;
//! println!("{}", running);
//!
//! runtime.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod digest;
pub mod error;
pub mod lock_order;
pub mod registry;
pub mod runtime;
pub mod service;

// Re-export commonly used types
pub use config::{Config, Parser};
pub use context::{ClientMetadata, Context};
pub use digest::Digest;
pub use error::{Error, Result};
pub use registry::{ServiceBinding, Services, StartedBindings};
pub use runtime::{LocalRuntime, Runtime};
pub use service::{
    IoAttachments, ProcessService, RunningService, ServiceKey, StartOptions, Startable,
};
