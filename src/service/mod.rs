//! Service identities, descriptors and the [`Startable`] capability.
//!
//! - [`ServiceKey`] / [`RunningService`]: what the registry keys on and caches
//! - [`Startable`]: the trait every kind of service implements
//! - [`ProcessService`]: a startable backed by one OS process
//! - [`StartOptions`] / [`IoAttachments`]: flags and stdio callbacks passed
//!   through to the startable that performs an attempt
//!
//! # Example
//!
//! ```ignore
//! use pipeline_services::service::{Startable, ProcessService};
//!
//! let svc = ProcessService::new("db", "postgres").port(5432);
//! println!("{} has identity {}", svc.name(), svc.digest()?);
//! ```

mod process;
mod startable;
mod types;

pub use process::*;
pub use startable::*;
pub use types::*;
