//! Configuration parsing and types.
//!
//! - `types` - Root config (`Config`) and per-service entries (`ServiceConfig`)
//! - `duration` - Human-readable durations ("500ms", "30s", "2m")
//! - `parser` - Locating and parsing `pipeline-services.yaml`
//! - `validation` - Config validation

mod duration;
mod parser;
mod types;
mod validation;

pub use duration::*;
pub use parser::*;
pub use types::*;
