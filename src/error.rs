// Allow unused_assignments at module level because thiserror's generated code
// for struct variants triggers false positive warnings - the fields ARE used
// in the Display impl but rustc's lint pass doesn't see this.
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid digest '{value}': {reason}")]
    #[diagnostic(
        code(psvc::digest::invalid),
        help("Digests have the form 'sha256:<64 lowercase hex characters>'")
    )]
    InvalidDigest { value: String, reason: String },

    #[error("Failed to resolve service identity: {0}")]
    #[diagnostic(code(psvc::service::identity))]
    Identity(String),

    #[error("No client metadata attached to the request context")]
    #[diagnostic(
        code(psvc::context::missing_client),
        help("Construct the context with Context::new(ClientMetadata::new(..)) before starting services")
    )]
    MissingClientMetadata,

    #[error("Invalid client ID '{id}': {reason}")]
    #[diagnostic(code(psvc::context::invalid_client))]
    InvalidClientId { id: String, reason: String },

    #[error("Service {0} is not running")]
    #[diagnostic(
        code(psvc::service::not_running),
        help("Start the service explicitly before looking it up")
    )]
    ServiceNotRunning(String),

    #[error("Service '{0}' failed to start: {1}")]
    #[diagnostic(
        code(psvc::service::start_failed),
        help("Check that the command exists and is executable")
    )]
    ServiceStartFailed(String, String),

    #[error("Runtime error: {0}")]
    #[diagnostic(code(psvc::runtime::error))]
    Runtime(String),

    #[error("Service not found: {0}")]
    #[diagnostic(
        code(psvc::service::not_found),
        help("Check the 'services:' section of your pipeline-services.yaml")
    )]
    ServiceNotFound(String),

    #[error("Circular dependency detected: {}", .0.join(" -> "))]
    #[diagnostic(
        code(psvc::dependency::circular),
        help("Services cannot depend on each other in a cycle. Review the depends_on fields")
    )]
    CircularDependency(Vec<String>),

    #[error("Timeout waiting for service '{0}'")]
    #[diagnostic(
        code(psvc::service::timeout),
        help("The service may be slow to start. Increase startup_timeout for it")
    )]
    Timeout(String),

    #[error("Operation cancelled for service '{0}'")]
    Cancelled(String),

    #[error("Multiple errors occurred:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Multiple(Vec<Error>),

    #[error("Invalid configuration: {0}")]
    #[diagnostic(
        code(psvc::config::validation),
        help("Run `psvc validate` for detailed validation errors")
    )]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::ServiceNotFound(name) => Some(format!(
                "Declare '{}' under 'services:' in pipeline-services.yaml, or check the spelling.",
                name
            )),
            Error::ServiceNotRunning(_) => Some(
                "Lookups never start services. Call start first, or retry once a pending start completes."
                    .to_string(),
            ),
            Error::ServiceStartFailed(name, _) => Some(format!(
                "Starting '{}' again will make a fresh attempt; the failure is not cached.",
                name
            )),
            Error::CircularDependency(path) => Some(format!(
                "Services cannot depend on each other in a cycle. Review the depends_on fields for: {}",
                path.join(", ")
            )),
            Error::Timeout(name) => Some(format!(
                "Raise 'startup_timeout' for '{}' or the global default in pipeline-services.yaml.",
                name
            )),
            Error::MissingClientMetadata => Some(
                "Every start or lookup is scoped to a client; attach ClientMetadata to the Context."
                    .to_string(),
            ),
            Error::InvalidClientId { .. } => Some(
                "Client IDs may only contain alphanumerics, '-' and '_' (max 64 characters)."
                    .to_string(),
            ),
            Error::Config(msg) if msg.contains("Could not find") => None,
            Error::Config(_) | Error::Validation(_) | Error::Parse(_) => {
                Some("Validate your config with: psvc validate".to_string())
            }
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}
