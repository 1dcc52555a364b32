mod digest;
mod start;
mod validate;

pub use digest::run_digest;
pub use start::run_start;
pub use validate::run_validate;

use pipeline_services::Config;

/// Requested service names, or every configured service when none are given.
fn selected_services(config: &Config, requested: Vec<String>) -> Vec<String> {
    if requested.is_empty() {
        config.service_names()
    } else {
        requested
    }
}
