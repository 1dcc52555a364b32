use super::selected_services;
use crate::output::UserOutput;
use pipeline_services::{Config, Startable};

/// Print the content digest and host hash of each service.
pub fn run_digest(
    config: &Config,
    services: Vec<String>,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let names = selected_services(config, services);
    let width = names.iter().map(String::len).max().unwrap_or(0);

    for name in names {
        let digest = config.service_definition(&name)?.digest()?;
        out.status(&format!(
            "{:<width$}  {}  {}",
            name,
            digest.host_hash(),
            digest,
            width = width
        ));
    }

    Ok(())
}
