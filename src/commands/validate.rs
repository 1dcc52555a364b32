use crate::output::UserOutput;
use pipeline_services::{Parser as ConfigParser, Startable};
use std::path::PathBuf;

pub fn run_validate(config_path: Option<PathBuf>, out: &dyn UserOutput) -> anyhow::Result<()> {
    let parser = ConfigParser::new();
    let config_path = if let Some(path) = config_path {
        path
    } else {
        match parser.find_config_file() {
            Ok(path) => path,
            Err(_) => {
                out.error("Error: No configuration file found");
                out.status("\nSearched for pipeline-services.yaml in:");
                out.status(&format!(
                    "  - Current directory: {}",
                    std::env::current_dir()?.display()
                ));
                out.status("  - Parent directories up to root");
                return Err(anyhow::anyhow!("Configuration file not found"));
            }
        }
    };

    out.status(&format!("Validating {}...", config_path.display()));

    let config = match parser.load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            out.error("Configuration failed to load");
            return Err(e.into());
        }
    };

    config.validate()?;

    out.success("Configuration is valid\n");

    out.status(&format!("Services: {}", config.services.len()));
    for name in config.service_names() {
        let definition = config.service_definition(&name)?;
        let deps: Vec<&str> = definition
            .dependencies
            .iter()
            .map(|d| d.alias.as_str())
            .collect();
        let identity = definition.digest()?.host_hash();
        if deps.is_empty() {
            out.status(&format!("  - {} ({})", name, identity));
        } else {
            out.status(&format!(
                "  - {} ({}) depends on {}",
                name,
                identity,
                deps.join(", ")
            ));
        }
    }

    Ok(())
}
