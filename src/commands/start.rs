use super::selected_services;
use crate::output::UserOutput;
use pipeline_services::service::{IoAttachments, OutputForwarder, OutputStream};
use pipeline_services::{
    ClientMetadata, Config, Context, Error, LocalRuntime, RunningService, ServiceBinding, Services,
    StartOptions,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run_start(
    config: &Config,
    client: ClientMetadata,
    services: Vec<String>,
    attach: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let names = selected_services(config, services);
    if names.is_empty() {
        out.warning("No services configured");
        return Ok(());
    }

    // Attached services start leaves first, so a requested service that is
    // also another one's dependency runs its own attempt with its own output
    let levels = if attach {
        config.start_levels(&names)?
    } else {
        vec![names]
    };
    let levels = levels
        .iter()
        .map(|level| bindings_for(config, level))
        .collect::<pipeline_services::Result<Vec<_>>>()?;
    let count: usize = levels.iter().map(Vec::len).sum();

    let runtime = Arc::new(
        LocalRuntime::new()
            .with_host(config.host())
            .with_startup_grace(config.startup_grace()?),
    );
    let registry = Services::new(runtime.clone());
    let ctx = Context::new(client);

    out.status(&format!(
        "Starting {} service(s) for client {}...",
        count,
        ctx.client_id()?
    ));

    let opts = |binding: &ServiceBinding| {
        if attach {
            StartOptions::interactive(attached_io(&binding.alias))
        } else {
            StartOptions::default()
        }
    };
    let started = tokio::select! {
        result = start_all(&registry, &ctx, &levels, opts) => result,
        _ = tokio::signal::ctrl_c() => {
            ctx.cancel();
            Err(Error::Cancelled("startup".to_string()))
        }
    };

    let started = match started {
        Ok(started) => started,
        Err(e) => {
            let stopped = runtime.shutdown().await;
            if stopped > 0 {
                out.warning(&format!("Stopped {} process(es) after failed start", stopped));
            }
            return Err(e.into());
        }
    };

    for (name, running) in &started {
        out.status(&format!("  {}: {}", name, running));
    }
    out.success(&format!(
        "{} service(s) running. Press Ctrl-C to stop.",
        registry.running().len()
    ));

    tokio::signal::ctrl_c().await?;

    out.status("Stopping services...");
    let stopped = runtime.shutdown().await;
    out.success(&format!("Stopped {} process(es)", stopped));

    Ok(())
}

fn bindings_for(
    config: &Config,
    names: &[String],
) -> pipeline_services::Result<Vec<ServiceBinding>> {
    names
        .iter()
        .map(|name| {
            let definition = config.service_definition(name)?;
            Ok(ServiceBinding::new(name.clone(), Arc::new(definition)))
        })
        .collect()
}

/// Start each level in turn; bindings within a level start concurrently.
async fn start_all<F>(
    registry: &Services,
    ctx: &Context,
    levels: &[Vec<ServiceBinding>],
    opts: F,
) -> pipeline_services::Result<Vec<(String, RunningService)>>
where
    F: Fn(&ServiceBinding) -> StartOptions,
{
    let mut started = Vec::new();
    for level in levels {
        let level_started = registry.start_bindings_with(ctx, level, &opts).await?;
        started.extend(
            level_started
                .services()
                .map(|(alias, running)| (alias.to_string(), running.clone())),
        );
    }
    Ok(started)
}

/// Forward a service's stdout and stderr to ours, one prefixed line at a time.
fn attached_io(name: &str) -> IoAttachments {
    IoAttachments {
        stdin: None,
        stdout: Some(forward_lines(name.to_string(), false)),
        stderr: Some(forward_lines(name.to_string(), true)),
    }
}

fn forward_lines(name: String, to_stderr: bool) -> OutputForwarder {
    Box::new(move |stream: OutputStream| {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if to_stderr {
                    eprintln!("[{}] {}", name, line);
                } else {
                    println!("[{}] {}", name, line);
                }
            }
        });
    })
}
