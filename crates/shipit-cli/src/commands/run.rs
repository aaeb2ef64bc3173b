//! Run execution command.

use anyhow::{Context, Result};
use shipit_builder::DockerBuilder;
use shipit_config::parse_pipeline;
use shipit_core::TriggerEvent;
use shipit_orchestrator::{JobState, Orchestrator, RunEvent};
use shipit_registry::HttpRegistryClient;
use std::sync::Arc;

/// Execute a run against the local Docker daemon.
pub async fn run(config_path: &str, event: TriggerEvent, repo: &str) -> Result<()> {
    let content = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path))?;

    let pipeline = parse_pipeline(&content)
        .with_context(|| format!("Failed to parse pipeline config: {}", config_path))?;

    println!("Pipeline: {}", pipeline.name);
    println!("Event: {}", event.label());
    println!("Components: {}", pipeline.components.len());

    let repo = std::path::Path::new(repo)
        .canonicalize()
        .context("Failed to resolve repository path")?;
    println!("Repository: {}", repo.display());

    let registry = Arc::new(HttpRegistryClient::new(
        &pipeline.registry.host,
        pipeline.registry.ttl_seconds,
    ));
    let builder = Arc::new(DockerBuilder::new().context("Failed to connect to Docker")?);

    let orchestrator = Orchestrator::new(registry, builder);

    println!("\n--- Starting run ---\n");

    let (mut rx, result_handle) = orchestrator.execute(pipeline, event, repo);

    // Process events concurrently with execution
    while let Some(event) = rx.recv().await {
        match event {
            RunEvent::RunSkipped { event } => {
                println!("⊘ Event '{}' matches no trigger; nothing to do", event);
            }
            RunEvent::SetupStarted => {
                println!("▶ Setup started");
            }
            RunEvent::SetupCompleted { version } => {
                println!("✓ Setup completed (version {})\n", version);
            }
            RunEvent::JobStarted { component } => {
                println!("▶ Job '{}' started", component);
            }
            RunEvent::ImagePushed { component, image } => {
                println!("  [{}] pushed {}", component, image);
            }
            RunEvent::DigestResolved { component, digest } => {
                println!("  [{}] digest {}", component, digest);
            }
            RunEvent::JobCompleted { component, success } => {
                if success {
                    println!("✓ Job '{}' completed successfully", component);
                } else {
                    println!("✗ Job '{}' failed", component);
                }
            }
            RunEvent::RunCompleted { success } => {
                if success {
                    println!("\n--- Run completed successfully ---");
                } else {
                    println!("\n--- Run failed ---");
                }
            }
        }
    }

    let result = result_handle.await.context("Run task failed")?;

    if !result.started {
        return Ok(());
    }

    println!("\n--- Job Summary ---");
    for outcome in &result.components {
        let status = match &outcome.state {
            JobState::Succeeded => match &outcome.digest {
                Some(digest) => format!("✓ succeeded ({})", digest),
                None => "✓ succeeded".to_string(),
            },
            JobState::Failed { message } => format!("✗ failed: {}", message),
        };
        println!("  {} - {}", outcome.component, status);
    }

    if result.success {
        println!("\n✓ Run succeeded!");
        Ok(())
    } else {
        anyhow::bail!("Run failed");
    }
}
