//! CLI command implementations.

pub mod run;

use anyhow::Result;

pub fn validate(path: &str) -> Result<()> {
    let content = std::fs::read_to_string(path)?;
    match shipit_config::parse_pipeline(&content) {
        Ok(pipeline) => {
            println!("Configuration is valid");
            println!("  pipeline: {}", pipeline.name);
            println!("  registry: {}", pipeline.registry.host);
            for component in &pipeline.components {
                println!("  component: {} ({})", component.name, component.build_file);
            }
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}
