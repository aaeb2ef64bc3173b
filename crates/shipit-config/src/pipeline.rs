//! Pipeline configuration parsing.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use shipit_core::registry::{Credential, DEFAULT_TTL_SECONDS};
use shipit_core::{ComponentDescriptor, Error, ReleaseAction, Trigger};

/// A parsed pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name (e.g., "my-app-release").
    pub name: String,
    /// Events that can start a run.
    pub triggers: Vec<Trigger>,
    /// Registry connection settings.
    pub registry: RegistryConfig,
    /// Components to build, in declaration order.
    pub components: Vec<ComponentDescriptor>,
}

/// Registry connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry host and namespace (e.g., "rg.example.com/my-app").
    pub host: String,
    /// Where the credential token comes from.
    pub credential: CredentialSource,
    /// Credential lifetime.
    pub ttl_seconds: u64,
    /// Also tag pushed images with the run's version alongside `:latest`.
    pub version_tags: bool,
}

/// Source of the registry credential token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialSource {
    /// Read the token from an environment variable at run time.
    Env { var: String, username: String },
}

impl CredentialSource {
    /// Resolve the credential. Fails if the secret is absent.
    pub fn resolve(&self) -> shipit_core::Result<Credential> {
        match self {
            CredentialSource::Env { var, username } => {
                let token = std::env::var(var)
                    .map_err(|_| Error::Credential(format!("secret '{}' is not set", var)))?;
                if token.is_empty() {
                    return Err(Error::Credential(format!("secret '{}' is empty", var)));
                }
                Ok(Credential::new(username.clone(), token))
            }
        }
    }
}

/// Parse a pipeline configuration from KDL text.
pub fn parse_pipeline(kdl: &str) -> ConfigResult<PipelineConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut name = String::new();
    let mut triggers = Vec::new();
    let mut registry: Option<RegistryConfig> = None;
    let mut components: Vec<ComponentDescriptor> = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "pipeline" => {
                name = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("pipeline name".to_string()))?;
            }
            "on" => {
                triggers.push(parse_trigger(node)?);
            }
            "registry" => {
                if registry.is_some() {
                    return Err(ConfigError::Duplicate("registry".to_string()));
                }
                registry = Some(parse_registry(node)?);
            }
            "component" => {
                components.push(parse_component(node)?);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    if name.is_empty() {
        return Err(ConfigError::MissingField("pipeline name".to_string()));
    }
    if triggers.is_empty() {
        return Err(ConfigError::MissingField("on (trigger)".to_string()));
    }
    let registry =
        registry.ok_or_else(|| ConfigError::MissingField("registry block".to_string()))?;
    if components.is_empty() {
        return Err(ConfigError::MissingField("component".to_string()));
    }

    // Component names must be unique; each owns a disjoint image namespace.
    for (i, component) in components.iter().enumerate() {
        if components[..i].iter().any(|c| c.name == component.name) {
            return Err(ConfigError::Duplicate(format!(
                "component '{}'",
                component.name
            )));
        }
    }

    Ok(PipelineConfig {
        name,
        triggers,
        registry,
        components,
    })
}

fn parse_trigger(node: &KdlNode) -> ConfigResult<Trigger> {
    let trigger_type = get_first_string_arg(node).unwrap_or_default();

    match trigger_type.as_str() {
        "release" => {
            let actions: Vec<ReleaseAction> = get_string_list_prop(node, "action")
                .iter()
                .map(|s| ReleaseAction::from(s.as_str()))
                .collect();
            if actions.is_empty() {
                return Err(ConfigError::MissingField(
                    "release trigger action".to_string(),
                ));
            }
            Ok(Trigger::Release { actions })
        }
        "dispatch" => Ok(Trigger::Dispatch),
        _ => Err(ConfigError::InvalidValue {
            field: "trigger type".to_string(),
            message: format!("unknown trigger type: {}", trigger_type),
        }),
    }
}

fn parse_registry(node: &KdlNode) -> ConfigResult<RegistryConfig> {
    let mut host = String::new();
    let mut credential: Option<CredentialSource> = None;
    let mut ttl_seconds = DEFAULT_TTL_SECONDS;
    let mut version_tags = false;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "host" => {
                    host = get_first_string_arg(child).unwrap_or_default();
                }
                "credential" => {
                    let var = get_string_prop(child, "env").ok_or_else(|| {
                        ConfigError::MissingField("credential env".to_string())
                    })?;
                    let username =
                        get_string_prop(child, "username").unwrap_or_else(|| "nologin".to_string());
                    credential = Some(CredentialSource::Env { var, username });
                }
                "ttl-seconds" => {
                    ttl_seconds = get_first_int_arg(child).ok_or_else(|| {
                        ConfigError::InvalidValue {
                            field: "ttl-seconds".to_string(),
                            message: "expected an integer argument".to_string(),
                        }
                    })? as u64;
                }
                "version-tags" => {
                    version_tags = get_first_bool_arg(child).unwrap_or(false);
                }
                _ => {}
            }
        }
    }

    if host.is_empty() {
        return Err(ConfigError::MissingField("registry host".to_string()));
    }
    let credential =
        credential.ok_or_else(|| ConfigError::MissingField("registry credential".to_string()))?;

    Ok(RegistryConfig {
        host,
        credential,
        ttl_seconds,
        version_tags,
    })
}

fn parse_component(node: &KdlNode) -> ConfigResult<ComponentDescriptor> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("component name".to_string()))?;

    let mut build_file = String::new();
    let mut image = String::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "build-file" => {
                    build_file = get_first_string_arg(child).unwrap_or_default();
                }
                "image" => {
                    image = get_first_string_arg(child).unwrap_or_default();
                }
                _ => {}
            }
        }
    }

    if build_file.is_empty() {
        return Err(ConfigError::MissingField(format!(
            "build-file for component '{}'",
            name
        )));
    }
    if image.is_empty() {
        return Err(ConfigError::MissingField(format!(
            "image for component '{}'",
            name
        )));
    }

    Ok(ComponentDescriptor::new(name, build_file, image))
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_int_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

fn get_first_bool_arg(node: &KdlNode) -> Option<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_string_list_prop(node: &KdlNode, name: &str) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_some_and(|n| n.value() == name))
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}
