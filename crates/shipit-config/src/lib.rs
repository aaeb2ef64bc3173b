//! KDL configuration parsing for shipit.
//!
//! This crate handles parsing of:
//! - Pipeline definitions (shipit.kdl): triggers, registry, components
//! - Variable interpolation in configuration values

pub mod error;
pub mod pipeline;
pub mod variables;

pub use error::{ConfigError, ConfigResult};
pub use pipeline::{CredentialSource, PipelineConfig, RegistryConfig, parse_pipeline};
pub use variables::VariableContext;
