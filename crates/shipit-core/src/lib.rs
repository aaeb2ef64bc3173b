//! Core domain types and traits for the shipit release builder.
//!
//! This crate contains:
//! - Trigger events and the trigger evaluator
//! - Component descriptors (what to build, from which file, to which image)
//! - Run context (event + commit identity for one pipeline run)
//! - Registry credentials, sessions and the `RegistryClient` trait
//! - The `Builder` trait for image build backends

pub mod builder;
pub mod component;
pub mod error;
pub mod registry;
pub mod run;
pub mod trigger;

pub use component::ComponentDescriptor;
pub use error::{Error, Result};
pub use run::{RunContext, RunId};
pub use trigger::{ReleaseAction, Trigger, TriggerEvent};
