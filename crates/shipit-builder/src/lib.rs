//! Docker image build backend for shipit.
//!
//! Implements the `Builder` trait over the local Docker daemon: build-context
//! tarball creation, single-platform image builds with remote cache reads,
//! tagging and pushes.

pub mod context;
pub mod docker;

pub use docker::DockerBuilder;
