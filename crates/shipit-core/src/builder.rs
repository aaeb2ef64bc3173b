//! Builder trait and build request types.
//!
//! Builders run image builds in isolated builder instances (a Docker daemon
//! build session in the default backend). The orchestrator provisions one
//! instance per job and tears it down when the job ends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::registry::RegistrySession;
use crate::{Result, RunId};

/// Target platform for all builds.
pub const PLATFORM: &str = "linux/amd64";

/// Parameters for one image build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequest {
    /// The run this build belongs to.
    pub run_id: RunId,
    /// Path to the build file, relative to `context_dir`.
    pub build_file: String,
    /// Build context: the repository root.
    pub context_dir: PathBuf,
    /// Image reference to tag the result with (no tag).
    pub image: String,
    /// Remote cache reference to read prior layers from, if any.
    /// A miss or read failure only affects build speed.
    pub cache_from: Option<String>,
    /// Extra build arguments.
    pub build_args: HashMap<String, String>,
    /// Target platform (`linux/amd64`).
    pub platform: String,
}

/// Outcome of a successful build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOutput {
    /// Local image id reported by the daemon, if any.
    pub image_id: Option<String>,
}

/// Handle to a provisioned builder instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderHandle {
    /// Backend-specific instance name.
    pub name: String,
}

/// Trait for image build backends.
#[async_trait]
pub trait Builder: Send + Sync {
    /// Name of this backend.
    fn name(&self) -> &'static str;

    /// Provision an isolated builder instance for the duration of a job.
    async fn provision(&self) -> Result<BuilderHandle>;

    /// Build an image. The result is tagged `<image>:latest` locally.
    async fn build(
        &self,
        handle: &BuilderHandle,
        request: &BuildRequest,
        session: &RegistrySession,
    ) -> Result<BuildOutput>;

    /// Apply an additional local tag to a built image.
    async fn tag(
        &self,
        handle: &BuilderHandle,
        image: &str,
        source_tag: &str,
        target_tag: &str,
    ) -> Result<()>;

    /// Push `<image>:<tag>` to the registry.
    async fn push(
        &self,
        handle: &BuilderHandle,
        image: &str,
        tag: &str,
        session: &RegistrySession,
    ) -> Result<()>;

    /// Tear down the builder instance.
    async fn teardown(&self, handle: &BuilderHandle) -> Result<()>;
}
