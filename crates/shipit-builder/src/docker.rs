//! Docker daemon build backend.

use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::image::{BuildImageOptions, PushImageOptions, TagImageOptions};
use bytes::Bytes;
use futures::StreamExt;
use shipit_core::builder::{BuildOutput, BuildRequest, Builder, BuilderHandle};
use shipit_core::registry::RegistrySession;
use shipit_core::{Error, Result};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::context::create_context;

/// Build backend over the local Docker daemon.
pub struct DockerBuilder {
    docker: Docker,
}

impl DockerBuilder {
    /// Connect to the local Docker daemon.
    pub fn new() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Create with a custom Docker client.
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    fn credentials(session: &RegistrySession) -> DockerCredentials {
        DockerCredentials {
            username: Some(session.username.clone()),
            password: Some(session.token.clone()),
            serveraddress: Some(session.registry.clone()),
            ..Default::default()
        }
    }

    fn handle_build_output(output: bollard::models::BuildInfo) -> Result<Option<String>> {
        if let Some(error) = output.error {
            return Err(Error::BuildFailed(error));
        }
        if let Some(detail) = output.error_detail {
            let message = detail.message.unwrap_or_else(|| "unknown build error".to_string());
            return Err(Error::BuildFailed(message));
        }
        if let Some(stream) = output.stream {
            let line = stream.trim_end();
            if !line.is_empty() {
                info!(target: "shipit::build", "{}", line);
            }
        }
        if let Some(status) = output.status {
            // Pull/cache progress. A cache-from miss surfaces here and is
            // not an error.
            debug!(target: "shipit::build", "{}", status);
        }
        Ok(output.aux.and_then(|aux| aux.id))
    }
}

#[async_trait]
impl Builder for DockerBuilder {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn provision(&self) -> Result<BuilderHandle> {
        self.docker
            .ping()
            .await
            .map_err(|e| Error::Internal(format!("docker daemon unavailable: {}", e)))?;

        let handle = BuilderHandle {
            name: format!("shipit-builder-{}", uuid::Uuid::new_v4()),
        };
        debug!(builder = %handle.name, "Provisioned builder");
        Ok(handle)
    }

    async fn build(
        &self,
        handle: &BuilderHandle,
        request: &BuildRequest,
        session: &RegistrySession,
    ) -> Result<BuildOutput> {
        session.ensure_valid()?;

        let tag = format!("{}:latest", request.image);
        info!(builder = %handle.name, image = %tag, build_file = %request.build_file, "Building image");

        let context = create_context(&request.context_dir, &request.build_file)?;

        let mut build_args: HashMap<String, String> = request.build_args.clone();
        // Embed cache metadata in the pushed image so the next run can read
        // layers back from <image>:buildcache. Inline cache covers the final
        // stage only; intermediate multi-stage layers are not exported.
        build_args.insert("BUILDKIT_INLINE_CACHE".to_string(), "1".to_string());

        let cachefrom = request.cache_from.clone().into_iter().collect::<Vec<_>>();
        if let Some(cache) = &request.cache_from {
            debug!(cache = %cache, "Reading remote build cache (best effort)");
        }

        let options = BuildImageOptions::<String> {
            dockerfile: request.build_file.clone(),
            t: tag.clone(),
            buildargs: build_args,
            cachefrom,
            platform: request.platform.clone(),
            pull: true,
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        // Registry credentials let the daemon pull base images and cache
        // layers from the authenticated registry.
        let mut registry_credentials = HashMap::new();
        registry_credentials.insert(session.registry.clone(), Self::credentials(session));

        let body = Bytes::from(context);
        let mut stream = self
            .docker
            .build_image(options, Some(registry_credentials), Some(body));

        let mut image_id = None;
        while let Some(message) = stream.next().await {
            match message {
                Ok(output) => {
                    if let Some(id) = Self::handle_build_output(output)? {
                        image_id = Some(id);
                    }
                }
                Err(e) => return Err(Error::BuildFailed(e.to_string())),
            }
        }

        info!(image = %tag, "Build succeeded");
        Ok(BuildOutput { image_id })
    }

    async fn tag(
        &self,
        _handle: &BuilderHandle,
        image: &str,
        source_tag: &str,
        target_tag: &str,
    ) -> Result<()> {
        let source = format!("{}:{}", image, source_tag);
        let options = TagImageOptions::<String> {
            repo: image.to_string(),
            tag: target_tag.to_string(),
        };
        self.docker
            .tag_image(&source, Some(options))
            .await
            .map_err(|e| Error::Internal(format!("failed to tag {}: {}", source, e)))?;
        debug!(image = %image, tag = %target_tag, "Tagged image");
        Ok(())
    }

    async fn push(
        &self,
        handle: &BuilderHandle,
        image: &str,
        tag: &str,
        session: &RegistrySession,
    ) -> Result<()> {
        session.ensure_valid()?;

        info!(builder = %handle.name, image = %image, tag = %tag, "Pushing image");

        let options = PushImageOptions::<String> {
            tag: tag.to_string(),
        };
        let mut stream =
            self.docker
                .push_image(image, Some(options), Some(Self::credentials(session)));

        let mut push_error = None;
        while let Some(message) = stream.next().await {
            match message {
                Ok(info) => {
                    if let Some(error) = info.error {
                        push_error = Some(error);
                    } else if let Some(status) = info.status {
                        debug!(target: "shipit::push", "{}", status);
                    }
                }
                Err(e) => return Err(Error::PushFailed(e.to_string())),
            }
        }

        if let Some(error) = push_error {
            return Err(Error::PushFailed(error));
        }

        info!(image = %image, tag = %tag, "Push succeeded");
        Ok(())
    }

    async fn teardown(&self, handle: &BuilderHandle) -> Result<()> {
        // The daemon owns the build session; nothing to reclaim beyond the
        // handle itself.
        debug!(builder = %handle.name, "Tore down builder");
        Ok(())
    }
}
