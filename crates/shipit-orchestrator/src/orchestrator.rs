//! Run orchestration: setup stage, then one build-and-push job per component.
//!
//! The build jobs are one parameterized routine invoked per component
//! descriptor. Jobs depend only on setup's completion; they run concurrently
//! and a failure in one never aborts, retries, or rolls back another (each
//! job owns a disjoint image namespace in the registry).

use shipit_config::{PipelineConfig, RegistryConfig, VariableContext};
use shipit_core::builder::{BuildRequest, Builder, BuilderHandle, PLATFORM};
use shipit_core::component::{CACHE_TAG, PUBLISH_TAG};
use shipit_core::registry::RegistryClient;
use shipit_core::trigger::{self, TriggerEvent};
use shipit_core::{ComponentDescriptor, Result, RunContext};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::checkout::SourceTree;

/// Final state of one component job.
#[derive(Debug, Clone)]
pub enum JobState {
    Succeeded,
    Failed { message: String },
}

impl JobState {
    pub fn is_success(&self) -> bool {
        matches!(self, JobState::Succeeded)
    }
}

/// Result of one component job.
#[derive(Debug, Clone)]
pub struct ComponentOutcome {
    pub component: String,
    pub state: JobState,
    /// Digest of the pushed `:latest` tag, when the lookup succeeded.
    pub digest: Option<String>,
}

/// Event emitted during run execution.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// The event did not match any configured trigger; zero jobs started.
    RunSkipped { event: String },
    SetupStarted,
    SetupCompleted { version: String },
    JobStarted { component: String },
    ImagePushed { component: String, image: String },
    DigestResolved { component: String, digest: String },
    JobCompleted { component: String, success: bool },
    RunCompleted { success: bool },
}

/// Result of a run.
#[derive(Debug)]
pub struct RunResult {
    /// Whether the trigger matched and jobs were started.
    pub started: bool,
    pub success: bool,
    /// Version computed by the setup stage, when setup ran.
    pub version: Option<String>,
    pub components: Vec<ComponentOutcome>,
}

/// Orchestrates the execution of a pipeline run.
pub struct Orchestrator {
    registry: Arc<dyn RegistryClient>,
    builder: Arc<dyn Builder>,
}

impl Orchestrator {
    pub fn new(registry: Arc<dyn RegistryClient>, builder: Arc<dyn Builder>) -> Self {
        Self { registry, builder }
    }

    /// Execute a run, returning a channel of events and a handle for the
    /// final result.
    pub fn execute(
        &self,
        config: PipelineConfig,
        event: TriggerEvent,
        repo: PathBuf,
    ) -> (
        mpsc::Receiver<RunEvent>,
        tokio::task::JoinHandle<RunResult>,
    ) {
        let (tx, rx) = mpsc::channel(100);
        let registry = self.registry.clone();
        let builder = self.builder.clone();

        let handle = tokio::spawn(async move {
            Self::execute_inner(registry, builder, config, event, repo, tx).await
        });

        (rx, handle)
    }

    async fn execute_inner(
        registry: Arc<dyn RegistryClient>,
        builder: Arc<dyn Builder>,
        config: PipelineConfig,
        event: TriggerEvent,
        repo: PathBuf,
        tx: mpsc::Sender<RunEvent>,
    ) -> RunResult {
        // Trigger evaluation: anything outside the configured events starts
        // zero jobs.
        if !trigger::evaluate(&event, &config.triggers) {
            info!(event = %event.label(), "Event does not match any trigger; not starting a run");
            let _ = tx
                .send(RunEvent::RunSkipped {
                    event: event.label(),
                })
                .await;
            return RunResult {
                started: false,
                success: true,
                version: None,
                components: Vec::new(),
            };
        }

        // Setup stage: source tree and version. Fatal for the whole run.
        let _ = tx.send(RunEvent::SetupStarted).await;
        let tree = match SourceTree::resolve(&repo) {
            Ok(tree) => tree,
            Err(e) => {
                error!(error = %e, "Setup failed; no build job will run");
                let _ = tx.send(RunEvent::RunCompleted { success: false }).await;
                return RunResult {
                    started: true,
                    success: false,
                    version: None,
                    components: Vec::new(),
                };
            }
        };

        let ctx = RunContext::new(event, tree.sha.clone());
        info!(run = %ctx.id, version = %ctx.version, "Setup completed");
        let _ = tx
            .send(RunEvent::SetupCompleted {
                version: ctx.version.clone(),
            })
            .await;

        // Resolve component descriptors against the run's variables.
        let vars = VariableContext::from_run(&ctx);
        let mut components = Vec::with_capacity(config.components.len());
        for component in &config.components {
            let resolved = ComponentDescriptor::new(
                component.name.clone(),
                component.build_file.clone(),
                vars.interpolate(&component.image),
            );
            if let Err(e) = resolved.validate() {
                error!(component = %resolved.name, error = %e, "Invalid component descriptor");
                let _ = tx.send(RunEvent::RunCompleted { success: false }).await;
                return RunResult {
                    started: true,
                    success: false,
                    version: Some(ctx.version.clone()),
                    components: Vec::new(),
                };
            }
            components.push(resolved);
        }

        // Component jobs: independent, concurrent, no ordering between them.
        let mut set = JoinSet::new();
        for component in &components {
            set.spawn(run_component_job(
                registry.clone(),
                builder.clone(),
                config.registry.clone(),
                component.clone(),
                ctx.clone(),
                tree.root.clone(),
                tx.clone(),
            ));
        }

        let mut outcomes = Vec::with_capacity(components.len());
        let mut join_failure = false;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(error = %e, "Component job task failed");
                    join_failure = true;
                }
            }
        }

        // Report in declaration order; JoinSet completion order is arbitrary.
        outcomes.sort_by_key(|o| {
            components
                .iter()
                .position(|c| c.name == o.component)
                .unwrap_or(usize::MAX)
        });

        let success = !join_failure && outcomes.iter().all(|o| o.state.is_success());
        let _ = tx.send(RunEvent::RunCompleted { success }).await;

        RunResult {
            started: true,
            success,
            version: Some(ctx.version),
            components: outcomes,
        }
    }
}

/// The build-and-push job, parameterized by a component descriptor.
async fn run_component_job(
    registry: Arc<dyn RegistryClient>,
    builder: Arc<dyn Builder>,
    registry_config: RegistryConfig,
    component: ComponentDescriptor,
    ctx: RunContext,
    root: PathBuf,
    tx: mpsc::Sender<RunEvent>,
) -> ComponentOutcome {
    let name = component.name.clone();
    let _ = tx
        .send(RunEvent::JobStarted {
            component: name.clone(),
        })
        .await;

    let result = component_job_inner(
        registry.as_ref(),
        builder.as_ref(),
        &registry_config,
        &component,
        &ctx,
        root,
        &tx,
    )
    .await;

    let outcome = match result {
        Ok(digest) => {
            info!(component = %name, "Job completed successfully");
            ComponentOutcome {
                component: name.clone(),
                state: JobState::Succeeded,
                digest,
            }
        }
        Err(e) => {
            error!(component = %name, error = %e, "Job failed");
            ComponentOutcome {
                component: name.clone(),
                state: JobState::Failed {
                    message: e.to_string(),
                },
                digest: None,
            }
        }
    };

    let _ = tx
        .send(RunEvent::JobCompleted {
            component: name,
            success: outcome.state.is_success(),
        })
        .await;

    outcome
}

/// Steps 2-7 of the job. Returns the published digest when the final lookup
/// succeeded; cache and digest failures are downgraded to warnings here.
async fn component_job_inner(
    registry: &dyn RegistryClient,
    builder: &dyn Builder,
    registry_config: &RegistryConfig,
    component: &ComponentDescriptor,
    ctx: &RunContext,
    root: PathBuf,
    tx: &mpsc::Sender<RunEvent>,
) -> Result<Option<String>> {
    // Acquire a scoped credential for this job; never shared across jobs.
    let credential = registry_config.credential.resolve()?;
    let session = registry.authenticate(&credential).await?;

    let handle = builder.provision().await?;

    let request = BuildRequest {
        run_id: ctx.id,
        build_file: component.build_file.clone(),
        context_dir: root,
        image: component.image.clone(),
        cache_from: Some(component.cache_ref()),
        build_args: HashMap::new(),
        platform: PLATFORM.to_string(),
    };

    let published = run_build_and_push(
        registry,
        builder,
        registry_config,
        component,
        ctx,
        &handle,
        &request,
        &session,
        tx,
    )
    .await;

    if let Err(e) = builder.teardown(&handle).await {
        warn!(component = %component.name, error = %e, "Builder teardown failed");
    }

    published
}

#[allow(clippy::too_many_arguments)]
async fn run_build_and_push(
    registry: &dyn RegistryClient,
    builder: &dyn Builder,
    registry_config: &RegistryConfig,
    component: &ComponentDescriptor,
    ctx: &RunContext,
    handle: &BuilderHandle,
    request: &BuildRequest,
    session: &shipit_core::registry::RegistrySession,
    tx: &mpsc::Sender<RunEvent>,
) -> Result<Option<String>> {
    // Build; a cache-read miss inside the backend only affects speed.
    builder.build(handle, request, session).await?;

    // Push the published tag. Failure leaves the registry's previous tag
    // untouched; tag-update atomicity is the registry's.
    builder
        .push(handle, &component.image, PUBLISH_TAG, session)
        .await?;
    let _ = tx
        .send(RunEvent::ImagePushed {
            component: component.name.clone(),
            image: component.publish_ref(),
        })
        .await;

    if registry_config.version_tags {
        builder
            .tag(handle, &component.image, PUBLISH_TAG, &ctx.version)
            .await?;
        builder
            .push(handle, &component.image, &ctx.version, session)
            .await?;
        let _ = tx
            .send(RunEvent::ImagePushed {
                component: component.name.clone(),
                image: format!("{}:{}", component.image, ctx.version),
            })
            .await;
    }

    // Refresh the remote cache layers. Best effort: a write failure degrades
    // the next build's speed, not this run's correctness.
    let cache_result = match builder
        .tag(handle, &component.image, PUBLISH_TAG, CACHE_TAG)
        .await
    {
        Ok(()) => {
            builder
                .push(handle, &component.image, CACHE_TAG, session)
                .await
        }
        Err(e) => Err(e),
    };
    if let Err(e) = cache_result {
        warn!(component = %component.name, cache = %component.cache_ref(), error = %e, "Cache write failed");
    }

    // Read back the digest for the log. The push already succeeded; a lookup
    // failure must not fail the job retroactively.
    match registry
        .digest(session, &component.image, PUBLISH_TAG)
        .await
    {
        Ok(digest) => {
            info!(component = %component.name, image = %component.publish_ref(), digest = %digest, "Published image digest");
            let _ = tx
                .send(RunEvent::DigestResolved {
                    component: component.name.clone(),
                    digest: digest.clone(),
                })
                .await;
            Ok(Some(digest))
        }
        Err(e) => {
            warn!(component = %component.name, error = %e, "Digest lookup failed after successful push");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shipit_config::CredentialSource;
    use shipit_core::registry::{Credential, RegistrySession};
    use shipit_core::trigger::{ReleaseAction, Trigger};
    use shipit_core::{Error, builder::BuildOutput};
    use std::sync::Mutex;

    struct MockRegistry {
        fail_digest: bool,
    }

    #[async_trait]
    impl RegistryClient for MockRegistry {
        async fn authenticate(&self, credential: &Credential) -> Result<RegistrySession> {
            if credential.token.is_empty() {
                return Err(Error::Credential("empty token".to_string()));
            }
            Ok(RegistrySession::new("rg.test", credential, 600))
        }

        async fn digest(
            &self,
            session: &RegistrySession,
            image: &str,
            _tag: &str,
        ) -> Result<String> {
            session.ensure_valid()?;
            if self.fail_digest {
                return Err(Error::Registry("manifest endpoint unavailable".to_string()));
            }
            Ok(format!("sha256:{:016x}", image.len() as u64 * 7919))
        }
    }

    #[derive(Default)]
    struct MockBuilder {
        fail_build_for: Option<String>,
        fail_cache_push: bool,
        pushes: Mutex<Vec<(String, String)>>,
    }

    impl MockBuilder {
        fn pushed(&self) -> Vec<(String, String)> {
            self.pushes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Builder for MockBuilder {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn provision(&self) -> Result<BuilderHandle> {
            Ok(BuilderHandle {
                name: "mock-builder".to_string(),
            })
        }

        async fn build(
            &self,
            _handle: &BuilderHandle,
            request: &BuildRequest,
            session: &RegistrySession,
        ) -> Result<BuildOutput> {
            session.ensure_valid()?;
            if let Some(fail) = &self.fail_build_for {
                if request.build_file.contains(fail) {
                    return Err(Error::BuildFailed(format!(
                        "step failed in {}",
                        request.build_file
                    )));
                }
            }
            Ok(BuildOutput {
                image_id: Some("sha256:local".to_string()),
            })
        }

        async fn tag(
            &self,
            _handle: &BuilderHandle,
            _image: &str,
            _source_tag: &str,
            _target_tag: &str,
        ) -> Result<()> {
            Ok(())
        }

        async fn push(
            &self,
            _handle: &BuilderHandle,
            image: &str,
            tag: &str,
            session: &RegistrySession,
        ) -> Result<()> {
            session.ensure_valid()?;
            if self.fail_cache_push && tag == CACHE_TAG {
                return Err(Error::PushFailed("cache upload interrupted".to_string()));
            }
            self.pushes
                .lock()
                .unwrap()
                .push((image.to_string(), tag.to_string()));
            Ok(())
        }

        async fn teardown(&self, _handle: &BuilderHandle) -> Result<()> {
            Ok(())
        }
    }

    fn make_config(secret_var: &str, version_tags: bool) -> PipelineConfig {
        PipelineConfig {
            name: "test-release".to_string(),
            triggers: vec![
                Trigger::Release {
                    actions: vec![ReleaseAction::Prereleased, ReleaseAction::Released],
                },
                Trigger::Dispatch,
            ],
            registry: RegistryConfig {
                host: "rg.test/app".to_string(),
                credential: CredentialSource::Env {
                    var: secret_var.to_string(),
                    username: "nologin".to_string(),
                },
                ttl_seconds: 600,
                version_tags,
            },
            components: vec![
                ComponentDescriptor::new("api", "Dockerfile.api", "rg.test/app/api"),
                ComponentDescriptor::new("queue", "Dockerfile.queue", "rg.test/app/queue"),
                ComponentDescriptor::new("ui", "Dockerfile.ui", "rg.test/app/ui"),
            ],
        }
    }

    fn set_secret(var: &str) {
        // SAFETY: test-local variable name, unique per test.
        unsafe { std::env::set_var(var, "token-abc") };
    }

    fn released() -> TriggerEvent {
        TriggerEvent::Release {
            action: ReleaseAction::Released,
        }
    }

    async fn run(
        registry: Arc<dyn RegistryClient>,
        builder: Arc<dyn Builder>,
        config: PipelineConfig,
        event: TriggerEvent,
        repo: PathBuf,
    ) -> (RunResult, Vec<RunEvent>) {
        let orchestrator = Orchestrator::new(registry, builder);
        let (mut rx, handle) = orchestrator.execute(config, event, repo);
        let result = handle.await.unwrap();
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (result, events)
    }

    #[tokio::test]
    async fn test_non_matching_event_starts_zero_jobs() {
        let repo = crate::checkout::tests::init_repo();
        set_secret("SHIPIT_TEST_SECRET_SKIP");
        let builder = Arc::new(MockBuilder::default());

        let (result, events) = run(
            Arc::new(MockRegistry { fail_digest: false }),
            builder.clone(),
            make_config("SHIPIT_TEST_SECRET_SKIP", false),
            TriggerEvent::Release {
                action: ReleaseAction::Other("created".to_string()),
            },
            repo.path().to_path_buf(),
        )
        .await;

        assert!(!result.started);
        assert!(result.components.is_empty());
        assert!(builder.pushed().is_empty());
        assert!(matches!(events[0], RunEvent::RunSkipped { .. }));
    }

    #[tokio::test]
    async fn test_release_run_publishes_latest_per_component() {
        let repo = crate::checkout::tests::init_repo();
        set_secret("SHIPIT_TEST_SECRET_OK");
        let builder = Arc::new(MockBuilder::default());

        let (result, events) = run(
            Arc::new(MockRegistry { fail_digest: false }),
            builder.clone(),
            make_config("SHIPIT_TEST_SECRET_OK", false),
            released(),
            repo.path().to_path_buf(),
        )
        .await;

        assert!(result.started);
        assert!(result.success);
        assert_eq!(result.components.len(), 3);
        assert!(result.components.iter().all(|o| o.state.is_success()));
        assert!(result.components.iter().all(|o| o.digest.is_some()));

        let pushes = builder.pushed();
        for image in ["rg.test/app/api", "rg.test/app/queue", "rg.test/app/ui"] {
            assert!(pushes.contains(&(image.to_string(), "latest".to_string())));
            assert!(pushes.contains(&(image.to_string(), "buildcache".to_string())));
        }

        let digest_lines = events
            .iter()
            .filter(|e| matches!(e, RunEvent::DigestResolved { .. }))
            .count();
        assert_eq!(digest_lines, 3);
    }

    #[tokio::test]
    async fn test_setup_computes_seven_char_version() {
        let repo = crate::checkout::tests::init_repo();
        set_secret("SHIPIT_TEST_SECRET_VERSION");
        let builder = Arc::new(MockBuilder::default());

        let (result, _) = run(
            Arc::new(MockRegistry { fail_digest: false }),
            builder,
            make_config("SHIPIT_TEST_SECRET_VERSION", false),
            TriggerEvent::Dispatch,
            repo.path().to_path_buf(),
        )
        .await;

        let version = result.version.unwrap();
        assert_eq!(version.len(), 7);
        assert!(version.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_queue_failure_leaves_api_and_ui_unaffected() {
        let repo = crate::checkout::tests::init_repo();
        set_secret("SHIPIT_TEST_SECRET_INDEP");
        let builder = Arc::new(MockBuilder {
            fail_build_for: Some("queue".to_string()),
            ..Default::default()
        });

        let (result, _) = run(
            Arc::new(MockRegistry { fail_digest: false }),
            builder.clone(),
            make_config("SHIPIT_TEST_SECRET_INDEP", false),
            released(),
            repo.path().to_path_buf(),
        )
        .await;

        assert!(!result.success);
        let by_name: std::collections::HashMap<&str, &ComponentOutcome> = result
            .components
            .iter()
            .map(|o| (o.component.as_str(), o))
            .collect();
        assert!(by_name["api"].state.is_success());
        assert!(by_name["ui"].state.is_success());
        assert!(matches!(by_name["queue"].state, JobState::Failed { .. }));

        let pushes = builder.pushed();
        assert!(pushes.contains(&("rg.test/app/api".to_string(), "latest".to_string())));
        assert!(pushes.contains(&("rg.test/app/ui".to_string(), "latest".to_string())));
        assert!(!pushes.contains(&("rg.test/app/queue".to_string(), "latest".to_string())));
    }

    #[tokio::test]
    async fn test_missing_secret_fails_jobs_not_setup() {
        let repo = crate::checkout::tests::init_repo();
        let builder = Arc::new(MockBuilder::default());

        let (result, _) = run(
            Arc::new(MockRegistry { fail_digest: false }),
            builder.clone(),
            make_config("SHIPIT_TEST_SECRET_NEVER_SET", false),
            released(),
            repo.path().to_path_buf(),
        )
        .await;

        assert!(result.started);
        assert!(!result.success);
        assert!(result.version.is_some());
        assert_eq!(result.components.len(), 3);
        assert!(
            result
                .components
                .iter()
                .all(|o| matches!(o.state, JobState::Failed { .. }))
        );
        assert!(builder.pushed().is_empty());
    }

    #[tokio::test]
    async fn test_digest_lookup_failure_does_not_fail_job() {
        let repo = crate::checkout::tests::init_repo();
        set_secret("SHIPIT_TEST_SECRET_DIGEST");
        let builder = Arc::new(MockBuilder::default());

        let (result, _) = run(
            Arc::new(MockRegistry { fail_digest: true }),
            builder,
            make_config("SHIPIT_TEST_SECRET_DIGEST", false),
            released(),
            repo.path().to_path_buf(),
        )
        .await;

        assert!(result.success);
        assert!(result.components.iter().all(|o| o.state.is_success()));
        assert!(result.components.iter().all(|o| o.digest.is_none()));
    }

    #[tokio::test]
    async fn test_cache_push_failure_is_non_fatal() {
        let repo = crate::checkout::tests::init_repo();
        set_secret("SHIPIT_TEST_SECRET_CACHE");
        let builder = Arc::new(MockBuilder {
            fail_cache_push: true,
            ..Default::default()
        });

        let (result, _) = run(
            Arc::new(MockRegistry { fail_digest: false }),
            builder.clone(),
            make_config("SHIPIT_TEST_SECRET_CACHE", false),
            released(),
            repo.path().to_path_buf(),
        )
        .await;

        assert!(result.success);
        let pushes = builder.pushed();
        assert!(pushes.contains(&("rg.test/app/api".to_string(), "latest".to_string())));
        assert!(!pushes.iter().any(|(_, tag)| tag == "buildcache"));
    }

    #[tokio::test]
    async fn test_version_tags_push_version_alongside_latest() {
        let repo = crate::checkout::tests::init_repo();
        set_secret("SHIPIT_TEST_SECRET_VTAGS");
        let builder = Arc::new(MockBuilder::default());

        let (result, _) = run(
            Arc::new(MockRegistry { fail_digest: false }),
            builder.clone(),
            make_config("SHIPIT_TEST_SECRET_VTAGS", true),
            released(),
            repo.path().to_path_buf(),
        )
        .await;

        assert!(result.success);
        let version = result.version.unwrap();
        let pushes = builder.pushed();
        assert!(pushes.contains(&("rg.test/app/api".to_string(), "latest".to_string())));
        assert!(pushes.contains(&("rg.test/app/api".to_string(), version.clone())));
    }

    #[tokio::test]
    async fn test_image_env_interpolation() {
        let repo = crate::checkout::tests::init_repo();
        set_secret("SHIPIT_TEST_SECRET_INTERP");
        // SAFETY: test-local variable name, unique to this test.
        unsafe { std::env::set_var("SHIPIT_TEST_API_IMAGE", "rg.test/app/api") };

        let mut config = make_config("SHIPIT_TEST_SECRET_INTERP", false);
        config.components = vec![ComponentDescriptor::new(
            "api",
            "Dockerfile.api",
            "${env.SHIPIT_TEST_API_IMAGE}",
        )];

        let builder = Arc::new(MockBuilder::default());
        let (result, _) = run(
            Arc::new(MockRegistry { fail_digest: false }),
            builder.clone(),
            config,
            released(),
            repo.path().to_path_buf(),
        )
        .await;

        assert!(result.success);
        assert!(
            builder
                .pushed()
                .contains(&("rg.test/app/api".to_string(), "latest".to_string()))
        );
    }
}
