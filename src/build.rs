//! Image build orchestration
//!
//! Building a service image walks a fixed, ordered chain of strategies and
//! stops at the first success. Later strategies only become applicable when
//! an earlier failure classifies into the problem they work around:
//!
//! 1. `primary` - plain build from the service's build definition
//! 2. `no-cache-auth` - after a credential helper failure, rebuild with an
//!    empty credential store and BuildKit disabled
//! 3. `legacy-builder` - after a missing-buildx failure, rebuild with
//!    BuildKit disabled
//! 4. `buildx` - explicit `buildx build --load`, attempted only when the
//!    extended builder reports itself available (probed at most once)
//! 5. `pull-fallback` - pull the known-good public image, for services that
//!    allow it
//!
//! Every failed attempt is classified and logged with its diagnostics tail;
//! when the chain runs out the last tail is surfaced verbatim.

use crate::runtime::{RuntimeClient, RuntimeError};
use crate::service::ServiceSpec;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Lines of stderr kept from a failed attempt.
const BUILD_DIAG_LINES: usize = 30;

/// Build errors.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Every applicable strategy failed; `diagnostics` is the stderr tail
    /// of the last attempt.
    #[error("all build strategies exhausted (last attempt: {strategy})")]
    Exhausted { strategy: String, diagnostics: String },

    /// The scratch credential-free config could not be written.
    #[error("failed to prepare the credential-free build config: {0}")]
    AuthConfig(#[from] std::io::Error),

    /// Infrastructure failure that no other strategy could recover from.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// What a failed build attempt tells us about the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// A credential helper broke before the build started
    CredentialHelper,
    /// BuildKit wants the buildx component and it is absent
    BuildxMissing,
    Unclassified,
}

impl FailureClass {
    /// Classifies a failed attempt by its stderr. The signatures are the
    /// stable fragments of the runtime's own error messages.
    pub fn classify(stderr: &str) -> Self {
        let text = stderr.to_lowercase();
        if text.contains("error getting credentials") || text.contains("docker-credential") {
            Self::CredentialHelper
        } else if text.contains("buildx component is missing")
            || text.contains("'buildx' is not a docker command")
        {
            Self::BuildxMissing
        } else {
            Self::Unclassified
        }
    }
}

/// A successful build: which image is now present and which strategy won.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub image: String,
    pub strategy: &'static str,
}

/// One step in the build chain.
#[async_trait]
pub trait BuildStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy should run, given how the previous attempt failed.
    fn applicable(&self, last_failure: Option<FailureClass>, spec: &ServiceSpec) -> bool;

    /// Requires the extended builder; the orchestrator probes availability
    /// lazily and skips the strategy when it is absent.
    fn needs_buildx(&self) -> bool {
        false
    }

    /// Attempts the build and returns the image reference now present.
    async fn execute(
        &self,
        client: &RuntimeClient,
        spec: &ServiceSpec,
    ) -> Result<String, BuildError>;
}

/// Strategy 1: plain build from the service's build definition.
pub struct PrimaryBuild;

#[async_trait]
impl BuildStrategy for PrimaryBuild {
    fn name(&self) -> &'static str {
        "primary"
    }

    fn applicable(&self, _last_failure: Option<FailureClass>, _spec: &ServiceSpec) -> bool {
        true
    }

    async fn execute(
        &self,
        client: &RuntimeClient,
        spec: &ServiceSpec,
    ) -> Result<String, BuildError> {
        client
            .build(
                &spec.build_file,
                &spec.image,
                &spec.platform,
                &spec.build_context,
                Vec::new(),
            )
            .await?;
        Ok(spec.image.clone())
    }
}

/// Strategy 2: rebuild with an empty credential store.
///
/// A broken credential helper fails the build before any registry access.
/// Pointing the runtime at a scratch config whose credential store is empty
/// removes the helper from the path entirely; BuildKit is disabled as well
/// since it re-resolves credentials on its own.
pub struct NoCacheAuthBuild {
    config_dir: PathBuf,
}

impl NoCacheAuthBuild {
    pub fn new() -> Self {
        Self {
            config_dir: std::env::temp_dir().join("dockhand-empty-auth"),
        }
    }

    pub fn with_config_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    fn prepare_config(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::write(self.config_dir.join("config.json"), b"{\"auths\": {}}\n")
    }
}

impl Default for NoCacheAuthBuild {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BuildStrategy for NoCacheAuthBuild {
    fn name(&self) -> &'static str {
        "no-cache-auth"
    }

    fn applicable(&self, last_failure: Option<FailureClass>, _spec: &ServiceSpec) -> bool {
        last_failure == Some(FailureClass::CredentialHelper)
    }

    async fn execute(
        &self,
        client: &RuntimeClient,
        spec: &ServiceSpec,
    ) -> Result<String, BuildError> {
        self.prepare_config()?;
        let envs = vec![
            (
                "DOCKER_CONFIG".to_string(),
                self.config_dir.display().to_string(),
            ),
            ("DOCKER_BUILDKIT".to_string(), "0".to_string()),
        ];
        client
            .build(
                &spec.build_file,
                &spec.image,
                &spec.platform,
                &spec.build_context,
                envs,
            )
            .await?;
        Ok(spec.image.clone())
    }
}

/// Strategy 3: rebuild with the legacy builder when buildx is absent.
pub struct LegacyBuilderBuild;

#[async_trait]
impl BuildStrategy for LegacyBuilderBuild {
    fn name(&self) -> &'static str {
        "legacy-builder"
    }

    fn applicable(&self, last_failure: Option<FailureClass>, _spec: &ServiceSpec) -> bool {
        last_failure == Some(FailureClass::BuildxMissing)
    }

    async fn execute(
        &self,
        client: &RuntimeClient,
        spec: &ServiceSpec,
    ) -> Result<String, BuildError> {
        let envs = vec![("DOCKER_BUILDKIT".to_string(), "0".to_string())];
        client
            .build(
                &spec.build_file,
                &spec.image,
                &spec.platform,
                &spec.build_context,
                envs,
            )
            .await?;
        Ok(spec.image.clone())
    }
}

/// Strategy 4: explicit `buildx build --load`.
pub struct BuildxBuild;

#[async_trait]
impl BuildStrategy for BuildxBuild {
    fn name(&self) -> &'static str {
        "buildx"
    }

    fn applicable(&self, _last_failure: Option<FailureClass>, _spec: &ServiceSpec) -> bool {
        true
    }

    fn needs_buildx(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        client: &RuntimeClient,
        spec: &ServiceSpec,
    ) -> Result<String, BuildError> {
        client
            .buildx_build(
                &spec.build_file,
                &spec.image,
                &spec.platform,
                &spec.build_context,
            )
            .await?;
        Ok(spec.image.clone())
    }
}

/// Strategy 5: pull the known-good public image instead of building.
pub struct PullFallback;

#[async_trait]
impl BuildStrategy for PullFallback {
    fn name(&self) -> &'static str {
        "pull-fallback"
    }

    fn applicable(&self, _last_failure: Option<FailureClass>, spec: &ServiceSpec) -> bool {
        spec.allow_pull_fallback && spec.fallback_image.is_some()
    }

    async fn execute(
        &self,
        client: &RuntimeClient,
        spec: &ServiceSpec,
    ) -> Result<String, BuildError> {
        let fallback = spec
            .fallback_image
            .as_ref()
            .expect("applicable() guarantees a fallback image");
        client.pull(fallback, &spec.platform).await?;
        Ok(fallback.clone())
    }
}

/// Walks the strategy chain for one service.
pub struct BuildOrchestrator {
    strategies: Vec<Box<dyn BuildStrategy>>,
}

impl BuildOrchestrator {
    /// The standard five-step chain.
    pub fn new() -> Self {
        Self {
            strategies: vec![
                Box::new(PrimaryBuild),
                Box::new(NoCacheAuthBuild::new()),
                Box::new(LegacyBuilderBuild),
                Box::new(BuildxBuild),
                Box::new(PullFallback),
            ],
        }
    }

    /// A custom chain, used by tests and by callers that need to constrain
    /// the fallback behavior.
    pub fn with_strategies(strategies: Vec<Box<dyn BuildStrategy>>) -> Self {
        Self { strategies }
    }

    /// Runs strategies in order until one succeeds.
    ///
    /// A command-level failure is classified, logged and feeds the next
    /// applicability decision. Spawn and parse failures abort immediately:
    /// if the runtime binary itself is broken, no later strategy can help.
    pub async fn build(
        &self,
        client: &RuntimeClient,
        spec: &ServiceSpec,
    ) -> Result<BuildOutcome, BuildError> {
        let mut last_failure: Option<FailureClass> = None;
        let mut last_attempt: Option<(&'static str, String)> = None;
        let mut buildx_available: Option<bool> = None;

        for strategy in &self.strategies {
            if !strategy.applicable(last_failure, spec) {
                debug!(strategy = strategy.name(), "build strategy not applicable");
                continue;
            }

            if strategy.needs_buildx() {
                let available = match buildx_available {
                    Some(cached) => cached,
                    None => {
                        let probed = match client.buildx_available().await {
                            Ok(probed) => probed,
                            Err(error) => {
                                debug!(%error, "buildx availability probe failed");
                                false
                            }
                        };
                        buildx_available = Some(probed);
                        probed
                    }
                };
                if !available {
                    debug!(
                        strategy = strategy.name(),
                        "extended builder unavailable, skipping"
                    );
                    continue;
                }
            }

            info!(
                strategy = strategy.name(),
                service = %spec.name,
                image = %spec.image,
                "attempting build strategy"
            );
            let started = Instant::now();

            match strategy.execute(client, spec).await {
                Ok(image) => {
                    info!(
                        strategy = strategy.name(),
                        image = %image,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "build strategy succeeded"
                    );
                    return Ok(BuildOutcome {
                        image,
                        strategy: strategy.name(),
                    });
                }
                Err(BuildError::Runtime(RuntimeError::CommandFailed { output, .. })) => {
                    let class = FailureClass::classify(&output.stderr);
                    warn!(
                        strategy = strategy.name(),
                        class = ?class,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "build strategy failed: {}",
                        output.diagnostic_tail(1)
                    );
                    last_failure = Some(class);
                    last_attempt =
                        Some((strategy.name(), output.diagnostic_tail(BUILD_DIAG_LINES)));
                }
                Err(fatal) => return Err(fatal),
            }
        }

        match last_attempt {
            Some((strategy, diagnostics)) => Err(BuildError::Exhausted {
                strategy: strategy.to_string(),
                diagnostics,
            }),
            None => Err(BuildError::Exhausted {
                strategy: "none".to_string(),
                diagnostics: "no build strategy was applicable".to_string(),
            }),
        }
    }
}

impl Default for BuildOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}
