//! dockhand - idempotent provisioning of local container-based dev dependencies
//!
//! This library builds, launches and health-gates the local containers a
//! development workflow depends on: a pgvector-enabled Postgres and an
//! Ollama-compatible inference server. Re-running any operation converges on
//! the same end state instead of erroring on leftovers from the last run.
//!
//! # Core Concepts
//!
//! - **Runtime client**: A typed facade over the `docker`/`podman` CLI. All
//!   state lives runtime-side; dockhand rediscovers it before every mutation
//!   instead of trusting its own bookkeeping
//! - **Service spec**: The complete description of one managed service
//!   (image, build definition, ports, volumes, probe), derived from
//!   configuration and the resolved platform
//! - **Build chain**: An ordered sequence of build strategies, each tried
//!   only when the previous failure matches the problem it fixes
//! - **Reclaim**: Teardown of the named resources, optionally widened to a
//!   pattern-scoped purge of everything a past run may have left behind
//!
//! # Example Usage
//!
//! ```ignore
//! use dockhand::config::Settings;
//! use dockhand::provision::Provisioner;
//! use dockhand::runtime::{RuntimeClient, SystemRunner};
//! use dockhand::service::ServiceSpec;
//! use dockhand::platform;
//! use std::sync::Arc;
//!
//! async fn bring_up() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::from_env();
//!     settings.validate()?;
//!
//!     let runner = Arc::new(SystemRunner::new());
//!     let profile = platform::resolve(settings.arch.as_deref(), runner.as_ref()).await;
//!     let client = RuntimeClient::new(settings.runtime.as_str(), runner);
//!
//!     let spec = ServiceSpec::vector_db(&settings, &profile);
//!     let report = Provisioner::new(&client, &settings).provision(&spec).await?;
//!     println!("{} ready via {}", report.service, report.strategy);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Project Structure
//!
//! - [`runtime`]: Container runtime invocation, typed inventory records
//! - [`platform`]: Target architecture resolution
//! - [`service`]: Managed service descriptions
//! - [`build`]: Image build orchestration with ordered fallbacks
//! - [`launch`]: Container replacement and grace-period verification
//! - [`probe`]: Readiness probing
//! - [`provision`]: The end-to-end provisioning pipeline
//! - [`reclaim`]: Teardown, pattern-scoped purge and prune passes
//! - [`diag`]: Health diagnostics behind `status`

// Public modules
pub mod build;
pub mod cli;
pub mod config;
pub mod diag;
pub mod launch;
pub mod platform;
pub mod probe;
pub mod provision;
pub mod reclaim;
pub mod runtime;
pub mod service;
pub mod util;

// Re-export key types for convenient access
pub use build::{BuildError, BuildOrchestrator, BuildOutcome};
pub use config::{ConfigError, Settings};
pub use diag::{DiagReport, Diagnostics};
pub use launch::{LaunchError, ServiceLauncher};
pub use platform::{Arch, PlatformProfile};
pub use probe::{HealthStatus, ProbeError, ReadinessProber};
pub use provision::{ProvisionError, ProvisionReport, Provisioner};
pub use reclaim::{ReclaimError, ReclaimOptions, ReclaimReport, Reclaimer};
pub use runtime::{CommandRunner, RuntimeClient, RuntimeError, SystemRunner};
pub use service::{ServiceKind, ServiceSpec};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name_is_dockhand() {
        assert_eq!(NAME, "dockhand");
    }
}
