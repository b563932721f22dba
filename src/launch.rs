//! Container launch with replace-then-verify semantics
//!
//! Launching a service always converges on one fresh container under the
//! service name: whatever is there now gets stopped and removed, the data
//! volume is ensured, and a new container starts. A container that exits
//! within the grace period is captured (log tail) and discarded, then the
//! launch retries once with the service's alternate command. Each check
//! re-queries the runtime immediately before the mutation it guards.

use crate::runtime::{RuntimeClient, RuntimeError};
use crate::service::ServiceSpec;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Launch errors.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The container exited within the grace period and the service defines
    /// no alternate command to retry with.
    #[error("container '{name}' exited during the grace period")]
    Exited { name: String, logs: String },

    /// Both the primary launch and the alternate-command retry exited.
    #[error("container '{name}' exited again after the alternate-command retry")]
    ExitedAfterRetry {
        name: String,
        primary_logs: String,
        retry_logs: String,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl LaunchError {
    /// Captured container log tails, for verbatim printing on failure.
    pub fn captured_logs(&self) -> Option<String> {
        match self {
            Self::Exited { logs, .. } => Some(logs.clone()),
            Self::ExitedAfterRetry {
                primary_logs,
                retry_logs,
                ..
            } => Some(format!(
                "--- first attempt ---\n{}\n--- retry ---\n{}",
                primary_logs.trim_end(),
                retry_logs.trim_end()
            )),
            Self::Runtime(_) => None,
        }
    }
}

/// Starts service containers and verifies they survive the grace period.
pub struct ServiceLauncher<'a> {
    client: &'a RuntimeClient,
    grace: Duration,
    log_tail: u32,
}

impl<'a> ServiceLauncher<'a> {
    pub fn new(client: &'a RuntimeClient, grace: Duration, log_tail: u32) -> Self {
        Self {
            client,
            grace,
            log_tail,
        }
    }

    /// Launches the service from the given image and returns the container id.
    pub async fn launch(&self, spec: &ServiceSpec, image: &str) -> Result<String, LaunchError> {
        self.clear_existing(&spec.name).await?;
        self.ensure_volume(&spec.data_volume).await?;

        if let Some(id) = self
            .start_and_verify(spec, image, spec.run_command.as_deref())
            .await?
        {
            return Ok(id);
        }

        let primary_logs = self.client.container_logs(&spec.name, self.log_tail).await?;
        warn!(
            service = %spec.name,
            "container exited within the grace period, discarding it"
        );
        self.client.remove_container(&spec.name, true).await?;

        let alt = match &spec.alt_command {
            Some(alt) => alt,
            None => {
                return Err(LaunchError::Exited {
                    name: spec.name.clone(),
                    logs: primary_logs,
                })
            }
        };

        info!(
            service = %spec.name,
            command = ?alt,
            "retrying launch with alternate command"
        );
        match self.start_and_verify(spec, image, Some(alt.as_slice())).await? {
            Some(id) => {
                warn!(
                    service = %spec.name,
                    "service required the alternate command to stay up"
                );
                Ok(id)
            }
            None => {
                let retry_logs = self.client.container_logs(&spec.name, self.log_tail).await?;
                self.client.remove_container(&spec.name, true).await?;
                Err(LaunchError::ExitedAfterRetry {
                    name: spec.name.clone(),
                    primary_logs,
                    retry_logs,
                })
            }
        }
    }

    /// Stops and removes whatever currently holds the service name.
    async fn clear_existing(&self, name: &str) -> Result<(), RuntimeError> {
        if let Some(existing) = self.client.find_container(name).await? {
            if existing.is_running() {
                info!(service = name, "stopping running container");
                self.client.stop_container(name).await?;
            }
        }

        // A fresh check guards the removal; the stop above may have raced
        // with an external removal
        if self.client.find_container(name).await?.is_some() {
            info!(service = name, "removing existing container");
            self.client.remove_container(name, true).await?;
        }

        Ok(())
    }

    async fn ensure_volume(&self, volume: &str) -> Result<(), RuntimeError> {
        if self.client.volume_exists(volume).await? {
            debug!(volume, "data volume already exists");
        } else {
            info!(volume, "creating data volume");
            self.client.create_volume(volume).await?;
        }
        Ok(())
    }

    /// Starts a container and re-inspects it after the grace period.
    /// `Ok(Some(id))` means it is still running; `Ok(None)` means it exited.
    async fn start_and_verify(
        &self,
        spec: &ServiceSpec,
        image: &str,
        command: Option<&[String]>,
    ) -> Result<Option<String>, RuntimeError> {
        let id = self.client.run_container(spec, image, command).await?;
        debug!(service = %spec.name, container = %id, "container started, waiting out the grace period");

        tokio::time::sleep(self.grace).await;

        let alive = matches!(
            self.client.find_container(&spec.name).await?,
            Some(current) if current.is_running()
        );
        if alive {
            info!(service = %spec.name, container = %id, "container survived the grace period");
            Ok(Some(id))
        } else {
            Ok(None)
        }
    }
}
