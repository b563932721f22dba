//! Readiness probing for launched services
//!
//! A running container is not a ready service. The prober drives the
//! service-specific health check (pg_isready inside the container, or an
//! HTTP GET against the published port) in fixed-interval rounds until it
//! passes or the attempt budget is spent. Probe misses are expected while
//! a service boots; only runtime invocation failures abort the wait.

use crate::runtime::{RuntimeClient, RuntimeError};
use crate::service::{ProbeSpec, ServiceSpec};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Probe errors.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Every probe round failed within the attempt budget.
    #[error("'{name}' did not become ready after {attempts} attempts ({}s)", .elapsed.as_secs())]
    TimedOut {
        name: String,
        attempts: u32,
        elapsed: Duration,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Outcome of a successful readiness wait.
#[derive(Debug, Clone, Copy)]
pub struct HealthStatus {
    /// Probe rounds used, including the one that passed.
    pub attempts: u32,
    /// Wall-clock time from the first probe to the passing one.
    pub elapsed: Duration,
}

/// Polls service health checks until they pass.
pub struct ReadinessProber<'a> {
    client: &'a RuntimeClient,
    rounds: u32,
    interval: Duration,
    http: reqwest::Client,
}

impl<'a> ReadinessProber<'a> {
    pub fn new(client: &'a RuntimeClient, rounds: u32, interval: Duration) -> Self {
        // Each request gets one interval to answer, with a floor so that
        // sub-second polling still leaves a usable deadline
        let http = reqwest::Client::builder()
            .timeout(interval.max(Duration::from_secs(1)))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            rounds,
            interval,
            http,
        }
    }

    /// Probes until the service passes or the attempt budget runs out.
    pub async fn wait_ready(&self, spec: &ServiceSpec) -> Result<HealthStatus, ProbeError> {
        let started = Instant::now();
        for attempt in 1..=self.rounds {
            if self.check(spec).await? {
                let elapsed = started.elapsed();
                info!(
                    service = %spec.name,
                    attempt,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "service is ready"
                );
                return Ok(HealthStatus {
                    attempts: attempt,
                    elapsed,
                });
            }
            debug!(
                service = %spec.name,
                attempt,
                rounds = self.rounds,
                "service not ready yet"
            );
            if attempt < self.rounds {
                tokio::time::sleep(self.interval).await;
            }
        }
        Err(ProbeError::TimedOut {
            name: spec.name.clone(),
            attempts: self.rounds,
            elapsed: started.elapsed(),
        })
    }

    /// Runs one probe round. A miss is `Ok(false)`; only failures to invoke
    /// the runtime itself surface as errors.
    pub async fn check(&self, spec: &ServiceSpec) -> Result<bool, ProbeError> {
        match &spec.probe {
            ProbeSpec::Postgres { user, database } => {
                let output = self
                    .client
                    .exec(
                        &spec.name,
                        &["pg_isready", "-U", user.as_str(), "-d", database.as_str()],
                    )
                    .await?;
                Ok(output.success())
            }
            ProbeSpec::Http { path } => {
                let url = format!("http://127.0.0.1:{}{}", spec.port.host, path);
                match self.http.get(&url).send().await {
                    Ok(response) => Ok(response.status().is_success()),
                    Err(err) => {
                        if err.is_timeout() || err.is_connect() {
                            debug!(%url, error = %err, "probe request did not reach the service");
                        } else {
                            warn!(%url, error = %err, "probe request failed");
                        }
                        Ok(false)
                    }
                }
            }
        }
    }
}
