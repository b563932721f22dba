//! Health diagnostics for provisioned services
//!
//! Produces a [`DiagReport`]: per service, whether the container runs, a
//! single-round readiness check, one real round-trip request (a SQL query
//! for the database, a generate call for the inference server) and the
//! runtime's resource statistics. Check failures are recorded in the
//! report rather than raised; only broken runtime invocations error out.

use crate::config::Settings;
use crate::probe::{ProbeError, ReadinessProber};
use crate::runtime::{RuntimeClient, RuntimeError, StatsRecord};
use crate::service::{ProbeSpec, ServiceSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

/// Inference round trips load the model on first use, which dwarfs the
/// usual probe timeout.
const GENERATE_TIMEOUT_SECS: u64 = 120;

const GENERATE_PROMPT: &str = "Reply with one word: ready";

/// Full diagnostic snapshot across services.
#[derive(Debug, Serialize)]
pub struct DiagReport {
    pub generated_at: DateTime<Utc>,
    pub services: Vec<ServiceReport>,
}

impl DiagReport {
    pub fn healthy(&self) -> bool {
        self.services.iter().all(ServiceReport::healthy)
    }
}

/// Diagnostics for one service.
#[derive(Debug, Serialize)]
pub struct ServiceReport {
    pub name: String,
    pub running: bool,
    pub checks: Vec<CheckReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsRecord>,
}

impl ServiceReport {
    pub fn healthy(&self) -> bool {
        self.running && self.checks.iter().all(|check| check.passed)
    }
}

/// One executed check.
#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub name: &'static str,
    pub passed: bool,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Runs the diagnostic checks.
pub struct Diagnostics<'a> {
    client: &'a RuntimeClient,
    settings: &'a Settings,
    http: reqwest::Client,
}

impl<'a> Diagnostics<'a> {
    pub fn new(client: &'a RuntimeClient, settings: &'a Settings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(GENERATE_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            settings,
            http,
        }
    }

    pub async fn run(&self, specs: &[ServiceSpec]) -> Result<DiagReport, RuntimeError> {
        let mut services = Vec::with_capacity(specs.len());
        for spec in specs {
            services.push(self.inspect(spec).await?);
        }
        Ok(DiagReport {
            generated_at: Utc::now(),
            services,
        })
    }

    async fn inspect(&self, spec: &ServiceSpec) -> Result<ServiceReport, RuntimeError> {
        let started = Instant::now();
        let container = self.client.find_container(&spec.name).await?;
        let (running, detail) = match &container {
            Some(c) if c.is_running() => (true, Some(c.status.clone())),
            Some(c) => (false, Some(c.status.clone())),
            None => (false, Some("not found".to_string())),
        };
        let mut checks = vec![CheckReport {
            name: "liveness",
            passed: running,
            elapsed_ms: elapsed_ms(started),
            detail,
        }];

        if !running {
            warn!(service = %spec.name, "container not running, skipping further checks");
            return Ok(ServiceReport {
                name: spec.name.clone(),
                running,
                checks,
                stats: None,
            });
        }

        checks.push(self.readiness(spec).await?);
        checks.push(self.round_trip(spec).await?);
        let stats = self.client.stats(&spec.name).await?;

        Ok(ServiceReport {
            name: spec.name.clone(),
            running,
            checks,
            stats,
        })
    }

    /// One probe round, reported instead of retried.
    async fn readiness(&self, spec: &ServiceSpec) -> Result<CheckReport, RuntimeError> {
        let started = Instant::now();
        let prober = ReadinessProber::new(self.client, 1, self.settings.probe_interval());
        let passed = match prober.check(spec).await {
            Ok(ready) => ready,
            Err(ProbeError::Runtime(err)) => return Err(err),
            Err(err) => {
                debug!(service = %spec.name, error = %err, "readiness check failed");
                false
            }
        };
        Ok(CheckReport {
            name: "readiness",
            passed,
            elapsed_ms: elapsed_ms(started),
            detail: None,
        })
    }

    async fn round_trip(&self, spec: &ServiceSpec) -> Result<CheckReport, RuntimeError> {
        let started = Instant::now();
        let (passed, detail) = match &spec.probe {
            ProbeSpec::Postgres { user, database } => {
                let output = self
                    .client
                    .exec(
                        &spec.name,
                        &[
                            "psql",
                            "-U",
                            user.as_str(),
                            "-d",
                            database.as_str(),
                            "-t",
                            "-c",
                            "SELECT 1;",
                        ],
                    )
                    .await?;
                if output.success() {
                    (true, None)
                } else {
                    (false, Some(output.diagnostic_tail(3)))
                }
            }
            ProbeSpec::Http { path } => match &spec.model {
                Some(model) => self.generate_round_trip(spec.port.host, model).await,
                None => self.get_round_trip(spec.port.host, path).await,
            },
        };
        Ok(CheckReport {
            name: "round-trip",
            passed,
            elapsed_ms: elapsed_ms(started),
            detail,
        })
    }

    /// A real completion request; the reply snippet lands in the report.
    async fn generate_round_trip(&self, port: u16, model: &str) -> (bool, Option<String>) {
        let url = format!("http://127.0.0.1:{}/api/generate", port);
        let request = GenerateRequest {
            model: model.to_string(),
            prompt: GENERATE_PROMPT.to_string(),
            stream: false,
        };
        let response = match self.http.post(&url).json(&request).send().await {
            Ok(response) => response,
            Err(err) => return (false, Some(err.to_string())),
        };
        if !response.status().is_success() {
            return (false, Some(format!("HTTP {}", response.status())));
        }
        match response.json::<GenerateResponse>().await {
            Ok(body) => {
                let snippet: String = body.response.trim().chars().take(80).collect();
                (true, Some(snippet))
            }
            Err(err) => (false, Some(format!("invalid response body: {}", err))),
        }
    }

    async fn get_round_trip(&self, port: u16, path: &str) -> (bool, Option<String>) {
        let url = format!("http://127.0.0.1:{}{}", port, path);
        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => (true, None),
            Ok(response) => (false, Some(format!("HTTP {}", response.status()))),
            Err(err) => (false, Some(err.to_string())),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Request body for the inference server's generate endpoint.
#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

/// The subset of the generate response the round trip needs.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}
