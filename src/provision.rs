//! End-to-end provisioning of one service
//!
//! Runs the pipeline build -> launch -> readiness, then ensures the
//! configured model is present for inference services. Any failing step
//! stops the pipeline; the error carries whatever diagnostic text the
//! failing step captured so the caller can print it verbatim.

use crate::build::{BuildError, BuildOrchestrator};
use crate::config::Settings;
use crate::launch::{LaunchError, ServiceLauncher};
use crate::probe::{HealthStatus, ProbeError, ReadinessProber};
use crate::runtime::{RuntimeClient, RuntimeError};
use crate::service::ServiceSpec;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

/// Provisioning errors, one variant per pipeline stage.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// Readiness never arrived; `logs` is the container tail at timeout.
    #[error("{source}")]
    Probe {
        #[source]
        source: ProbeError,
        logs: Option<String>,
    },

    #[error("failed to pull model '{model}'")]
    Model { model: String, detail: String },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl ProvisionError {
    /// Diagnostic text of the failing step, printed verbatim on exit.
    pub fn diagnostics(&self) -> Option<String> {
        match self {
            Self::Build(BuildError::Exhausted { diagnostics, .. }) => Some(diagnostics.clone()),
            Self::Build(BuildError::Runtime(err)) => err.diagnostics(usize::MAX),
            Self::Build(BuildError::AuthConfig(_)) => None,
            Self::Launch(err) => err.captured_logs(),
            Self::Probe { logs, .. } => logs.clone(),
            Self::Model { detail, .. } => Some(detail.clone()),
            Self::Runtime(err) => err.diagnostics(usize::MAX),
        }
    }
}

/// What a completed provisioning run produced.
#[derive(Debug)]
pub struct ProvisionReport {
    pub service: String,
    pub image: String,
    /// Name of the build strategy that produced the image.
    pub strategy: &'static str,
    pub health: HealthStatus,
}

/// Drives the provisioning pipeline for individual services.
pub struct Provisioner<'a> {
    client: &'a RuntimeClient,
    settings: &'a Settings,
}

impl<'a> Provisioner<'a> {
    pub fn new(client: &'a RuntimeClient, settings: &'a Settings) -> Self {
        Self { client, settings }
    }

    /// Builds, launches and waits for readiness of one service.
    pub async fn provision(&self, spec: &ServiceSpec) -> Result<ProvisionReport, ProvisionError> {
        let started = Instant::now();
        info!(service = %spec.name, "provisioning");

        let orchestrator = BuildOrchestrator::new();
        let outcome = orchestrator.build(self.client, spec).await?;
        info!(
            service = %spec.name,
            image = %outcome.image,
            strategy = outcome.strategy,
            "image ready"
        );

        let launcher = ServiceLauncher::new(
            self.client,
            self.settings.grace_period(),
            self.settings.log_tail,
        );
        launcher.launch(spec, &outcome.image).await?;

        let prober = ReadinessProber::new(
            self.client,
            self.settings.probe_rounds,
            self.settings.probe_interval(),
        );
        let health = match prober.wait_ready(spec).await {
            Ok(health) => health,
            Err(source) => {
                // Best effort: the tail usually names the real problem
                let logs = self
                    .client
                    .container_logs(&spec.name, self.settings.log_tail)
                    .await
                    .ok();
                return Err(ProvisionError::Probe { source, logs });
            }
        };

        if let Some(model) = &spec.model {
            self.ensure_model(&spec.name, model).await?;
        }

        info!(
            service = %spec.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "service provisioned"
        );
        Ok(ProvisionReport {
            service: spec.name.clone(),
            image: outcome.image,
            strategy: outcome.strategy,
            health,
        })
    }

    /// Pulls the model inside the container unless it is already listed.
    async fn ensure_model(&self, container: &str, model: &str) -> Result<(), ProvisionError> {
        let listing = self.client.exec(container, &["ollama", "list"]).await?;
        if listing.success() && listing.stdout.contains(model) {
            debug!(model, "model already present");
            return Ok(());
        }

        info!(model, "pulling model, this can take a while");
        let pull = self.client.exec(container, &["ollama", "pull", model]).await?;
        if !pull.success() {
            return Err(ProvisionError::Model {
                model: model.to_string(),
                detail: pull.diagnostic_tail(self.settings.log_tail as usize),
            });
        }
        info!(model, "model ready");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{CommandRunner, MockRunner};
    use crate::service::{PortBinding, ProbeSpec, ServiceKind};
    use std::path::PathBuf;
    use std::sync::Arc;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    const RUNNING: &str =
        r#"{"ID":"c1","Names":"pgvector","State":"running","Status":"Up 1 second"}"#;

    fn settings() -> Settings {
        let mut settings = Settings::from_env();
        settings.probe_rounds = 2;
        settings.probe_interval_secs = 0;
        settings.grace_secs = 0;
        settings
    }

    fn db_spec() -> ServiceSpec {
        ServiceSpec {
            kind: ServiceKind::VectorDb,
            name: "pgvector".to_string(),
            image: "pgvector-local:latest".to_string(),
            fallback_image: Some("pgvector/pgvector:pg16".to_string()),
            allow_pull_fallback: true,
            build_file: PathBuf::from("docker/pgvector.Dockerfile"),
            build_context: PathBuf::from("."),
            platform: "linux/amd64".to_string(),
            memory: "1g".to_string(),
            cpus: "2".to_string(),
            env: Vec::new(),
            port: PortBinding {
                host: 5432,
                container: 5432,
            },
            volumes: Vec::new(),
            data_volume: "pgvector_data".to_string(),
            run_command: None,
            alt_command: Some(vec!["postgres".to_string()]),
            probe: ProbeSpec::Postgres {
                user: "postgres".to_string(),
                database: "vectors".to_string(),
            },
            model: None,
            purge_pattern: "pgvector|vectordb".to_string(),
        }
    }

    fn client(runner: &Arc<MockRunner>) -> RuntimeClient {
        RuntimeClient::new("docker", Arc::clone(runner) as Arc<dyn CommandRunner>)
    }

    fn script_clean_launch(runner: &MockRunner, container_line: &str) {
        runner.push_success(""); // ps: nothing running
        runner.push_success(""); // ps: nothing to remove
        runner.push_success(""); // volume ls: absent
        runner.push_success("volume\n"); // volume create
        runner.push_success("c1\n"); // run
        runner.push_success(container_line); // ps after grace
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_provision_vector_db_happy_path() {
        let runner = Arc::new(MockRunner::new());
        runner.push_success("sha256:built\n"); // build
        script_clean_launch(&runner, RUNNING);
        runner.push_success("accepting connections\n"); // pg_isready

        let settings = settings();
        let client = client(&runner);
        let report = Provisioner::new(&client, &settings)
            .provision(&db_spec())
            .await
            .unwrap();

        assert_eq!(report.service, "pgvector");
        assert_eq!(report.image, "pgvector-local:latest");
        assert_eq!(report.strategy, "primary");
        assert_eq!(report.health.attempts, 1);
        assert!(runner.invocation_lines()[0].starts_with("docker build"));
        assert_eq!(runner.remaining_outputs(), 0);
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_provision_pulls_missing_model() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok")
                    .await;
            }
        });

        let mut spec = db_spec();
        spec.name = "ollama".to_string();
        spec.model = Some("qwen2.5-coder:7b".to_string());
        spec.probe = ProbeSpec::Http {
            path: "/api/tags".to_string(),
        };
        spec.port = PortBinding {
            host: port,
            container: 11434,
        };

        let runner = Arc::new(MockRunner::new());
        runner.push_success("sha256:built\n"); // build
        script_clean_launch(
            &runner,
            r#"{"ID":"c1","Names":"ollama","State":"running","Status":"Up 1 second"}"#,
        );
        runner.push_success("NAME  ID  SIZE\n"); // ollama list: model absent
        runner.push_success("pulling manifest... success\n"); // ollama pull

        let settings = settings();
        let client = client(&runner);
        Provisioner::new(&client, &settings)
            .provision(&spec)
            .await
            .unwrap();

        let lines = runner.invocation_lines();
        assert_eq!(lines[lines.len() - 2], "docker exec ollama ollama list");
        assert_eq!(
            lines[lines.len() - 1],
            "docker exec ollama ollama pull qwen2.5-coder:7b"
        );
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_provision_skips_pull_when_model_listed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok")
                    .await;
            }
        });

        let mut spec = db_spec();
        spec.name = "ollama".to_string();
        spec.model = Some("qwen2.5-coder:7b".to_string());
        spec.probe = ProbeSpec::Http {
            path: "/api/tags".to_string(),
        };
        spec.port = PortBinding {
            host: port,
            container: 11434,
        };

        let runner = Arc::new(MockRunner::new());
        runner.push_success("sha256:built\n");
        script_clean_launch(
            &runner,
            r#"{"ID":"c1","Names":"ollama","State":"running","Status":"Up 1 second"}"#,
        );
        runner.push_success("qwen2.5-coder:7b  abc123  4.7 GB\n"); // ollama list

        let settings = settings();
        let client = client(&runner);
        Provisioner::new(&client, &settings)
            .provision(&spec)
            .await
            .unwrap();

        assert!(!runner
            .invocation_lines()
            .iter()
            .any(|l| l.contains("ollama pull")));
        assert_eq!(runner.remaining_outputs(), 0);
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_build_exhaustion_stops_the_pipeline() {
        let mut spec = db_spec();
        spec.allow_pull_fallback = false;
        spec.fallback_image = None;

        let runner = Arc::new(MockRunner::new());
        runner.push_failure(1, "unrecognized compiler error\n"); // primary build
        runner.push_failure(1, "buildx: command not found\n"); // buildx probe

        let settings = settings();
        let client = client(&runner);
        let err = Provisioner::new(&client, &settings)
            .provision(&spec)
            .await
            .unwrap_err();

        match &err {
            ProvisionError::Build(BuildError::Exhausted { strategy, .. }) => {
                assert_eq!(strategy, "primary");
            }
            other => panic!("expected build exhaustion, got {:?}", other),
        }
        assert!(err.diagnostics().unwrap().contains("compiler error"));
        // Nothing was launched
        assert!(!runner.invocation_lines().iter().any(|l| l.contains(" run ")));
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_probe_timeout_attaches_container_logs() {
        let runner = Arc::new(MockRunner::new());
        runner.push_success("sha256:built\n"); // build
        script_clean_launch(&runner, RUNNING);
        runner.push_failure(1, "no response\n"); // probe 1
        runner.push_failure(1, "no response\n"); // probe 2
        runner.push_success("FATAL: data directory has wrong ownership\n"); // logs

        let settings = settings();
        let client = client(&runner);
        let err = Provisioner::new(&client, &settings)
            .provision(&db_spec())
            .await
            .unwrap_err();

        match &err {
            ProvisionError::Probe { logs, .. } => {
                assert!(logs.as_deref().unwrap().contains("wrong ownership"));
            }
            other => panic!("expected probe timeout, got {:?}", other),
        }
        assert!(err.diagnostics().unwrap().contains("wrong ownership"));
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_model_pull_failure_is_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok")
                    .await;
            }
        });

        let mut spec = db_spec();
        spec.name = "ollama".to_string();
        spec.model = Some("qwen2.5-coder:7b".to_string());
        spec.probe = ProbeSpec::Http {
            path: "/api/tags".to_string(),
        };
        spec.port = PortBinding {
            host: port,
            container: 11434,
        };

        let runner = Arc::new(MockRunner::new());
        runner.push_success("sha256:built\n");
        script_clean_launch(
            &runner,
            r#"{"ID":"c1","Names":"ollama","State":"running","Status":"Up 1 second"}"#,
        );
        runner.push_success("NAME  ID  SIZE\n"); // ollama list
        runner.push_failure(1, "Error: pull model manifest: connection refused\n");

        let settings = settings();
        let client = client(&runner);
        let err = Provisioner::new(&client, &settings)
            .provision(&spec)
            .await
            .unwrap_err();

        match &err {
            ProvisionError::Model { model, detail } => {
                assert_eq!(model, "qwen2.5-coder:7b");
                assert!(detail.contains("connection refused"));
            }
            other => panic!("expected model pull failure, got {:?}", other),
        }
    }
}
