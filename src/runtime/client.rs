//! Typed facade over the container runtime CLI
//!
//! [`RuntimeClient`] owns the runtime program name (`docker`, `podman`, a
//! shim path) and renders each operation into one subprocess invocation.
//! Inventory queries return typed records; mutations report whether they
//! found anything to act on. Nothing here caches state: every query hits
//! the runtime again, so a check immediately precedes the mutation that
//! depends on it.

use crate::runtime::command::{CommandOutput, CommandRunner, Invocation};
use crate::runtime::error::RuntimeError;
use crate::runtime::records::{
    parse_record_lines, ContainerRecord, ImageRecord, NetworkRecord, StatsRecord, VolumeRecord,
};
use crate::service::ServiceSpec;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Go-template that makes listing commands emit one JSON object per line.
const JSON_FORMAT: &str = "{{json .}}";

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Removal and stop failures caused by the resource already being gone.
fn is_not_found(output: &CommandOutput) -> bool {
    let text = output.stderr.to_lowercase();
    text.contains("no such") || text.contains("not found")
}

#[derive(Clone)]
pub struct RuntimeClient {
    program: String,
    runner: Arc<dyn CommandRunner>,
}

impl RuntimeClient {
    pub fn new(program: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        Arc::clone(&self.runner)
    }

    async fn run(&self, invocation: Invocation) -> Result<CommandOutput, RuntimeError> {
        self.runner.run(invocation).await
    }

    /// Runs the invocation and maps a non-zero exit to [`RuntimeError::CommandFailed`].
    async fn run_checked(&self, invocation: Invocation) -> Result<CommandOutput, RuntimeError> {
        let command = invocation.display();
        let output = self.run(invocation).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(RuntimeError::CommandFailed { command, output })
        }
    }

    fn invocation(&self, parts: &[&str]) -> Invocation {
        Invocation::new(&self.program, argv(parts))
    }

    // --- containers ---

    pub async fn list_containers(&self) -> Result<Vec<ContainerRecord>, RuntimeError> {
        let output = self
            .run_checked(self.invocation(&["ps", "-a", "--no-trunc", "--format", JSON_FORMAT]))
            .await?;
        parse_record_lines(&output.stdout, "container")
    }

    /// Fresh lookup of a container by exact name.
    pub async fn find_container(&self, name: &str) -> Result<Option<ContainerRecord>, RuntimeError> {
        let containers = self.list_containers().await?;
        Ok(containers.into_iter().find(|c| c.has_name(name)))
    }

    /// Stops a container. `Ok(false)` when no such container exists.
    pub async fn stop_container(&self, name: &str) -> Result<bool, RuntimeError> {
        let invocation = self.invocation(&["stop", name]);
        let command = invocation.display();
        let output = self.run(invocation).await?;
        if output.success() {
            Ok(true)
        } else if is_not_found(&output) {
            debug!(container = name, "stop skipped, container not found");
            Ok(false)
        } else {
            Err(RuntimeError::CommandFailed { command, output })
        }
    }

    /// Removes a container. `Ok(false)` when no such container exists.
    pub async fn remove_container(&self, name: &str, force: bool) -> Result<bool, RuntimeError> {
        let invocation = if force {
            self.invocation(&["rm", "-f", name])
        } else {
            self.invocation(&["rm", name])
        };
        let command = invocation.display();
        let output = self.run(invocation).await?;
        if output.success() {
            Ok(true)
        } else if is_not_found(&output) {
            debug!(container = name, "remove skipped, container not found");
            Ok(false)
        } else {
            Err(RuntimeError::CommandFailed { command, output })
        }
    }

    /// Starts a detached container for the service and returns the container id.
    ///
    /// `command` overrides the image's default command; `None` keeps it.
    pub async fn run_container(
        &self,
        spec: &ServiceSpec,
        image: &str,
        command: Option<&[String]>,
    ) -> Result<String, RuntimeError> {
        let mut args = argv(&["run", "-d", "--name", &spec.name, "--platform", &spec.platform]);

        args.push("--memory".to_string());
        args.push(spec.memory.clone());
        args.push("--cpus".to_string());
        args.push(spec.cpus.clone());

        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.push("-p".to_string());
        args.push(format!("{}:{}", spec.port.host, spec.port.container));

        for volume in &spec.volumes {
            args.push("-v".to_string());
            let mut binding = format!("{}:{}", volume.source, volume.target);
            if volume.read_only {
                binding.push_str(":ro");
            }
            args.push(binding);
        }

        args.push(image.to_string());
        if let Some(command) = command {
            args.extend(command.iter().cloned());
        }

        let output = self
            .run_checked(Invocation::new(&self.program, args))
            .await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Last `tail` log lines of a container, stdout and stderr combined.
    /// Best effort: a vanished container yields whatever the runtime printed.
    pub async fn container_logs(&self, name: &str, tail: u32) -> Result<String, RuntimeError> {
        let tail_arg = tail.to_string();
        let output = self
            .run(self.invocation(&["logs", "--tail", &tail_arg, name]))
            .await?;
        let mut combined = output.stdout;
        if !output.stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&output.stderr);
        }
        Ok(combined)
    }

    pub async fn exec(&self, name: &str, command: &[&str]) -> Result<CommandOutput, RuntimeError> {
        let mut parts = vec!["exec", name];
        parts.extend_from_slice(command);
        self.run(self.invocation(&parts)).await
    }

    pub async fn stats(&self, name: &str) -> Result<Option<StatsRecord>, RuntimeError> {
        let output = self
            .run(self.invocation(&["stats", "--no-stream", "--format", JSON_FORMAT, name]))
            .await?;
        if !output.success() {
            return Ok(None);
        }
        let records: Vec<StatsRecord> = parse_record_lines(&output.stdout, "stats")?;
        Ok(records.into_iter().next())
    }

    // --- images ---

    pub async fn list_images(&self) -> Result<Vec<ImageRecord>, RuntimeError> {
        let output = self
            .run_checked(self.invocation(&["images", "--format", JSON_FORMAT]))
            .await?;
        parse_record_lines(&output.stdout, "image")
    }

    /// Removes an image by reference. `Ok(false)` when no such image exists;
    /// an in-use image is an error the caller decides how to handle.
    pub async fn remove_image(&self, reference: &str) -> Result<bool, RuntimeError> {
        let invocation = self.invocation(&["rmi", reference]);
        let command = invocation.display();
        let output = self.run(invocation).await?;
        if output.success() {
            Ok(true)
        } else if is_not_found(&output) {
            debug!(image = reference, "remove skipped, image not found");
            Ok(false)
        } else {
            Err(RuntimeError::CommandFailed { command, output })
        }
    }

    pub async fn pull(&self, reference: &str, platform: &str) -> Result<(), RuntimeError> {
        self.run_checked(self.invocation(&["pull", "--platform", platform, reference]))
            .await?;
        Ok(())
    }

    pub async fn build(
        &self,
        build_file: &Path,
        tag: &str,
        platform: &str,
        context: &Path,
        envs: Vec<(String, String)>,
    ) -> Result<(), RuntimeError> {
        let file = build_file.to_string_lossy();
        let ctx = context.to_string_lossy();
        let invocation = self
            .invocation(&["build", "--platform", platform, "-f", &file, "-t", tag, &ctx])
            .with_envs(envs);
        self.run_checked(invocation).await?;
        Ok(())
    }

    pub async fn buildx_build(
        &self,
        build_file: &Path,
        tag: &str,
        platform: &str,
        context: &Path,
    ) -> Result<(), RuntimeError> {
        let file = build_file.to_string_lossy();
        let ctx = context.to_string_lossy();
        // --load lands the result in the local image store
        let invocation = self.invocation(&[
            "buildx", "build", "--platform", platform, "--load", "-f", &file, "-t", tag, &ctx,
        ]);
        self.run_checked(invocation).await?;
        Ok(())
    }

    pub async fn buildx_available(&self) -> Result<bool, RuntimeError> {
        let output = self.run(self.invocation(&["buildx", "version"])).await?;
        Ok(output.success())
    }

    // --- volumes ---

    pub async fn list_volumes(&self) -> Result<Vec<VolumeRecord>, RuntimeError> {
        let output = self
            .run_checked(self.invocation(&["volume", "ls", "--format", JSON_FORMAT]))
            .await?;
        parse_record_lines(&output.stdout, "volume")
    }

    pub async fn volume_exists(&self, name: &str) -> Result<bool, RuntimeError> {
        let volumes = self.list_volumes().await?;
        Ok(volumes.iter().any(|v| v.name == name))
    }

    pub async fn create_volume(&self, name: &str) -> Result<(), RuntimeError> {
        self.run_checked(self.invocation(&["volume", "create", name]))
            .await?;
        Ok(())
    }

    /// Removes a volume. `Ok(false)` when no such volume exists.
    pub async fn remove_volume(&self, name: &str) -> Result<bool, RuntimeError> {
        let invocation = self.invocation(&["volume", "rm", name]);
        let command = invocation.display();
        let output = self.run(invocation).await?;
        if output.success() {
            Ok(true)
        } else if is_not_found(&output) {
            debug!(volume = name, "remove skipped, volume not found");
            Ok(false)
        } else {
            Err(RuntimeError::CommandFailed { command, output })
        }
    }

    // --- networks ---

    pub async fn list_networks(&self) -> Result<Vec<NetworkRecord>, RuntimeError> {
        let output = self
            .run_checked(self.invocation(&["network", "ls", "--format", JSON_FORMAT]))
            .await?;
        parse_record_lines(&output.stdout, "network")
    }

    /// Removes a network. `Ok(false)` when no such network exists.
    pub async fn remove_network(&self, name: &str) -> Result<bool, RuntimeError> {
        let invocation = self.invocation(&["network", "rm", name]);
        let command = invocation.display();
        let output = self.run(invocation).await?;
        if output.success() {
            Ok(true)
        } else if is_not_found(&output) {
            debug!(network = name, "remove skipped, network not found");
            Ok(false)
        } else {
            Err(RuntimeError::CommandFailed { command, output })
        }
    }

    // --- prunes ---

    pub async fn prune_build_cache(&self) -> Result<(), RuntimeError> {
        self.run_checked(self.invocation(&["builder", "prune", "--force"]))
            .await?;
        Ok(())
    }

    pub async fn prune_images(&self) -> Result<(), RuntimeError> {
        self.run_checked(self.invocation(&["image", "prune", "--force"]))
            .await?;
        Ok(())
    }

    pub async fn prune_volumes(&self) -> Result<(), RuntimeError> {
        self.run_checked(self.invocation(&["volume", "prune", "--force"]))
            .await?;
        Ok(())
    }

    pub async fn prune_networks(&self) -> Result<(), RuntimeError> {
        self.run_checked(self.invocation(&["network", "prune", "--force"]))
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for RuntimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeClient")
            .field("program", &self.program)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::mock::MockRunner;
    use crate::service::{PortBinding, ProbeSpec, ServiceKind, VolumeBinding};
    use std::path::PathBuf;

    fn client(runner: &Arc<MockRunner>) -> RuntimeClient {
        RuntimeClient::new("docker", Arc::clone(runner) as Arc<dyn CommandRunner>)
    }

    fn sample_spec() -> ServiceSpec {
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
            env: vec![("POSTGRES_USER".to_string(), "postgres".to_string())],
            port: PortBinding {
                host: 5432,
                container: 5432,
            },
            volumes: vec![
                VolumeBinding {
                    source: "pgvector_data".to_string(),
                    target: "/var/lib/postgresql/data".to_string(),
                    read_only: false,
                },
                VolumeBinding {
                    source: "/tmp/initdb".to_string(),
                    target: "/docker-entrypoint-initdb.d".to_string(),
                    read_only: true,
                },
            ],
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

    #[tokio::test]
    async fn test_find_container_matches_exact_name() {
        let runner = Arc::new(MockRunner::new());
        runner.push_success(concat!(
            r#"{"ID":"a1","Names":"pgvector-old","State":"exited","Status":"Exited (0) 2 days ago"}"#,
            "\n",
            r#"{"ID":"b2","Names":"pgvector","State":"running","Status":"Up 3 minutes"}"#,
        ));

        let found = client(&runner).find_container("pgvector").await.unwrap();
        assert_eq!(found.unwrap().id, "b2");
        assert_eq!(
            runner.invocation_lines(),
            vec!["docker ps -a --no-trunc --format {{json .}}"]
        );
    }

    #[tokio::test]
    async fn test_find_container_absent() {
        let runner = Arc::new(MockRunner::new());
        runner.push_success("");
        let found = client(&runner).find_container("pgvector").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_stop_tolerates_missing_container() {
        let runner = Arc::new(MockRunner::new());
        runner.push_failure(1, "Error response from daemon: No such container: pgvector");
        let stopped = client(&runner).stop_container("pgvector").await.unwrap();
        assert!(!stopped);
    }

    #[tokio::test]
    async fn test_stop_propagates_other_failures() {
        let runner = Arc::new(MockRunner::new());
        runner.push_failure(1, "Error response from daemon: cannot connect");
        let result = client(&runner).stop_container("pgvector").await;
        assert!(matches!(result, Err(RuntimeError::CommandFailed { .. })));
    }

    #[tokio::test]
    async fn test_remove_image_not_found() {
        let runner = Arc::new(MockRunner::new());
        runner.push_failure(1, "Error: No such image: pgvector-local:latest");
        let removed = client(&runner)
            .remove_image("pgvector-local:latest")
            .await
            .unwrap();
        assert!(!removed);
    }

    #[tokio::test]
    async fn test_run_container_arg_shape() {
        let runner = Arc::new(MockRunner::new());
        runner.push_success("abc123\n");
        let spec = sample_spec();

        let id = client(&runner)
            .run_container(&spec, &spec.image, None)
            .await
            .unwrap();
        assert_eq!(id, "abc123");

        let line = &runner.invocation_lines()[0];
        assert!(line.starts_with("docker run -d --name pgvector --platform linux/amd64"));
        assert!(line.contains("--memory 1g"));
        assert!(line.contains("--cpus 2"));
        assert!(line.contains("-e POSTGRES_USER=postgres"));
        assert!(line.contains("-p 5432:5432"));
        assert!(line.contains("-v pgvector_data:/var/lib/postgresql/data"));
        assert!(line.contains("-v /tmp/initdb:/docker-entrypoint-initdb.d:ro"));
        assert!(line.ends_with("pgvector-local:latest"));
    }

    #[tokio::test]
    async fn test_run_container_with_explicit_command() {
        let runner = Arc::new(MockRunner::new());
        runner.push_success("id\n");
        let spec = sample_spec();
        let command = vec!["postgres".to_string()];

        client(&runner)
            .run_container(&spec, &spec.image, Some(&command))
            .await
            .unwrap();

        assert!(runner.invocation_lines()[0].ends_with("pgvector-local:latest postgres"));
    }

    #[tokio::test]
    async fn test_container_logs_combines_streams() {
        let runner = Arc::new(MockRunner::new());
        runner.push_output(CommandOutput {
            code: Some(0),
            stdout: "boot line\n".to_string(),
            stderr: "FATAL: exiting\n".to_string(),
        });

        let logs = client(&runner).container_logs("pgvector", 50).await.unwrap();
        assert!(logs.contains("boot line"));
        assert!(logs.contains("FATAL: exiting"));
        assert_eq!(
            runner.invocation_lines(),
            vec!["docker logs --tail 50 pgvector"]
        );
    }

    #[tokio::test]
    async fn test_stats_absent_container() {
        let runner = Arc::new(MockRunner::new());
        runner.push_failure(1, "Error response from daemon: No such container: gone");
        let stats = client(&runner).stats("gone").await.unwrap();
        assert!(stats.is_none());
    }

    #[tokio::test]
    async fn test_buildx_available_probe() {
        let runner = Arc::new(MockRunner::new());
        runner.push_success("github.com/docker/buildx v0.14.0\n");
        assert!(client(&runner).buildx_available().await.unwrap());

        runner.push_failure(125, "docker: 'buildx' is not a docker command.");
        assert!(!client(&runner).buildx_available().await.unwrap());
    }

    #[tokio::test]
    async fn test_build_invocation_shape() {
        let runner = Arc::new(MockRunner::new());
        runner.push_success("");

        client(&runner)
            .build(
                Path::new("docker/pgvector.Dockerfile"),
                "pgvector-local:latest",
                "linux/arm64",
                Path::new("."),
                vec![("DOCKER_BUILDKIT".to_string(), "0".to_string())],
            )
            .await
            .unwrap();

        let invocations = runner.invocations();
        assert_eq!(
            invocations[0].display(),
            "docker build --platform linux/arm64 -f docker/pgvector.Dockerfile -t pgvector-local:latest ."
        );
        assert_eq!(
            invocations[0].envs,
            vec![("DOCKER_BUILDKIT".to_string(), "0".to_string())]
        );
    }

    #[tokio::test]
    async fn test_volume_exists() {
        let runner = Arc::new(MockRunner::new());
        runner.push_success(r#"{"Driver":"local","Name":"pgvector_data"}"#);
        assert!(client(&runner).volume_exists("pgvector_data").await.unwrap());

        runner.push_success(r#"{"Driver":"local","Name":"other"}"#);
        assert!(!client(&runner).volume_exists("pgvector_data").await.unwrap());
    }
}
