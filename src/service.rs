//! Service specifications
//!
//! A [`ServiceSpec`] is the complete, platform-resolved description of one
//! managed service: what to build, how to run it, how to tell it is ready,
//! and what its purge pattern covers. Specs are constructed once from
//! [`Settings`] plus the resolved [`PlatformProfile`] and treated as
//! read-only afterwards.

use crate::config::Settings;
use crate::platform::PlatformProfile;
use std::fmt;
use std::path::{Path, PathBuf};

/// Container-side ports are fixed by the images themselves.
const DB_CONTAINER_PORT: u16 = 5432;
const LLM_CONTAINER_PORT: u16 = 11434;

const DB_DATA_TARGET: &str = "/var/lib/postgresql/data";
const DB_SEED_TARGET: &str = "/docker-entrypoint-initdb.d";
const LLM_MODELS_TARGET: &str = "/root/.ollama";

/// The managed services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    VectorDb,
    Inference,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VectorDb => "vector-db",
            Self::Inference => "inference",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host to container port mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortBinding {
    pub host: u16,
    pub container: u16,
}

/// Named volume or host path mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBinding {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

/// How readiness is checked for a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeSpec {
    /// `pg_isready` executed inside the container
    Postgres { user: String, database: String },
    /// HTTP GET against the published host port, 2xx means ready
    Http { path: String },
}

/// Complete description of one managed service.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub kind: ServiceKind,
    /// Container name, also the anchor for idempotent re-provisioning
    pub name: String,
    /// Tag the local build produces
    pub image: String,
    /// Known-good public image used when local builds are exhausted
    pub fallback_image: Option<String>,
    /// Whether pulling the fallback image is an acceptable last resort
    pub allow_pull_fallback: bool,
    /// Build definition, already resolved for the target architecture
    pub build_file: PathBuf,
    pub build_context: PathBuf,
    /// Platform string pinned on build, pull and run
    pub platform: String,
    pub memory: String,
    pub cpus: String,
    pub env: Vec<(String, String)>,
    pub port: PortBinding,
    pub volumes: Vec<VolumeBinding>,
    /// The named volume that must exist before launch
    pub data_volume: String,
    /// Explicit command for the first launch attempt, `None` keeps the image default
    pub run_command: Option<Vec<String>>,
    /// Alternate command for the single launch retry
    pub alt_command: Option<Vec<String>>,
    pub probe: ProbeSpec,
    /// Model ensured present after readiness, inference only
    pub model: Option<String>,
    /// Pattern scoping `--zap` purges for this service
    pub purge_pattern: String,
}

impl ServiceSpec {
    /// The pgvector-enabled Postgres service.
    pub fn vector_db(settings: &Settings, profile: &PlatformProfile) -> Self {
        let db = &settings.db;
        Self {
            kind: ServiceKind::VectorDb,
            name: db.name.clone(),
            image: db.image.clone(),
            fallback_image: Some(db.fallback_image.clone()),
            allow_pull_fallback: true,
            build_file: db.build_file.clone(),
            build_context: PathBuf::from("."),
            platform: profile.platform.clone(),
            memory: db.memory.clone(),
            cpus: db.cpus.clone(),
            env: vec![
                ("POSTGRES_USER".to_string(), db.user.clone()),
                ("POSTGRES_PASSWORD".to_string(), db.password.clone()),
                ("POSTGRES_DB".to_string(), db.database.clone()),
            ],
            port: PortBinding {
                host: db.port,
                container: DB_CONTAINER_PORT,
            },
            volumes: vec![
                VolumeBinding {
                    source: db.volume.clone(),
                    target: DB_DATA_TARGET.to_string(),
                    read_only: false,
                },
                VolumeBinding {
                    source: absolutize(&db.seed_dir).display().to_string(),
                    target: DB_SEED_TARGET.to_string(),
                    read_only: true,
                },
            ],
            data_volume: db.volume.clone(),
            run_command: None,
            // The image entrypoint normally execs postgres itself; naming it
            // explicitly sidesteps entrypoint wrappers that die early
            alt_command: Some(vec!["postgres".to_string()]),
            probe: ProbeSpec::Postgres {
                user: db.user.clone(),
                database: db.database.clone(),
            },
            model: None,
            purge_pattern: db.purge_pattern.clone(),
        }
    }

    /// The Ollama-compatible inference service.
    pub fn inference(settings: &Settings, profile: &PlatformProfile) -> Self {
        let llm = &settings.llm;
        let build_file = llm.build_file.replace("{arch}", profile.build_suffix);
        Self {
            kind: ServiceKind::Inference,
            name: llm.name.clone(),
            image: llm.image.clone(),
            fallback_image: None,
            allow_pull_fallback: false,
            build_file: PathBuf::from(build_file),
            build_context: PathBuf::from("."),
            platform: profile.platform.clone(),
            memory: llm.memory.clone(),
            cpus: llm.cpus.clone(),
            env: vec![(
                "OLLAMA_HOST".to_string(),
                format!("0.0.0.0:{}", LLM_CONTAINER_PORT),
            )],
            port: PortBinding {
                host: llm.port,
                container: LLM_CONTAINER_PORT,
            },
            volumes: vec![VolumeBinding {
                source: llm.volume.clone(),
                target: LLM_MODELS_TARGET.to_string(),
                read_only: false,
            }],
            data_volume: llm.volume.clone(),
            run_command: None,
            // The image entrypoint is the ollama binary; `serve` repeats the
            // default command explicitly on retry
            alt_command: Some(vec!["serve".to_string()]),
            probe: ProbeSpec::Http {
                path: "/api/tags".to_string(),
            },
            model: Some(llm.model.clone()),
            purge_pattern: llm.purge_pattern.clone(),
        }
    }

    /// Image references this service may have created locally.
    pub fn known_images(&self) -> Vec<&str> {
        let mut images = vec![self.image.as_str()];
        if let Some(fallback) = &self.fallback_image {
            images.push(fallback.as_str());
        }
        images
    }

    /// Local files and directories this service's provisioning consumes.
    /// Read-only mounts are host-side seed material; writable mounts are
    /// named volumes and never local paths.
    pub fn local_artifacts(&self) -> Vec<PathBuf> {
        let mut artifacts = vec![self.build_file.clone()];
        for volume in &self.volumes {
            if volume.read_only {
                artifacts.push(PathBuf::from(&volume.source));
            }
        }
        artifacts
    }
}

/// Bind mount sources must be absolute paths; named volumes pass through.
fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let trimmed = path.strip_prefix(".").unwrap_or(path);
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(trimmed),
        Err(_) => path.to_path_buf(),
    }
}
