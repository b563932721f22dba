//! Configuration management for dockhand
//!
//! All settings load from environment variables with sensible defaults and
//! are captured once at startup into an immutable [`Settings`] value. No
//! other component reads the process environment; everything downstream
//! receives its parameters from this snapshot.
//!
//! # Environment Variables
//!
//! ## Runtime
//! - `DOCKHAND_RUNTIME`: Container runtime binary (docker|podman|path) - default: "docker"
//! - `DOCKHAND_ARCH`: Architecture override (arm64|amd64) - default: detected from host
//!
//! ## Vector database service
//! - `DOCKHAND_DB_NAME`: Container name - default: "pgvector"
//! - `DOCKHAND_DB_VOLUME`: Data volume name - default: "<name>_data"
//! - `DOCKHAND_DB_PORT`: Host port - default: "5432"
//! - `DOCKHAND_DB_IMAGE`: Locally built image tag - default: "pgvector-local:latest"
//! - `DOCKHAND_DB_FALLBACK_IMAGE`: Known-good public image - default: "pgvector/pgvector:pg16"
//! - `DOCKHAND_DB_BUILD_FILE`: Build definition path - default: "docker/pgvector.Dockerfile"
//! - `DOCKHAND_DB_MEMORY`: Memory limit - default: "1g"
//! - `DOCKHAND_DB_CPUS`: CPU limit - default: "2"
//! - `DOCKHAND_DB_USER` / `DOCKHAND_DB_PASSWORD`: Credentials - default: "postgres"/"postgres"
//! - `DOCKHAND_DB_DATABASE`: Database name - default: "vectors"
//! - `DOCKHAND_DB_SEED_DIR`: Host directory mounted for first-run seeding - default: "./initdb"
//! - `DOCKHAND_DB_PURGE_PATTERN`: Purge pattern for --zap - default: "pgvector|vectordb"
//!
//! ## Inference service
//! - `DOCKHAND_LLM_NAME`: Container name - default: "ollama"
//! - `DOCKHAND_LLM_VOLUME`: Model volume name - default: "<name>_models"
//! - `DOCKHAND_LLM_PORT`: Host port - default: "11434"
//! - `DOCKHAND_LLM_IMAGE`: Locally built image tag - default: "ollama-local:latest"
//! - `DOCKHAND_LLM_BUILD_FILE`: Build definition path, `{arch}` expands to the
//!   resolved architecture suffix - default: "docker/ollama.{arch}.Dockerfile"
//! - `DOCKHAND_LLM_MEMORY`: Memory limit - default: "4g"
//! - `DOCKHAND_LLM_CPUS`: CPU limit - default: "4"
//! - `DOCKHAND_LLM_MODEL`: Model ensured present after startup - default: "qwen2.5-coder:7b"
//! - `DOCKHAND_LLM_PURGE_PATTERN`: Purge pattern for --zap - default: "ollama|llm-server"
//!
//! ## Behavior
//! - `DOCKHAND_PROBE_ROUNDS`: Readiness probe attempts - default: "30"
//! - `DOCKHAND_PROBE_INTERVAL_SECS`: Seconds between probe attempts - default: "2"
//! - `DOCKHAND_GRACE_SECS`: Seconds a container must survive after start - default: "3"
//! - `DOCKHAND_LOG_TAIL`: Log lines captured on failure - default: "50"
//! - `DOCKHAND_PURGE_PATTERN`: Global purge pattern overriding the per-service ones
//! - `DOCKHAND_ASSUME_YES`: Skip confirmation prompts (true|false) - default: "false"
//! - `DOCKHAND_ZAP` / `DOCKHAND_PRUNE` / `DOCKHAND_CLEAN_FILES`: Teardown modes,
//!   equivalent to the matching CLI flags (true|false) - default: "false"
//!
//! Logging is configured separately via `DOCKHAND_LOG_LEVEL` and
//! `DOCKHAND_LOG_JSON`; see [`crate::util::logging`].

use regex::RegexBuilder;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default values for configuration
const DEFAULT_RUNTIME: &str = "docker";
const DEFAULT_DB_NAME: &str = "pgvector";
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_DB_IMAGE: &str = "pgvector-local:latest";
const DEFAULT_DB_FALLBACK_IMAGE: &str = "pgvector/pgvector:pg16";
const DEFAULT_DB_BUILD_FILE: &str = "docker/pgvector.Dockerfile";
const DEFAULT_DB_MEMORY: &str = "1g";
const DEFAULT_DB_CPUS: &str = "2";
const DEFAULT_DB_USER: &str = "postgres";
const DEFAULT_DB_PASSWORD: &str = "postgres";
const DEFAULT_DB_DATABASE: &str = "vectors";
const DEFAULT_DB_SEED_DIR: &str = "./initdb";
const DEFAULT_DB_PURGE_PATTERN: &str = "pgvector|vectordb";
const DEFAULT_LLM_NAME: &str = "ollama";
const DEFAULT_LLM_PORT: u16 = 11434;
const DEFAULT_LLM_IMAGE: &str = "ollama-local:latest";
const DEFAULT_LLM_BUILD_FILE: &str = "docker/ollama.{arch}.Dockerfile";
const DEFAULT_LLM_MEMORY: &str = "4g";
const DEFAULT_LLM_CPUS: &str = "4";
const DEFAULT_LLM_MODEL: &str = "qwen2.5-coder:7b";
const DEFAULT_LLM_PURGE_PATTERN: &str = "ollama|llm-server";
const DEFAULT_PROBE_ROUNDS: u32 = 30;
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 2;
const DEFAULT_GRACE_SECS: u64 = 3;
const DEFAULT_LOG_TAIL: u32 = 50;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// A purge pattern is not a valid regular expression
    #[error("Invalid purge pattern '{pattern}': {error}")]
    InvalidPattern { pattern: String, error: String },
}

/// Vector database service settings.
#[derive(Debug, Clone)]
pub struct DbSettings {
    pub name: String,
    pub volume: String,
    pub port: u16,
    pub image: String,
    pub fallback_image: String,
    pub build_file: PathBuf,
    pub memory: String,
    pub cpus: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub seed_dir: PathBuf,
    pub purge_pattern: String,
}

/// Inference service settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub name: String,
    pub volume: String,
    pub port: u16,
    pub image: String,
    /// May contain an `{arch}` placeholder expanded at spec construction.
    pub build_file: String,
    pub memory: String,
    pub cpus: String,
    pub model: String,
    pub purge_pattern: String,
}

/// Immutable snapshot of all dockhand settings.
///
/// Constructed once at startup via [`Settings::from_env`] (or
/// `Default::default()`, which is the same thing) and passed by reference
/// everywhere else.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Container runtime binary to invoke
    pub runtime: String,

    /// Explicit architecture override, `None` to detect from the host
    pub arch: Option<String>,

    pub db: DbSettings,
    pub llm: LlmSettings,

    /// Readiness probe attempts before giving up
    pub probe_rounds: u32,

    /// Seconds between readiness probe attempts
    pub probe_interval_secs: u64,

    /// Seconds a freshly started container must survive before it counts
    pub grace_secs: u64,

    /// Log lines captured from a failed container
    pub log_tail: u32,

    /// Global purge pattern overriding the per-service patterns
    pub purge_pattern: Option<String>,

    /// Skip confirmation prompts
    pub assume_yes: bool,

    /// Teardown mode flags, OR'd with the matching CLI flags
    pub zap: bool,
    pub prune: bool,
    pub clean_files: bool,
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false)
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_env()
    }
}

impl Settings {
    /// Loads settings from `DOCKHAND_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let db_name = env_string("DOCKHAND_DB_NAME", DEFAULT_DB_NAME);
        let db_volume = env_string("DOCKHAND_DB_VOLUME", &format!("{}_data", db_name));
        let llm_name = env_string("DOCKHAND_LLM_NAME", DEFAULT_LLM_NAME);
        let llm_volume = env_string("DOCKHAND_LLM_VOLUME", &format!("{}_models", llm_name));

        let db = DbSettings {
            name: db_name,
            volume: db_volume,
            port: env_parse("DOCKHAND_DB_PORT", DEFAULT_DB_PORT),
            image: env_string("DOCKHAND_DB_IMAGE", DEFAULT_DB_IMAGE),
            fallback_image: env_string("DOCKHAND_DB_FALLBACK_IMAGE", DEFAULT_DB_FALLBACK_IMAGE),
            build_file: PathBuf::from(env_string("DOCKHAND_DB_BUILD_FILE", DEFAULT_DB_BUILD_FILE)),
            memory: env_string("DOCKHAND_DB_MEMORY", DEFAULT_DB_MEMORY),
            cpus: env_string("DOCKHAND_DB_CPUS", DEFAULT_DB_CPUS),
            user: env_string("DOCKHAND_DB_USER", DEFAULT_DB_USER),
            password: env_string("DOCKHAND_DB_PASSWORD", DEFAULT_DB_PASSWORD),
            database: env_string("DOCKHAND_DB_DATABASE", DEFAULT_DB_DATABASE),
            seed_dir: PathBuf::from(env_string("DOCKHAND_DB_SEED_DIR", DEFAULT_DB_SEED_DIR)),
            purge_pattern: env_string("DOCKHAND_DB_PURGE_PATTERN", DEFAULT_DB_PURGE_PATTERN),
        };

        let llm = LlmSettings {
            name: llm_name,
            volume: llm_volume,
            port: env_parse("DOCKHAND_LLM_PORT", DEFAULT_LLM_PORT),
            image: env_string("DOCKHAND_LLM_IMAGE", DEFAULT_LLM_IMAGE),
            build_file: env_string("DOCKHAND_LLM_BUILD_FILE", DEFAULT_LLM_BUILD_FILE),
            memory: env_string("DOCKHAND_LLM_MEMORY", DEFAULT_LLM_MEMORY),
            cpus: env_string("DOCKHAND_LLM_CPUS", DEFAULT_LLM_CPUS),
            model: env_string("DOCKHAND_LLM_MODEL", DEFAULT_LLM_MODEL),
            purge_pattern: env_string("DOCKHAND_LLM_PURGE_PATTERN", DEFAULT_LLM_PURGE_PATTERN),
        };

        Self {
            runtime: env_string("DOCKHAND_RUNTIME", DEFAULT_RUNTIME),
            arch: env_opt("DOCKHAND_ARCH"),
            db,
            llm,
            probe_rounds: env_parse("DOCKHAND_PROBE_ROUNDS", DEFAULT_PROBE_ROUNDS),
            probe_interval_secs: env_parse(
                "DOCKHAND_PROBE_INTERVAL_SECS",
                DEFAULT_PROBE_INTERVAL_SECS,
            ),
            grace_secs: env_parse("DOCKHAND_GRACE_SECS", DEFAULT_GRACE_SECS),
            log_tail: env_parse("DOCKHAND_LOG_TAIL", DEFAULT_LOG_TAIL),
            purge_pattern: env_opt("DOCKHAND_PURGE_PATTERN"),
            assume_yes: env_flag("DOCKHAND_ASSUME_YES"),
            zap: env_flag("DOCKHAND_ZAP"),
            prune: env_flag("DOCKHAND_PRUNE"),
            clean_files: env_flag("DOCKHAND_CLEAN_FILES"),
        }
    }

    /// Validates the configuration.
    ///
    /// Checks that names are present and distinct, ports are usable, probe
    /// parameters are non-zero, and purge patterns compile.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any validation fails
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Runtime binary name must not be empty".to_string(),
            ));
        }

        if self.db.name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Vector database container name must not be empty".to_string(),
            ));
        }
        if self.llm.name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Inference container name must not be empty".to_string(),
            ));
        }
        if self.db.name == self.llm.name {
            return Err(ConfigError::ValidationFailed(format!(
                "Services must use distinct container names, both are '{}'",
                self.db.name
            )));
        }

        if self.db.port == 0 {
            return Err(ConfigError::ValidationFailed(
                "Vector database port must not be 0".to_string(),
            ));
        }
        if self.llm.port == 0 {
            return Err(ConfigError::ValidationFailed(
                "Inference port must not be 0".to_string(),
            ));
        }

        if self.probe_rounds == 0 {
            return Err(ConfigError::ValidationFailed(
                "Probe rounds must be at least 1".to_string(),
            ));
        }
        if self.probe_interval_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Probe interval must be at least 1 second".to_string(),
            ));
        }

        for pattern in [&self.db.purge_pattern, &self.llm.purge_pattern]
            .into_iter()
            .chain(self.purge_pattern.as_ref())
        {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    error: e.to_string(),
                })?;
        }

        Ok(())
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dockhand Configuration:")?;
        writeln!(f, "  Runtime: {}", self.runtime)?;
        writeln!(
            f,
            "  Architecture: {}",
            self.arch.as_deref().unwrap_or("(detected)")
        )?;
        writeln!(f, "  Vector database:")?;
        writeln!(f, "    Name: {}", self.db.name)?;
        writeln!(f, "    Image: {}", self.db.image)?;
        writeln!(f, "    Port: {}", self.db.port)?;
        writeln!(f, "    Volume: {}", self.db.volume)?;
        writeln!(f, "  Inference:")?;
        writeln!(f, "    Name: {}", self.llm.name)?;
        writeln!(f, "    Image: {}", self.llm.image)?;
        writeln!(f, "    Port: {}", self.llm.port)?;
        writeln!(f, "    Volume: {}", self.llm.volume)?;
        writeln!(f, "    Model: {}", self.llm.model)?;
        writeln!(
            f,
            "  Probe: {} rounds x {}s",
            self.probe_rounds, self.probe_interval_secs
        )?;
        writeln!(f, "  Grace Period: {}s", self.grace_secs)?;
        writeln!(f, "  Log Tail: {} lines", self.log_tail)?;
        Ok(())
    }
}
