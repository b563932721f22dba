//! Teardown and purge of provisioned resources
//!
//! Teardown always removes the named container, its data volume and the
//! image references a service is known to create; a resource that is
//! already gone is logged and skipped, never an error. The optional purge
//! pass scans every container, volume, network and image for names
//! matching the configured pattern, case-insensitively, and removes the
//! matches. Global prunes and local file deletion run only behind an
//! injected confirmation policy, so non-interactive callers decide up
//! front instead of blocking on a prompt.

use crate::runtime::{RuntimeClient, RuntimeError};
use crate::service::ServiceSpec;
use regex::{Regex, RegexBuilder};
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Reclaim errors.
#[derive(Debug, Error)]
pub enum ReclaimError {
    #[error("invalid purge pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    /// An empty pattern would match every resource on the host.
    #[error("refusing to purge with an empty pattern")]
    EmptyPattern,

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Decides whether a destructive, non-scoped step may proceed.
pub trait ConfirmPolicy {
    fn confirm(&self, action: &str) -> bool;
}

/// Confirms everything. Used when `--force` is set.
pub struct AssumeYes;

impl ConfirmPolicy for AssumeYes {
    fn confirm(&self, _action: &str) -> bool {
        true
    }
}

/// Asks on the controlling terminal. Declines when stdin is not a tty,
/// so piped invocations never hang on a prompt.
pub struct TerminalPrompt;

impl ConfirmPolicy for TerminalPrompt {
    fn confirm(&self, action: &str) -> bool {
        if !atty::is(atty::Stream::Stdin) {
            warn!(action, "stdin is not a terminal, declining");
            return false;
        }
        eprint!("{}? [y/N] ", action);
        let _ = io::stderr().flush();
        let mut line = String::new();
        if io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

/// What a reclaim pass is allowed to touch beyond the named resources.
#[derive(Debug, Clone, Default)]
pub struct ReclaimOptions {
    /// Pattern-scoped purge across all resource kinds.
    pub zap: bool,
    /// Global prune of build cache, dangling images, unused volumes and
    /// networks. Confirmation-gated.
    pub prune: bool,
    /// Delete local build definitions and seed data. Confirmation-gated.
    pub clean_files: bool,
    /// Overrides the per-service purge patterns when set.
    pub pattern: Option<String>,
}

/// Resource kinds subject to the purge pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Container,
    Volume,
    Network,
    Image,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Volume => "volume",
            Self::Network => "network",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resource selected for removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMatch {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceMatch {
    fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Everything a reclaim pass did, for the end-of-run summary.
#[derive(Debug, Default)]
pub struct ReclaimReport {
    pub removed: Vec<ResourceMatch>,
    pub pruned: Vec<String>,
    pub cleaned_files: Vec<PathBuf>,
    pub skipped: Vec<String>,
}

impl ReclaimReport {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
            && self.pruned.is_empty()
            && self.cleaned_files.is_empty()
            && self.skipped.is_empty()
    }
}

impl fmt::Display for ReclaimReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "nothing to reclaim");
        }
        for resource in &self.removed {
            writeln!(f, "removed {} {}", resource.kind, resource.name)?;
        }
        for pass in &self.pruned {
            writeln!(f, "pruned {}", pass)?;
        }
        for path in &self.cleaned_files {
            writeln!(f, "deleted {}", path.display())?;
        }
        for step in &self.skipped {
            writeln!(f, "skipped {}", step)?;
        }
        Ok(())
    }
}

/// Removes a service's resources, optionally purging by pattern.
pub struct Reclaimer<'a> {
    client: &'a RuntimeClient,
    confirm: &'a dyn ConfirmPolicy,
}

impl<'a> Reclaimer<'a> {
    pub fn new(client: &'a RuntimeClient, confirm: &'a dyn ConfirmPolicy) -> Self {
        Self { client, confirm }
    }

    /// Tears down the given services and applies the optional passes.
    pub async fn teardown(
        &self,
        specs: &[ServiceSpec],
        opts: &ReclaimOptions,
    ) -> Result<ReclaimReport, ReclaimError> {
        // The purge pattern is validated before anything is mutated
        let purge_regex = if opts.zap {
            Some(compile_pattern(&effective_pattern(specs, opts))?)
        } else {
            None
        };

        let mut report = ReclaimReport::default();

        for spec in specs {
            self.remove_named(spec, &mut report).await?;
        }

        if let Some(regex) = &purge_regex {
            self.purge_matching(regex, &mut report).await?;
        }

        if opts.prune {
            if self
                .confirm
                .confirm("prune the build cache and all unused images, volumes and networks")
            {
                self.prune_all(&mut report).await?;
            } else {
                info!("prune declined, skipping");
                report.skipped.push("global prune".to_string());
            }
        }

        if opts.clean_files {
            if self.confirm.confirm("delete generated local files") {
                self.clean_files(specs, &mut report);
            } else {
                info!("file cleanup declined, skipping");
                report.skipped.push("local file cleanup".to_string());
            }
        }

        Ok(report)
    }

    /// The always-on part of teardown: the named container, its data
    /// volume and the known image references.
    async fn remove_named(
        &self,
        spec: &ServiceSpec,
        report: &mut ReclaimReport,
    ) -> Result<(), ReclaimError> {
        match self.client.find_container(&spec.name).await? {
            Some(existing) => {
                if existing.is_running() {
                    info!(container = %spec.name, "stopping container");
                    self.client.stop_container(&spec.name).await?;
                }
                if self.client.remove_container(&spec.name, true).await? {
                    info!(container = %spec.name, "removed container");
                    report
                        .removed
                        .push(ResourceMatch::new(ResourceKind::Container, &spec.name));
                }
            }
            None => info!(container = %spec.name, "container not found, nothing to remove"),
        }

        if self.client.remove_volume(&spec.data_volume).await? {
            info!(volume = %spec.data_volume, "removed volume");
            report
                .removed
                .push(ResourceMatch::new(ResourceKind::Volume, &spec.data_volume));
        } else {
            info!(volume = %spec.data_volume, "volume not found, nothing to remove");
        }

        for image in spec.known_images() {
            match self.client.remove_image(image).await {
                Ok(true) => {
                    info!(image, "removed image");
                    report
                        .removed
                        .push(ResourceMatch::new(ResourceKind::Image, image));
                }
                Ok(false) => info!(image, "image not found, nothing to remove"),
                // In-use images stay behind; containers outside our naming
                // scheme may layer on them
                Err(RuntimeError::CommandFailed { output, .. }) => {
                    warn!(image, detail = %output.diagnostic_tail(1), "image not removed");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }

    /// Pattern purge across all resource kinds. Each kind is enumerated
    /// fresh immediately before its removals.
    async fn purge_matching(
        &self,
        regex: &Regex,
        report: &mut ReclaimReport,
    ) -> Result<(), ReclaimError> {
        info!(pattern = %regex.as_str(), "purging resources matching pattern");

        // Containers go first so volumes, networks and images are released
        for container in self.client.list_containers().await? {
            let matched = container
                .names
                .split(',')
                .map(str::trim)
                .find(|name| regex.is_match(name))
                .map(str::to_string);
            let name = match matched {
                Some(name) => name,
                None => continue,
            };
            if self
                .remove_tolerant(ResourceKind::Container, &container.id, &name)
                .await?
            {
                report
                    .removed
                    .push(ResourceMatch::new(ResourceKind::Container, name));
            }
        }

        for volume in self.client.list_volumes().await? {
            if !regex.is_match(&volume.name) {
                continue;
            }
            if self
                .remove_tolerant(ResourceKind::Volume, &volume.name, &volume.name)
                .await?
            {
                report
                    .removed
                    .push(ResourceMatch::new(ResourceKind::Volume, &volume.name));
            }
        }

        for network in self.client.list_networks().await? {
            if network.is_builtin() {
                debug!(network = %network.name, "built-in network, never purged");
                continue;
            }
            if !regex.is_match(&network.name) {
                continue;
            }
            if self
                .remove_tolerant(ResourceKind::Network, &network.name, &network.name)
                .await?
            {
                report
                    .removed
                    .push(ResourceMatch::new(ResourceKind::Network, &network.name));
            }
        }

        for image in self.client.list_images().await? {
            let reference = image.reference();
            if !regex.is_match(&reference) {
                continue;
            }
            if self
                .remove_tolerant(ResourceKind::Image, &reference, &reference)
                .await?
            {
                report
                    .removed
                    .push(ResourceMatch::new(ResourceKind::Image, reference));
            }
        }

        Ok(())
    }

    /// Removes one resource, tolerating individual failures so the purge
    /// pass completes. Only spawn-level errors abort.
    async fn remove_tolerant(
        &self,
        kind: ResourceKind,
        id: &str,
        name: &str,
    ) -> Result<bool, ReclaimError> {
        let result = match kind {
            ResourceKind::Container => self.client.remove_container(id, true).await,
            ResourceKind::Volume => self.client.remove_volume(id).await,
            ResourceKind::Network => self.client.remove_network(id).await,
            ResourceKind::Image => self.client.remove_image(id).await,
        };
        match result {
            Ok(true) => {
                info!(kind = %kind, name, "removed");
                Ok(true)
            }
            Ok(false) => {
                debug!(kind = %kind, name, "already gone");
                Ok(false)
            }
            Err(RuntimeError::CommandFailed { output, .. }) => {
                warn!(kind = %kind, name, detail = %output.diagnostic_tail(1), "not removed");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Global prunes, not pattern-scoped. A failed pass is reported and
    /// the rest still run.
    async fn prune_all(&self, report: &mut ReclaimReport) -> Result<(), ReclaimError> {
        record_prune(
            self.client.prune_build_cache().await,
            "build cache",
            report,
        )?;
        record_prune(self.client.prune_images().await, "dangling images", report)?;
        record_prune(self.client.prune_volumes().await, "unused volumes", report)?;
        record_prune(
            self.client.prune_networks().await,
            "unused networks",
            report,
        )?;
        Ok(())
    }

    fn clean_files(&self, specs: &[ServiceSpec], report: &mut ReclaimReport) {
        for spec in specs {
            for artifact in spec.local_artifacts() {
                match remove_artifact(&artifact) {
                    Ok(true) => {
                        info!(path = %artifact.display(), "deleted");
                        report.cleaned_files.push(artifact);
                    }
                    Ok(false) => debug!(path = %artifact.display(), "already absent"),
                    Err(err) => {
                        warn!(path = %artifact.display(), error = %err, "could not delete")
                    }
                }
            }
        }
    }
}

fn record_prune(
    result: Result<(), RuntimeError>,
    pass: &str,
    report: &mut ReclaimReport,
) -> Result<(), ReclaimError> {
    match result {
        Ok(()) => {
            info!(pass, "pruned");
            report.pruned.push(pass.to_string());
            Ok(())
        }
        Err(RuntimeError::CommandFailed { output, .. }) => {
            warn!(pass, detail = %output.diagnostic_tail(1), "prune failed");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// The explicit override wins; otherwise the per-service patterns are
/// joined into one alternation.
fn effective_pattern(specs: &[ServiceSpec], opts: &ReclaimOptions) -> String {
    if let Some(pattern) = &opts.pattern {
        return pattern.clone();
    }
    specs
        .iter()
        .map(|s| s.purge_pattern.as_str())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("|")
}

fn compile_pattern(pattern: &str) -> Result<Regex, ReclaimError> {
    if pattern.is_empty() {
        return Err(ReclaimError::EmptyPattern);
    }
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| ReclaimError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// `Ok(false)` when the path is already absent.
fn remove_artifact(path: &Path) -> io::Result<bool> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if metadata.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else {
        std::fs::remove_file(path)?;
    }
    Ok(true)
}
