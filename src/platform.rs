//! Host architecture resolution
//!
//! Maps the host (or an explicit override) onto one of the two supported
//! platform profiles. Everything downstream pins this profile: image builds
//! get `--platform`, the inference build definition gets its per-arch
//! suffix, and container launches run against the same platform string.
//!
//! Resolution never fails. Unknown labels fall back to [`Arch::Amd64`] with
//! a warning, and the translation probe treats any probe failure as native
//! execution. Resolution runs exactly once per command.

use crate::runtime::{CommandRunner, Invocation};
use std::fmt;
use tracing::{debug, warn};

/// Supported CPU architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    /// 64-bit ARM (Apple Silicon, Graviton)
    Arm64,
    /// 64-bit x86
    Amd64,
}

impl Arch {
    /// Maps a reported architecture label onto a supported value.
    /// Both the Go-style and uname-style spellings are accepted.
    fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "arm64" | "aarch64" => Some(Self::Arm64),
            "amd64" | "x86_64" => Some(Self::Amd64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arm64 => "arm64",
            Self::Amd64 => "amd64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything architecture-dependent that the rest of the tool needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformProfile {
    pub arch: Arch,
    /// Platform string passed to build, pull and run, e.g. `linux/arm64`
    pub platform: String,
    /// Suffix substituted into per-arch build definition names
    pub build_suffix: &'static str,
}

impl PlatformProfile {
    pub fn for_arch(arch: Arch) -> Self {
        match arch {
            Arch::Arm64 => Self {
                arch,
                platform: "linux/arm64".to_string(),
                build_suffix: "arm64",
            },
            Arch::Amd64 => Self {
                arch,
                platform: "linux/amd64".to_string(),
                build_suffix: "amd64",
            },
        }
    }
}

impl fmt::Display for PlatformProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.platform)
    }
}

/// Resolves the platform profile from an optional override or the host.
///
/// An explicit override wins unconditionally. Without one, the compiled-in
/// host architecture is used, except that a host reporting x86_64 under a
/// binary translation layer resolves to the native [`Arch::Arm64`].
pub async fn resolve(override_arch: Option<&str>, runner: &dyn CommandRunner) -> PlatformProfile {
    resolve_from(
        override_arch,
        std::env::consts::ARCH,
        cfg!(target_os = "macos"),
        runner,
    )
    .await
}

async fn resolve_from(
    override_arch: Option<&str>,
    detected: &str,
    probe_translation: bool,
    runner: &dyn CommandRunner,
) -> PlatformProfile {
    if let Some(label) = override_arch {
        let arch = match Arch::from_label(label) {
            Some(arch) => arch,
            None => {
                warn!(
                    requested = label,
                    "unrecognized architecture override, defaulting to amd64"
                );
                Arch::Amd64
            }
        };
        debug!(%arch, "architecture pinned by override");
        return PlatformProfile::for_arch(arch);
    }

    let mut arch = match Arch::from_label(detected) {
        Some(arch) => arch,
        None => {
            warn!(
                detected = detected,
                "unrecognized host architecture, defaulting to amd64"
            );
            Arch::Amd64
        }
    };

    // An x86_64 process on Apple Silicon is running under Rosetta; the
    // container runtime on such hosts serves arm64 images natively.
    if arch == Arch::Amd64 && probe_translation && is_translated(runner).await {
        warn!("x86_64 reported under binary translation, preferring native arm64");
        arch = Arch::Arm64;
    }

    debug!(%arch, "architecture resolved from host");
    PlatformProfile::for_arch(arch)
}

/// Checks the translation flag the kernel exposes to translated processes.
/// Any failure to probe counts as native execution.
async fn is_translated(runner: &dyn CommandRunner) -> bool {
    let invocation = Invocation::new(
        "sysctl",
        vec!["-in".to_string(), "sysctl.proc_translated".to_string()],
    );
    match runner.run(invocation).await {
        Ok(output) if output.success() => output.stdout.trim() == "1",
        _ => false,
    }
}
