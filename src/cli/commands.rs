use clap::{Parser, Subcommand, ValueEnum};

/// Idempotent provisioning and teardown of local container-based dev dependencies
#[derive(Parser, Debug)]
#[command(
    name = "dockhand",
    about = "Provision and tear down local container-based dev dependencies",
    version,
    author,
    long_about = "dockhand builds, launches and health-gates the local containers a \
                  development workflow depends on: a pgvector-enabled Postgres and an \
                  Ollama-compatible inference server. Provisioning is idempotent; \
                  re-running converges on one healthy container per service. Teardown \
                  removes the named resources and can optionally purge everything \
                  matching the configured pattern."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Increase verbosity")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Build, launch and health-gate services",
        long_about = "Resolves the target platform, builds (or pulls) the service image, \
                      replaces any existing container under the service name and waits \
                      until the readiness probe passes.\n\n\
                      Examples:\n  \
                      dockhand up\n  \
                      dockhand up --service vector-db\n  \
                      DOCKHAND_ARCH=arm64 dockhand up --service inference"
    )]
    Up(UpArgs),

    #[command(
        about = "Stop and remove provisioned resources",
        long_about = "Removes the named containers, data volumes and locally built \
                      images. Resources that are already gone are skipped. --zap \
                      additionally purges every container, image, volume and network \
                      whose name matches the purge pattern.\n\n\
                      Examples:\n  \
                      dockhand down\n  \
                      dockhand down --zap\n  \
                      dockhand down --force --zap --prune-build-cache --clean-files"
    )]
    Down(DownArgs),

    #[command(
        about = "Check service health and resource usage",
        long_about = "Runs liveness, readiness and one real round-trip request per \
                      service, then reports timing and resource usage. Exits non-zero \
                      when any check fails.\n\n\
                      Examples:\n  \
                      dockhand status\n  \
                      dockhand status --service inference --format json"
    )]
    Status(StatusArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct UpArgs {
    #[arg(
        short = 's',
        long,
        value_enum,
        default_value = "all",
        help = "Service to provision"
    )]
    pub service: ServiceArg,
}

#[derive(Parser, Debug, Clone)]
pub struct DownArgs {
    #[arg(
        short = 's',
        long,
        value_enum,
        default_value = "all",
        help = "Service to tear down"
    )]
    pub service: ServiceArg,

    #[arg(short = 'f', long, help = "Skip confirmation prompts")]
    pub force: bool,

    #[arg(
        long,
        help = "Purge every container, image, volume and network matching the purge pattern"
    )]
    pub zap: bool,

    #[arg(
        long,
        help = "Prune the build cache and all unused images, volumes and networks"
    )]
    pub prune_build_cache: bool,

    #[arg(long, help = "Delete generated build definitions and seed data")]
    pub clean_files: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct StatusArgs {
    #[arg(
        short = 's',
        long,
        value_enum,
        default_value = "all",
        help = "Service to check"
    )]
    pub service: ServiceArg,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

/// Which managed services a command applies to.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceArg {
    VectorDb,
    Inference,
    All,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}
