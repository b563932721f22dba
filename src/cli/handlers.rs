//! Command handlers for the dockhand CLI
//!
//! Each handler drives one subcommand end to end and returns a process exit
//! code. Errors are logged through `tracing`; captured runtime output is
//! echoed to stderr so the user sees what the container runtime said.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use crate::cli::commands::{DownArgs, ServiceArg, StatusArgs, UpArgs};
use crate::cli::output::OutputFormatter;
use crate::config::Settings;
use crate::diag::Diagnostics;
use crate::platform::{self, PlatformProfile};
use crate::provision::Provisioner;
use crate::reclaim::{AssumeYes, ConfirmPolicy, ReclaimOptions, Reclaimer, TerminalPrompt};
use crate::runtime::{CommandRunner, RuntimeClient, SystemRunner};
use crate::service::ServiceSpec;

/// Everything a handler needs: validated settings, a client bound to the
/// system runner and the specs the command applies to.
struct Session {
    settings: Settings,
    client: RuntimeClient,
    specs: Vec<ServiceSpec>,
}

async fn open_session(service: ServiceArg) -> anyhow::Result<Session> {
    let settings = Settings::from_env();
    settings.validate().context("invalid configuration")?;

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new());
    let profile = platform::resolve(settings.arch.as_deref(), runner.as_ref()).await;
    info!(arch = %profile.arch, platform = %profile.platform, "resolved target platform");

    let client = RuntimeClient::new(settings.runtime.as_str(), Arc::clone(&runner));
    let specs = select_specs(service, &settings, &profile);

    Ok(Session {
        settings,
        client,
        specs,
    })
}

fn select_specs(
    service: ServiceArg,
    settings: &Settings,
    profile: &PlatformProfile,
) -> Vec<ServiceSpec> {
    match service {
        ServiceArg::VectorDb => vec![ServiceSpec::vector_db(settings, profile)],
        ServiceArg::Inference => vec![ServiceSpec::inference(settings, profile)],
        ServiceArg::All => vec![
            ServiceSpec::vector_db(settings, profile),
            ServiceSpec::inference(settings, profile),
        ],
    }
}

/// Provisions the selected services in order, stopping at the first failure.
pub async fn handle_up(args: &UpArgs) -> i32 {
    info!("Starting provisioning");

    let session = match open_session(args.service).await {
        Ok(session) => session,
        Err(e) => {
            error!("{:#}", e);
            return 1;
        }
    };

    let provisioner = Provisioner::new(&session.client, &session.settings);
    for spec in &session.specs {
        match provisioner.provision(spec).await {
            Ok(report) => {
                println!(
                    "\u{2713} {} ready ({} via {}, {} probe attempt{})",
                    report.service,
                    report.image,
                    report.strategy,
                    report.health.attempts,
                    if report.health.attempts == 1 { "" } else { "s" }
                );
            }
            Err(e) => {
                error!(service = %spec.name, "Provisioning failed: {}", e);
                if let Some(diagnostics) = e.diagnostics() {
                    eprintln!("{}", diagnostics.trim_end());
                }
                return 1;
            }
        }
    }

    0
}

/// Tears down the selected services and runs the optional purge passes.
pub async fn handle_down(args: &DownArgs) -> i32 {
    info!("Starting teardown");

    let session = match open_session(args.service).await {
        Ok(session) => session,
        Err(e) => {
            error!("{:#}", e);
            return 1;
        }
    };

    let opts = ReclaimOptions {
        zap: args.zap || session.settings.zap,
        prune: args.prune_build_cache || session.settings.prune,
        clean_files: args.clean_files || session.settings.clean_files,
        pattern: session.settings.purge_pattern.clone(),
    };

    let policy: Box<dyn ConfirmPolicy> = if args.force || session.settings.assume_yes {
        Box::new(AssumeYes)
    } else {
        Box::new(TerminalPrompt)
    };

    let reclaimer = Reclaimer::new(&session.client, policy.as_ref());
    match reclaimer.teardown(&session.specs, &opts).await {
        Ok(report) => {
            print!("{}", report);
            0
        }
        Err(e) => {
            error!("Teardown failed: {}", e);
            if let crate::reclaim::ReclaimError::Runtime(runtime_err) = &e {
                if let Some(diagnostics) =
                    runtime_err.diagnostics(session.settings.log_tail as usize)
                {
                    eprintln!("{}", diagnostics.trim_end());
                }
            }
            1
        }
    }
}

/// Reports service health; exits non-zero when any check fails.
pub async fn handle_status(args: &StatusArgs) -> i32 {
    let session = match open_session(args.service).await {
        Ok(session) => session,
        Err(e) => {
            error!("{:#}", e);
            return 1;
        }
    };

    let diagnostics = Diagnostics::new(&session.client, &session.settings);
    let report = match diagnostics.run(&session.specs).await {
        Ok(report) => report,
        Err(e) => {
            error!("Status checks failed: {}", e);
            return 1;
        }
    };

    let formatter = OutputFormatter::new(args.format.into());
    match formatter.format(&report) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            error!("{:#}", e);
            return 1;
        }
    }

    if report.healthy() {
        0
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Arch;
    use crate::service::ServiceKind;
    use serial_test::serial;

    fn profile() -> PlatformProfile {
        PlatformProfile::for_arch(Arch::Amd64)
    }

    #[test]
    #[serial]
    fn test_select_specs_single_service() {
        let settings = Settings::from_env();

        let specs = select_specs(ServiceArg::VectorDb, &settings, &profile());
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].kind, ServiceKind::VectorDb);

        let specs = select_specs(ServiceArg::Inference, &settings, &profile());
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].kind, ServiceKind::Inference);
    }

    #[test]
    #[serial]
    fn test_select_specs_all_orders_db_first() {
        let settings = Settings::from_env();
        let specs = select_specs(ServiceArg::All, &settings, &profile());
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].kind, ServiceKind::VectorDb);
        assert_eq!(specs[1].kind, ServiceKind::Inference);
    }

    #[tokio::test]
    #[serial]
    async fn test_open_session_uses_configured_selection() {
        let session = open_session(ServiceArg::All).await.unwrap();
        assert_eq!(session.specs.len(), 2);
        assert_eq!(session.specs[0].name, session.settings.db.name);
        assert_eq!(session.specs[1].name, session.settings.llm.name);
    }
}
