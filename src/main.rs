mod cli;
mod config;
mod error;
mod firewall;
mod probe;
mod runtime;
mod toggle;

use clap::Parser;
use cli::{Cli, Commands};
use config::ToggleConfig;
use error::NetlockError;
use firewall::iptables::IptablesChain;
use firewall::RuleStore;
use probe::ProbeOutcome;
use runtime::{create_runtime, ContainerRuntime, RuntimeKind};
use std::sync::Arc;
use toggle::{FirewallStatus, IsolationToggle};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "netlock=debug,info"
    } else {
        "netlock=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(cli).await {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> error::Result<()> {
    let kind = match &cli.runtime {
        Some(runtime) => Commands::parse_runtime(runtime).map_err(NetlockError::Config)?,
        None => RuntimeKind::detect()?,
    };

    let runtime: Arc<dyn ContainerRuntime> = Arc::from(create_runtime(kind));
    let chain: Arc<dyn RuleStore> = Arc::new(IptablesChain::new(&cli.chain));

    let mut config = ToggleConfig {
        container: cli.container,
        marker: cli.marker,
        chain: cli.chain,
        ..Default::default()
    };

    match cli.command {
        Commands::Enable {
            probe_url,
            no_probe,
        } => {
            config.probe_url = probe_url;
            config.no_probe = no_probe;
            let toggle = IsolationToggle::new(config, runtime, chain);

            let report = toggle.enable().await?;
            println!(
                "Isolation enabled for '{}' at {}",
                toggle.config().container,
                report.address
            );
            if report.purged > 0 {
                println!("Replaced {} stale rule(s)", report.purged);
            }
            match report.probe {
                Some(ProbeOutcome::Blocked) => {
                    println!("Verification: outbound access is blocked");
                }
                Some(ProbeOutcome::Reached) => {
                    println!(
                        "WARNING: workload reached {} - isolation is NOT effective",
                        toggle.config().probe_url
                    );
                }
                Some(ProbeOutcome::Inconclusive) => {
                    println!(
                        "Verification inconclusive (workload may still be starting); rules remain installed"
                    );
                }
                None => {}
            }
        }

        Commands::Disable => {
            let toggle = IsolationToggle::new(config, runtime, chain);

            let report = toggle.disable().await?;
            if report.was_noop() {
                println!(
                    "No rules carry '{}'; nothing to remove",
                    toggle.config().marker
                );
            } else {
                println!("Removed {} rule(s):", report.removed.len());
                for spec in &report.removed {
                    println!("  {}", spec);
                }
            }
        }

        Commands::Status { json } => {
            let toggle = IsolationToggle::new(config, runtime, chain);

            let report = toggle.status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            println!(
                "Workload '{}': {}",
                report.container,
                if report.running { "running" } else { "not running" }
            );
            match report.address {
                Some(address) => println!("Address: {}", address),
                None => println!("Address: none"),
            }
            match report.firewall {
                FirewallStatus::Active { rules } => {
                    println!("Isolation: ACTIVE ({} rule(s))", rules.len());
                    for spec in rules {
                        println!("  {}", spec);
                    }
                }
                FirewallStatus::Inactive => println!("Isolation: INACTIVE"),
                FirewallStatus::Unknown { reason } => {
                    println!("Isolation: UNKNOWN ({})", reason);
                }
            }
        }
    }

    Ok(())
}
