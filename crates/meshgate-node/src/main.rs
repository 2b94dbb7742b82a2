//! Meshgate - APRS-IS gateway for a Meshtastic mesh
//!
//! This binary runs the gateway with:
//! - Configuration discovery (`./meshgate.yaml`, then the user config dir)
//! - Console and file logging
//! - The registration registry, the mesh radio, and the APRS-IS client

mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use meshgate_aprs::AprsClient;
use meshgate_bridge::{interface, Gateway, GatewayConfig};
use meshgate_registry::Registry;

#[derive(Parser, Debug)]
#[command(name = "meshgate")]
#[command(version, about = "APRS-IS gateway for Meshtastic mesh radios")]
struct Args {
    /// Configuration file (default: ./meshgate.yaml, then the user config dir)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,

    /// Print the merged registry as a seed list and exit
    #[arg(long)]
    dump_registry: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let (config_path, config) = GatewayConfig::discover(args.config.as_deref())?;

    if args.dump_registry {
        let registry = Registry::open_with(config.data_dir(), config.registry_options())
            .await
            .context("failed to open the registry")?;
        println!("{}", serde_json::to_string_pretty(&registry.snapshot())?);
        return Ok(());
    }

    logging::init(args.verbose, config.logs_dir.as_deref())?;
    info!(
        version = meshgate_bridge::VERSION,
        config = %config_path.display(),
        call_sign = %config.call_sign,
        "Starting meshgate"
    );

    let registry = Registry::open_with(config.data_dir(), config.registry_options())
        .await
        .context("failed to open the registry")?;

    let mesh = interface::from_config(&config.meshtastic_interface)
        .context("no mesh radio available")?;

    let mut gateway = Gateway::start(&config, mesh, registry, |filter| {
        AprsClient::spawn(config.aprs_client_config(filter))
    })
    .await
    .context("failed to connect to the mesh radio")?;

    tokio::select! {
        _ = gateway.run() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Shutting down");
        }
    }

    let stats = gateway.stats();
    info!(
        mesh_packets = stats.mesh_packets,
        aprs_packets = stats.aprs_packets,
        mesh_to_aprs = stats.mesh_to_aprs,
        aprs_to_mesh = stats.aprs_to_mesh,
        reconnects = stats.reconnects,
        handler_failures = stats.handler_failures,
        "Gateway stopped"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["meshgate"]).unwrap();
        assert!(args.config.is_none());
        assert!(!args.verbose);
        assert!(!args.dump_registry);
    }

    #[test]
    fn test_args_flags() {
        let args =
            Args::try_parse_from(["meshgate", "--config", "/etc/meshgate.yaml", "-v", "--dump-registry"])
                .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/etc/meshgate.yaml")));
        assert!(args.verbose);
        assert!(args.dump_registry);
    }

    #[test]
    fn test_args_reject_unknown() {
        assert!(Args::try_parse_from(["meshgate", "--bootstrap"]).is_err());
    }
}
