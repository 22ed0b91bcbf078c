//! wlt - network egress portal
//!
//! Self-service control over which egress route a client IP takes, backed by
//! an nftables map binding source IPs to packet marks. Expiry of
//! time-limited grants is enforced entirely by nftables; this process only
//! reads and writes map elements.
//!
//! # Usage
//!
//! ```bash
//! wlt status 10.0.0.5                                  # current access
//! wlt grant 10.0.0.5 -s exit=international -t 4        # open for 4 hours
//! wlt grant 10.0.0.5 -s exit=domestic -t 0             # open permanently
//! wlt revoke 10.0.0.5                                  # reset to default
//! wlt menu                                             # interactive menu (IP from --ip or SSH_CONNECTION)
//! wlt check-config                                     # validate the config file
//! ```

mod audit;
mod config;
mod core;
mod elevation;
mod menu;

use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use crate::core::access::AccessController;
use crate::core::gateway::NftGateway;
use crate::core::mark;

#[derive(Parser)]
#[command(name = "wlt")]
#[command(about = "Network egress portal - self-service nftables mark management", long_about = None)]
struct Cli {
    /// Path to the config file (default: XDG config dir)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current access state for an IP
    Status { ip: IpAddr },
    /// Grant an IP the selected outlets for a time limit
    Grant {
        ip: IpAddr,
        /// One selection per group, as GROUP=OUTLET
        #[arg(short = 's', long = "select", value_name = "GROUP=OUTLET")]
        selections: Vec<String>,
        /// Duration in hours (0 = permanent); must be a configured time limit
        #[arg(short = 't', long = "time", value_name = "HOURS")]
        hours: u32,
    },
    /// Revoke any access entry for an IP
    Revoke { ip: IpAddr },
    /// Interactive terminal menu
    Menu {
        /// Client IP (default: peer address from SSH_CONNECTION)
        #[arg(long)]
        ip: Option<IpAddr>,
    },
    /// Load and validate the config file, then print a summary
    CheckConfig,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(handle_cli(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Splits a `GROUP=OUTLET` argument into its two halves.
fn parse_selection(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((group, outlet)) if !group.is_empty() && !outlet.is_empty() => {
            Ok((group.to_string(), outlet.to_string()))
        }
        _ => Err(format!("invalid selection '{raw}', expected GROUP=OUTLET")),
    }
}

/// Resolves the client IP for the menu: explicit flag first, then the peer
/// address from `SSH_CONNECTION` when running as a forced SSH command.
fn client_ip(flag: Option<IpAddr>) -> Result<IpAddr, String> {
    if let Some(ip) = flag {
        return Ok(ip);
    }

    if let Ok(conn) = std::env::var("SSH_CONNECTION")
        && let Some(peer) = conn.split_whitespace().next()
        && let Ok(ip) = peer.parse()
    {
        return Ok(ip);
    }

    Err("no client IP: pass --ip or run via SSH".to_string())
}

async fn handle_cli(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_config(cli.config.as_deref()).await?;
    let gateway = NftGateway::new(
        config.nftables.clone(),
        Duration::from_secs(config.command_timeout_secs),
    );
    let controller = AccessController::new(&config, &gateway);

    match cli.command {
        Commands::Status { ip } => {
            let status = controller.status(ip).await;
            match status.mark {
                Some(mark) => {
                    println!("{ip}: mark 0x{mark:x}");
                    for (group, selection) in
                        config.outlet_groups.iter().zip(&status.selections)
                    {
                        println!(
                            "  {}: {}",
                            group.title,
                            selection.as_deref().unwrap_or("unlabeled")
                        );
                    }
                    match status.expires_secs {
                        Some(secs) => println!("  expires in: {secs}s"),
                        None => println!("  expires in: never (permanent)"),
                    }
                }
                None => println!("{ip}: no entry (default route)"),
            }
        }
        Commands::Grant {
            ip,
            selections,
            hours,
        } => {
            let selections = selections
                .iter()
                .map(|raw| parse_selection(raw))
                .collect::<Result<Vec<_>, _>>()?;

            let outcome = controller.grant(ip, &selections, hours).await?;
            audit::log_grant(ip, outcome.mark, hours, &outcome.label, outcome.ok).await;

            if !outcome.ok {
                return Err(format!("failed to apply access for {ip}").into());
            }
            println!("granted {ip}: {} [mark 0x{:x}]", outcome.label, outcome.mark);
        }
        Commands::Revoke { ip } => {
            let ok = controller.revoke(ip).await;
            audit::log_revoke(ip, ok).await;

            if !ok {
                return Err(format!("failed to revoke access for {ip}").into());
            }
            println!("revoked {ip}");
        }
        Commands::Menu { ip } => {
            let ip = client_ip(ip)?;
            menu::run(&config, &gateway, ip).await?;
        }
        Commands::CheckConfig => {
            println!(
                "config ok: map {} {} {}",
                config.nftables.family, config.nftables.table, config.nftables.map
            );
            for group in &config.outlet_groups {
                let names: Vec<&str> =
                    group.outlets.iter().map(|(n, _)| n.as_str()).collect();
                println!(
                    "  group '{}' (mask 0x{:x}): {}",
                    group.title,
                    group.mask,
                    names.join(", ")
                );
            }
            let limits: Vec<String> = config
                .time_limits
                .iter()
                .map(|&h| mark::duration_label(h))
                .collect();
            println!("  time limits: {}", limits.join(", "));
        }
    }

    Ok(())
}
