use clap::{Parser, Subcommand};
use log::{error, info};
use portal_gate::configuration::Config;
use portal_gate::controller::Controller;
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "portal-gate")]
#[command(version)]
#[command(about = "Captive-portal gateway granting LAN clients network access after login")]
struct Cli {
    /// TOML configuration file. When given, it replaces the flag and environment values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    settings: Config,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the portal (default).
    Serve,
    /// Print the persisted sessions.
    Sessions,
    /// Remove every session of a client IP and revoke its access.
    Revoke { ip: IpAddr },
    /// Print the firewall chains managed by the portal.
    Rules,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_target(false)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            info!("Importing configuration from {}", path.display());
            match Config::from_file(path) {
                Ok(config) => config,
                Err(e) => {
                    error!("Unable to import configuration from file: {}", e);
                    std::process::exit(1);
                }
            }
        }
        None => cli.settings,
    };

    let controller = match Controller::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            println!(
                "portal-gate v{} listening on {}",
                env!("CARGO_PKG_VERSION"),
                controller.config.listen_addr()
            );
            if let Err(e) = controller.run().await {
                error!("Gateway failed: {}, exiting...", e);
                std::process::exit(1);
            }
        }
        Command::Sessions => print!("{}", controller.sessions_report()),
        Command::Revoke { ip } => {
            println!("{} session(s) revoked for {}", controller.revoke_ip(ip), ip)
        }
        Command::Rules => match controller.rules() {
            Ok(rules) => print!("{}", rules),
            Err(e) => {
                error!("Unable to list rules: {}", e);
                std::process::exit(1);
            }
        },
    }
}
