//! Neewer Light Control CLI
//!
//! Command-line interface for the Neewer light daemon and its clients.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use neewerctl::client::DaemonClient;
use neewerctl::config::SerialSettings;
use neewerctl::control::LightController;
use neewerctl::daemon::Daemon;
use neewerctl::device::{SimulatedPanel, list_ports};
use neewerctl::protocol::DeviceState;
use neewerctl::service;
use neewerctl::storage::{self, AppConfig, StateStore};
use neewerctl::{NeewerError, Session};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Neewer LED panel control tool
#[derive(Parser, Debug)]
#[command(name = "neewerctl")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Daemon socket (overrides config file)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Config file (default: user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run or control the light daemon
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },

    /// Set brightness, temperature or a profile (switches the light on)
    Set {
        /// Brightness percentage (0-100)
        #[arg(short, long)]
        brightness: Option<i32>,

        /// Colour temperature in Kelvin (2900-7000)
        #[arg(short, long)]
        temperature: Option<i32>,

        /// Profile preset; overrides brightness and temperature
        #[arg(short, long)]
        profile: Option<String>,

        /// Serial port label (overrides config file)
        #[arg(short = 'd', long = "device")]
        port: Option<String>,
    },

    /// Power the light on or off
    Power {
        state: PowerState,

        /// Serial port label (overrides config file)
        #[arg(short = 'd', long = "device")]
        port: Option<String>,
    },

    /// Show the state reported by the panel
    Status {
        /// Serial port label (overrides config file)
        #[arg(short = 'd', long = "device")]
        port: Option<String>,
    },

    /// List serial ports
    List,

    /// List light profiles
    Profiles,
}

#[derive(Subcommand, Debug)]
enum DaemonAction {
    /// Run the daemon in the foreground
    Run {
        /// Serial port of the panel (overrides config file)
        #[arg(short = 'd', long)]
        port: Option<String>,

        /// Use an in-memory panel instead of a serial port
        #[arg(long)]
        simulate: bool,
    },

    /// Start the systemd service
    Start,

    /// Stop the running daemon
    Stop {
        /// Stop the systemd service instead of sending a stop request
        #[arg(long)]
        service: bool,
    },

    /// Install the systemd service (requires root)
    Install {
        /// Serial port of the panel (overrides config file)
        #[arg(short = 'd', long)]
        port: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum PowerState {
    On,
    Off,
}

// =============================================================================
// Main
// =============================================================================

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = match &args.config {
        Some(path) => storage::load_config_from(path),
        None => storage::load_config(),
    }
    .context("Failed to load config")?;
    if let Some(socket) = args.socket {
        config.daemon.socket_path = socket;
    }

    match args.command {
        Command::Daemon { action } => match action {
            DaemonAction::Run { port, simulate } => cmd_daemon_run(config, port, simulate),
            DaemonAction::Start => cmd_daemon_start(),
            DaemonAction::Stop { service } => cmd_daemon_stop(&config, service),
            DaemonAction::Install { port } => cmd_daemon_install(&config, port),
        },
        Command::Set {
            brightness,
            temperature,
            profile,
            port,
        } => cmd_set(&config, brightness, temperature, profile.as_deref(), port),
        Command::Power { state, port } => cmd_power(&config, state, port),
        Command::Status { port } => cmd_status(&config, port),
        Command::List => cmd_list(&config),
        Command::Profiles => cmd_profiles(&config),
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

// =============================================================================
// Daemon Commands
// =============================================================================

fn cmd_daemon_run(config: AppConfig, port: Option<String>, simulate: bool) -> Result<()> {
    let mut daemon_config = config.daemon;
    if let Some(port) = port {
        daemon_config.port = port;
    }

    let mut initial = match StateStore::open_default().and_then(|store| store.load()) {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!(error = %e, "Could not load saved state, using defaults");
            DeviceState::default()
        }
    };
    initial.port = daemon_config.port.clone();

    let settings = SerialSettings::default();
    let session = if simulate {
        let panel = SimulatedPanel::new(initial.clone());
        Session::from_link("simulated", panel.link(), &settings)
    } else {
        Session::open(&daemon_config.port, &settings)
    }
    .with_context(|| format!("Failed to open panel on {}", daemon_config.port))?;

    let socket_path = daemon_config.socket_path.clone();
    let daemon = Daemon::bind(daemon_config, Arc::new(session), initial)
        .context("Failed to start daemon listener")?;

    let shutdown = daemon.shutdown_handle();
    ctrlc::set_handler(move || {
        shutdown.trigger();
    })
    .context("Failed to set Ctrl+C handler")?;

    println!(
        "💡 Neewer daemon running on {} (Ctrl+C to stop)",
        socket_path.display()
    );
    daemon.serve().context("Daemon failed")?;
    println!("✅ Daemon stopped.");
    Ok(())
}

fn cmd_daemon_start() -> Result<()> {
    service::start_service().context("Failed to start daemon service")?;
    println!("✅ Daemon started.");
    Ok(())
}

fn cmd_daemon_stop(config: &AppConfig, via_service: bool) -> Result<()> {
    if via_service {
        service::stop_service().context("Failed to stop daemon service")?;
    } else {
        let client = DaemonClient::new(&config.daemon.socket_path);
        client.stop().context("Failed to stop daemon")?;
    }
    println!("✅ Daemon stopped.");
    Ok(())
}

fn cmd_daemon_install(config: &AppConfig, port: Option<String>) -> Result<()> {
    let port = port.unwrap_or_else(|| config.daemon.port.clone());
    service::install_service(
        Path::new(service::UNIT_PATH),
        &port,
        &config.daemon.socket_path,
    )
    .context("Failed to install daemon service")?;
    println!("✅ Service installed at {}", service::UNIT_PATH);
    println!("   Start it with: neewerctl daemon start");
    Ok(())
}

// =============================================================================
// Light Commands
// =============================================================================

fn controller(config: &AppConfig) -> Result<LightController> {
    let store = StateStore::open_default().context("Failed to locate state file")?;
    Ok(LightController::new(DaemonClient::new(&config.daemon.socket_path), store))
}

fn resolve_port(config: &AppConfig, port: Option<String>) -> String {
    port.unwrap_or_else(|| config.daemon.port.clone())
}

fn cmd_set(
    config: &AppConfig,
    brightness: Option<i32>,
    temperature: Option<i32>,
    profile: Option<&str>,
    port: Option<String>,
) -> Result<()> {
    let port = resolve_port(config, port);
    let lights = controller(config)?;

    let state = match profile {
        Some(name) => {
            let profile = config.profile(name)?;
            println!("🎨 Profile: {}", profile);
            lights.apply_profile(&profile, &port)
        }
        None => lights.adjust(&port, brightness, temperature),
    };

    print_result(state)
}

fn cmd_power(config: &AppConfig, state: PowerState, port: Option<String>) -> Result<()> {
    let port = resolve_port(config, port);
    let lights = controller(config)?;

    let result = match state {
        PowerState::On => lights.power_on(&port),
        PowerState::Off => lights.power_off(&port),
    };

    print_result(result)
}

/// Print the requested state. A save failure after a successful send is only
/// a warning: the light did change.
fn print_result(result: neewerctl::Result<DeviceState>) -> Result<()> {
    match result {
        Ok(state) => {
            println!("{}", state);
            Ok(())
        }
        Err(e @ NeewerError::PersistenceFailure { .. }) => {
            println!("✅ Light updated.");
            println!("⚠️  {}", e);
            Ok(())
        }
        Err(e) => Err(e).context("Failed to update light"),
    }
}

fn cmd_status(config: &AppConfig, port: Option<String>) -> Result<()> {
    let port = resolve_port(config, port);
    let client = DaemonClient::new(&config.daemon.socket_path);

    let state = client.get_state(&port).context("Failed to read panel state")?;
    println!("{}", state);
    Ok(())
}

fn cmd_list(config: &AppConfig) -> Result<()> {
    let ports = list_ports().context("Failed to enumerate serial ports")?;

    if ports.is_empty() {
        println!("❌ No serial ports found.");
        return Ok(());
    }

    println!("🔍 Found {} serial port(s):\n", ports.len());
    for (i, port) in ports.iter().enumerate() {
        let marker = if *port == config.daemon.port {
            " (daemon)"
        } else {
            ""
        };
        println!("  {}. {}{}", i + 1, port, marker);
    }

    Ok(())
}

fn cmd_profiles(config: &AppConfig) -> Result<()> {
    println!("🎨 Light profiles:\n");
    for name in config.profile_names() {
        let profile = config.profile(&name)?;
        println!(
            "  {:<12} {:>3}%  {:>4}K",
            profile.name(),
            profile.brightness(),
            profile.temperature()
        );
    }
    Ok(())
}
