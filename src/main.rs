// SPDX-License-Identifier: GPL-3.0-only

#[macro_use]
extern crate tracing;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, Registry, reload};

use acpi_brightness_keys::consumers::ComponentDirectory;
use acpi_brightness_keys::keyboard::uinput::UinputKeyboard;
use acpi_brightness_keys::panel::resolver::resolve;
use acpi_brightness_keys::registry::RegistryEntry;
use acpi_brightness_keys::registry::udev_tree;
use acpi_brightness_keys::source::acpid;
use acpi_brightness_keys::state::PanelRecord;
use acpi_brightness_keys::{BrightnessKeys, Config};

#[derive(Parser, Debug)]
#[command(name = "acpi-brightness-keys", version, about)]
struct Cli {
    /// Config file, defaults to the user config directory
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Route brightness notifications until interrupted
    Run,
    /// Print the panels that would be listened on and exit
    Probe,
}

#[derive(Serialize)]
struct ProbeReport {
    panels: Vec<PanelRecord>,
}

type LogFilter = reload::Handle<EnvFilter, Registry>;

fn log_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new(format!(
        "warn,{}={}",
        env!("CARGO_CRATE_NAME"),
        level
    )))
}

/// Install the subscriber; the returned handle swaps the filter later on
fn setup_logs(verbose: bool) -> LogFilter {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let fmt_layer = fmt::layer().with_target(false);
    let (filter_layer, filter) = reload::Layer::new(log_filter(verbose));

    if let Ok(journal_layer) = tracing_journald::layer() {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .with(journal_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    }

    filter
}

fn probe() -> Result<()> {
    let snapshot = udev_tree::scan().context("Failed to read the ACPI device tree")?;
    let panels = resolve(&snapshot.tree, &snapshot.video);

    let report = ProbeReport {
        panels: panels
            .slots()
            .into_iter()
            .map(|(slot, device)| PanelRecord {
                slot: slot.to_string(),
                name: device.name().unwrap_or_default(),
            })
            .collect(),
    };
    print!("{}", toml::to_string(&report).context("Failed to format probe report")?);
    Ok(())
}

/// Type brightness keys on a uinput keyboard until interrupted
///
/// The component directory created here stays empty: nothing outside this
/// process can publish to it, so every key is typed. Claiming keys before
/// they are typed is only available to library users that publish their
/// own components.
async fn run(config: Config) -> Result<()> {
    let snapshot = udev_tree::scan().context("Failed to read the ACPI device tree")?;
    let keyboard = UinputKeyboard::new(&config.device_name, config.keys)
        .context("Failed to create virtual keyboard")?;
    let directory = ComponentDirectory::new();

    let service = BrightnessKeys::start(&snapshot.tree, &snapshot.video, &directory, keyboard, &config)
        .await
        .context("Failed to start brightness keys")?;

    let outcome = tokio::select! {
        result = acpid::listen(&config.acpid_socket, &snapshot.tree) => {
            result.with_context(|| format!("Lost acpid at {}", config.acpid_socket.display()))
        }
        result = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            result.context("Failed to wait for Ctrl-C")
        }
    };

    service.stop().await.context("Failed to stop brightness keys")?;
    outcome
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = setup_logs(cli.verbose);
    let config = Config::load_or_default(cli.config.as_deref()).context("Failed to load config")?;
    if config.debug && !cli.verbose {
        if let Err(e) = filter.reload(log_filter(true)) {
            warn!("Failed to enable debug logging: {}", e);
        }
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Probe => probe(),
    }
}
