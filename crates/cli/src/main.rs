//! lamzu-automator CLI: switch the mouse polling rate while games run.

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use lamzu_automator_core::config::{self, Config};
use lamzu_automator_core::controller::{RateController, SharedController};
use lamzu_automator_core::device::{self, DeviceIdentity, PollingRate};
use lamzu_automator_core::error::Error as CoreError;
use lamzu_automator_core::notify::{self, Event, Notifier, SharedNotifier};
use lamzu_automator_core::process::SystemProcessSampler;
use lamzu_automator_core::steam;
use lamzu_automator_core::transport;
use lamzu_automator_core::watcher::GameWatcher;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "lamzu-automator",
    version,
    about = "Automatic polling rate switching for LAMZU mice"
)]
struct Cli {
    /// Path to the YAML config file.
    #[arg(short, long, global = true, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Run in the background without the interactive banner.
    #[arg(short, long)]
    daemon: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the polling rate once (500, 1000, 2000, 4000, or 8000 Hz).
    Set {
        /// Polling rate in Hz.
        rate: u32,
    },
    /// List supported polling rates.
    List,
    /// Connect and cycle 1000 -> 2000 -> 1000 Hz, reporting each step.
    Debug,
    /// List every HID interface of the mouse.
    ListDevices {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Add a game to watch.
    AddGame {
        /// Display name.
        #[arg(long)]
        name: String,
        /// Executable name, e.g. game.exe.
        #[arg(long)]
        exe: String,
        /// Install path (informational).
        #[arg(long, default_value = "")]
        path: String,
    },
    /// Remove a custom game by name.
    RemoveGame {
        #[arg(long)]
        name: String,
    },
    /// Show every watched executable.
    ListGames,
    /// Find installed Steam games and add them to the watch list.
    ScanSteam {
        /// Show what would be detected without saving.
        #[arg(long)]
        dry_run: bool,
        /// Scan even if the last scan is less than a day old.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Device-level failures exit with 2, everything else with 1.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<CoreError>()
        .map(|e| e.severity().exit_code())
        .unwrap_or(1)
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        None => run_monitor(&cli.config, cli.daemon).await?,
        Some(Commands::Set { rate }) => {
            let rate = PollingRate::try_from_hz(rate)?;
            let mut ctl = connect()?;
            ctl.apply(rate)
                .with_context(|| format!("failed to set polling rate to {rate}"))?;
            ctl.close();
            println!("Polling rate set to {rate}");
        }
        Some(Commands::List) => {
            println!("Supported polling rates:");
            for rate in PollingRate::ALL {
                println!("  {rate}");
            }
        }
        Some(Commands::Debug) => run_debug()?,
        Some(Commands::ListDevices { json }) => list_devices(json)?,
        Some(Commands::AddGame { name, exe, path }) => {
            let mut config = Config::load(&cli.config)?;
            config.add_custom_game(&name, &exe, &path)?;
            config.save(&cli.config)?;
            println!("Added '{name}' ({exe})");
        }
        Some(Commands::RemoveGame { name }) => {
            let mut config = Config::load(&cli.config)?;
            let removed = config.remove_custom_game(&name)?;
            config.save(&cli.config)?;
            println!("Removed '{}' ({})", removed.name, removed.executable);
        }
        Some(Commands::ListGames) => list_games(&cli.config)?,
        Some(Commands::ScanSteam { dry_run, force }) => {
            scan_steam(&cli.config, dry_run, force)?
        }
    }
    Ok(())
}

fn connect() -> Result<RateController> {
    let backend = transport::platform_backend()?;
    let mut ctl = RateController::new(backend, DeviceIdentity::LAMZU);
    ctl.connect()
        .with_context(|| format!("failed to connect to {}", DeviceIdentity::LAMZU))?;
    Ok(ctl)
}

/// Resolves on Ctrl+C, or on the platform's terminate / close / shutdown
/// signal. A listener that cannot be installed is skipped.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    r = tokio::signal::ctrl_c() => log_ctrl_c(r),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to listen for SIGTERM"),
        }
    }

    #[cfg(windows)]
    {
        use tokio::signal::windows::{ctrl_close, ctrl_shutdown};

        match (ctrl_close(), ctrl_shutdown()) {
            (Ok(mut close), Ok(mut shutdown)) => {
                tokio::select! {
                    r = tokio::signal::ctrl_c() => log_ctrl_c(r),
                    _ = close.recv() => info!("Console window closed"),
                    _ = shutdown.recv() => info!("System shutting down"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to listen for console close events")
            }
        }
    }

    log_ctrl_c(tokio::signal::ctrl_c().await);
}

fn log_ctrl_c(result: std::io::Result<()>) {
    match result {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }
}

async fn run_monitor(config_path: &Path, daemon: bool) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let settings = config.watcher_settings()?;
    let notifier: SharedNotifier = notify::platform_notifier();

    if daemon {
        info!(config = %config_path.display(), "Starting in daemon mode");
    } else {
        println!("LAMZU polling rate automator");
        println!(
            "  default: {}  game: {}  interval: {:?}",
            settings.default_rate, settings.game_rate, settings.interval
        );
        println!("Press Ctrl+C to exit.");
    }

    let ctl = match connect().and_then(|ctl| {
        ctl.test_connection().context("connection test failed")?;
        Ok(ctl)
    }) {
        Ok(ctl) => ctl,
        Err(e) => {
            notifier.notify(&Event::Error {
                title: "Mouse not found".to_string(),
                message: format!("{e:#}"),
            });
            return Err(e);
        }
    };
    if let Some(device) = ctl.device() {
        notifier.notify(&Event::Connected {
            vid: device.attributes.vendor_id,
            pid: device.attributes.product_id,
            path: device.path.to_string(),
        });
    }
    let controller: SharedController = ctl.into_shared();

    controller
        .lock()
        .apply(settings.default_rate)
        .with_context(|| format!("failed to set default rate {}", settings.default_rate))?;

    notifier.notify(&Event::Started {
        games: settings.games.len(),
    });

    let watcher = GameWatcher::new(
        settings,
        Arc::clone(&controller),
        Box::new(SystemProcessSampler::new()),
        Arc::clone(&notifier),
    );
    let mut handle = watcher.start()?;

    shutdown_signal().await;
    info!("Shutting down");

    handle.stop();
    controller.lock().close();
    Ok(())
}

fn run_debug() -> Result<()> {
    let id = DeviceIdentity::LAMZU;
    println!(
        "Looking for VID=0x{:04X} PID=0x{:04X} interface {}",
        id.vendor_id, id.product_id, id.interface
    );

    let mut ctl = connect()?;
    if let Some(device) = ctl.device() {
        println!("Connected:");
        println!("  path:      {}", device.path);
        println!("  interface: {}", device.interface);
        println!(
            "  VID=0x{:04X} PID=0x{:04X} version=0x{:04X}",
            device.attributes.vendor_id, device.attributes.product_id, device.attributes.version
        );
    }

    for rate in [PollingRate::Hz1000, PollingRate::Hz2000, PollingRate::Hz1000] {
        match ctl.apply(rate) {
            Ok(delivery) => println!("  {rate}: ok ({delivery:?})"),
            Err(e) => println!("  {rate}: FAILED ({e})"),
        }
    }

    ctl.close();
    Ok(())
}

fn list_devices(json: bool) -> Result<()> {
    let interfaces = device::discover_interfaces(&DeviceIdentity::LAMZU)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&interfaces)?);
        return Ok(());
    }

    if interfaces.is_empty() {
        println!("No LAMZU interfaces found.");
        println!("Ensure your mouse is connected.");
        return Ok(());
    }

    for iface in &interfaces {
        println!(
            "{} interface {} (VID: 0x{:04X}, PID: 0x{:04X}, usage 0x{:04X}/0x{:04X}){}",
            iface.product.as_deref().unwrap_or("LAMZU"),
            iface.interface_number,
            iface.vid,
            iface.pid,
            iface.usage_page,
            iface.usage,
            if iface.is_control { " [control]" } else { "" }
        );
        println!("  path: {}", iface.path);
    }
    Ok(())
}

fn format_size(size_mb: u64) -> String {
    if size_mb >= 1024 {
        format!("{:.1} GB", size_mb as f64 / 1024.0)
    } else {
        format!("{size_mb} MB")
    }
}

fn list_games(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;

    if !config.detected_games.is_empty() {
        println!("Steam games ({}):", config.detected_games.len());
        for game in &config.detected_games {
            let mut line = format!("  {} ({})", game.name, game.executable);
            if game.size_mb > 0 {
                line.push_str(&format!(" - {}", format_size(game.size_mb)));
            }
            if !game.library.is_empty() {
                line.push_str(&format!(" [{}]", game.library));
            }
            println!("{line}");
        }
    }
    if !config.custom_games.is_empty() {
        println!("Custom games ({}):", config.custom_games.len());
        for game in &config.custom_games {
            println!("  {} ({})", game.name, game.executable);
            if !game.path.is_empty() {
                println!("    path: {}", game.path);
            }
        }
    }
    if !config.games.is_empty() {
        println!("Games ({}):", config.games.len());
        for exe in &config.games {
            println!("  {exe}");
        }
    }

    println!("Watching {} executables in total.", config.watched_games().len());
    match config.last_steam_scan() {
        Some(last) => println!(
            "Last Steam scan: {}",
            last.with_timezone(&Local).format("%Y-%m-%d %H:%M")
        ),
        None => println!("Steam has not been scanned yet; run 'scan-steam'."),
    }
    Ok(())
}

fn scan_steam(config_path: &Path, dry_run: bool, force: bool) -> Result<()> {
    let mut config = Config::load(config_path)?;
    let now = Utc::now();

    if !force && config.steam_scan_is_recent(now) {
        if let Some(last) = config.last_steam_scan() {
            let hours = (now - last).num_hours();
            println!("Steam was scanned {hours}h ago. Use --force to scan again.");
        }
        return Ok(());
    }

    println!("Scanning Steam libraries...");
    let report = steam::scan(config.steam_install_path())?;

    println!("Steam: {}", report.install_path.display());
    for library in &report.libraries {
        println!("  {}: {}", library.label, library.path);
    }
    println!("Found {} games:", report.games.len());
    for game in &report.games {
        println!(
            "  {} ({}) - {}",
            game.name,
            game.executable,
            format_size(game.size_mb)
        );
    }

    if dry_run {
        println!("Dry run: config not changed.");
        return Ok(());
    }

    config.apply_steam_scan(&report, now);
    config
        .save(config_path)
        .with_context(|| format!("failed to save {}", config_path.display()))?;

    let counts = config.game_counts();
    println!(
        "Saved: {} Steam games, {} custom games, {} plain entries.",
        counts.detected, counts.custom, counts.legacy
    );
    Ok(())
}
