mod config;
mod input;
mod output;

use clap::Parser;
use config::Config;
use input::device::{DeviceHandle, DeviceRegistry, EvdevDevice, EvdevRegistry};
use input::discovery::DiscoveryEngine;
use input::selector::Selector;
use input::watch::watch_directory;
use output::dump::{dump_device, listing_line, DeviceId};
use output::printer::spawn_reader;
use output::{Palette, Printer};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;

#[derive(Parser)]
#[command(name = "evsniff")]
#[command(about = "Print events from Linux input devices")]
struct Cli {
    /// Force colors
    #[arg(short = 'c', long)]
    color: bool,

    /// Disable colors
    #[arg(long)]
    no_color: bool,

    /// Dump device capabilities and announce every read
    #[arg(short, long)]
    verbose: bool,

    /// Print device info and quit
    #[arg(short, long)]
    info: bool,

    /// Do not watch for devices plugged in later
    #[arg(long)]
    no_hotplug: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write the default config file and exit
    #[arg(long)]
    write_config: bool,

    /// Device filters: name regex, absolute device path, "!" to exclude
    #[arg(value_name = "FILTER")]
    filters: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = if cli.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    if cli.write_config {
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => Config::config_path()?,
        };
        Config::create_default_config(&path)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let filters = if cli.filters.is_empty() {
        config.filters.patterns.clone()
    } else {
        cli.filters.clone()
    };
    let selector = Arc::new(Selector::from_filters(&filters)?);
    tracing::debug!("Using {} filter(s): {:?}", filters.len(), filters);

    let palette = Palette::resolve(cli.color, cli.no_color, config.output.color);
    tracing::debug!("Colors enabled: {}", palette.enabled());
    let printer = Arc::new(Printer::new(
        palette,
        Duration::from_millis(config.output.banner_interval_ms),
        cli.verbose,
    ));

    run_to_completion(run(cli, config, selector, printer))
}

/// Drives `future` on a fresh runtime and returns its result without waiting
/// for blocking tasks still parked in device reads.
fn run_to_completion<F>(future: F) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>>,
{
    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(future);
    // Readers sit in fetch_events and never observe a shutdown.
    rt.shutdown_background();
    result
}

async fn run(
    cli: Cli,
    config: Config,
    selector: Arc<Selector>,
    printer: Arc<Printer>,
) -> anyhow::Result<()> {
    let registry = EvdevRegistry::new(&config.discovery.device_dir);
    let hotplug = !cli.info && !cli.no_hotplug;

    // Subscribe before listing so nodes created meanwhile are not missed.
    let watch = if hotplug {
        Some(watch_directory(registry.dir())?)
    } else {
        None
    };

    let paths = registry.list_paths()?;
    let devices = list_devices(&registry, &paths, &selector, cli.verbose);
    if cli.info {
        return Ok(());
    }

    let mut readers = Vec::with_capacity(devices.len());
    for device in devices {
        readers.push(spawn_reader(printer.clone(), device));
    }

    let Some((watcher, notifications)) = watch else {
        if readers.is_empty() {
            tracing::warn!("No matching input devices found in {:?}", registry.dir());
        }
        for reader in readers {
            reader.await?;
        }
        return Ok(());
    };

    let engine = DiscoveryEngine::new(registry.clone(), selector, watcher.dir(), notifications)
        .with_debounce(Duration::from_millis(config.discovery.debounce_ms))
        .with_max_retries(config.discovery.max_retries)
        .with_known_paths(paths);

    let verbose = cli.verbose;
    engine
        .run(move |device: EvdevDevice| {
            print_listing(&device, verbose);
            spawn_reader(printer.clone(), device);
        })
        .await?;

    drop(watcher);
    Ok(())
}

/// Opens the listed event nodes and keeps the selected ones.
fn list_devices(
    registry: &EvdevRegistry,
    paths: &[PathBuf],
    selector: &Selector,
    verbose: bool,
) -> Vec<EvdevDevice> {
    let mut devices = Vec::new();

    for path in paths {
        let device = match registry.open(path) {
            Ok(device) => device,
            Err(e) => {
                tracing::warn!("{}", e);
                continue;
            }
        };
        if !selector.matches(device.info()) {
            tracing::debug!("Skipping {}", device.info());
            continue;
        }
        print_listing(&device, verbose);
        devices.push(device);
    }

    devices
}

fn print_listing(device: &EvdevDevice, verbose: bool) {
    println!(
        "{}",
        listing_line(device.info(), DeviceId::of(device.device()))
    );
    if verbose {
        print!("{}", dump_device(device.device(), "    "));
    }
}
