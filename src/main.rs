use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

use vigil::{
    DetectorEngine, PlateRegistry, SyntheticScene, SyntheticSource, VigilConfig,
};

#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(about = "Motion-triggered frame capture engine")]
#[command(version)]
#[command(long_about = "Watches a frame source for motion, debounces it, and persists \
the sharpest recent frame as a JPEG together with an append-only capture log. This \
binary drives the engine against a synthetic frame source; real deployments embed \
the library behind their own camera backend.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "vigil.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the engine")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Stop the demo after this many seconds (default: run until Ctrl-C)
    #[arg(long, value_name = "SECONDS", help = "Stop after the given number of seconds")]
    duration: Option<u64>,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Mirror logs into this file
    #[arg(long, value_name = "PATH", help = "Append logs to the given file")]
    log_file: Option<String>,

    /// Authorize a plate number and exit
    #[arg(long, value_name = "PLATE", help = "Add a plate to the authorized registry and exit")]
    add_plate: Option<String>,

    /// Revoke a plate number and exit
    #[arg(long, value_name = "PLATE", help = "Remove a plate from the authorized registry and exit")]
    remove_plate: Option<String>,

    /// List authorized plates and exit
    #[arg(long, help = "Print the authorized plate registry and exit")]
    list_plates: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    // Initialize logging; the guard keeps the file writer flushing
    let _log_guard = init_logging(&args)?;

    info!("Starting Vigil v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match VigilConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    config.validate()?;

    if args.add_plate.is_some() || args.remove_plate.is_some() || args.list_plates {
        return manage_plates(&args, &config).await;
    }

    run_demo(&args, config).await
}

/// Drive the engine against a synthetic scene loop, printing events as
/// they arrive, until Ctrl-C or the requested duration elapses.
async fn run_demo(args: &Args, config: VigilConfig) -> Result<()> {
    let (width, height) = config.source.resolution;
    let source = Arc::new(SyntheticSource::cycling(width, height, demo_script(width, height)));
    let engine = DetectorEngine::new(config, source).await?;

    engine.start().await?;
    println!("Engine running; captures land in the configured directory. Ctrl-C to stop.");

    let deadline = args.duration.map(Duration::from_secs);
    let started = Instant::now();
    let mut last_stats = Instant::now();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            event = engine.poll_event(Some(Duration::from_millis(500))) => {
                if let Some(event) = event {
                    println!("[{}] {}", event.event_type(), event.description());
                }
            }
        }

        if let Some(limit) = deadline {
            if started.elapsed() >= limit {
                info!("Requested duration elapsed");
                break;
            }
        }

        if last_stats.elapsed() >= Duration::from_secs(10) {
            let stats = engine.statistics();
            info!(
                frames_read = stats.frames_read,
                motions_detected = stats.motions_detected,
                captures_saved = stats.captures_saved,
                "Engine statistics"
            );
            last_stats = Instant::now();
        }
    }

    engine.stop().await;

    let stats = engine.statistics();
    println!(
        "Done: {} frames read, {} motions, {} captures saved",
        stats.frames_read, stats.motions_detected, stats.captures_saved
    );
    for line in engine.recent_history(5).await? {
        println!("  {}", line);
    }

    Ok(())
}

/// Scene loop for the demo source: a quiet stretch, then a bright square
/// hopping between two spots long enough to satisfy the default debounce.
fn demo_script(width: u32, height: u32) -> Vec<SyntheticScene> {
    let side = (width.min(height) / 4).max(8);
    let y = height.saturating_sub(side) / 2;
    let left = width / 8;
    let right = width / 2;

    let mut script = vec![SyntheticScene::flat(); 10];
    for hop in 0..8 {
        let x = if hop % 2 == 0 { left } else { right };
        script.push(SyntheticScene::blob_at(x, y, side));
    }
    script
}

async fn manage_plates(args: &Args, config: &VigilConfig) -> Result<()> {
    let dir = Path::new(&config.storage.capture_dir);
    tokio::fs::create_dir_all(dir).await?;
    let registry_path = dir.join(&config.storage.plate_registry_file);
    let mut registry = PlateRegistry::load(registry_path).await?;

    if let Some(plate) = &args.add_plate {
        if registry.add(plate).await? {
            println!("✓ Plate authorized");
        } else {
            eprintln!("✗ '{}' holds no digits, nothing added", plate);
            std::process::exit(1);
        }
    }

    if let Some(plate) = &args.remove_plate {
        if registry.remove(plate).await? {
            println!("✓ Plate revoked");
        } else {
            eprintln!("✗ '{}' is not in the registry", plate);
            std::process::exit(1);
        }
    }

    if args.list_plates {
        if registry.is_empty() {
            println!("No authorized plates");
        } else {
            for plate in registry.plates() {
                println!("{}", plate);
            }
        }
    }

    Ok(())
}

fn init_logging(args: &Args) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vigil={}", log_level)));

    // Configure format based on options
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_file {
        Some(path) => {
            let path = Path::new(path);
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "vigil.log".to_string());

            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Vigil Configuration File");
    println!("# This is the default configuration with all available options");
    println!();
    println!("{}", toml::to_string_pretty(&VigilConfig::default())?);
    Ok(())
}
