use anyhow::{Context, Result};
use clap::Parser;
use dronescan::{
    DroneScanConfig, ExportEncoder, FsArtifactStore, ScanApp, SessionStore, SystemClock,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "dronescan")]
#[command(about = "Geotagged barcode scanning sessions for survey drones")]
#[command(version)]
#[command(long_about = "Runs a barcode scan session fed by detection, position and trigger \
feeds. Confirmed captures are stamped with the latest position fix and exported as JSON and \
CSV when the session closes. Also lists, shows and clears saved sessions.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "dronescan.toml", help = "Path to TOML configuration file")]
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
    #[arg(long, help = "Validate configuration file and exit without starting a session")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Replay script overriding `feeds.replay_script`
    #[arg(long, value_name = "FILE", help = "Drive the session from a replay script")]
    replay: Option<PathBuf>,

    /// Use the space bar as the confirm button
    #[arg(long, help = "Confirm captures with the space bar; q quits")]
    keyboard: bool,

    /// Notes for the session opened at startup
    #[arg(long, value_name = "TEXT")]
    notes: Option<String>,

    /// List saved session artifacts and exit
    #[arg(long, help = "List saved session artifacts and exit")]
    list_sessions: bool,

    /// Print a saved session and exit
    #[arg(long, value_name = "FILE", help = "Print a saved JSON session and exit")]
    show: Option<PathBuf>,

    /// Delete every saved artifact and exit
    #[arg(long, help = "Delete all saved session artifacts and exit")]
    clear_data: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let mut config = DroneScanConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;
    if let Some(replay) = &args.replay {
        config.feeds.replay_script = Some(replay.to_string_lossy().to_string());
    }
    if args.keyboard {
        config.feeds.keyboard_trigger = true;
    }

    let log_guard = init_logging(&args, config.logging.file.as_deref())?;

    info!("Starting DroneScan v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    // Validate configuration if requested
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
                drop(log_guard);
                std::process::exit(1);
            }
        }
    }

    config.validate().context("Invalid configuration")?;

    if args.list_sessions || args.show.is_some() || args.clear_data {
        let store = offline_store(&config);
        if args.list_sessions {
            list_sessions(&store).await?;
        }
        if let Some(path) = &args.show {
            show_session(&store, path).await?;
        }
        if args.clear_data {
            let removed = store.clear_all_data().await?;
            println!("Removed {} files", removed);
        }
        return Ok(());
    }

    let mut app = ScanApp::new(config)
        .await
        .map_err(|e| {
            error!("Failed to create scan application: {}", e);
            e
        })?
        .with_session_notes(args.notes.clone());

    app.initialize().await.map_err(|e| {
        error!("Failed to initialize: {}", e);
        e
    })?;

    app.start().await.map_err(|e| {
        error!("Failed to start: {}", e);
        e
    })?;

    let exit_code = app.run().await.map_err(|e| {
        error!("Error during execution: {}", e);
        e
    })?;

    info!("DroneScan exited with code: {}", exit_code);

    drop(log_guard);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args, log_file: Option<&str>) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

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
        .unwrap_or_else(|_| EnvFilter::new(format!("dronescan={}", log_level)));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    layers.push(match args.log_format.as_deref() {
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
    });

    let guard = match log_file {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file path '{}' has no file name", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));
            layers.push(fmt::layer().with_writer(writer).with_ansi(false).boxed());
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

fn offline_store(config: &DroneScanConfig) -> SessionStore {
    SessionStore::new(
        ExportEncoder::new(config.export.zone()),
        Arc::new(FsArtifactStore::new(config.storage.artifact_folder())),
        Arc::new(SystemClock),
    )
}

async fn list_sessions(store: &SessionStore) -> Result<()> {
    let saved = store.saved_sessions().await?;
    if saved.is_empty() {
        println!("No saved sessions in {}", store.artifacts().location().display());
        return Ok(());
    }
    for path in saved {
        println!("{}", path.display());
    }
    Ok(())
}

async fn show_session(store: &SessionStore, path: &Path) -> Result<()> {
    let session = store
        .load_session(path)
        .await
        .with_context(|| format!("Failed to load session {}", path.display()))?;
    let zone = store.encoder().zone();

    println!("{}", session.summary(store.clock().now(), zone));
    if let Some(notes) = session.notes() {
        println!("Notes: {}", notes);
    }
    for code in session.codes() {
        println!(
            "{}  {:<12} {:<24} {}",
            code.formatted_timestamp(zone),
            code.format().as_str(),
            code.value(),
            code.formatted_location()
        );
    }
    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# DroneScan Configuration File");
    println!("# This is the default configuration with all available options");
    println!("# Every key can be overridden with DRONESCAN_<SECTION>__<KEY> environment variables");
    println!();

    let rendered = toml::to_string_pretty(&DroneScanConfig::default())
        .context("Failed to render default configuration")?;
    println!("{}", rendered);
    println!("# [feeds]");
    println!("# replay_script = \"flights/north_field.json\"");
    println!();
    println!("# [logging]");
    println!("# file = \"/var/log/dronescan/dronescan.log\"");
    Ok(())
}
