//! QSO Relay CLI - forward contacts from logging software to the LdA logbook.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use qso_relay::{
    config::Config,
    metrics::start_metrics_server,
    profile::Registry,
    relay::{Command, NoticeStatus, Relay, RelayEvent, SessionContext},
    stats::RelayStats,
    upload::LdaClient,
};
use std::io::{self, BufRead};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// QSO Relay - upload contacts logged in Log4OM, WSJT-X/JTDX or N1MM+ to LdA
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Cmd>,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "QSO_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Logging software to listen for (log4om, wsjtx, n1mm)
    #[arg(short, long, env = "QSO_RELAY_SOFTWARE")]
    software: Option<String>,

    /// Address to bind the UDP listener to
    #[arg(long)]
    bind: Option<IpAddr>,

    /// LdA submission endpoint
    #[arg(long, env = "LDA_API_URL")]
    api_url: Option<String>,

    /// Settings file holding the LdA account
    #[arg(long, env = "QSO_RELAY_SETTINGS")]
    settings: Option<PathBuf>,

    /// Print statistics every N seconds (0 = never)
    #[arg(long)]
    stats_interval: Option<u64>,

    /// Serve Prometheus metrics on this port
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Store the LdA account in the settings file
    Configure {
        /// LdA username
        #[arg(long)]
        username: String,

        /// LdA password
        #[arg(long)]
        password: String,

        /// Main callsign
        #[arg(long = "call")]
        main_call_sign: String,

        /// Additional callsign (repeatable); replaces the stored list when given
        #[arg(long = "alias")]
        aliases: Vec<String>,
    },

    /// List the supported logging software
    Profiles,
}

/// A line typed on stdin while relaying.
#[derive(Debug, PartialEq, Eq)]
enum ConsoleCommand {
    Relay(Command),
    Stats,
    Profiles,
    Help,
}

const CONSOLE_HELP: &str = "Commands: software <log4om|wsjtx|n1mm>, stats, profiles, quit";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    match args.command {
        Some(Cmd::Configure {
            username,
            password,
            main_call_sign,
            aliases,
        }) => configure(&config, username, password, main_call_sign, aliases).await,
        Some(Cmd::Profiles) => {
            print_profiles(&config.registry()?);
            Ok(())
        }
        None => run(config).await,
    }
}

/// Command-line flags win over the config file.
fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(ref software) = args.software {
        config.software = software.clone();
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(ref api_url) = args.api_url {
        config.api_url = api_url.clone();
    }
    if let Some(ref settings) = args.settings {
        config.settings_path = Some(settings.clone());
    }
    if let Some(interval) = args.stats_interval {
        config.stats_interval = interval;
    }
    if let Some(port) = args.metrics_port {
        config.metrics_enabled = true;
        config.metrics_port = port;
    }
}

async fn configure(
    config: &Config,
    username: String,
    password: String,
    main_call_sign: String,
    aliases: Vec<String>,
) -> Result<()> {
    let store = config.settings_store()?;
    let mut settings = store.load().await?;

    settings.username = username;
    settings.password = password;
    settings.main_call_sign = main_call_sign.to_uppercase();
    if !aliases.is_empty() {
        settings.aliases = aliases.iter().map(|a| a.to_uppercase()).collect();
    }

    store.save(&settings).await?;
    println!("Saved settings to {}", store.path().display());
    Ok(())
}

fn print_profiles(registry: &Registry) {
    for profile in registry.iter() {
        println!("{}", profile);
    }
}

async fn run(config: Config) -> Result<()> {
    let registry = Arc::new(config.registry()?);
    let settings = config.settings_store()?;

    info!("QSO Relay starting...");
    info!("Settings file: {}", settings.path().display());
    info!("LdA endpoint: {}", config.api_url);

    let uploader = Arc::new(LdaClient::new(&config.api_url).context("Failed to build HTTP client")?);

    // Create shared statistics
    let stats = Arc::new(RelayStats::new());

    if config.metrics_enabled {
        let stats_clone = Arc::clone(&stats);
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(port, stats_clone).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let (event_tx, mut events) = mpsc::channel(1000);
    let (command_tx, command_rx) = mpsc::channel(16);

    let relay = Relay::new(
        Arc::clone(&registry),
        SessionContext {
            software: config.software.clone(),
            bind_address: config.bind_address,
            settings,
        },
        uploader,
        Arc::clone(&stats),
        event_tx,
    )?;
    let relay_task = tokio::spawn(relay.run(command_rx));

    // Handle Ctrl+C
    let shutdown_tx = command_tx.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                let _ = shutdown_tx.send(Command::Shutdown).await;
            }
            Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
        }
    });

    // Console commands. A blocking stdin read cannot be cancelled, so it runs
    // on its own OS thread, which is not joined at exit.
    let console_stats = Arc::clone(&stats);
    let console_registry = Arc::clone(&registry);
    std::thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            read_console(io::stdin().lock(), command_tx, console_stats, console_registry)
        })
        .context("Failed to start console thread")?;

    // Start stats printer
    if config.stats_interval > 0 {
        let stats_clone = Arc::clone(&stats);
        let stats_interval = config.stats_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(stats_interval));
            interval.tick().await;
            loop {
                interval.tick().await;
                println!("\n{}", stats_clone.summary());
            }
        });
    }

    // Main event loop; ends once the relay and all in-flight uploads are done
    while let Some(event) = events.recv().await {
        report_event(&event);
    }

    relay_task.await.context("Relay task failed")?;

    println!("\n\nFINAL STATISTICS");
    println!("{}", stats.summary());

    Ok(())
}

/// Read console commands from `input` until it closes or `quit` is typed.
fn read_console(
    input: impl BufRead,
    commands: mpsc::Sender<Command>,
    stats: Arc<RelayStats>,
    registry: Arc<Registry>,
) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                return;
            }
        };

        match parse_console_line(&line) {
            Ok(None) => {}
            Ok(Some(ConsoleCommand::Relay(command))) => {
                let quit = command == Command::Shutdown;
                if commands.blocking_send(command).is_err() || quit {
                    return;
                }
            }
            Ok(Some(ConsoleCommand::Stats)) => println!("{}", stats.summary()),
            Ok(Some(ConsoleCommand::Profiles)) => print_profiles(&registry),
            Ok(Some(ConsoleCommand::Help)) => println!("{}", CONSOLE_HELP),
            Err(message) => println!("{}\n{}", message, CONSOLE_HELP),
        }
    }
    debug!("stdin closed, console commands disabled");
}

/// Parse one console line. Blank lines yield `Ok(None)`.
fn parse_console_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "software" | "sw" => {
            let id = words
                .next()
                .ok_or_else(|| "software: missing software id".to_string())?;
            ConsoleCommand::Relay(Command::ChangeSoftware(id.to_ascii_lowercase()))
        }
        "stats" => ConsoleCommand::Stats,
        "profiles" => ConsoleCommand::Profiles,
        "quit" | "exit" => ConsoleCommand::Relay(Command::Shutdown),
        "help" | "?" => ConsoleCommand::Help,
        other => return Err(format!("Unknown command: {}", other)),
    };
    Ok(Some(command))
}

/// Render a relay event for the operator.
fn report_event(event: &RelayEvent) {
    match event {
        RelayEvent::Listening { port } => {
            println!("Listening for logging software on UDP port {}", port);
        }
        RelayEvent::MessageReceived(notice) => {
            debug!(
                "Notice: {}",
                serde_json::to_string(notice).unwrap_or_default()
            );
            // Upload outcomes are reported by their own events
            if notice.status.is_none() {
                println!(
                    "✗ Message from {}:{} ({}) not processed: {}",
                    notice.address,
                    notice.port,
                    notice.software,
                    notice.error.as_deref().unwrap_or("unknown reason")
                );
            } else if notice.status == Some(NoticeStatus::Error)
                && let Some(ref details) = notice.details
            {
                debug!("LdA error details: {}", details);
            }
        }
        RelayEvent::UploadSucceeded(result) => match result.data {
            Some(ref qso) => println!("✓ {}  {}", qso, result.message),
            None => println!("✓ {}", result.message),
        },
        RelayEvent::UploadFailed(result) => {
            match result.data {
                Some(ref qso) => println!("✗ {}  {}", qso, result.message),
                None => println!("✗ {}", result.message),
            }
            if let Some(ref error) = result.error {
                println!("  {}", error);
            }
        }
        RelayEvent::ProcessingError { message, error } => {
            println!("✗ {}: {}", message, error);
        }
        RelayEvent::ListenerError(message) => {
            println!("✗ Listener error: {}", message);
        }
    }
}
