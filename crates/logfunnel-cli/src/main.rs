use anyhow::{bail, Context, Result};
use clap::Parser;
use logfunnel_core::config::{ReceiverConfig, TcpConfig, UdpConfig};
use logfunnel_core::{Config, FilterRegistry, SelectionFilter, SYSLOG_COLUMNS};
use logfunnel_ingestion::ReceiverManager;
use logfunnel_output::{ExportWriter, OutputFormat, StdoutWriter};
use logfunnel_pipeline::MessageStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Visible messages waiting for stdout; beyond this they stay in the store only
const LIVE_CHANNEL_SIZE: usize = 1024;

/// logfunnel - multi-source log receiver with live logger-path filtering
#[derive(Parser, Debug)]
#[command(name = "logfunnel")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format: pretty, json, or raw (overrides config)
    #[arg(short, long)]
    format: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print an example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Add a UDP syslog receiver, e.g. 0.0.0.0:514 (repeatable)
    #[arg(long, value_name = "ADDR:PORT")]
    udp: Vec<String>,

    /// Add a TCP syslog receiver, e.g. 127.0.0.1:1514 (repeatable)
    #[arg(long, value_name = "ADDR:PORT")]
    tcp: Vec<String>,

    /// Only show messages from this logger path, e.g. myhost.sshd
    #[arg(long, value_name = "PATH")]
    filter: Option<String>,

    /// Also show messages from descendants of --filter
    #[arg(long, requires = "filter")]
    recursive: bool,
}

fn split_addr(value: &str) -> Result<(String, u16)> {
    let (host, port) = value
        .rsplit_once(':')
        .with_context(|| format!("expected ADDR:PORT, got '{}'", value))?;
    let port = port
        .parse::<u16>()
        .with_context(|| format!("invalid port in '{}'", value))?;
    Ok((host.to_string(), port))
}

fn cli_receivers(args: &Args) -> Result<Vec<ReceiverConfig>> {
    let mut receivers = Vec::new();
    for value in &args.udp {
        let (bind_address, port) = split_addr(value)?;
        receivers.push(ReceiverConfig::Udp(UdpConfig {
            bind_address,
            port,
            ..Default::default()
        }));
    }
    for value in &args.tcp {
        let (bind_address, port) = split_addr(value)?;
        receivers.push(ReceiverConfig::Tcp(TcpConfig {
            bind_address,
            port,
            ..Default::default()
        }));
    }
    Ok(receivers)
}

fn log_level(args: &Args, config: &Config) -> Level {
    if args.verbose {
        return Level::DEBUG;
    }
    match config.general.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    }
}

fn export(dir: &Path, config: &Config, manager: &ReceiverManager, store: &MessageStore) -> Result<()> {
    let file_name = match manager.len() {
        1 => manager
            .receivers()
            .next()
            .map(|r| r.export_file_name())
            .unwrap_or_else(|| config.general.instance_name.clone()),
        _ => config.general.instance_name.clone(),
    };
    let columns = manager
        .receivers()
        .next()
        .map(|r| r.columns())
        .unwrap_or(SYSLOG_COLUMNS);

    let path = ExportWriter::new(columns).export_to_dir(dir, &file_name, &store.visible())?;
    info!(path = %path.display(), "Export written");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("{}", Config::example().to_toml()?);
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    FmtSubscriber::builder()
        .with_max_level(log_level(&args, &config))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    info!(instance = %config.general.instance_name, "Starting logfunnel");

    config.receivers.extend(cli_receivers(&args)?);
    if config.receivers.is_empty() {
        eprintln!("Warning: No receivers configured. Use --udp, --tcp, or [[receivers]] in the config.");
        return Ok(());
    }

    let output_format = OutputFormat::parse(
        args.format
            .as_deref()
            .unwrap_or(&config.output.stdout.format),
    );

    // Filter registry with an optional command-line selection context
    let registry = Arc::new(FilterRegistry::new(config.filter.policy));
    let _cli_filter = args.filter.as_deref().map(|path| {
        let source = SelectionFilter::attach("command-line", &registry);
        source.select(path, args.recursive);
        source
    });

    let (live_tx, mut live_rx) = mpsc::channel(LIVE_CHANNEL_SIZE);
    let store = Arc::new(MessageStore::new(config.general.store_capacity).with_live_channel(live_tx));
    let watcher = store.watch_filters(&registry);

    let mut manager = ReceiverManager::from_config(&config.receivers, store.clone());
    let started = manager.start_all().await;
    if started == 0 {
        bail!("no receiver could be started");
    }
    info!(started, configured = manager.len(), "Receivers started");

    let mut writer = StdoutWriter::with_format(output_format);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            message = live_rx.recv() => {
                let Some(message) = message else { break };
                if config.output.stdout.enabled {
                    if let Err(e) = writer.write(&message).await {
                        warn!(error = %e, "Output error");
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    manager.stop_all().await;
    watcher.abort();

    if let Some(dir) = &config.output.export.directory {
        export(Path::new(dir), &config, &manager, &store)?;
    }

    info!(held = store.len(), visible = store.visible_count(), "Stopped");
    Ok(())
}
