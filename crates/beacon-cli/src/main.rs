//! Beacon CLI - record metrics, submit pings and drain the upload queue

mod uploader;

use anyhow::{anyhow, bail, Context, Result};
use beacon_core::{
    Beacon, BooleanMetric, CommonMetricData, Configuration, CounterMetric, Lifetime, PingType,
    StringMetric,
};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::uploader::{drain, DirectoryUploader, DrainOptions, HttpUploader, Uploader};

#[derive(Parser)]
#[command(name = "beacon")]
#[command(about = "Beacon - telemetry pings from the command line", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides the configuration file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Application identifier (overrides the configuration file)
    #[arg(long, global = true)]
    package_name: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Record metrics, submit a ping and upload it
    Send {
        /// Ping name
        ping: String,

        #[command(flatten)]
        ping_args: PingArgs,

        #[command(flatten)]
        metrics: MetricArgs,

        /// Upload to this endpoint (defaults to the configured server)
        #[arg(long, conflicts_with = "out_dir")]
        endpoint: Option<String>,

        /// Write pings to this directory instead of uploading them
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// HTTP timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,

        /// Give up after this many seconds if pings remain queued
        #[arg(long, default_value_t = 60)]
        max_wait: u64,

        /// Log each ping body before it is uploaded
        #[arg(long)]
        log_pings: bool,
    },

    /// Record metrics and print the payload a ping would carry
    Collect {
        /// Ping name
        ping: String,

        #[command(flatten)]
        ping_args: PingArgs,

        #[command(flatten)]
        metrics: MetricArgs,
    },
}

#[derive(Args)]
struct PingArgs {
    /// Submission reason
    #[arg(short, long)]
    reason: Option<String>,

    /// Include the client id in the payload
    #[arg(long)]
    include_client_id: bool,

    /// Send the ping even if it carries no metrics
    #[arg(long)]
    send_if_empty: bool,
}

impl PingArgs {
    fn ping_type(&self, name: &str) -> PingType {
        PingType::new(
            name,
            self.include_client_id,
            self.send_if_empty,
            self.reason.iter().cloned().collect(),
        )
    }
}

#[derive(Args)]
struct MetricArgs {
    /// Boolean metric, as category.name=true|false
    #[arg(long = "bool", value_name = "ID=VALUE")]
    booleans: Vec<String>,

    /// String metric, as category.name=text
    #[arg(long = "string", value_name = "ID=VALUE")]
    strings: Vec<String>,

    /// Counter increment, as category.name=amount
    #[arg(long = "counter", value_name = "ID=VALUE")]
    counters: Vec<String>,
}

impl MetricArgs {
    /// Record every metric given on the command line into `ping`
    fn record(&self, beacon: &Beacon, ping: &str) -> Result<usize> {
        for arg in &self.booleans {
            let (meta, value) = parse_assignment(arg, ping)?;
            let value: bool = value
                .parse()
                .with_context(|| format!("Invalid boolean in '{}'", arg))?;
            BooleanMetric::new(meta).set(beacon, value);
        }
        for arg in &self.strings {
            let (meta, value) = parse_assignment(arg, ping)?;
            StringMetric::new(meta).set(beacon, value);
        }
        for arg in &self.counters {
            let (meta, value) = parse_assignment(arg, ping)?;
            let amount: i32 = value
                .parse()
                .with_context(|| format!("Invalid counter amount in '{}'", arg))?;
            CounterMetric::new(meta).add(beacon, amount);
        }
        Ok(self.booleans.len() + self.strings.len() + self.counters.len())
    }
}

/// Split `category.name=value` into metric metadata and the raw value
fn parse_assignment<'a>(arg: &'a str, ping: &str) -> Result<(CommonMetricData, &'a str)> {
    let (identifier, value) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected ID=VALUE, got '{}'", arg))?;
    let (category, name) = identifier.rsplit_once('.').unwrap_or(("", identifier));
    if name.is_empty() {
        bail!("Missing metric name in '{}'", arg);
    }
    let meta = CommonMetricData::new(category, name, vec![ping.to_string()])
        .with_lifetime(Lifetime::Ping);
    Ok((meta, value))
}

fn load_configuration(cli: &Cli) -> Result<Configuration> {
    let mut config = match &cli.config {
        Some(path) => Configuration::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => Configuration::new(PathBuf::from(".beacon"), "org.example.beacon"),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_path = dir.clone();
    }
    if let Some(name) = &cli.package_name {
        config.package_name = name.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = load_configuration(&cli)?;
    let server_endpoint = config.server_endpoint.clone();
    let beacon = Beacon::new(config).context("Failed to initialize Beacon")?;
    info!("Beacon CLI starting (client {})", beacon.client_id());

    match cli.command {
        Commands::Send {
            ping,
            ping_args,
            metrics,
            endpoint,
            out_dir,
            timeout,
            max_wait,
            log_pings,
        } => {
            beacon.register_ping_type(&ping_args.ping_type(&ping));
            let recorded = metrics.record(&beacon, &ping)?;

            if !beacon.submit_ping_by_name(&ping, ping_args.reason.as_deref()) {
                println!("{}", format!("Ping '{}' was not submitted", ping).yellow());
                println!("  Recorded {} metric(s); use --send-if-empty to send anyway", recorded);
                return Ok(());
            }

            let uploader: Box<dyn Uploader> = match out_dir {
                Some(dir) => Box::new(DirectoryUploader::new(dir)),
                None => Box::new(HttpUploader::new(
                    endpoint.unwrap_or(server_endpoint),
                    Duration::from_secs(timeout),
                )?),
            };
            let options = DrainOptions {
                log_pings,
                deadline: Some(Duration::from_secs(max_wait)),
            };
            let summary = drain(&beacon, uploader.as_ref(), &options).await?;

            if summary.sent > 0 {
                println!("{}", "✓ Ping uploaded".green().bold());
            } else {
                println!("{}", "✗ Ping not uploaded".red().bold());
            }
            println!("  Sent:      {}", summary.sent);
            println!("  Discarded: {}", summary.discarded);
            println!("  Retried:   {}", summary.retried);
            if summary.pending > 0 {
                println!("  Pending:   {}", summary.pending);
            }
            Ok(())
        }

        Commands::Collect {
            ping,
            ping_args,
            metrics,
        } => {
            let ping_type = ping_args.ping_type(&ping);
            beacon.register_ping_type(&ping_type);
            metrics.record(&beacon, &ping)?;

            match beacon.collect_ping(&ping_type, ping_args.reason.as_deref()) {
                Some(payload) => println!("{}", payload),
                None => println!("{}", format!("Ping '{}' is empty", ping).yellow()),
            }
            Ok(())
        }
    }
}
