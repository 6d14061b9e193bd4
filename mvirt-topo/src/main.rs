//! mvirt-topo: cluster topology collector.
//!
//! Polls the agent endpoints of every cluster node, stores the collected
//! fabric state and checks that the loopback ARP entries of all nodes agree
//! with the addresses the owning nodes advertise. The report is printed as
//! JSON on stdout.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mvirt_topo::config::{DEFAULT_AGENT_PORT, DEFAULT_ARP_PREFIX_LEN, DEFAULT_LOOPBACK_NAME};
use mvirt_topo::{
    CollectorConfig, FileNodeSource, NodeIdentity, NodeStore, StaticNodeSource, TopologyReport,
    TopologyRun, ValidatorConfig, seed_store,
};

/// mvirt Topology Collector
#[derive(Parser, Debug)]
#[command(name = "mvirt-topo", version, about)]
struct Args {
    /// Node to poll, as id:name:management[:data] (can be repeated)
    #[arg(long = "node")]
    nodes: Vec<NodeIdentity>,

    /// JSON file with an array of nodes
    #[arg(long)]
    nodes_file: Option<PathBuf>,

    /// Port the node agents listen on
    #[arg(long, default_value_t = DEFAULT_AGENT_PORT)]
    agent_port: u16,

    /// URL scheme used to reach the agents
    #[arg(long, default_value = "http")]
    scheme: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "10")]
    request_timeout: u64,

    /// Deadline in seconds for collecting all reports of one pass
    #[arg(long, default_value = "30")]
    collect_timeout: u64,

    /// Also collect telemetry
    #[arg(long)]
    telemetry: bool,

    /// Internal name of the loopback interface
    #[arg(long, default_value = DEFAULT_LOOPBACK_NAME)]
    loopback_name: String,

    /// Prefix length appended to ARP addresses for loopback lookups
    #[arg(long, default_value_t = DEFAULT_ARP_PREFIX_LEN)]
    arp_prefix_len: u8,

    /// Repeat collection every N seconds until interrupted
    #[arg(long)]
    interval: Option<u64>,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, the report to stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mvirt_topo=info,reqwest=warn,hyper=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut store = NodeStore::new();
    if let Some(path) = &args.nodes_file {
        let added = seed_store(&mut store, &FileNodeSource::new(path)).await?;
        info!("Loaded {} nodes from {}", added, path.display());
    }
    seed_store(&mut store, &StaticNodeSource::new(args.nodes.clone())).await?;

    if store.is_empty() {
        bail!("no nodes given, use --node or --nodes-file");
    }

    let mut collector = CollectorConfig::default()
        .with_scheme(args.scheme.clone())
        .with_agent_port(args.agent_port)
        .with_request_timeout(Duration::from_secs(args.request_timeout))
        .with_collect_timeout(Duration::from_secs(args.collect_timeout));
    if args.telemetry {
        collector = collector.with_telemetry();
    }
    let validator = ValidatorConfig {
        loopback_name: args.loopback_name.clone(),
        arp_prefix_len: args.arp_prefix_len,
    };
    let run = TopologyRun::from_config(collector, validator)?;

    info!("Starting mvirt-topo for {} nodes", store.len());

    let Some(interval) = args.interval else {
        let report = run.run(&mut store).await;
        print_report(&report, args.pretty)?;
        if !report.is_healthy() {
            std::process::exit(1);
        }
        return Ok(());
    };

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = run.run(&mut store).await;
                if let Err(e) = print_report(&report, args.pretty) {
                    error!("Failed to write report: {}", e);
                }
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                break;
            }
        }
    }

    Ok(())
}

fn print_report(report: &TopologyReport, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(report)?
    } else {
        serde_json::to_string(report)?
    };
    println!("{}", json);
    Ok(())
}
