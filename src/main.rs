//! `dhtcrawld`: the crawler binary. Wires the library's components
//! together — one or more DHT nodes, a fixed-size metadata fetcher pool,
//! and a coordinator moving peers and torrents between them — behind a
//! thin `clap` flag surface and a `tracing-subscriber` logging init. The
//! persistence and tagging collaborators are external per the crate's
//! scope; this binary runs against the in-process reference
//! implementations (`MemoryStore`, `NoopTagger`) so the crawler is
//! runnable standalone.
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::{broadcast, mpsc};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dhtcrawl::blacklist::Blacklists;
use dhtcrawl::config::Config;
use dhtcrawl::coordinator::{Coordinator, CoordinatorConfig};
use dhtcrawl::dht::DhtNode;
use dhtcrawl::infohash::Infohash;
use dhtcrawl::stats::Stats;
use dhtcrawl::store::MemoryStore;
use dhtcrawl::tagger::NoopTagger;

/// Mainline DHT crawler: neighbour-spoofing participant plus ut_metadata
/// fetcher.
#[derive(Debug, Parser)]
#[command(name = "dhtcrawld", version)]
struct Args {
    /// Base UDP port; each additional DHT node instance binds port + i.
    #[arg(long, default_value_t = Config::default().port)]
    port: u16,

    /// Number of DHT node instances to run concurrently.
    #[arg(long, default_value_t = 1)]
    nodes: u16,

    /// Prefer IPv6 bind over IPv4.
    #[arg(long)]
    ipv6: bool,

    /// Bounded routing table capacity per node.
    #[arg(long, default_value_t = Config::default().routing_table_size)]
    routing_table_size: usize,

    /// Outbound rate limit, in bytes/second.
    #[arg(long, default_value_t = Config::default().rate_limit_bps)]
    rate_limit_bps: u64,

    /// Outbound rate limiter burst capacity, in bytes.
    #[arg(long, default_value_t = Config::default().rate_burst_bytes)]
    rate_burst_bytes: u64,

    /// Number of concurrent metadata fetcher workers.
    #[arg(long, default_value_t = Config::default().fetcher_workers)]
    fetcher_workers: usize,

    /// TCP read/write timeout (seconds) for metadata sessions.
    #[arg(long, default_value_t = Config::default().tcp_timeout.as_secs())]
    tcp_timeout_s: u64,

    /// Blacklist capacity (infohashes and peer addresses each).
    #[arg(long, default_value_t = Config::default().blacklist_size)]
    blacklist_size: usize,

    /// Tag names that cause a fetched torrent to be rejected.
    #[arg(long)]
    skip_tag: Vec<String>,

    /// Infohashes pulled from the store per dispatch poll.
    #[arg(long, default_value_t = Config::default().batch_size)]
    batch_size: usize,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            port: self.port,
            ipv6: self.ipv6,
            routing_table_size: self.routing_table_size,
            rate_limit_bps: self.rate_limit_bps,
            rate_burst_bytes: self.rate_burst_bytes,
            fetcher_workers: self.fetcher_workers,
            udp_timeout: Duration::from_secs(15),
            tcp_timeout: Duration::from_secs(self.tcp_timeout_s),
            blacklist_size: self.blacklist_size,
            skip_tags: self.skip_tag.clone(),
            batch_size: self.batch_size,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let base_config = args.config();

    let stats = Arc::new(Stats::new());
    let blacklists = Arc::new(Blacklists::new(base_config.blacklist_size));
    let store = Arc::new(MemoryStore::new());
    let tagger = Arc::new(NoopTagger);

    let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
    let (peer_tx, peer_rx) = mpsc::channel(256);

    let mut all_tasks = Vec::new();

    for i in 0..args.nodes {
        let mut node_config = base_config.clone();
        node_config.port = base_config.port + i;
        let self_id = Infohash::random();

        info!(port = node_config.port, id = %self_id, "starting dht node");
        let node = Arc::new(
            DhtNode::bind(&node_config, self_id, stats.clone(), peer_tx.clone()).await?,
        );
        all_tasks.extend(node.spawn(shutdown_tx.clone()).tasks);
    }
    drop(peer_tx);

    let coordinator = Arc::new(Coordinator::new(
        store,
        tagger,
        blacklists,
        stats,
        CoordinatorConfig {
            fetcher_workers: base_config.fetcher_workers,
            batch_size: base_config.batch_size,
            tcp_timeout: base_config.tcp_timeout,
            skip_tags: base_config.skip_tags.clone(),
        },
    ));
    all_tasks.extend(coordinator.spawn(peer_rx, shutdown_tx.clone()).tasks);

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(());

    for task in all_tasks {
        let _ = task.await;
    }

    Ok(())
}
