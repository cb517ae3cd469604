//! The work coordination fabric (C7): wires the DHT's announced peers to
//! the store, the store's pending infohashes to the fetcher worker pool,
//! and the fetcher's results back to the store, with the two blacklists
//! applying backpressure at each hop.
//!
//! Channel shapes follow the original crawler's `bt.Worker`/`dhtWorker`
//! pattern: a worker sends a one-shot "I'm ready" channel into a shared
//! pool, and whichever loop has work pulls a ready channel out and hands
//! work into it. This reads the same in async Rust as it does as
//! goroutines over unbuffered channels.
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::blacklist::Blacklists;
use crate::dht::AnnouncedPeer;
use crate::peer::{fetch_metadata, PeerError};
use crate::stats::Stats;
use crate::store::Store;
use crate::tagger::Tagger;
use crate::torrent::{Peer, Torrent};

const POLL_INTERVAL_WHEN_IDLE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

/// Outcome of one fetch attempt, reported by a worker back to the
/// dispatch loop that handles store writes.
enum FetchOutcome {
    Fetched(Torrent),
    Failed(Peer),
}

/// Shared configuration the coordinator's loops need. Distinct from
/// `crate::config::Config` so that tests can build one without every DHT
/// knob.
pub struct CoordinatorConfig {
    pub fetcher_workers: usize,
    pub batch_size: usize,
    pub tcp_timeout: Duration,
    pub skip_tags: Vec<String>,
}

/// Owns the channels between the DHT source of peers, the fetcher pool,
/// and the persistence layer. Spawned tasks are handed back to the
/// caller so the process can wait on or abort them at shutdown.
pub struct Coordinator {
    store: Arc<dyn Store>,
    tagger: Arc<dyn Tagger>,
    blacklists: Arc<Blacklists>,
    stats: Arc<Stats>,
    config: CoordinatorConfig,
}

pub struct CoordinatorHandle {
    pub tasks: Vec<JoinHandle<()>>,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn Store>,
        tagger: Arc<dyn Tagger>,
        blacklists: Arc<Blacklists>,
        stats: Arc<Stats>,
        config: CoordinatorConfig,
    ) -> Self {
        Coordinator {
            store,
            tagger,
            blacklists,
            stats,
            config,
        }
    }

    /// Spawns every coordinator loop: peer intake, the fixed-size fetcher
    /// pool, the store-to-pool dispatcher, and the fetch-result handler.
    /// `peers_in` is the DHT node's `AnnouncedPeer` channel; `shutdown`
    /// is a broadcast sender each loop subscribes to independently.
    pub fn spawn(
        self: Arc<Self>,
        mut peers_in: mpsc::Receiver<AnnouncedPeer>,
        shutdown: broadcast::Sender<()>,
    ) -> CoordinatorHandle {
        let (pool_tx, pool_rx) = mpsc::channel::<oneshot::Sender<Peer>>(self.config.fetcher_workers);
        let (torrents_tx, torrents_rx) = mpsc::channel::<FetchOutcome>(self.config.fetcher_workers);

        let mut tasks = Vec::new();

        tasks.push(tokio::spawn({
            let this = self.clone();
            let mut shutdown = shutdown.subscribe();
            async move {
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => return,
                        peer = peers_in.recv() => {
                            match peer {
                                Some(peer) => this.handle_announced_peer(peer).await,
                                None => return,
                            }
                        }
                    }
                }
            }
        }));

        for worker_id in 0..self.config.fetcher_workers {
            tasks.push(tokio::spawn(fetcher_worker(
                worker_id,
                self.clone(),
                pool_tx.clone(),
                torrents_tx.clone(),
                shutdown.subscribe(),
            )));
        }
        drop(torrents_tx);

        tasks.push(tokio::spawn(dispatch_loop(
            self.clone(),
            pool_rx,
            shutdown.subscribe(),
        )));

        tasks.push(tokio::spawn(result_loop(
            self.clone(),
            torrents_rx,
            shutdown.subscribe(),
        )));

        CoordinatorHandle { tasks }
    }

    /// DHT → store: persist a freshly announced peer unless its infohash
    /// is already blacklisted.
    #[instrument(level = "debug", skip(self))]
    async fn handle_announced_peer(&self, announced: AnnouncedPeer) {
        if self.blacklists.infohashes.contains(&announced.infohash) {
            Stats::incr(&self.stats.peers_skipped, 1);
            return;
        }
        let peer = Peer {
            addr: announced.addr,
            infohash: announced.infohash,
        };
        let store = self.store.clone();
        let result = tokio::task::spawn_blocking(move || store.save_peer(&peer))
            .await
            .unwrap_or_else(|e| Err(crate::store::StoreError::Backend(e.to_string())));
        if let Err(e) = result {
            warn!(error = %e, "failed to save announced peer");
        }
    }
}

/// Store → pool: periodically drains `PendingInfohashes(batch_size)` and
/// hands each one to the next free worker. Sleeps briefly when the store
/// has nothing pending rather than spinning.
#[instrument(level = "debug", skip_all)]
async fn dispatch_loop(
    coordinator: Arc<Coordinator>,
    mut pool_rx: mpsc::Receiver<oneshot::Sender<Peer>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        if shutdown.try_recv().is_ok() {
            return;
        }

        let store = coordinator.store.clone();
        let batch_size = coordinator.config.batch_size;
        let pending = tokio::task::spawn_blocking(move || store.pending_infohashes(batch_size)).await;
        let pending = match pending {
            Ok(Ok(pending)) => pending,
            Ok(Err(e)) => {
                warn!(error = %e, "failed to poll pending infohashes");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "pending infohashes task panicked");
                Vec::new()
            }
        };

        if pending.is_empty() {
            tokio::select! {
                _ = shutdown.recv() => return,
                _ = tokio::time::sleep(POLL_INTERVAL_WHEN_IDLE) => {}
            }
            continue;
        }

        for peer in pending {
            if coordinator.blacklists.infohashes.contains(&peer.infohash) {
                continue;
            }
            let ready = tokio::select! {
                _ = shutdown.recv() => return,
                ready = pool_rx.recv() => ready,
            };
            let Some(ready) = ready else { return };
            let _ = ready.send(peer);
        }
    }
}

/// One fetcher worker: registers a ready channel into the pool, waits
/// for a peer, fetches metadata synchronously, reports the outcome, and
/// loops. `worker_id` only labels tracing spans.
#[instrument(level = "debug", skip(coordinator, pool_tx, torrents_tx, shutdown))]
async fn fetcher_worker(
    worker_id: usize,
    coordinator: Arc<Coordinator>,
    pool_tx: mpsc::Sender<oneshot::Sender<Peer>>,
    torrents_tx: mpsc::Sender<FetchOutcome>,
    mut shutdown: broadcast::Receiver<()>,
) {
    Stats::incr(&coordinator.stats.bt_workers, 1);
    loop {
        let (ready_tx, ready_rx) = oneshot::channel();
        if tokio::select! {
            _ = shutdown.recv() => return,
            result = pool_tx.send(ready_tx) => result.is_err(),
        } {
            return;
        }

        let peer = tokio::select! {
            _ = shutdown.recv() => return,
            peer = ready_rx => match peer {
                Ok(peer) => peer,
                Err(_) => return,
            },
        };

        debug!(worker_id, peer = %peer.addr, "fetching metadata");
        let outcome = match fetch_metadata(peer.addr, peer.infohash, coordinator.config.tcp_timeout).await {
            Ok(torrent) => FetchOutcome::Fetched(torrent),
            Err(e) => {
                log_fetch_failure(&e, &peer);
                FetchOutcome::Failed(peer)
            }
        };

        if torrents_tx.send(outcome).await.is_err() {
            return;
        }
    }
}

fn log_fetch_failure(error: &PeerError, peer: &Peer) {
    debug!(peer = %peer.addr, infohash = %peer.infohash, error = %error, "metadata fetch failed");
}

/// Fetcher → store: tag and persist successful fetches (or reject+
/// blacklist them if a tag is on the skip list); remove and blacklist
/// the peer on failure.
#[instrument(level = "debug", skip_all)]
async fn result_loop(
    coordinator: Arc<Coordinator>,
    mut torrents_rx: mpsc::Receiver<FetchOutcome>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let outcome = tokio::select! {
            _ = shutdown.recv() => return,
            outcome = torrents_rx.recv() => outcome,
        };
        let Some(outcome) = outcome else { return };

        match outcome {
            FetchOutcome::Fetched(mut torrent) => {
                let tags = coordinator.tagger.tag(&torrent);
                torrent.tags = tags.clone();

                let skip = tags.iter().any(|t| coordinator.config.skip_tags.contains(t));
                let store = coordinator.store.clone();
                if skip {
                    coordinator.blacklists.infohashes.insert(torrent.infohash);
                    Stats::incr(&coordinator.stats.torrents_skipped, 1);
                    let result =
                        tokio::task::spawn_blocking(move || store.remove_torrent(&torrent)).await;
                    if let Ok(Err(e)) = result {
                        warn!(error = %e, "failed to remove skipped torrent");
                    }
                } else {
                    Stats::incr(&coordinator.stats.torrents_saved, 1);
                    info!(name = %torrent.name, infohash = %torrent.infohash, "torrent saved");
                    let result = tokio::task::spawn_blocking(move || store.save_torrent(&torrent)).await;
                    if let Ok(Err(e)) = result {
                        warn!(error = %e, "failed to save torrent");
                    }
                }
            }
            FetchOutcome::Failed(peer) => {
                coordinator.blacklists.peers.insert(peer.addr);
                let store = coordinator.store.clone();
                let result = tokio::task::spawn_blocking(move || store.remove_peer(&peer)).await;
                if let Ok(Err(e)) = result {
                    warn!(error = %e, "failed to remove bad peer");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infohash::Infohash;
    use crate::store::MemoryStore;
    use crate::tagger::NoopTagger;

    fn config() -> CoordinatorConfig {
        CoordinatorConfig {
            fetcher_workers: 2,
            batch_size: 8,
            tcp_timeout: Duration::from_millis(200),
            skip_tags: vec!["spam".into()],
        }
    }

    #[tokio::test]
    async fn announced_peer_becomes_pending_unless_blacklisted() {
        let store = Arc::new(MemoryStore::new());
        let blacklists = Arc::new(Blacklists::new(100));
        let coordinator = Arc::new(Coordinator::new(
            store.clone(),
            Arc::new(NoopTagger),
            blacklists.clone(),
            Arc::new(Stats::new()),
            config(),
        ));

        let clean = AnnouncedPeer {
            addr: "127.0.0.1:1".parse().unwrap(),
            infohash: Infohash::random(),
        };
        coordinator.handle_announced_peer(clean.clone()).await;
        assert_eq!(store.pending_infohashes(10).unwrap().len(), 1);

        let blacklisted_ih = Infohash::random();
        blacklists.infohashes.insert(blacklisted_ih);
        let dirty = AnnouncedPeer {
            addr: "127.0.0.1:2".parse().unwrap(),
            infohash: blacklisted_ih,
        };
        coordinator.handle_announced_peer(dirty).await;
        assert_eq!(store.pending_infohashes(10).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn bad_peer_result_removes_and_blacklists() {
        let store = Arc::new(MemoryStore::new());
        let blacklists = Arc::new(Blacklists::new(100));
        let coordinator = Arc::new(Coordinator::new(
            store.clone(),
            Arc::new(NoopTagger),
            blacklists.clone(),
            Arc::new(Stats::new()),
            config(),
        ));

        let peer = Peer {
            addr: "127.0.0.1:3".parse().unwrap(),
            infohash: Infohash::random(),
        };
        store.save_peer(&peer).unwrap();

        let (torrents_tx, torrents_rx) = mpsc::channel(4);
        torrents_tx.send(FetchOutcome::Failed(peer.clone())).await.unwrap();
        drop(torrents_tx);

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        result_loop(coordinator, torrents_rx, shutdown_rx).await;

        assert_eq!(store.pending_infohashes(10).unwrap().len(), 0);
        assert!(blacklists.peers.contains(&peer.addr));
    }

    #[tokio::test]
    async fn skip_tagged_torrent_is_blacklisted_instead_of_saved() {
        let store = Arc::new(MemoryStore::new());
        let blacklists = Arc::new(Blacklists::new(100));

        struct SpamTagger;
        impl Tagger for SpamTagger {
            fn tag(&self, _t: &Torrent) -> Vec<String> {
                vec!["spam".into()]
            }
        }

        let coordinator = Arc::new(Coordinator::new(
            store.clone(),
            Arc::new(SpamTagger),
            blacklists.clone(),
            Arc::new(Stats::new()),
            config(),
        ));

        let infohash = Infohash::random();
        let torrent = Torrent {
            infohash,
            name: "x".into(),
            size: 1,
            files: Vec::new(),
            tags: Vec::new(),
        };

        let (torrents_tx, torrents_rx) = mpsc::channel(4);
        torrents_tx.send(FetchOutcome::Fetched(torrent)).await.unwrap();
        drop(torrents_tx);

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        result_loop(coordinator, torrents_rx, shutdown_rx).await;

        assert!(blacklists.infohashes.contains(&infohash));
    }
}
