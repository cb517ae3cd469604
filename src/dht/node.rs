//! The DHT node lifecycle: bind, bootstrap, refresh, and the
//! reader/dispatcher/writer task trio that drives everything else in
//! this module.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace, warn};

use crate::bencode::{self, Value};
use crate::blacklist::Blacklists;
use crate::config::Config;
use crate::infohash::Infohash;
use crate::krpc::{self, Message};
use crate::routing_table::{RemoteNode, RoutingTable};
use crate::slab::Slab;
use crate::stats::Stats;

use super::handlers;
use super::packet::{AnnouncedPeer, OutboundPacket};
use super::rate_limiter::RateLimiter;
use super::{DhtError, DhtResult};

const REFRESH_INTERVAL: Duration = Duration::from_secs(5);
const OUTBOUND_QUEUE_BOUND: usize = 1024;

/// Owns the socket and shared state; cheap to clone behind the handle's
/// `Arc`, never cloned itself.
pub struct DhtNode {
    pub self_id: Infohash,
    socket: Arc<UdpSocket>,
    routing_table: Arc<RoutingTable>,
    blacklist: Arc<Blacklists>,
    rate_limiter: Arc<RateLimiter>,
    stats: Arc<Stats>,
    outbound_tx: mpsc::Sender<OutboundPacket>,
    outbound_rx: tokio::sync::Mutex<Option<mpsc::Receiver<OutboundPacket>>>,
    peer_tx: mpsc::Sender<AnnouncedPeer>,
    bootstrap_routers: Vec<SocketAddr>,
}

/// Join handles for the spawned background tasks, held by the caller so
/// the node can be awaited or aborted on shutdown.
pub struct DhtNodeHandle {
    pub tasks: Vec<JoinHandle<()>>,
}

impl DhtNode {
    #[instrument(level = "info", skip(config, stats, peer_tx))]
    pub async fn bind(
        config: &Config,
        self_id: Infohash,
        stats: Arc<Stats>,
        peer_tx: mpsc::Sender<AnnouncedPeer>,
    ) -> DhtResult<Self> {
        let bind_addr: SocketAddr = if config.ipv6 {
            format!("[::]:{}", config.port).parse().expect("valid ipv6 bind addr")
        } else {
            format!("0.0.0.0:{}", config.port).parse().expect("valid ipv4 bind addr")
        };
        let socket = UdpSocket::bind(bind_addr).await.map_err(DhtError::Fatal)?;

        let bootstrap_routers = resolve_bootstrap_routers().await;

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_BOUND);

        Ok(DhtNode {
            self_id,
            socket: Arc::new(socket),
            routing_table: Arc::new(RoutingTable::new(self_id, config.routing_table_size)),
            blacklist: Arc::new(Blacklists::new(config.blacklist_size)),
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit_bps, config.rate_burst_bytes)),
            stats,
            outbound_tx,
            outbound_rx: tokio::sync::Mutex::new(Some(outbound_rx)),
            peer_tx,
            bootstrap_routers,
        })
    }

    pub fn routing_table(&self) -> &Arc<RoutingTable> {
        &self.routing_table
    }

    /// The socket's bound local address, useful when `config.port == 0`
    /// let the OS pick an ephemeral port (tests, or running several
    /// nodes without colliding).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns the reader, dispatcher, writer, and refresh-ticker tasks.
    /// `shutdown` is a broadcast channel each task subscribes to so a
    /// single `send(())` stops the whole node.
    pub fn spawn(self: Arc<Self>, shutdown: broadcast::Sender<()>) -> DhtNodeHandle {
        let (inbound_tx, inbound_rx) = mpsc::channel(OUTBOUND_QUEUE_BOUND);

        let reader = tokio::spawn(reader_loop(self.clone(), inbound_tx, shutdown.subscribe()));
        let dispatcher = tokio::spawn(dispatcher_loop(self.clone(), inbound_rx, shutdown.subscribe()));
        let writer = tokio::spawn(writer_loop(self.clone(), shutdown.subscribe()));
        let refresh = tokio::spawn(refresh_loop(self.clone(), shutdown.subscribe()));

        DhtNodeHandle {
            tasks: vec![reader, dispatcher, writer, refresh],
        }
    }

    /// Queues an outbound packet, silently dropping it if the queue is
    /// full (resource exhaustion, per the error handling design).
    pub fn enqueue(&self, to: SocketAddr, bytes: Vec<u8>) {
        if self.outbound_tx.try_send(OutboundPacket { bytes, to }).is_err() {
            Stats::incr(&self.stats.dht_packets_dropped, 1);
        }
    }

    fn send_find_node(&self, to: SocketAddr, claimed_id: Infohash) {
        let target = Infohash::random();
        let args = Value::dict([
            (b"id".to_vec(), Value::bytes(claimed_id.as_bytes().to_vec())),
            (b"target".to_vec(), Value::bytes(target.as_bytes().to_vec())),
        ]);
        let query = krpc::make_query(&krpc::new_transaction_id(), "find_node", args);
        self.enqueue(to, bencode::encode(&query));
    }
}

async fn resolve_bootstrap_routers() -> Vec<SocketAddr> {
    let mut out = Vec::new();
    for router in crate::config::BOOTSTRAP_ROUTERS {
        if let Ok(mut addrs) = tokio::net::lookup_host(router).await {
            if let Some(addr) = addrs.next() {
                out.push(addr);
            }
        }
    }
    out
}

#[instrument(level = "debug", skip_all)]
async fn reader_loop(
    node: Arc<DhtNode>,
    inbound_tx: mpsc::Sender<super::packet::InboundPacket>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut slab = Slab::new(64);
    loop {
        let mut buf = slab.alloc().await;
        let recv_result = tokio::select! {
            _ = shutdown.recv() => return,
            result = node.socket.recv_from(&mut buf) => result,
        };

        match recv_result {
            Ok((len, from)) => {
                Stats::incr(&node.stats.dht_packets_in, 1);
                Stats::incr(&node.stats.dht_bytes_in, len as u64);
                // Copy the datagram out for the dispatcher and return the
                // slab slot immediately, so the fixed-size pool keeps
                // cycling instead of draining to zero after `num_blocks`
                // packets.
                let bytes = buf[..len].to_vec();
                slab.free(buf);
                if inbound_tx
                    .send(super::packet::InboundPacket { bytes, from })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, "udp recv failed");
                Stats::incr(&node.stats.dht_errors, 1);
                slab.free(buf);
            }
        }
    }
}

#[instrument(level = "debug", skip_all)]
async fn dispatcher_loop(
    node: Arc<DhtNode>,
    mut inbound_rx: mpsc::Receiver<super::packet::InboundPacket>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            packet = inbound_rx.recv() => {
                match packet {
                    Some(packet) => dispatch_one(&node, packet).await,
                    None => return,
                }
            }
        }
    }
}

async fn dispatch_one(node: &Arc<DhtNode>, packet: super::packet::InboundPacket) {
    if node.blacklist.peers.contains(&packet.from) {
        return;
    }

    let value = match bencode::decode_all(&packet.bytes) {
        Ok(v) => v,
        Err(_) => {
            node.blacklist.peers.insert(packet.from);
            Stats::incr(&node.stats.dht_errors, 1);
            return;
        }
    };

    let message = match krpc::parse(&value) {
        Ok(m) => m,
        Err(_) => {
            node.blacklist.peers.insert(packet.from);
            return;
        }
    };

    match message {
        Message::Query {
            transaction,
            method,
            args,
        } => handle_query(node, transaction, method, args, packet.from).await,
        Message::Response { result, .. } => handle_response(node, result, packet.from).await,
        Message::Error { code, message, .. } => {
            debug!(code, message, from = %packet.from, "krpc error response");
        }
    }
}

async fn handle_query(
    node: &Arc<DhtNode>,
    transaction: &[u8],
    method: &[u8],
    args: &Value,
    source: SocketAddr,
) {
    let sender_id = match args.get_bytes(b"id").ok().and_then(|b| Infohash::from_slice(b).ok()) {
        Some(id) => id,
        None => return,
    };
    if sender_id == node.self_id {
        return;
    }

    let reply = match method {
        b"ping" => Some(handlers::handle_ping(&node.self_id)),
        b"get_peers" => args
            .get_bytes(b"info_hash")
            .ok()
            .and_then(|b| Infohash::from_slice(b).ok())
            .map(|key| handlers::handle_get_peers_or_find_node(&node.self_id, &key)),
        b"find_node" => args
            .get_bytes(b"target")
            .ok()
            .and_then(|b| Infohash::from_slice(b).ok())
            .map(|key| handlers::handle_get_peers_or_find_node(&node.self_id, &key)),
        b"announce_peer" => {
            if let Some(peer) = handlers::handle_announce_peer(args, source) {
                if !node.blacklist.infohashes.contains(&peer.infohash) {
                    Stats::incr(&node.stats.peers_announced, 1);
                    let _ = node.peer_tx.send(peer).await;
                } else {
                    Stats::incr(&node.stats.peers_skipped, 1);
                }
            }
            None
        }
        _ => {
            node.blacklist.peers.insert(source);
            None
        }
    };

    if let Some(result) = reply {
        let response = krpc::make_response(transaction, result);
        node.enqueue(source, bencode::encode(&response));
    }

    node.routing_table.add(RemoteNode {
        addr: source,
        id: sender_id,
    });
}

async fn handle_response(node: &Arc<DhtNode>, result: &Value, source: SocketAddr) {
    let sender_id = match result.get_bytes(b"id").ok().and_then(|b| Infohash::from_slice(b).ok()) {
        Some(id) => id,
        None => return,
    };
    if sender_id == node.self_id {
        return;
    }

    if let Ok(nodes_bytes) = result.get_bytes(b"nodes") {
        let entry_len = if nodes_bytes.len() % 26 == 0 {
            26
        } else if nodes_bytes.len() % 38 == 0 {
            38
        } else {
            0
        };
        for compact in krpc::decode_compact_nodes(nodes_bytes, entry_len) {
            if compact.id != node.self_id && compact.addr.port() != 0 {
                node.routing_table.add(RemoteNode {
                    addr: compact.addr,
                    id: compact.id,
                });
            }
        }
    }

    node.routing_table.add(RemoteNode {
        addr: source,
        id: sender_id,
    });
}

#[instrument(level = "debug", skip_all)]
async fn writer_loop(node: Arc<DhtNode>, mut shutdown: broadcast::Receiver<()>) {
    let mut rx = node
        .outbound_rx
        .lock()
        .await
        .take()
        .expect("writer_loop spawned more than once");

    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            packet = rx.recv() => {
                let Some(packet) = packet else { return };
                if !node.rate_limiter.acquire(packet.bytes.len()).await {
                    Stats::incr(&node.stats.dht_packets_dropped, 1);
                    continue;
                }
                match node.socket.send_to(&packet.bytes, packet.to).await {
                    Ok(n) => {
                        Stats::incr(&node.stats.dht_packets_out, 1);
                        Stats::incr(&node.stats.dht_bytes_out, n as u64);
                    }
                    Err(e) => {
                        trace!(error = %e, to = %packet.to, "udp send failed");
                        node.blacklist.peers.insert(packet.to);
                        Stats::incr(&node.stats.dht_errors, 1);
                    }
                }
            }
        }
    }
}

#[instrument(level = "debug", skip_all)]
async fn refresh_loop(node: Arc<DhtNode>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = ticker.tick() => refresh_once(&node),
        }
    }
}

fn refresh_once(node: &Arc<DhtNode>) {
    if node.routing_table.is_empty() {
        for router in &node.bootstrap_routers {
            node.send_find_node(*router, node.self_id);
        }
        return;
    }

    for rn in node.routing_table.get(0) {
        let claimed_id = node.self_id.neighbour(&rn.id);
        node.send_find_node(rn.addr, claimed_id);
    }
    node.routing_table.flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_picks_an_ephemeral_port_successfully() {
        let config = Config {
            port: 0,
            ..Config::default()
        };
        let (tx, _rx) = mpsc::channel(8);
        let node = DhtNode::bind(&config, Infohash::random(), Arc::new(Stats::new()), tx)
            .await
            .unwrap();
        assert!(node.routing_table().is_empty());
    }
}
