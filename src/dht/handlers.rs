//! Query handlers (§4.5). The crawler intentionally never returns real
//! neighbour lists from `get_peers`/`find_node` — it isn't trying to be
//! a correct routing participant, only a convincing one.
use std::net::SocketAddr;

use crate::bencode::Value;
use crate::infohash::Infohash;
use crate::krpc;

use super::packet::AnnouncedPeer;

pub fn handle_ping(self_id: &Infohash) -> Value {
    Value::dict([(b"id".to_vec(), Value::bytes(self_id.as_bytes().to_vec()))])
}

/// `get_peers`/`find_node` share this reply shape: our claimed id is
/// `neighbour(self_id, key)`, and `nodes` is always empty.
pub fn handle_get_peers_or_find_node(self_id: &Infohash, key: &Infohash) -> Value {
    let claimed_id = self_id.neighbour(key);
    Value::dict([
        (b"id".to_vec(), Value::bytes(claimed_id.as_bytes().to_vec())),
        (b"token".to_vec(), Value::bytes(key.as_bytes()[..2].to_vec())),
        (b"nodes".to_vec(), Value::bytes(Vec::new())),
    ])
}

/// Extracts an `AnnouncedPeer` from an `announce_peer` query, applying
/// the `implied_port` rule (replace the announced port with the UDP
/// packet's source port, keep the source host either way) and dropping
/// announcements with `port == 0`.
pub fn handle_announce_peer(args: &Value, source: SocketAddr) -> Option<AnnouncedPeer> {
    let info_hash_bytes = args.get_bytes(b"info_hash").ok()?;
    let infohash = Infohash::from_slice(info_hash_bytes).ok()?;

    let implied_port = args.get_int(b"implied_port").unwrap_or(0);
    let port = args.get_int(b"port").unwrap_or(0);
    if implied_port == 0 && port == 0 {
        return None;
    }

    let addr = krpc::resolve_announced_addr(source, implied_port, port);
    Some(AnnouncedPeer { addr, infohash })
}
