//! The persistence boundary (C9): consumed behind a trait, never
//! implemented against a real database by this crate. `MemoryStore` is a
//! minimal in-process reference implementation so the binary is runnable
//! without an external collaborator wired in.
use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use crate::infohash::Infohash;
use crate::torrent::{Peer, Torrent};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

pub trait Store: Send + Sync {
    fn save_peer(&self, peer: &Peer) -> StoreResult<()>;
    fn remove_peer(&self, peer: &Peer) -> StoreResult<()>;
    fn save_torrent(&self, torrent: &Torrent) -> StoreResult<()>;
    fn remove_torrent(&self, torrent: &Torrent) -> StoreResult<()>;
    fn pending_infohashes(&self, n: usize) -> StoreResult<Vec<Peer>>;
}

/// In-memory reference `Store`. Pending infohashes are whatever peers
/// have been saved and not yet drained by `pending_infohashes`; this is
/// enough to exercise the coordinator end to end without a SQL backend.
#[derive(Default)]
pub struct MemoryStore {
    pending: Mutex<Vec<Peer>>,
    torrents: Mutex<HashMap<Infohash, Torrent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn save_peer(&self, peer: &Peer) -> StoreResult<()> {
        self.pending
            .lock()
            .map_err(|_| StoreError::Backend("pending mutex poisoned".into()))?
            .push(peer.clone());
        Ok(())
    }

    fn remove_peer(&self, peer: &Peer) -> StoreResult<()> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| StoreError::Backend("pending mutex poisoned".into()))?;
        pending.retain(|p| p != peer);
        Ok(())
    }

    fn save_torrent(&self, torrent: &Torrent) -> StoreResult<()> {
        self.torrents
            .lock()
            .map_err(|_| StoreError::Backend("torrents mutex poisoned".into()))?
            .insert(torrent.infohash, torrent.clone());
        Ok(())
    }

    fn remove_torrent(&self, torrent: &Torrent) -> StoreResult<()> {
        self.torrents
            .lock()
            .map_err(|_| StoreError::Backend("torrents mutex poisoned".into()))?
            .remove(&torrent.infohash);
        Ok(())
    }

    fn pending_infohashes(&self, n: usize) -> StoreResult<Vec<Peer>> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| StoreError::Backend("pending mutex poisoned".into()))?;
        let take = n.min(pending.len());
        Ok(pending.drain(..take).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> Peer {
        Peer {
            addr: format!("127.0.0.1:{port}").parse().unwrap(),
            infohash: Infohash::random(),
        }
    }

    #[test]
    fn saved_peers_become_pending() {
        let store = MemoryStore::new();
        store.save_peer(&peer(1)).unwrap();
        store.save_peer(&peer(2)).unwrap();
        let drained = store.pending_infohashes(1).unwrap();
        assert_eq!(drained.len(), 1);
        let rest = store.pending_infohashes(10).unwrap();
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn remove_peer_drops_it_from_pending() {
        let store = MemoryStore::new();
        let p = peer(1);
        store.save_peer(&p).unwrap();
        store.remove_peer(&p).unwrap();
        assert_eq!(store.pending_infohashes(10).unwrap().len(), 0);
    }
}
