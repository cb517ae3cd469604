//! 20-byte infohash identity shared by the DHT keyspace and torrent info
//! dicts.
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use sha1::{Digest, Sha1};
use thiserror::Error;

pub const LEN: usize = 20;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum InfohashError {
    #[error("infohash must be exactly {LEN} bytes, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex infohash")]
    InvalidHex,
}

/// A 20-byte identity: a node ID or a torrent infohash, interchangeably,
/// as BEP-5 requires.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Infohash([u8; LEN]);

impl Infohash {
    pub fn from_bytes(bytes: [u8; LEN]) -> Self {
        Infohash(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, InfohashError> {
        if bytes.len() != LEN {
            return Err(InfohashError::InvalidLength(bytes.len()));
        }
        let mut buf = [0u8; LEN];
        buf.copy_from_slice(bytes);
        Ok(Infohash(buf))
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, InfohashError> {
        let bytes = hex::decode(hex_str).map_err(|_| InfohashError::InvalidHex)?;
        Self::from_slice(&bytes)
    }

    /// A fresh infohash seeded from the current time and process-local
    /// randomness, used to populate `target` in exploratory `find_node`
    /// queries.
    pub fn random() -> Self {
        let mut seed = Vec::with_capacity(16);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        seed.extend_from_slice(&now.as_nanos().to_be_bytes());
        let mut extra = [0u8; 8];
        rand::rng().fill_bytes(&mut extra);
        seed.extend_from_slice(&extra);

        let digest = Sha1::digest(&seed);
        Infohash(digest.into())
    }

    pub fn as_bytes(&self) -> &[u8; LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Number of leading bits `self` and `other` share, from 0 (differ in
    /// the top bit of the first byte) to 160 (identical).
    pub fn distance(&self, other: &Infohash) -> u32 {
        for i in 0..LEN {
            let xor = self.0[i] ^ other.0[i];
            if xor != 0 {
                return (i as u32) * 8 + xor.leading_zeros();
            }
        }
        160
    }

    /// An ID close to `target` in keyspace while remaining distinct from
    /// `self`: `target`'s first 10 bytes, then `self`'s last 10 bytes.
    pub fn neighbour(&self, target: &Infohash) -> Infohash {
        let mut buf = [0u8; LEN];
        buf[..10].copy_from_slice(&target.0[..10]);
        buf[10..].copy_from_slice(&self.0[10..]);
        Infohash(buf)
    }
}

impl fmt::Debug for Infohash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Infohash({})", self.to_hex())
    }
}

impl fmt::Display for Infohash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_invariant() {
        let h = Infohash::random();
        assert_eq!(h.as_bytes().len(), LEN);
        assert_eq!(h.distance(&h), 160);
    }

    #[test]
    fn distance_is_symmetric_and_bounded() {
        let a = Infohash::random();
        let b = Infohash::random();
        let d = a.distance(&b);
        assert_eq!(d, b.distance(&a));
        assert!(d <= 160);
    }

    #[test]
    fn distance_counts_leading_shared_bits() {
        let mut a = [0u8; LEN];
        let mut b = [0u8; LEN];
        a[0] = 0b1111_0000;
        b[0] = 0b1111_1000;
        let ih_a = Infohash::from_bytes(a);
        let ih_b = Infohash::from_bytes(b);
        assert_eq!(ih_a.distance(&ih_b), 4);
    }

    #[test]
    fn neighbour_matches_target_prefix_and_self_suffix() {
        let me = Infohash::random();
        let target = Infohash::random();
        let n = me.neighbour(&target);
        assert_eq!(&n.as_bytes()[..10], &target.as_bytes()[..10]);
        assert_eq!(&n.as_bytes()[10..], &me.as_bytes()[10..]);
    }

    #[test]
    fn hex_round_trips() {
        let h = Infohash::random();
        let hex_str = h.to_hex();
        assert_eq!(Infohash::from_hex(&hex_str).unwrap(), h);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Infohash::from_slice(&[0u8; 19]).is_err());
        assert!(Infohash::from_slice(&[0u8; 21]).is_err());
    }
}
