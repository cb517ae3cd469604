//! Compact node and peer address encodings used in `find_node`/`get_peers`
//! replies (BEP-5).
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use byteorder::{BigEndian, WriteBytesExt};
use thiserror::Error;

use crate::infohash::Infohash;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompactError {
    #[error("compact node entry must be 26 or 38 bytes, got {0}")]
    InvalidNodeLength(usize),

    #[error("compact addr entry must be 6 or 18 bytes, got {0}")]
    InvalidAddrLength(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactNode {
    pub id: Infohash,
    pub addr: SocketAddr,
}

/// Encodes a single compact node entry: 20-byte ID, then 4 or 16 IP
/// bytes, then a 2-byte big-endian port.
pub fn encode_compact_node(node: &CompactNode) -> Vec<u8> {
    let mut buf = Vec::with_capacity(38);
    buf.extend_from_slice(node.id.as_bytes());
    buf.extend_from_slice(&ip_bytes(node.addr.ip()));
    buf.write_u16::<BigEndian>(node.addr.port()).expect("write to Vec cannot fail");
    buf
}

/// Decodes a single compact node entry (26 bytes IPv4, 38 bytes IPv6).
pub fn decode_compact_node(data: &[u8]) -> Result<CompactNode, CompactError> {
    let (id_bytes, ip, port_bytes) = match data.len() {
        26 => (&data[0..20], ip_from_slice(&data[20..24]), &data[24..26]),
        38 => (&data[0..20], ip_from_slice(&data[20..36]), &data[36..38]),
        other => return Err(CompactError::InvalidNodeLength(other)),
    };
    let id = Infohash::from_slice(id_bytes).map_err(|_| CompactError::InvalidNodeLength(data.len()))?;
    let port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);
    Ok(CompactNode {
        id,
        addr: SocketAddr::new(ip, port),
    })
}

/// Splits a concatenated compact node-info string into individual 26- or
/// 38-byte entries and decodes each, skipping any that fail to parse.
pub fn decode_compact_nodes(data: &[u8], entry_len: usize) -> Vec<CompactNode> {
    if entry_len == 0 || data.len() % entry_len != 0 {
        return Vec::new();
    }
    data.chunks(entry_len)
        .filter_map(|chunk| decode_compact_node(chunk).ok())
        .collect()
}

/// Encodes a compact peer address: IP ++ port (6 bytes IPv4, 18 IPv6).
pub fn encode_peer_addr(addr: SocketAddr) -> Vec<u8> {
    let mut buf = ip_bytes(addr.ip());
    buf.write_u16::<BigEndian>(addr.port()).expect("write to Vec cannot fail");
    buf
}

/// Decodes a compact peer address.
pub fn decode_peer_addr(data: &[u8]) -> Result<SocketAddr, CompactError> {
    match data.len() {
        6 => {
            let ip = ip_from_slice(&data[0..4]);
            let port = u16::from_be_bytes([data[4], data[5]]);
            Ok(SocketAddr::new(ip, port))
        }
        18 => {
            let ip = ip_from_slice(&data[0..16]);
            let port = u16::from_be_bytes([data[16], data[17]]);
            Ok(SocketAddr::new(ip, port))
        }
        other => Err(CompactError::InvalidAddrLength(other)),
    }
}

fn ip_bytes(ip: IpAddr) -> Vec<u8> {
    match ip {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

fn ip_from_slice(bytes: &[u8]) -> IpAddr {
    match bytes.len() {
        4 => {
            let mut b = [0u8; 4];
            b.copy_from_slice(bytes);
            IpAddr::V4(Ipv4Addr::from(b))
        }
        16 => {
            let mut b = [0u8; 16];
            b.copy_from_slice(bytes);
            IpAddr::V6(Ipv6Addr::from(b))
        }
        _ => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_node_round_trip_is_26_bytes() {
        let node = CompactNode {
            id: Infohash::random(),
            addr: "127.0.0.1:6881".parse().unwrap(),
        };
        let encoded = encode_compact_node(&node);
        assert_eq!(encoded.len(), 26);
        assert_eq!(decode_compact_node(&encoded).unwrap(), node);
    }

    #[test]
    fn ipv6_node_round_trip_is_38_bytes() {
        let node = CompactNode {
            id: Infohash::random(),
            addr: "[::1]:6881".parse().unwrap(),
        };
        let encoded = encode_compact_node(&node);
        assert_eq!(encoded.len(), 38);
        assert_eq!(decode_compact_node(&encoded).unwrap(), node);
    }

    #[test]
    fn peer_addr_round_trip_is_6_bytes_for_ipv4() {
        let addr: SocketAddr = "10.0.0.1:49152".parse().unwrap();
        let encoded = encode_peer_addr(addr);
        assert_eq!(encoded.len(), 6);
        assert_eq!(decode_peer_addr(&encoded).unwrap(), addr);
    }

    #[test]
    fn rejects_wrong_lengths() {
        assert!(decode_compact_node(&[0u8; 25]).is_err());
        assert!(decode_peer_addr(&[0u8; 5]).is_err());
    }

    #[test]
    fn decode_compact_nodes_splits_concatenated_entries() {
        let a = CompactNode {
            id: Infohash::random(),
            addr: "1.2.3.4:1".parse().unwrap(),
        };
        let b = CompactNode {
            id: Infohash::random(),
            addr: "5.6.7.8:2".parse().unwrap(),
        };
        let mut buf = encode_compact_node(&a);
        buf.extend(encode_compact_node(&b));
        let nodes = decode_compact_nodes(&buf, 26);
        assert_eq!(nodes, vec![a, b]);
    }
}
