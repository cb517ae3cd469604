//! Bounded routing table keyed by address, ordered max-distance-first so
//! the least useful entry evicts first when over capacity.
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::net::SocketAddr;
use std::sync::Mutex;

use crate::infohash::Infohash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNode {
    pub addr: SocketAddr,
    pub id: Infohash,
}

/// Max-heap entry ordered by distance from the owning node's ID, so the
/// furthest (least useful) node sits at the heap root.
struct Entry {
    distance: u32,
    node: RemoteNode,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: `distance` counts leading shared bits, so a smaller
        // value means a more-distant node. The furthest node must be the
        // heap's max (its root), so it sorts as the greatest `Entry`.
        other.distance.cmp(&self.distance)
    }
}

struct Inner {
    heap: BinaryHeap<Entry>,
    addrs: HashSet<String>,
}

/// A bounded, concurrency-safe set of remote DHT nodes.
///
/// All operations hold a single mutex; the heap gives O(log N) add and
/// evict at the cost of O(N) for `get`, which is rare and small (`n` is
/// bounded by the refresh cadence, not the table size).
pub struct RoutingTable {
    self_id: Infohash,
    capacity: usize,
    inner: Mutex<Inner>,
}

impl RoutingTable {
    pub fn new(self_id: Infohash, capacity: usize) -> Self {
        RoutingTable {
            self_id,
            capacity,
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                addrs: HashSet::new(),
            }),
        }
    }

    /// Inserts `node` unless its address is already present, its id is
    /// the owner's own id, or its address has already been seen. Evicts
    /// the furthest node if this insertion pushes the table over
    /// capacity.
    pub fn add(&self, node: RemoteNode) {
        if node.id == self.self_id {
            return;
        }
        let key = node.addr.to_string();
        let mut inner = self.inner.lock().expect("routing table mutex poisoned");
        if inner.addrs.contains(&key) {
            return;
        }
        let distance = self.self_id.distance(&node.id);
        inner.addrs.insert(key);
        inner.heap.push(Entry { distance, node });

        while inner.heap.len() > self.capacity {
            if let Some(evicted) = inner.heap.pop() {
                inner.addrs.remove(&evicted.node.addr.to_string());
            }
        }
    }

    /// Returns up to `n` nodes (all of them if `n == 0`), closest-first
    /// by distance from the owning node's ID.
    pub fn get(&self, n: usize) -> Vec<RemoteNode> {
        let inner = self.inner.lock().expect("routing table mutex poisoned");
        let mut entries: Vec<&Entry> = inner.heap.iter().collect();
        entries.sort_by(|a, b| a.distance.cmp(&b.distance));
        let iter = entries.into_iter().map(|e| e.node.clone());
        if n == 0 {
            iter.collect()
        } else {
            iter.take(n).collect()
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("routing table mutex poisoned").heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flush(&self) {
        let mut inner = self.inner.lock().expect("routing table mutex poisoned");
        inner.heap.clear();
        inner.addrs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(addr: &str) -> RemoteNode {
        RemoteNode {
            addr: addr.parse().unwrap(),
            id: Infohash::random(),
        }
    }

    #[test]
    fn add_and_get_round_trip() {
        let table = RoutingTable::new(Infohash::random(), 10);
        assert!(table.is_empty());
        table.add(node("127.0.0.1:1"));
        table.add(node("127.0.0.1:2"));
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0).len(), 2);
        assert_eq!(table.get(1).len(), 1);
    }

    #[test]
    fn dedups_by_addr() {
        let table = RoutingTable::new(Infohash::random(), 10);
        let n = node("127.0.0.1:1");
        table.add(n.clone());
        table.add(n);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn self_filter_is_a_no_op() {
        let self_id = Infohash::random();
        let table = RoutingTable::new(self_id, 10);
        table.add(RemoteNode {
            addr: "127.0.0.1:1".parse().unwrap(),
            id: self_id,
        });
        assert!(table.is_empty());
    }

    #[test]
    fn evicts_furthest_node_over_capacity() {
        let self_id = Infohash::from_bytes([0u8; 20]);
        let table = RoutingTable::new(self_id, 1);

        let mut near_bytes = [0u8; 20];
        near_bytes[0] = 0b0000_0001;
        let near = RemoteNode {
            addr: "127.0.0.1:1".parse().unwrap(),
            id: Infohash::from_bytes(near_bytes),
        };

        let mut far_bytes = [0u8; 20];
        far_bytes[0] = 0b1111_1111;
        let far = RemoteNode {
            addr: "127.0.0.1:2".parse().unwrap(),
            id: Infohash::from_bytes(far_bytes),
        };

        table.add(far);
        table.add(near.clone());
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0), vec![near]);
    }

    #[test]
    fn flush_resets_table() {
        let table = RoutingTable::new(Infohash::random(), 10);
        table.add(node("127.0.0.1:1"));
        table.flush();
        assert!(table.is_empty());
        table.add(node("127.0.0.1:1"));
        assert_eq!(table.len(), 1);
    }
}
