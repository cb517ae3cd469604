//! Fixed pool of reusable byte buffers for the UDP receive hot path.
//!
//! Modeled on the original crawler's channel-backed slab: a bounded
//! channel doubles as both the free-list and the blocking primitive, so
//! `alloc` is just a receive and `free` is just a send.
use tokio::sync::mpsc::{self, Receiver, Sender};

const BLOCK_SIZE: usize = 8192;

pub struct Slab {
    free: Sender<Vec<u8>>,
    taken: Receiver<Vec<u8>>,
}

impl Slab {
    pub fn new(num_blocks: usize) -> Self {
        let (free, taken) = mpsc::channel(num_blocks);
        for _ in 0..num_blocks {
            free
                .try_send(vec![0u8; BLOCK_SIZE])
                .expect("channel sized to num_blocks");
        }
        Slab { free, taken }
    }

    /// Waits for a free buffer, resetting it to full capacity first.
    pub async fn alloc(&mut self) -> Vec<u8> {
        let mut buf = self
            .taken
            .recv()
            .await
            .expect("slab sender half outlives every receiver");
        buf.resize(BLOCK_SIZE, 0);
        buf
    }

    /// Returns a buffer to the pool. Dropped silently if the pool is
    /// somehow full already (double free).
    pub fn free(&self, buf: Vec<u8>) {
        let _ = self.free.try_send(buf);
    }
}
