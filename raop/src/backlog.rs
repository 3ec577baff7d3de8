//! Bounded insertion-ordered store of recently-sent audio packets, used
//! to service retransmit requests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Default capacity; the oldest entry is evicted once a new insert would
/// exceed this.
pub const PACKET_BACKLOG_SIZE: usize = 1000;

pub type SharedBacklog = Arc<Mutex<PacketBacklog>>;

/// Insertion-ordered `seqno -> bytes` map with oldest-eviction at
/// capacity. Lookup and membership are O(1). Not thread-shared: all
/// access happens from the task driving the streaming loop and control
/// endpoint, which share one event loop.
pub struct PacketBacklog {
    // ---
    capacity: usize,
    order: VecDeque<u16>,
    packets: HashMap<u16, Vec<u8>>,
}

impl PacketBacklog {
    // ---
    pub fn new(capacity: usize) -> Self {
        // ---
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            packets: HashMap::with_capacity(capacity),
        }
    }

    /// Inserts `bytes` under `seqno`, evicting the single oldest entry if
    /// the backlog is already at capacity. Re-inserting an existing
    /// `seqno` replaces its bytes without changing eviction order.
    pub fn insert(&mut self, seqno: u16, bytes: Vec<u8>) {
        // ---
        if self.packets.insert(seqno, bytes).is_some() {
            return;
        }
        self.order.push_back(seqno);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.packets.remove(&oldest);
            }
        }
    }

    pub fn contains(&self, seqno: u16) -> bool {
        // ---
        self.packets.contains_key(&seqno)
    }

    pub fn get(&self, seqno: u16) -> Option<&[u8]> {
        // ---
        self.packets.get(&seqno).map(Vec::as_slice)
    }

    pub fn clear(&mut self) {
        // ---
        self.order.clear();
        self.packets.clear();
    }

    pub fn len(&self) -> usize {
        // ---
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        // ---
        self.packets.is_empty()
    }
}

impl Default for PacketBacklog {
    // ---
    fn default() -> Self {
        // ---
        Self::new(PACKET_BACKLOG_SIZE)
    }
}
