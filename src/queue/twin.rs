//! The twin reported-state round trip (§4.4): a pending queue for entries
//! not yet accepted by the transport, and an ack queue for entries accepted
//! but not yet acknowledged by item id. An entry is never present in both.

use std::collections::VecDeque;
use std::sync::Arc;

/// Fired exactly once, with the transport-reported status code.
pub type TwinCallback = Box<dyn FnOnce(i32)>;

struct TwinEntry {
    item_id: u32,
    payload: Arc<[u8]>,
    callback: Option<TwinCallback>,
}

/// Allocates item ids, monotonically increasing and wrapping from
/// `u32::MAX` back to 1 (0 is reserved and never handed out; see invariant 2
/// in §4's invariant list).
#[derive(Default)]
pub struct ItemIdAllocator {
    last: u32,
}

impl ItemIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> u32 {
        self.last = if self.last == u32::MAX { 1 } else { self.last + 1 };
        self.last
    }
}

#[derive(Default)]
pub struct TwinQueues {
    pending: VecDeque<TwinEntry>,
    ack: VecDeque<TwinEntry>,
}

impl TwinQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn ack_len(&self) -> usize {
        self.ack.len()
    }

    pub fn enqueue_pending(
        &mut self,
        item_id: u32,
        payload: Arc<[u8]>,
        callback: Option<TwinCallback>,
    ) {
        self.pending.push_back(TwinEntry {
            item_id,
            payload,
            callback,
        });
    }

    /// A read-only view of the pending queue, front to back, for the driver
    /// loop to feed the transport's per-item processor one at a time.
    pub fn pending_payloads(&self) -> impl Iterator<Item = (u32, &[u8])> {
        self.pending.iter().map(|e| (e.item_id, e.payload.as_ref()))
    }

    /// Move the front pending entry (matching `item_id`) to the ack queue,
    /// once the transport's per-item processor accepts it.
    pub fn accept_front(&mut self, item_id: u32) {
        if let Some(front) = self.pending.front() {
            if front.item_id == item_id {
                let entry = self.pending.pop_front().unwrap();
                self.ack.push_back(entry);
            }
        }
    }

    /// Drop the front pending entry without acking it (the transport's
    /// per-item processor signaled an error for it).
    pub fn drop_front(&mut self) -> Option<u32> {
        self.pending.pop_front().map(|e| e.item_id)
    }

    /// Scan the ack queue for `item_id` and, if found, remove it and return
    /// its callback plus the status to fire it with. Unmatched ids are
    /// ignored, per §4.4.
    pub fn acknowledge(&mut self, item_id: u32, status: i32) -> Option<(Option<TwinCallback>, i32)> {
        let pos = self.ack.iter().position(|e| e.item_id == item_id)?;
        let entry = self.ack.remove(pos)?;
        Some((entry.callback, status))
    }

    /// Drain both queues for teardown. No callbacks fire for twin entries on
    /// destroy (§4.10), so this only returns ids for bookkeeping/logging.
    pub fn drain_for_destroy(&mut self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.pending.drain(..).map(|e| e.item_id).collect();
        ids.extend(self.ack.drain(..).map(|e| e.item_id));
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_ids_are_monotone_and_skip_zero() {
        let mut alloc = ItemIdAllocator::new();
        assert_eq!(alloc.next(), 1);
        assert_eq!(alloc.next(), 2);
        assert_eq!(alloc.next(), 3);
    }

    #[test]
    fn item_ids_wrap_from_u32_max_to_one() {
        let mut alloc = ItemIdAllocator {
            last: u32::MAX - 1,
        };
        assert_eq!(alloc.next(), u32::MAX);
        assert_eq!(alloc.next(), 1);
        assert_ne!(alloc.next(), 0);
    }

    #[test]
    fn s5_twin_round_trip_acks_out_of_enqueue_order() {
        let mut queues = TwinQueues::new();
        queues.enqueue_pending(1, Arc::from(b"p1".as_slice()), None);
        queues.enqueue_pending(2, Arc::from(b"p2".as_slice()), None);

        queues.accept_front(1);
        queues.accept_front(2);
        assert_eq!(queues.pending_len(), 0);
        assert_eq!(queues.ack_len(), 2);

        assert!(queues.acknowledge(2, 200).is_some());
        assert!(queues.acknowledge(1, 200).is_some());
        assert_eq!(queues.ack_len(), 0);
    }

    #[test]
    fn unmatched_ack_id_is_ignored() {
        let mut queues = TwinQueues::new();
        queues.enqueue_pending(1, Arc::from(b"p1".as_slice()), None);
        queues.accept_front(1);
        assert!(queues.acknowledge(99, 200).is_none());
        assert_eq!(queues.ack_len(), 1);
    }

    #[test]
    fn no_entry_appears_in_both_queues() {
        let mut queues = TwinQueues::new();
        queues.enqueue_pending(1, Arc::from(b"p1".as_slice()), None);
        queues.accept_front(1);
        assert_eq!(queues.pending_len(), 0);
        assert_eq!(queues.ack_len(), 1);
    }
}
