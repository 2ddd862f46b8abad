//! The outbound telemetry queue (§4.3): holds cloned messages awaiting send,
//! each with an optional per-message timeout deadline measured in ticks
//! since enqueue, not wall-clock time.

use std::collections::VecDeque;

use crate::tick::Tick;
use crate::transport::{ConfirmationResult, OutboundMessageRef};

/// Fired exactly once per entry: on completion, timeout, or destroy.
pub type OutboundCallback = Box<dyn FnOnce(ConfirmationResult)>;

struct OutboundEntry {
    id: u64,
    payload: Vec<u8>,
    output_name: Option<String>,
    callback: Option<OutboundCallback>,
    created_at: Tick,
    timeout_ms: Option<u64>,
}

/// Completed entry handed back to the caller for firing the user callback.
/// The queue never invokes callbacks itself; it only decides which entries
/// are done and hands them over, keeping callback invocation (and any panics
/// in it) at the call site.
pub struct Completed {
    pub id: u64,
    pub callback: Option<OutboundCallback>,
    pub result: ConfirmationResult,
}

#[derive(Default)]
pub struct OutboundQueue {
    entries: VecDeque<OutboundEntry>,
    next_id: u64,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clone `payload` into the queue and assign it a fresh correlation id.
    /// `timeout_ms = None` means no timeout. Insertion order is preserved
    /// (FIFO), matching the ordering guarantee in §4's "Ordering
    /// guarantees" paragraph.
    pub fn enqueue(
        &mut self,
        payload: Vec<u8>,
        output_name: Option<String>,
        callback: Option<OutboundCallback>,
        now: Tick,
        timeout_ms: Option<u64>,
    ) -> u64 {
        self.next_id = self.next_id.wrapping_add(1);
        let id = self.next_id;
        self.entries.push_back(OutboundEntry {
            id,
            payload,
            output_name,
            callback,
            created_at: now,
            timeout_ms,
        });
        id
    }

    /// A read-only view of every currently queued entry, for handing to the
    /// transport.
    pub fn snapshot_refs(&self) -> Vec<OutboundMessageRef<'_>> {
        self.entries
            .iter()
            .map(|e| OutboundMessageRef {
                id: e.id,
                payload: &e.payload,
                output_name: e.output_name.as_deref(),
            })
            .collect()
    }

    /// Remove and return every entry whose deadline has elapsed as of `now`.
    /// An entry with `timeout_ms = None` never times out.
    pub fn sweep_timeouts(&mut self, now: Tick) -> Vec<Completed> {
        let mut timed_out = Vec::new();
        self.entries.retain(|entry| {
            let Some(timeout_ms) = entry.timeout_ms else {
                return true;
            };
            if now.saturating_sub(entry.created_at) > timeout_ms {
                timed_out.push(entry.id);
                false
            } else {
                true
            }
        });

        timed_out
            .into_iter()
            .filter_map(|id| self.remove(id))
            .map(|(id, callback)| Completed {
                id,
                callback,
                result: ConfirmationResult::MessageTimeout,
            })
            .collect()
    }

    /// Remove and return every entry whose id is in `ids`, all carrying the
    /// same `result` (the transport reports completion as a batch with a
    /// single verdict; see §4 "Data flow").
    pub fn complete_batch(&mut self, ids: &[u64], result: ConfirmationResult) -> Vec<Completed> {
        ids.iter()
            .filter_map(|&id| self.remove(id))
            .map(|(id, callback)| Completed {
                id,
                callback,
                result,
            })
            .collect()
    }

    /// Drain every remaining entry, for teardown (§4.10): all fire with
    /// `BECAUSE_DESTROY`.
    pub fn drain_for_destroy(&mut self) -> Vec<Completed> {
        self.entries
            .drain(..)
            .map(|e| Completed {
                id: e.id,
                callback: e.callback,
                result: ConfirmationResult::BecauseDestroy,
            })
            .collect()
    }

    fn remove(&mut self, id: u64) -> Option<(u64, Option<OutboundCallback>)> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        let entry = self.entries.remove(pos)?;
        Some((entry.id, entry.callback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_preserved_in_snapshot() {
        let mut q = OutboundQueue::new();
        q.enqueue(b"a".to_vec(), None, None, Tick::ZERO, None);
        q.enqueue(b"b".to_vec(), None, None, Tick::ZERO, None);
        let refs = q.snapshot_refs();
        assert_eq!(refs[0].payload, b"a");
        assert_eq!(refs[1].payload, b"b");
    }

    #[test]
    fn s4_timeout_fires_after_sweep() {
        let mut q = OutboundQueue::new();
        let id = q.enqueue(b"a".to_vec(), None, None, Tick::ZERO, Some(1000));
        let _ = id;
        // Advance past tick 1500: (1500 - 0) > 1000.
        let later = Tick::from_millis(1500);
        let completed = q.sweep_timeouts(later);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].result, ConfirmationResult::MessageTimeout);
        assert!(q.is_empty());
    }

    #[test]
    fn no_timeout_entries_never_sweep() {
        let mut q = OutboundQueue::new();
        q.enqueue(b"a".to_vec(), None, None, Tick::ZERO, None);
        let later = Tick::from_millis(u64::MAX);
        assert!(q.sweep_timeouts(later).is_empty());
    }

    #[test]
    fn complete_batch_removes_only_named_ids_in_transport_order() {
        let mut q = OutboundQueue::new();
        let a = q.enqueue(b"a".to_vec(), None, None, Tick::ZERO, None);
        let b = q.enqueue(b"b".to_vec(), None, None, Tick::ZERO, None);
        let completed = q.complete_batch(&[b, a], ConfirmationResult::Ok);
        assert_eq!(completed[0].id, b);
        assert_eq!(completed[1].id, a);
        assert!(q.is_empty());
    }

    #[test]
    fn destroy_drains_everything_as_because_destroy() {
        let mut q = OutboundQueue::new();
        q.enqueue(b"a".to_vec(), None, None, Tick::ZERO, None);
        q.enqueue(b"b".to_vec(), None, None, Tick::ZERO, None);
        let completed = q.drain_for_destroy();
        assert_eq!(completed.len(), 2);
        assert!(completed
            .iter()
            .all(|c| c.result == ConfirmationResult::BecauseDestroy));
        assert!(q.is_empty());
    }
}
