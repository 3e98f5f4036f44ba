//! Multi-buffered frame exchange between one producer and many readers
//! (SPEC_FULL.md §4.1).
//!
//! Grounded on `streamlib/src/core/buffers.rs::RingBuffer`: fixed slot count,
//! latest-read semantics, no queueing, no backpressure. This bin generalizes
//! that discipline with per-slot pin counts so multiple readers can hold the
//! *ready* slot concurrently without ever stalling the producer, and with a
//! strictly increasing sequence number per published slot.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, StreamError};

/// A pinned snapshot of one published frame, returned by [`FrameBin::acquire_read`].
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub sequence: u64,
    pub payload: Arc<[u8]>,
    pub metadata: Arc<[u8]>,
    slot_index: usize,
}

struct Slot {
    sequence: u64,
    payload: Arc<[u8]>,
    metadata: Arc<[u8]>,
    pins: usize,
    occupied: bool,
}

impl Slot {
    fn empty() -> Self {
        Self {
            sequence: 0,
            payload: Arc::from(&[][..]),
            metadata: Arc::from(&[][..]),
            pins: 0,
            occupied: false,
        }
    }
}

struct BinState {
    slots: Vec<Slot>,
    ready: Option<usize>,
    next_sequence: u64,
}

/// A fixed-size ring of frame slots for exactly one stream.
pub struct FrameBin {
    state: Mutex<BinState>,
}

/// Handle to a slot reserved for writing via [`FrameBin::begin_write`].
pub struct WriteToken {
    index: usize,
}

impl FrameBin {
    /// Creates a bin with `slot_count` slots (N >= 2).
    pub fn new(slot_count: usize) -> Self {
        assert!(slot_count >= 2, "FrameBin needs at least 2 slots, got {slot_count}");
        Self {
            state: Mutex::new(BinState {
                slots: (0..slot_count).map(|_| Slot::empty()).collect(),
                ready: None,
                next_sequence: 0,
            }),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Reserves a slot distinct from *ready* and any currently pinned slot.
    pub fn begin_write(&self) -> Result<WriteToken> {
        let state = self.state.lock();
        for (index, slot) in state.slots.iter().enumerate() {
            if Some(index) != state.ready && slot.pins == 0 {
                return Ok(WriteToken { index });
            }
        }
        Err(StreamError::InternalError(
            "FrameBin::begin_write: no writable slot (all slots pinned by readers)".to_string(),
        ))
    }

    /// Installs the reserved slot as the new *ready* slot, stamping the next
    /// sequence number. Consumes the write token so a stale token can't be
    /// reused after another `end_write`.
    pub fn end_write(&self, token: WriteToken, payload: Vec<u8>, metadata: Vec<u8>) -> u64 {
        let mut state = self.state.lock();
        let sequence = state.next_sequence;
        state.next_sequence += 1;

        let slot = &mut state.slots[token.index];
        slot.sequence = sequence;
        slot.payload = Arc::from(payload.into_boxed_slice());
        slot.metadata = Arc::from(metadata.into_boxed_slice());
        slot.occupied = true;
        state.ready = Some(token.index);

        sequence
    }

    /// Pins and returns the current *ready* slot. Returns `None` if nothing
    /// has ever been published.
    pub fn acquire_read(&self) -> Option<FrameSnapshot> {
        let mut state = self.state.lock();
        let ready = state.ready?;
        let slot = &mut state.slots[ready];
        slot.pins += 1;
        Some(FrameSnapshot {
            sequence: slot.sequence,
            payload: slot.payload.clone(),
            metadata: slot.metadata.clone(),
            slot_index: ready,
        })
    }

    /// Releases a pin acquired by `acquire_read`.
    pub fn release_read(&self, snapshot: &FrameSnapshot) {
        let mut state = self.state.lock();
        let slot = &mut state.slots[snapshot.slot_index];
        debug_assert!(slot.pins > 0, "FrameBin::release_read: pin count underflow");
        slot.pins = slot.pins.saturating_sub(1);
    }

    /// Sequence number of the current *ready* slot, without pinning it.
    pub fn ready_sequence(&self) -> Option<u64> {
        let state = self.state.lock();
        state.ready.map(|idx| state.slots[idx].sequence)
    }

    /// True once at least one frame has been published.
    pub fn has_published(&self) -> bool {
        self.state.lock().ready.is_some()
    }

    /// Reallocates the bin with a new slot count. Only permitted when no
    /// slot is currently pinned; resets sequence numbering to zero.
    pub fn resize(&self, new_slot_count: usize) -> Result<()> {
        assert!(new_slot_count >= 2, "FrameBin needs at least 2 slots, got {new_slot_count}");
        let mut state = self.state.lock();
        if state.slots.iter().any(|s| s.pins > 0) {
            return Err(StreamError::InvalidOperation(
                "FrameBin::resize: cannot resize while slots are pinned".to_string(),
            ));
        }
        state.slots = (0..new_slot_count).map(|_| Slot::empty()).collect();
        state.ready = None;
        state.next_sequence = 0;
        Ok(())
    }

    /// Diagnostic accessor for a future debug-mode watchdog (SPEC_FULL.md §5):
    /// total pins currently outstanding across all slots.
    pub fn total_pins(&self) -> usize {
        self.state.lock().slots.iter().map(|s| s.pins).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish(bin: &FrameBin, payload: &[u8]) -> u64 {
        let token = bin.begin_write().unwrap();
        bin.end_write(token, payload.to_vec(), Vec::new())
    }

    #[test]
    fn sequence_numbers_strictly_increase() {
        let bin = FrameBin::new(3);
        assert_eq!(publish(&bin, b"a"), 0);
        assert_eq!(publish(&bin, b"b"), 1);
        assert_eq!(publish(&bin, b"c"), 2);
        assert_eq!(bin.ready_sequence(), Some(2));
    }

    #[test]
    fn acquire_read_before_any_publish_is_none() {
        let bin = FrameBin::new(3);
        assert!(bin.acquire_read().is_none());
    }

    #[test]
    fn multiple_readers_see_same_ready_slot() {
        let bin = FrameBin::new(3);
        publish(&bin, b"frame");
        let a = bin.acquire_read().unwrap();
        let b = bin.acquire_read().unwrap();
        assert_eq!(a.sequence, b.sequence);
        assert_eq!(&*a.payload, b"frame");
        assert_eq!(bin.total_pins(), 2);
        bin.release_read(&a);
        bin.release_read(&b);
        assert_eq!(bin.total_pins(), 0);
    }

    #[test]
    fn pinned_slots_are_never_chosen_for_writing() {
        let bin = FrameBin::new(2);
        publish(&bin, b"one");
        let pinned = bin.acquire_read().unwrap();
        // Only 2 slots: the ready one is pinned, the other is free to write.
        let token = bin.begin_write().unwrap();
        bin.end_write(token, b"two".to_vec(), Vec::new());
        // The pinned snapshot is untouched even though bin advanced.
        assert_eq!(&*pinned.payload, b"one");
        bin.release_read(&pinned);
    }

    #[test]
    fn begin_write_fails_when_every_slot_pinned() {
        let bin = FrameBin::new(2);
        publish(&bin, b"one");
        let a = bin.acquire_read().unwrap();
        // Write into the other slot, then pin it too — now both are pinned.
        let token = bin.begin_write().unwrap();
        bin.end_write(token, b"two".to_vec(), Vec::new());
        let b = bin.acquire_read().unwrap();
        assert!(bin.begin_write().is_err());
        bin.release_read(&a);
        bin.release_read(&b);
    }

    #[test]
    fn resize_rejected_while_pinned() {
        let bin = FrameBin::new(3);
        publish(&bin, b"one");
        let pinned = bin.acquire_read().unwrap();
        assert!(bin.resize(4).is_err());
        bin.release_read(&pinned);
        assert!(bin.resize(4).is_ok());
        assert_eq!(bin.slot_count(), 4);
        assert_eq!(bin.ready_sequence(), None);
    }
}
