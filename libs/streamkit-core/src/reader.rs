//! Multi-stream synchronization and frame-ready dispatch (SPEC_FULL.md §4.3).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::connection::{ConnectionInner, StreamConnection};
use crate::error::{Result, StreamError};
use crate::frame_bin::FrameSnapshot;
use crate::stream::{Stream, StreamDescription};
use crate::stream_set::StreamSet;

/// Delivered to a frame-ready callback (SPEC_FULL.md §4.3, §5 scenario 6).
#[derive(Clone)]
pub struct FrameReadyEvent {
    pub reader: StreamReader,
    pub description: StreamDescription,
    pub tag: u64,
}

pub type FrameReadyCallback = Arc<dyn Fn(FrameReadyEvent) + Send + Sync>;

#[derive(Clone)]
struct CallbackRegistration {
    id: u64,
    callback: FrameReadyCallback,
    tag: u64,
}

/// Guards the dispatch-coalescing state as one unit so "pending is empty,
/// stop dispatching" and "pending just gained an entry, is someone already
/// dispatching" can never race each other.
#[derive(Default)]
struct DispatchState {
    pending: HashSet<StreamDescription>,
    dispatching: bool,
}

pub(crate) struct ReaderInner {
    weak_self: Weak<ReaderInner>,
    stream_set: StreamSet,
    connections: Mutex<HashMap<StreamDescription, Arc<ConnectionInner>>>,
    wake_mutex: Mutex<()>,
    condvar: Condvar,
    callbacks: Mutex<Vec<CallbackRegistration>>,
    next_callback_id: AtomicU64,
    dispatch_state: Mutex<DispatchState>,
    shutdown: AtomicBool,
}

impl ReaderInner {
    fn new(stream_set: StreamSet) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            stream_set,
            connections: Mutex::new(HashMap::new()),
            wake_mutex: Mutex::new(()),
            condvar: Condvar::new(),
            callbacks: Mutex::new(Vec::new()),
            next_callback_id: AtomicU64::new(0),
            dispatch_state: Mutex::new(DispatchState::default()),
            shutdown: AtomicBool::new(false),
        })
    }

    fn get_stream(&self, description: StreamDescription) -> StreamConnection {
        if let Some(conn) = self.connections.lock().get(&description) {
            return StreamConnection(conn.clone());
        }

        let stream = self
            .stream_set
            .find_by_type_subtype(description)
            .unwrap_or_else(|| self.stream_set.create_placeholder(description));

        let mut connections = self.connections.lock();
        if let Some(conn) = connections.get(&description) {
            return StreamConnection(conn.clone());
        }
        let conn = ConnectionInner::new(stream.clone(), self.weak_self.clone());
        stream.register_connection(&conn);
        connections.insert(description, conn.clone());
        StreamConnection(conn)
    }

    /// Invoked (from the publisher's thread, see SPEC_FULL.md §5) whenever a
    /// connection belonging to this reader sees a new sequence. Wakes any
    /// blocked `lock` and dispatches frame-ready callbacks.
    pub(crate) fn wake_for_new_frame(&self, description: StreamDescription) {
        {
            let _guard = self.wake_mutex.lock();
            self.condvar.notify_all();
        }
        self.dispatch_frame_ready(description);
    }

    /// Coalesces by connection identity, not by call: a description that
    /// arrives while another thread is mid-dispatch is queued and delivered
    /// by that thread's next drain, never folded into a description it
    /// didn't belong to. The pending set and the in-flight flag share one
    /// lock so "pending just became empty" and "a new description just
    /// arrived" can't interleave and strand an entry.
    fn dispatch_frame_ready(&self, description: StreamDescription) {
        let mut state = self.dispatch_state.lock();
        state.pending.insert(description);
        if state.dispatching {
            return;
        }
        state.dispatching = true;
        drop(state);

        let reader = self.weak_self.upgrade().map(StreamReader);

        loop {
            let pending: Vec<StreamDescription> = {
                let mut state = self.dispatch_state.lock();
                if state.pending.is_empty() {
                    state.dispatching = false;
                    break;
                }
                state.pending.drain().collect()
            };

            if let Some(reader) = &reader {
                let snapshot = self.callbacks.lock().clone();
                for description in pending {
                    for registration in &snapshot {
                        (registration.callback)(FrameReadyEvent {
                            reader: reader.clone(),
                            description,
                            tag: registration.tag,
                        });
                    }
                }
            }
        }
    }

    fn register_frame_ready_callback(&self, callback: FrameReadyCallback, tag: u64) -> u64 {
        let id = self.next_callback_id.fetch_add(1, Ordering::SeqCst);
        self.callbacks.lock().push(CallbackRegistration { id, callback, tag });
        id
    }

    fn unregister_frame_ready_callback(&self, id: u64) {
        self.callbacks.lock().retain(|reg| reg.id != id);
    }

    fn has_any_unseen_frame(&self) -> bool {
        self.connections.lock().values().any(|c| c.has_unseen_frame())
    }

    fn snapshot_locked_connections(&self) -> Vec<FrameHandleEntry> {
        let connections = self.connections.lock();
        let mut entries = Vec::new();
        for (description, conn) in connections.iter() {
            if !conn.is_started() {
                continue;
            }
            if let Some(snapshot) = conn.snapshot_for_lock() {
                entries.push(FrameHandleEntry {
                    description: *description,
                    stream: conn.stream(),
                    snapshot,
                });
            }
        }
        entries
    }

    fn lock(&self, timeout_ms: i64) -> Result<FrameHandle> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(StreamError::Shutdown);
        }

        let deadline = (timeout_ms > 0).then(|| Instant::now() + Duration::from_millis(timeout_ms as u64));
        let mut guard = self.wake_mutex.lock();
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Err(StreamError::Shutdown);
            }
            if self.has_any_unseen_frame() {
                break;
            }
            if timeout_ms == 0 {
                return Err(StreamError::Timeout);
            }
            match deadline {
                None => {
                    self.condvar.wait(&mut guard);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(StreamError::Timeout);
                    }
                    let timed_out = self.condvar.wait_for(&mut guard, deadline - now).timed_out();
                    if timed_out && !self.has_any_unseen_frame() {
                        return Err(StreamError::Timeout);
                    }
                }
            }
        }
        drop(guard);

        Ok(FrameHandle { entries: self.snapshot_locked_connections() })
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _guard = self.wake_mutex.lock();
        self.condvar.notify_all();
    }
}

/// Client-side grouping of connections offering atomic multi-stream locking.
#[derive(Clone)]
pub struct StreamReader(pub(crate) Arc<ReaderInner>);

impl StreamReader {
    pub(crate) fn new(stream_set: StreamSet) -> Self {
        Self(ReaderInner::new(stream_set))
    }

    /// Idempotent: first call creates the connection (possibly a placeholder),
    /// subsequent calls return the same object.
    pub fn get_stream(&self, description: StreamDescription) -> StreamConnection {
        self.0.get_stream(description)
    }

    pub fn lock(&self, timeout_ms: i64) -> Result<FrameHandle> {
        self.0.lock(timeout_ms)
    }

    pub fn register_frame_ready_callback(&self, callback: FrameReadyCallback, tag: u64) -> u64 {
        self.0.register_frame_ready_callback(callback, tag)
    }

    /// Idempotent: removing an already-removed id is a no-op.
    pub fn unregister_frame_ready_callback(&self, id: u64) {
        self.0.unregister_frame_ready_callback(id)
    }

    /// Handed to `Context` so it can force this reader's `lock` to return
    /// `Shutdown` on `terminate` without keeping it alive past its last
    /// client handle.
    pub(crate) fn weak(&self) -> Weak<ReaderInner> {
        Arc::downgrade(&self.0)
    }
}

/// Forces any in-progress or future `lock` on `reader` to return `Shutdown`,
/// if it is still alive. Called by `Context::terminate` for every reader it created.
pub(crate) fn shutdown_reader(reader: &Weak<ReaderInner>) {
    if let Some(reader) = reader.upgrade() {
        reader.shutdown();
    }
}

struct FrameHandleEntry {
    description: StreamDescription,
    stream: Stream,
    snapshot: FrameSnapshot,
}

/// A composite, internally-consistent snapshot across every started
/// connection whose stream has ever published. Releases all pins on drop —
/// `unlock` is sugar for `drop`, not a separate bookkeeping step
/// (SPEC_FULL.md §4.3).
pub struct FrameHandle {
    entries: Vec<FrameHandleEntry>,
}

impl FrameHandle {
    pub fn get(&self, description: StreamDescription) -> Option<&FrameSnapshot> {
        self.entries
            .iter()
            .find(|e| e.description == description)
            .map(|e| &e.snapshot)
    }

    pub fn descriptions(&self) -> impl Iterator<Item = StreamDescription> + '_ {
        self.entries.iter().map(|e| e.description)
    }
}

impl Drop for FrameHandle {
    fn drop(&mut self) {
        for entry in &self.entries {
            entry.stream.bin().release_read(&entry.snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SetCatalog;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn new_reader() -> (SetCatalog, StreamReader) {
        let catalog = SetCatalog::new();
        let set = catalog.open("device/0", 3);
        let reader = StreamReader::new(set);
        (catalog, reader)
    }

    #[test]
    fn lock_nonblocking_times_out_with_no_data() {
        let (_catalog, reader) = new_reader();
        reader.get_stream(StreamDescription::new(1, 0));
        let err = reader.lock(0).unwrap_err();
        assert!(matches!(err, StreamError::Timeout));
    }

    #[test]
    fn lock_returns_published_frame() {
        let (_catalog, reader) = new_reader();
        let conn = reader.get_stream(StreamDescription::new(1, 0));
        conn.stream().publish_frame(vec![9, 9], vec![]).unwrap();
        let handle = reader.lock(0).unwrap();
        let snapshot = handle.get(StreamDescription::new(1, 0)).unwrap();
        assert_eq!(&*snapshot.payload, &[9, 9]);
    }

    #[test]
    fn consecutive_locks_strictly_increase_sequence() {
        let (_catalog, reader) = new_reader();
        let conn = reader.get_stream(StreamDescription::new(1, 0));
        conn.stream().publish_frame(vec![1], vec![]).unwrap();
        let first = reader.lock(0).unwrap();
        let s1 = first.get(StreamDescription::new(1, 0)).unwrap().sequence;
        drop(first);

        conn.stream().publish_frame(vec![2], vec![]).unwrap();
        let second = reader.lock(0).unwrap();
        let s2 = second.get(StreamDescription::new(1, 0)).unwrap().sequence;
        assert!(s2 > s1);
    }

    #[test]
    fn blocking_lock_wakes_on_publish_from_another_thread() {
        let (_catalog, reader) = new_reader();
        let conn = reader.get_stream(StreamDescription::new(1, 0));
        let stream = conn.stream();

        let reader_clone = reader.clone();
        let handle_thread = thread::spawn(move || reader_clone.lock(1000));

        thread::sleep(Duration::from_millis(20));
        stream.publish_frame(vec![7], vec![]).unwrap();

        let handle = handle_thread.join().unwrap().unwrap();
        assert_eq!(handle.get(StreamDescription::new(1, 0)).unwrap().payload[0], 7);
    }

    #[test]
    fn unregister_callback_stops_future_invocations() {
        let (_catalog, reader) = new_reader();
        let conn = reader.get_stream(StreamDescription::new(1, 0));
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let id = reader.register_frame_ready_callback(
            Arc::new(move |_event| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
            0,
        );
        conn.stream().publish_frame(vec![1], vec![]).unwrap();
        reader.unregister_frame_ready_callback(id);
        conn.stream().publish_frame(vec![2], vec![]).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_dispatch_on_different_connections_delivers_both_descriptions() {
        let (_catalog, reader) = new_reader();
        let conn_a = reader.get_stream(StreamDescription::new(1, 0));
        let conn_b = reader.get_stream(StreamDescription::new(2, 0));
        let stream_a = conn_a.stream();
        let stream_b = conn_b.stream();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        reader.register_frame_ready_callback(
            Arc::new(move |event| {
                // Simulate a slow callback so a concurrent publish on the
                // other stream lands while this dispatch is in flight.
                thread::sleep(Duration::from_millis(20));
                seen_clone.lock().push(event.description);
            }),
            0,
        );

        let thread_a = thread::spawn(move || stream_a.publish_frame(vec![1], vec![]).unwrap());
        thread::sleep(Duration::from_millis(5));
        let thread_b = thread::spawn(move || stream_b.publish_frame(vec![2], vec![]).unwrap());

        thread_a.join().unwrap();
        thread_b.join().unwrap();
        // Give the coalesced redispatch loop time to drain.
        thread::sleep(Duration::from_millis(100));

        let seen = seen.lock();
        assert!(seen.contains(&StreamDescription::new(1, 0)));
        assert!(seen.contains(&StreamDescription::new(2, 0)));
    }

    #[test]
    fn frame_handle_drop_releases_pins() {
        let (_catalog, reader) = new_reader();
        let conn = reader.get_stream(StreamDescription::new(1, 0));
        let stream = conn.stream();
        stream.publish_frame(vec![1], vec![]).unwrap();
        {
            let _handle = reader.lock(0).unwrap();
            assert_eq!(stream.bin().total_pins(), 1);
        }
        assert_eq!(stream.bin().total_pins(), 0);
    }
}
