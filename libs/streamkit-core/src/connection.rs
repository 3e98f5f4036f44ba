//! Consumer-side view of a stream (SPEC_FULL.md §3, §4.2).
//!
//! Holds an owning `Arc` to its [`Stream`] and a notifying `Weak` back to its
//! owning [`StreamReader`] (SPEC_FULL.md §9's cycle-breaking convention).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{Result, StreamError};
use crate::frame_bin::FrameSnapshot;
use crate::reader::ReaderInner;
use crate::stream::{Stream, StreamDescription};

/// Opaque result-retrieval identifier, monotonic per connection.
pub type Token = u64;

pub(crate) struct ConnectionInner {
    pub(crate) description: StreamDescription,
    pub(crate) stream: Stream,
    pub(crate) reader: Weak<ReaderInner>,
    started: AtomicBool,
    has_delivered: AtomicBool,
    last_delivered_seq: AtomicU64,
    next_token: AtomicU64,
    inbox: Mutex<HashMap<Token, Vec<u8>>>,
}

impl ConnectionInner {
    pub(crate) fn new(stream: Stream, reader: Weak<ReaderInner>) -> Arc<Self> {
        let description = stream.description();
        Arc::new(Self {
            description,
            stream,
            reader,
            started: AtomicBool::new(true),
            has_delivered: AtomicBool::new(false),
            last_delivered_seq: AtomicU64::new(0),
            next_token: AtomicU64::new(0),
            inbox: Mutex::new(HashMap::new()),
        })
    }

    /// Called by `Stream::publish_frame` for every connection still alive.
    /// Wakes the owning reader if this connection is started.
    pub(crate) fn notify_new_frame(&self) {
        if self.started.load(Ordering::SeqCst) {
            if let Some(reader) = self.reader.upgrade() {
                reader.wake_for_new_frame(self.description);
            }
        }
    }

    pub(crate) fn has_unseen_frame(&self) -> bool {
        if !self.started.load(Ordering::SeqCst) {
            return false;
        }
        if !self.has_delivered.load(Ordering::SeqCst) {
            return self.stream.bin().has_published();
        }
        match self.stream.bin().ready_sequence() {
            Some(seq) => seq > self.last_delivered_seq.load(Ordering::SeqCst),
            None => false,
        }
    }

    /// Snapshots the current ready slot (if the stream has ever published)
    /// and advances the delivered-sequence cursor. Does not check `started`:
    /// callers decide which connections to include in a lock.
    pub(crate) fn snapshot_for_lock(&self) -> Option<FrameSnapshot> {
        let snapshot = self.stream.bin().acquire_read()?;
        self.last_delivered_seq.store(snapshot.sequence, Ordering::SeqCst);
        self.has_delivered.store(true, Ordering::SeqCst);
        Some(snapshot)
    }
}

/// Shared handle to a consumer-side connection.
#[derive(Clone)]
pub struct StreamConnection(pub(crate) Arc<ConnectionInner>);

impl StreamConnection {
    pub fn description(&self) -> StreamDescription {
        self.0.description
    }

    pub fn stream(&self) -> Stream {
        self.0.stream.clone()
    }

    /// Idempotent. Does not destroy the connection when toggled off.
    pub fn start(&self) {
        self.0.started.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.0.started.store(false, Ordering::SeqCst);
    }

    pub fn is_started(&self) -> bool {
        self.0.started.load(Ordering::SeqCst)
    }

    pub fn set_parameter(&self, param_id: u32, bytes: &[u8]) -> Result<()> {
        self.0.stream.set_parameter(param_id, bytes)
    }

    /// Returns `(byte_length, token)`. `byte_length == 0` with a live token
    /// means the plugin deferred the answer; retrieve it via `get_result`.
    pub fn get_parameter(&self, param_id: u32) -> Result<(usize, Token)> {
        let token = self.0.next_token.fetch_add(1, Ordering::SeqCst);
        match self.0.stream.get_parameter(param_id, token)? {
            Some(bytes) => {
                let len = bytes.len();
                self.0.inbox.lock().insert(token, bytes);
                Ok((len, token))
            }
            None => Ok((0, token)),
        }
    }

    pub fn invoke(&self, cmd_id: u32, in_bytes: &[u8]) -> Result<(usize, Token)> {
        let token = self.0.next_token.fetch_add(1, Ordering::SeqCst);
        match self.0.stream.invoke(cmd_id, in_bytes, token)? {
            Some(bytes) => {
                let len = bytes.len();
                self.0.inbox.lock().insert(token, bytes);
                Ok((len, token))
            }
            None => Ok((0, token)),
        }
    }

    /// Retrieves a previously deferred (or already-completed) result.
    /// Fails with `InvalidOperation` for an unknown or expired token.
    pub fn get_result(&self, token: Token) -> Result<Vec<u8>> {
        self.0
            .inbox
            .lock()
            .remove(&token)
            .ok_or_else(|| StreamError::InvalidOperation(format!("unknown or expired token {token}")))
    }

    /// Called by `PluginService::complete_result` to deposit a deferred answer.
    pub(crate) fn complete_result(&self, token: Token, bytes: Vec<u8>) {
        self.0.inbox.lock().insert(token, bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamDescription;

    fn test_stream() -> Stream {
        Stream::new_placeholder(StreamDescription::new(1, 0), 3)
    }

    #[test]
    fn unknown_token_fails_invalid_operation() {
        let conn = StreamConnection(ConnectionInner::new(test_stream(), Weak::new()));
        let err = conn.get_result(999).unwrap_err();
        assert!(matches!(err, StreamError::InvalidOperation(_)));
    }

    #[test]
    fn start_stop_is_idempotent_and_does_not_destroy() {
        let conn = StreamConnection(ConnectionInner::new(test_stream(), Weak::new()));
        conn.stop();
        conn.stop();
        assert!(!conn.is_started());
        conn.start();
        conn.start();
        assert!(conn.is_started());
    }

    #[test]
    fn has_unseen_frame_false_until_publish() {
        let stream = test_stream();
        let conn_inner = ConnectionInner::new(stream.clone(), Weak::new());
        assert!(!conn_inner.has_unseen_frame());
        stream.publish_frame(vec![1], vec![]).unwrap();
        assert!(conn_inner.has_unseen_frame());
    }
}
