//! Producer-side stream object (SPEC_FULL.md §4.2).

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::connection::ConnectionInner;
use crate::error::{Result, StreamError};
use crate::frame_bin::FrameBin;

/// Identifies a stream within a set: a (type, subtype) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamDescription {
    pub stream_type: u32,
    pub subtype: u32,
}

impl StreamDescription {
    pub fn new(stream_type: u32, subtype: u32) -> Self {
        Self { stream_type, subtype }
    }
}

/// Hooks a plugin supplies when registering a stream, invoked synchronously
/// from the consumer side of [`StreamConnection`](crate::connection::StreamConnection).
pub trait StreamCallbacks: Send + Sync {
    fn on_set_parameter(&self, param_id: u32, bytes: &[u8]) -> Result<()>;

    /// Returns `Some(bytes)` if answered synchronously, `None` if deferred
    /// (the plugin will later call `PluginService::complete_result` with the
    /// token this stream hands back to the caller).
    fn on_get_parameter(&self, param_id: u32, token: u64) -> Result<Option<Vec<u8>>>;

    fn on_invoke(&self, cmd_id: u32, in_bytes: &[u8], token: u64) -> Result<Option<Vec<u8>>>;
}

pub(crate) struct StreamInner {
    pub(crate) description: StreamDescription,
    pub(crate) bin: FrameBin,
    pub(crate) callbacks: Mutex<Option<Box<dyn StreamCallbacks>>>,
    pub(crate) connections: Mutex<Vec<Weak<ConnectionInner>>>,
}

/// Shared handle to a producer-side stream. Cheap to clone (`Arc` under the
/// hood); "same handle" identity is `Arc::ptr_eq` (SPEC_FULL.md §9).
#[derive(Clone)]
pub struct Stream(pub(crate) Arc<StreamInner>);

impl Stream {
    pub(crate) fn new_placeholder(description: StreamDescription, slot_count: usize) -> Self {
        Self(Arc::new(StreamInner {
            description,
            bin: FrameBin::new(slot_count),
            callbacks: Mutex::new(None),
            connections: Mutex::new(Vec::new()),
        }))
    }

    pub fn description(&self) -> StreamDescription {
        self.0.description
    }

    /// True while no producer callbacks have been registered (SPEC_FULL.md §4.4).
    pub fn is_placeholder(&self) -> bool {
        self.0.callbacks.lock().is_none()
    }

    pub(crate) fn promote(&self, callbacks: Box<dyn StreamCallbacks>) {
        *self.0.callbacks.lock() = Some(callbacks);
    }

    pub(crate) fn ptr_eq(a: &Stream, b: &Stream) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    pub(crate) fn register_connection(&self, conn: &Arc<ConnectionInner>) {
        self.0.connections.lock().push(Arc::downgrade(conn));
    }

    /// Publishes a frame and notifies every started, live connection.
    /// Grounded on `streamlib/src/core/buffers.rs`'s publish discipline: the
    /// sequence write happens under the bin's lock, notification happens
    /// after, so a waiter that wakes always observes the sequence that woke it.
    pub fn publish_frame(&self, payload: Vec<u8>, metadata: Vec<u8>) -> Result<u64> {
        let token = self.0.bin.begin_write()?;
        let sequence = self.0.bin.end_write(token, payload, metadata);

        let connections = self.0.connections.lock();
        for weak_conn in connections.iter() {
            if let Some(conn) = weak_conn.upgrade() {
                conn.notify_new_frame();
            }
        }
        Ok(sequence)
    }

    pub fn set_parameter(&self, param_id: u32, bytes: &[u8]) -> Result<()> {
        let callbacks = self.0.callbacks.lock();
        match callbacks.as_deref() {
            Some(cb) => cb.on_set_parameter(param_id, bytes),
            None => Err(StreamError::InvalidOperation(
                "set_parameter on a placeholder stream with no producer".to_string(),
            )),
        }
    }

    pub fn get_parameter(&self, param_id: u32, token: u64) -> Result<Option<Vec<u8>>> {
        let callbacks = self.0.callbacks.lock();
        match callbacks.as_deref() {
            Some(cb) => cb.on_get_parameter(param_id, token),
            None => Err(StreamError::InvalidOperation(
                "get_parameter on a placeholder stream with no producer".to_string(),
            )),
        }
    }

    pub fn invoke(&self, cmd_id: u32, in_bytes: &[u8], token: u64) -> Result<Option<Vec<u8>>> {
        let callbacks = self.0.callbacks.lock();
        match callbacks.as_deref() {
            Some(cb) => cb.on_invoke(cmd_id, in_bytes, token),
            None => Err(StreamError::InvalidOperation(
                "invoke on a placeholder stream with no producer".to_string(),
            )),
        }
    }

    pub(crate) fn bin(&self) -> &FrameBin {
        &self.0.bin
    }
}
