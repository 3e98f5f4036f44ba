//! Host API surface plugins call into (SPEC_FULL.md §4.6).

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::catalog::SetCatalog;
use crate::config::SeverityLevel;
use crate::connection::{StreamConnection, Token};
use crate::stream::{Stream, StreamCallbacks, StreamDescription};
use crate::stream_set::StreamSet;

use super::callbacks::PluginCallbacks;
use super::manager::PluginManagerInner;

struct PluginServiceInner {
    catalog: SetCatalog,
    default_slot_count: usize,
    manager: Weak<PluginManagerInner>,
    registered: Mutex<Option<Box<dyn PluginCallbacks>>>,
}

/// Bound to exactly one plugin load; handed to the plugin's entry function
/// and to every subsequent `update`/`on_host_event` callback for that plugin.
#[derive(Clone)]
pub struct PluginService(Arc<PluginServiceInner>);

impl PluginService {
    pub(crate) fn new(catalog: SetCatalog, default_slot_count: usize, manager: Weak<PluginManagerInner>) -> Self {
        Self(Arc::new(PluginServiceInner {
            catalog,
            default_slot_count,
            manager,
            registered: Mutex::new(None),
        }))
    }

    pub fn create_stream_set(&self, uri: &str) -> StreamSet {
        self.0.catalog.open(uri, self.0.default_slot_count)
    }

    pub fn register_stream(
        &self,
        set: &StreamSet,
        description: StreamDescription,
        callbacks: Box<dyn StreamCallbacks>,
    ) -> Stream {
        set.create_stream(description, callbacks)
    }

    pub fn publish_frame(&self, stream: &Stream, payload: Vec<u8>, metadata: Vec<u8>) -> crate::error::Result<u64> {
        stream.publish_frame(payload, metadata)
    }

    pub fn complete_result(&self, connection: &StreamConnection, token: Token, bytes: Vec<u8>) {
        connection.complete_result(token, bytes);
    }

    /// Emits a structured log event at the plugin's requested level, tagged
    /// with `target`. Routed through `tracing`, never a bespoke sink — the
    /// library never installs its own subscriber (SPEC_FULL.md §1).
    pub fn log(&self, level: SeverityLevel, target: &str, message: &str) {
        match level {
            SeverityLevel::Trace => tracing::trace!(target: "plugin", plugin_target = target, "{message}"),
            SeverityLevel::Debug => tracing::debug!(target: "plugin", plugin_target = target, "{message}"),
            SeverityLevel::Info => tracing::info!(target: "plugin", plugin_target = target, "{message}"),
            SeverityLevel::Warn => tracing::warn!(target: "plugin", plugin_target = target, "{message}"),
            SeverityLevel::Error => tracing::error!(target: "plugin", plugin_target = target, "{message}"),
        }
    }

    /// Broadcasts a tagged event to every loaded plugin's `on_host_event`,
    /// including the caller (plugin-to-plugin messaging, SPEC_FULL.md §9).
    pub fn notify_event(&self, event_id: u32, bytes: &[u8]) {
        if let Some(manager) = self.0.manager.upgrade() {
            manager.broadcast_host_event(event_id, bytes);
        }
    }

    /// Called once from the plugin's entry function to hand the host its
    /// callback instance (SPEC_FULL.md §4.6, §9's realization of "a pointer
    /// to the plugin's instance" for same-process Rust plugins).
    pub fn register_plugin(&self, instance: Box<dyn PluginCallbacks>) {
        *self.0.registered.lock() = Some(instance);
    }

    pub(crate) fn take_registered(&self) -> Option<Box<dyn PluginCallbacks>> {
        self.0.registered.lock().take()
    }
}
