//! Hooks the host invokes on a loaded plugin (SPEC_FULL.md §4.6).

use crate::error::Result;
use super::service::PluginService;

pub trait PluginCallbacks: Send + Sync {
    /// Fan-out of `notify_host_event`: a tagged payload broadcast to every
    /// loaded plugin, serialized through the manager's plugin-list mutex.
    fn on_host_event(&self, service: &PluginService, event_id: u32, bytes: &[u8]);

    /// Driven once per `Context::update` tick, in load order. An error is
    /// logged but does not unload the plugin (transient errors are tolerated).
    fn update(&self, service: &PluginService) -> Result<()>;

    /// Called once during shutdown, in reverse load order, before the host
    /// unloads the backing dynamic library. Must tear down the plugin's own
    /// streams before returning.
    fn destroy(&self, service: &PluginService);
}
