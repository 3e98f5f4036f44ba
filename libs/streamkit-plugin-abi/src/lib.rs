//! ABI-stable plugin interface for StreamKit dynamic sensor-driver loading.
//!
//! This crate re-exports the declaration types `streamkit-core`'s
//! `PluginManager` validates, plus the [`export_plugin!`] macro that
//! generates the exported symbol a plugin library must provide.
//!
//! # Example plugin
//!
//! ```ignore
//! use streamkit_core::{PluginCallbacks, PluginService, Result};
//! use streamkit_plugin_abi::export_plugin;
//!
//! struct MySensorPlugin;
//!
//! impl PluginCallbacks for MySensorPlugin {
//!     fn on_host_event(&self, _service: &PluginService, _event_id: u32, _bytes: &[u8]) {}
//!     fn update(&self, _service: &PluginService) -> Result<()> { Ok(()) }
//!     fn destroy(&self, _service: &PluginService) {}
//! }
//!
//! fn plugin_entry(service: &PluginService) {
//!     service.register_plugin(Box::new(MySensorPlugin));
//! }
//!
//! export_plugin!(plugin_entry);
//! ```
//!
//! # Plugin Cargo.toml
//!
//! ```toml
//! [lib]
//! crate-type = ["cdylib"]
//!
//! [dependencies]
//! streamkit-core = "0.1"
//! streamkit-plugin-abi = "0.1"
//! ```

pub use streamkit_core::{PluginDeclaration, PluginEntryFn, STREAMKIT_ABI_VERSION};

/// Exports a plugin entry function under the `STREAMKIT_PLUGIN` symbol the
/// host's `PluginManager` looks for.
///
/// # Example
///
/// ```ignore
/// export_plugin!(my_plugin_entry);
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($entry:path) => {
        #[no_mangle]
        pub static STREAMKIT_PLUGIN: $crate::PluginDeclaration = $crate::PluginDeclaration {
            abi_version: $crate::STREAMKIT_ABI_VERSION,
            entry: $entry,
        };
    };
}
