//! ABI-stable plugin entry point (SPEC_FULL.md §6 "Plugin ABI").
//!
//! The `streamkit-plugin-abi` crate re-exports these types for plugin authors;
//! they live here so [`PluginManager`](super::manager::PluginManager) can
//! validate and invoke them without a circular crate dependency.

use super::service::PluginService;

/// Increment on any breaking change to [`PluginDeclaration`] or the
/// `PluginService`/`PluginCallbacks` contract.
pub const STREAMKIT_ABI_VERSION: u32 = 1;

/// Entry function every plugin exports. Receives a `PluginService` bound to
/// this load; the plugin is expected to call
/// `PluginService::register_plugin` exactly once before returning.
pub type PluginEntryFn = extern "C" fn(&PluginService);

/// Static exported by dynamic plugin libraries under the symbol name
/// `STREAMKIT_PLUGIN`.
#[repr(C)]
pub struct PluginDeclaration {
    pub abi_version: u32,
    pub entry: PluginEntryFn,
}

// Safety: a version number and a function pointer, both Send + Sync.
unsafe impl Send for PluginDeclaration {}
unsafe impl Sync for PluginDeclaration {}
