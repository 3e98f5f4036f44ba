//! Plugin lifecycle and host/plugin event bus (SPEC_FULL.md §4.5, §4.6).

mod abi;
mod callbacks;
mod manager;
mod service;

pub use abi::{PluginDeclaration, PluginEntryFn, STREAMKIT_ABI_VERSION};
pub use callbacks::PluginCallbacks;
pub use manager::PluginManager;
pub use service::PluginService;
