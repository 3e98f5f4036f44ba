//! Core of a sensor-streaming runtime: stream catalog, frame exchange
//! protocol, command/parameter channel, and plugin lifecycle/event bus.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! host binary's job.

pub mod catalog;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod frame_bin;
pub mod plugin;
pub mod reader;
pub mod stream;
pub mod stream_set;
pub mod usb_uri;

pub use catalog::SetCatalog;
pub use config::{RuntimeConfig, SeverityLevel};
pub use connection::{StreamConnection, Token};
pub use context::Context;
pub use error::{Result, Status, StreamError};
pub use frame_bin::{FrameBin, FrameSnapshot};
pub use plugin::{PluginCallbacks, PluginDeclaration, PluginEntryFn, PluginManager, PluginService, STREAMKIT_ABI_VERSION};
pub use reader::{FrameHandle, FrameReadyCallback, FrameReadyEvent, StreamReader};
pub use stream::{Stream, StreamCallbacks, StreamDescription};
pub use stream_set::StreamSet;
pub use usb_uri::UsbResourceUri;
