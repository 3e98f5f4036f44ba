//! Orchestrator binding the stream catalog to the plugin host (SPEC_FULL.md §4.7).

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;

use parking_lot::Mutex;

use crate::catalog::SetCatalog;
use crate::config::RuntimeConfig;
use crate::error::{Result, StreamError};
use crate::plugin::PluginManager;
use crate::reader::{self, ReaderInner, StreamReader};
use crate::stream_set::StreamSet;

struct Initialized {
    catalog: SetCatalog,
    plugins: PluginManager,
    default_slot_count: usize,
    readers: Mutex<Vec<Weak<ReaderInner>>>,
}

/// Thin coordinator. All operations are `Uninitialized` when not yet
/// initialized (or after `terminate`). `initialize`/`terminate` are both
/// idempotent.
pub struct Context {
    initialized: AtomicBool,
    state: Mutex<Option<Initialized>>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            state: Mutex::new(None),
        }
    }

    /// Construction order is `SetCatalog` -> `PluginManager`; plugins are
    /// scanned from `config.plugin_directory` immediately.
    pub fn initialize(&self, config: &RuntimeConfig) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        let catalog = SetCatalog::with_default_slot_count(config.frame_bin_slot_count);
        let plugins = PluginManager::new(catalog.clone(), config.frame_bin_slot_count);
        plugins.load_plugins(Path::new(&config.plugin_directory))?;

        *self.state.lock() = Some(Initialized {
            catalog,
            plugins,
            default_slot_count: config.frame_bin_slot_count,
            readers: Mutex::new(Vec::new()),
        });
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Destruction is the reverse of construction: every reader is told to
    /// abandon its blocked `lock` with `Shutdown`, the plugin manager shuts
    /// its plugins down (tearing down their streams), then the catalog's
    /// stream sets are dropped.
    pub fn terminate(&self) {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(state) = self.state.lock().take() {
            for weak_reader in state.readers.lock().iter() {
                reader::shutdown_reader(weak_reader);
            }
            state.plugins.shutdown();
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn with_state<T>(&self, f: impl FnOnce(&Initialized) -> Result<T>) -> Result<T> {
        let guard = self.state.lock();
        match guard.as_ref() {
            Some(state) => f(state),
            None => Err(StreamError::Uninitialized),
        }
    }

    pub fn streamset_open(&self, uri: &str) -> Result<StreamSet> {
        self.with_state(|s| Ok(s.catalog.open(uri, s.default_slot_count)))
    }

    pub fn streamset_close(&self, set: &StreamSet) -> Result<()> {
        self.with_state(|s| {
            s.catalog.close(set);
            Ok(())
        })
    }

    pub fn reader_create(&self, set: &StreamSet) -> Result<StreamReader> {
        self.with_state(|s| {
            let reader = StreamReader::new(set.clone());
            s.readers.lock().push(reader.weak());
            Ok(reader)
        })
    }

    /// Readers have no catalog-level registration to undo; destruction is
    /// the caller dropping its last handle. Present for API symmetry with
    /// `streamset_close` and to reject calls on an uninitialized context.
    pub fn reader_destroy(&self, _reader: StreamReader) -> Result<()> {
        self.with_state(|_| Ok(()))
    }

    /// Drives every plugin's `update` hook once.
    pub fn update(&self) -> Result<()> {
        self.with_state(|s| {
            s.plugins.update();
            Ok(())
        })
    }

    pub fn notify_host_event(&self, event_id: u32, bytes: &[u8]) -> Result<()> {
        self.with_state(|s| {
            s.plugins.notify_host_event(event_id, bytes);
            Ok(())
        })
    }

    pub fn plugin_manager(&self) -> Result<PluginManager> {
        self.with_state(|s| Ok(s.plugins.clone()))
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamDescription;

    #[test]
    fn operations_before_initialize_return_uninitialized() {
        let ctx = Context::new();
        let err = ctx.streamset_open("device/0").unwrap_err();
        assert!(matches!(err, StreamError::Uninitialized));
    }

    #[test]
    fn initialize_and_terminate_are_idempotent() {
        let ctx = Context::new();
        let config = RuntimeConfig::default();
        ctx.initialize(&config).unwrap();
        ctx.initialize(&config).unwrap();
        assert!(ctx.is_initialized());
        ctx.terminate();
        ctx.terminate();
        assert!(!ctx.is_initialized());
    }

    #[test]
    fn full_round_trip_open_reader_lock() {
        let ctx = Context::new();
        ctx.initialize(&RuntimeConfig::default()).unwrap();

        let set = ctx.streamset_open("device/0").unwrap();
        let reader = ctx.reader_create(&set).unwrap();
        let conn = reader.get_stream(StreamDescription::new(1, 0));
        conn.stream().publish_frame(vec![42], vec![]).unwrap();

        let handle = reader.lock(0).unwrap();
        assert_eq!(handle.get(StreamDescription::new(1, 0)).unwrap().payload[0], 42);

        ctx.streamset_close(&set).unwrap();
        ctx.terminate();
    }

    #[test]
    fn terminate_wakes_a_blocked_reader_with_shutdown() {
        let ctx = std::sync::Arc::new(Context::new());
        ctx.initialize(&RuntimeConfig::default()).unwrap();
        let set = ctx.streamset_open("device/0").unwrap();
        let reader = ctx.reader_create(&set).unwrap();
        reader.get_stream(StreamDescription::new(1, 0));

        let ctx_clone = ctx.clone();
        let blocked = std::thread::spawn(move || reader.lock(-1));

        std::thread::sleep(std::time::Duration::from_millis(20));
        ctx_clone.terminate();

        let err = blocked.join().unwrap().unwrap_err();
        assert!(matches!(err, StreamError::Shutdown));
    }
}
