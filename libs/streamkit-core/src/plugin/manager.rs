//! Plugin discovery, loading, update-driving, and teardown (SPEC_FULL.md §4.5).
//!
//! Grounded on `streamlib-cli/src/plugin_loader.rs`: `std::fs::read_dir`
//! filtered by platform extension, `libloading::Library::new`, a
//! `#[repr(C)]` declaration validated by ABI version and exported under a
//! fixed symbol name. Generalized here to register a whole plugin instance
//! (via [`PluginService::register_plugin`]) instead of a single processor type.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use anyhow::{anyhow, Context as _};
use libloading::Library;
use parking_lot::Mutex;

use crate::catalog::SetCatalog;
use crate::error::Result;

use super::abi::{PluginDeclaration, STREAMKIT_ABI_VERSION};
use super::callbacks::PluginCallbacks;
use super::service::PluginService;

struct PluginRegistration {
    path: Option<PathBuf>,
    // Kept alive for the registration's lifetime; dropping it unloads the code.
    // `None` for plugins registered in-process (SPEC_FULL.md §4.6).
    _library: Option<Library>,
    callbacks: Box<dyn PluginCallbacks>,
    service: PluginService,
}

pub(crate) struct PluginManagerInner {
    weak_self: Weak<PluginManagerInner>,
    catalog: SetCatalog,
    default_slot_count: usize,
    registrations: Mutex<Vec<PluginRegistration>>,
}

impl PluginManagerInner {
    /// Broadcasts a host event to every loaded plugin, serialized through
    /// the registrations mutex (SPEC_FULL.md §9).
    pub(crate) fn broadcast_host_event(&self, event_id: u32, bytes: &[u8]) {
        let registrations = self.registrations.lock();
        for reg in registrations.iter() {
            reg.callbacks.on_host_event(&reg.service, event_id, bytes);
        }
    }
}

/// Discovers, loads, initializes, updates, and unloads plugin modules.
#[derive(Clone)]
pub struct PluginManager(Arc<PluginManagerInner>);

impl PluginManager {
    pub fn new(catalog: SetCatalog, default_slot_count: usize) -> Self {
        Self(Arc::new_cyclic(|weak_self| PluginManagerInner {
            weak_self: weak_self.clone(),
            catalog,
            default_slot_count,
            registrations: Mutex::new(Vec::new()),
        }))
    }

    /// Loads every recognized plugin library found directly under `dir`.
    /// A plugin that fails to load is logged and skipped; loading continues.
    /// Returns the number of plugins successfully loaded.
    pub fn load_plugins(&self, dir: &Path) -> Result<usize> {
        if !dir.exists() {
            tracing::debug!(dir = %dir.display(), "plugin directory does not exist, skipping scan");
            return Ok(0);
        }

        let entries = std::fs::read_dir(dir)?;
        let mut loaded = 0;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !is_plugin_library(&path) {
                continue;
            }
            match self.load_plugin(&path) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "loaded plugin");
                    loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to load plugin, skipping");
                }
            }
        }
        Ok(loaded)
    }

    /// Loads a single plugin library: resolves `STREAMKIT_PLUGIN`, validates
    /// its ABI version, invokes its entry function, and expects it to call
    /// `PluginService::register_plugin` before returning.
    pub fn load_plugin(&self, path: &Path) -> std::result::Result<(), anyhow::Error> {
        let library = unsafe {
            Library::new(path).with_context(|| format!("failed to load plugin library {}", path.display()))?
        };

        let declaration: &PluginDeclaration = unsafe {
            let symbol = library
                .get::<*const PluginDeclaration>(b"STREAMKIT_PLUGIN\0")
                .with_context(|| {
                    format!(
                        "plugin '{}' is missing the STREAMKIT_PLUGIN symbol (use the export_plugin! macro)",
                        path.display()
                    )
                })?;
            &**symbol
        };

        if declaration.abi_version != STREAMKIT_ABI_VERSION {
            return Err(anyhow!(
                "ABI version mismatch for '{}': plugin has v{}, host expects v{}",
                path.display(),
                declaration.abi_version,
                STREAMKIT_ABI_VERSION
            ));
        }

        let service = PluginService::new(self.0.catalog.clone(), self.0.default_slot_count, self.0.weak_self.clone());
        (declaration.entry)(&service);

        let callbacks = service
            .take_registered()
            .ok_or_else(|| anyhow!("plugin '{}' did not call register_plugin", path.display()))?;

        self.0.registrations.lock().push(PluginRegistration {
            path: Some(path.to_path_buf()),
            _library: Some(library),
            callbacks,
            service,
        });
        Ok(())
    }

    /// Registers an already-constructed plugin without dynamic loading —
    /// the same-process path SPEC_FULL.md §4.6 calls out for Rust plugins
    /// compiled directly into the host binary.
    pub fn register_inline_plugin(&self, callbacks: Box<dyn PluginCallbacks>) -> PluginService {
        let service = PluginService::new(self.0.catalog.clone(), self.0.default_slot_count, self.0.weak_self.clone());
        self.0.registrations.lock().push(PluginRegistration {
            path: None,
            _library: None,
            callbacks,
            service: service.clone(),
        });
        service
    }

    /// Drives every loaded plugin's `update` hook, in load order. A single
    /// plugin's error is logged but does not unload it (policy: tolerate
    /// transient errors).
    pub fn update(&self) {
        let registrations = self.0.registrations.lock();
        for reg in registrations.iter() {
            if let Err(e) = reg.callbacks.update(&reg.service) {
                let label = reg.path.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "<inline>".to_string());
                tracing::warn!(plugin = %label, error = %e, "plugin update returned an error");
            }
        }
    }

    /// Fans a host event out to every loaded plugin's `on_host_event` hook.
    pub fn notify_host_event(&self, event_id: u32, bytes: &[u8]) {
        self.0.broadcast_host_event(event_id, bytes);
    }

    pub fn loaded_count(&self) -> usize {
        self.0.registrations.lock().len()
    }

    /// Tears plugins down in reverse load order, then drops (unloads) each
    /// library. Each plugin is responsible for tearing down its own streams
    /// before `destroy` returns.
    pub fn shutdown(&self) {
        let mut registrations = self.0.registrations.lock();
        while let Some(reg) = registrations.pop() {
            reg.callbacks.destroy(&reg.service);
        }
    }
}

fn is_plugin_library(path: &Path) -> bool {
    let extension = path.extension().and_then(|e| e.to_str());
    match extension {
        Some("dylib") => cfg!(target_os = "macos"),
        Some("so") => cfg!(target_os = "linux"),
        Some("dll") => cfg!(target_os = "windows"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as CoreResult;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPlugin {
        updates: Arc<AtomicUsize>,
        destroys: Arc<AtomicUsize>,
    }

    impl PluginCallbacks for CountingPlugin {
        fn on_host_event(&self, _service: &PluginService, _event_id: u32, _bytes: &[u8]) {}

        fn update(&self, _service: &PluginService) -> CoreResult<()> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn destroy(&self, _service: &PluginService) {
            self.destroys.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn inline_plugin_receives_update_and_destroy() {
        let manager = PluginManager::new(SetCatalog::new(), 3);
        let updates = Arc::new(AtomicUsize::new(0));
        let destroys = Arc::new(AtomicUsize::new(0));
        manager.register_inline_plugin(Box::new(CountingPlugin {
            updates: updates.clone(),
            destroys: destroys.clone(),
        }));

        assert_eq!(manager.loaded_count(), 1);
        manager.update();
        manager.update();
        assert_eq!(updates.load(Ordering::SeqCst), 2);

        manager.shutdown();
        assert_eq!(destroys.load(Ordering::SeqCst), 1);
        assert_eq!(manager.loaded_count(), 0);
    }

    #[test]
    fn missing_plugin_directory_is_not_an_error() {
        let manager = PluginManager::new(SetCatalog::new(), 3);
        let loaded = manager.load_plugins(Path::new("/nonexistent/streamkit-plugins")).unwrap();
        assert_eq!(loaded, 0);
    }
}
