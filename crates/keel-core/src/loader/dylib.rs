//! Dynamic-library code source.
//!
//! A compiled unit library exports one entry point,
//! [`REGISTER_SYMBOL`], with the signature of [`RegisterUnitsFn`]. The
//! loader calls it once at load time to collect the library's unit
//! factories and resources; the library handle is retained for the
//! source's lifetime so the factories' code stays mapped.
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use libloading::{Library, Symbol};

use crate::loader::error::LoaderError;
use crate::loader::source::{CodeSource, ResourceHit};
use crate::units::factory::UnitFactory;

/// Entry symbol every unit library must export.
pub const REGISTER_SYMBOL: &[u8] = b"keel_register_units";

/// Registration surface handed to a library's entry point.
#[derive(Default)]
pub struct UnitExports {
    factories: HashMap<String, Arc<UnitFactory>>,
    resources: HashMap<String, Arc<[u8]>>,
}

impl UnitExports {
    pub fn factory(&mut self, key: &str, factory: UnitFactory) {
        self.factories.insert(key.to_string(), Arc::new(factory));
    }

    pub fn resource(&mut self, name: &str, data: Vec<u8>) {
        self.resources.insert(name.to_string(), Arc::from(data));
    }
}

/// Signature of the registration entry point.
pub type RegisterUnitsFn = fn(&mut UnitExports);

/// Code source backed by a loaded dynamic library.
pub struct DylibSource {
    id: String,
    factories: HashMap<String, Arc<UnitFactory>>,
    resources: HashMap<String, Arc<[u8]>>,
    // Keeps the mapped library alive as long as its factories are reachable.
    _library: Library,
}

impl DylibSource {
    pub fn load(id: &str, path: &Path) -> Result<Self, LoaderError> {
        // SAFETY: loading a library runs its initializers; the path comes
        // from a configured deployment directory, which is the trust
        // boundary this kernel documents.
        let library = unsafe { Library::new(path) }.map_err(|source| LoaderError::LibraryLoad {
            path: path.to_path_buf(),
            source,
        })?;
        let mut exports = UnitExports::default();
        {
            // SAFETY: the symbol is looked up by the documented name and
            // called with the documented signature.
            let register: Symbol<'_, RegisterUnitsFn> = unsafe { library.get(REGISTER_SYMBOL) }
                .map_err(|source| LoaderError::LibraryLoad {
                    path: path.to_path_buf(),
                    source,
                })?;
            let entry = *register;
            if panic::catch_unwind(AssertUnwindSafe(|| entry(&mut exports))).is_err() {
                return Err(LoaderError::RegistrationFailed {
                    path: path.to_path_buf(),
                    message: "registration entry point panicked".to_string(),
                });
            }
        }
        log::info!(
            "Loaded library '{}' from {}: {} factorie(s)",
            id,
            path.display(),
            exports.factories.len()
        );
        Ok(Self {
            id: id.to_string(),
            factories: exports.factories,
            resources: exports.resources,
            _library: library,
        })
    }
}

impl CodeSource for DylibSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn resolve_factory(&self, key: &str) -> Option<Arc<UnitFactory>> {
        self.factories.get(key).cloned()
    }

    fn find_resources(&self, name: &str) -> Vec<ResourceHit> {
        self.resources
            .get(name)
            .map(|data| {
                vec![ResourceHit {
                    source: self.id.clone(),
                    data: data.clone(),
                }]
            })
            .unwrap_or_default()
    }
}

impl fmt::Debug for DylibSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DylibSource")
            .field("id", &self.id)
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
