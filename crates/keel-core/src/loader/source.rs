use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::loader::error::LoaderError;
use crate::units::factory::UnitFactory;

/// One resource match, tagged with the source that provided it.
#[derive(Debug, Clone)]
pub struct ResourceHit {
    pub source: String,
    pub data: Arc<[u8]>,
}

/// A location code can be resolved from: unit factories by key plus named
/// resources. Absence of a symbol falls through to the next delegate and
/// is never an error at this level.
pub trait CodeSource: Send + Sync {
    /// Stable identifier, used as the export-pool key.
    fn id(&self) -> &str;

    fn resolve_factory(&self, key: &str) -> Option<Arc<UnitFactory>>;

    /// All matches for a resource name in this source.
    fn find_resources(&self, name: &str) -> Vec<ResourceHit>;
}

/// In-memory code source: the kernel's factory baseline and the natural
/// backing for programmatically registered unit types.
pub struct StaticSource {
    id: String,
    factories: RwLock<HashMap<String, Arc<UnitFactory>>>,
    resources: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl StaticSource {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            factories: RwLock::new(HashMap::new()),
            resources: RwLock::new(HashMap::new()),
        }
    }

    /// Register a factory under `key`. The first registration wins.
    pub fn register_factory(&self, key: &str, factory: UnitFactory) -> Result<(), LoaderError> {
        let mut factories = self
            .factories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if factories.contains_key(key) {
            return Err(LoaderError::DuplicateSymbol {
                source_id: self.id.clone(),
                symbol: key.to_string(),
            });
        }
        factories.insert(key.to_string(), Arc::new(factory));
        Ok(())
    }

    pub fn put_resource(&self, name: &str, data: Vec<u8>) {
        self.resources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::from(data));
    }

    pub fn factory_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl CodeSource for StaticSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn resolve_factory(&self, key: &str) -> Option<Arc<UnitFactory>> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn find_resources(&self, name: &str) -> Vec<ResourceHit> {
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
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

impl fmt::Debug for StaticSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticSource")
            .field("id", &self.id)
            .field("factories", &self.factory_keys())
            .finish()
    }
}
