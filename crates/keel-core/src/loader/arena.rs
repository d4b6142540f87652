use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use crate::loader::error::LoaderError;
use crate::loader::source::CodeSource;

/// Index of a loader node within its arena. Cross-node links are plain
/// indices, never owning pointers, so parent/child relations and the
/// delegate-to-creator link of a parent-last node cannot form ownership
/// cycles. A node lives exactly as long as its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Code-visibility strategy of one loader node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Consult the parent chain before the local search path.
    ParentFirst,
    /// Consult the local search path first, then the shared export pool,
    /// and only then the parent baseline.
    ParentLast,
}

impl LoadPolicy {
    /// Parse a configuration string (`parent-first` / `parent-last`).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "parent-first" => Some(LoadPolicy::ParentFirst),
            "parent-last" => Some(LoadPolicy::ParentLast),
            _ => None,
        }
    }
}

pub(crate) struct LoaderNode {
    pub(crate) name: String,
    pub(crate) policy: LoadPolicy,
    pub(crate) parent: Option<NodeId>,
    pub(crate) locals: Vec<Arc<dyn CodeSource>>,
}

/// Arena owning every loader node of one kernel session plus the shared
/// pool of exported code sources. The pool is a non-owning lookup
/// relation keyed by source id; exporting does not transfer a source's
/// ownership to any node.
pub struct LoaderArena {
    pub(crate) nodes: RwLock<Vec<LoaderNode>>,
    pub(crate) exports: RwLock<Vec<Arc<dyn CodeSource>>>,
}

impl LoaderArena {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(Vec::new()),
            exports: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn nodes_read(&self) -> RwLockReadGuard<'_, Vec<LoaderNode>> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn exports_read(&self) -> RwLockReadGuard<'_, Vec<Arc<dyn CodeSource>>> {
        self.exports.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a node and return its id.
    pub fn add_node(
        &self,
        name: &str,
        policy: LoadPolicy,
        parent: Option<NodeId>,
        locals: Vec<Arc<dyn CodeSource>>,
    ) -> NodeId {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        let id = NodeId(nodes.len());
        nodes.push(LoaderNode {
            name: name.to_string(),
            policy,
            parent,
            locals,
        });
        log::debug!("Loader {id} '{name}' added ({policy:?})");
        id
    }

    /// Append a source to a node's local search path.
    pub fn add_local_source(
        &self,
        node: NodeId,
        source: Arc<dyn CodeSource>,
    ) -> Result<(), LoaderError> {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        let entry = nodes.get_mut(node.0).ok_or(LoaderError::NodeNotFound(node.0))?;
        entry.locals.push(source);
        Ok(())
    }

    /// Export a source into the shared pool. Fails if the id is taken.
    pub fn export(&self, source: Arc<dyn CodeSource>) -> Result<(), LoaderError> {
        let mut exports = self.exports.write().unwrap_or_else(PoisonError::into_inner);
        if exports.iter().any(|e| e.id() == source.id()) {
            return Err(LoaderError::DuplicateExport {
                id: source.id().to_string(),
            });
        }
        log::debug!("Code source '{}' exported", source.id());
        exports.push(source);
        Ok(())
    }

    /// Export a source, replacing any previous export with the same id.
    /// This is the hot-redeploy path for reloaded code locations.
    pub fn replace_export(&self, source: Arc<dyn CodeSource>) {
        let mut exports = self.exports.write().unwrap_or_else(PoisonError::into_inner);
        exports.retain(|e| e.id() != source.id());
        log::debug!("Code source '{}' exported (replacing any previous)", source.id());
        exports.push(source);
    }

    pub fn exported_ids(&self) -> Vec<String> {
        self.exports_read().iter().map(|e| e.id().to_string()).collect()
    }

    pub fn node_name(&self, node: NodeId) -> Result<String, LoaderError> {
        self.nodes_read()
            .get(node.0)
            .map(|n| n.name.clone())
            .ok_or(LoaderError::NodeNotFound(node.0))
    }

    pub fn node_count(&self) -> usize {
        self.nodes_read().len()
    }
}

impl Default for LoaderArena {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoaderArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nodes = self.nodes_read();
        let names: Vec<&String> = nodes.iter().map(|n| &n.name).collect();
        f.debug_struct("LoaderArena")
            .field("nodes", &names)
            .field("exports", &self.exported_ids())
            .finish()
    }
}
