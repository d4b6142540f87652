//! Resolution over the delegate chain.
//!
//! Both policies walk an ordered set of delegates; a delegate that lacks
//! the symbol falls through silently, and the overall lookup fails only
//! when the whole configured order is exhausted. Resource enumeration
//! follows the identical order but merges every hit instead of stopping
//! at the first.
use std::collections::HashSet;
use std::sync::Arc;

use crate::loader::arena::{LoadPolicy, LoaderArena, LoaderNode, NodeId};
use crate::loader::error::LoaderError;
use crate::loader::source::{CodeSource, ResourceHit};
use crate::units::factory::UnitFactory;

impl LoaderArena {
    /// Resolve a unit factory through `node`'s delegate chain.
    pub fn resolve_factory(
        &self,
        node: NodeId,
        key: &str,
    ) -> Result<Arc<UnitFactory>, LoaderError> {
        let nodes = self.nodes_read();
        let exports = self.exports_read();
        let mut tried = Vec::new();
        match resolve_in(&nodes, &exports, node, key, &mut tried)? {
            Some(factory) => Ok(factory),
            None => {
                let name = nodes
                    .get(node.0)
                    .map(|n| n.name.clone())
                    .unwrap_or_else(|| node.to_string());
                log::debug!("Symbol '{key}' unresolved from loader '{name}'; tried {tried:?}");
                Err(LoaderError::ResolveFailure {
                    symbol: key.to_string(),
                    node: name,
                    tried,
                })
            }
        }
    }

    /// Enumerate all resource matches visible from `node`, in delegation
    /// order, one entry per source.
    pub fn find_resources(&self, node: NodeId, name: &str) -> Result<Vec<ResourceHit>, LoaderError> {
        let nodes = self.nodes_read();
        let exports = self.exports_read();
        let mut hits = Vec::new();
        let mut seen = HashSet::new();
        collect_in(&nodes, &exports, node, name, &mut hits, &mut seen)?;
        Ok(hits)
    }
}

fn node_of<'a>(nodes: &'a [LoaderNode], id: NodeId) -> Result<&'a LoaderNode, LoaderError> {
    nodes.get(id.0).ok_or(LoaderError::NodeNotFound(id.0))
}

fn is_local(node: &LoaderNode, source_id: &str) -> bool {
    node.locals.iter().any(|l| l.id() == source_id)
}

fn resolve_in(
    nodes: &[LoaderNode],
    exports: &[Arc<dyn CodeSource>],
    id: NodeId,
    key: &str,
    tried: &mut Vec<String>,
) -> Result<Option<Arc<UnitFactory>>, LoaderError> {
    let node = node_of(nodes, id)?;
    match node.policy {
        LoadPolicy::ParentFirst => {
            if let Some(parent) = node.parent {
                if let Some(factory) = resolve_in(nodes, exports, parent, key, tried)? {
                    return Ok(Some(factory));
                }
            }
            Ok(resolve_locals(node, key, tried))
        }
        LoadPolicy::ParentLast => {
            if let Some(factory) = resolve_locals(node, key, tried) {
                return Ok(Some(factory));
            }
            // The shared pool is consulted before the baseline; sources this
            // node already owns locally were tried above and are skipped.
            for export in exports {
                if is_local(node, export.id()) {
                    continue;
                }
                tried.push(format!("export:{}", export.id()));
                if let Some(factory) = export.resolve_factory(key) {
                    return Ok(Some(factory));
                }
            }
            match node.parent {
                Some(parent) => resolve_in(nodes, exports, parent, key, tried),
                None => Ok(None),
            }
        }
    }
}

fn resolve_locals(node: &LoaderNode, key: &str, tried: &mut Vec<String>) -> Option<Arc<UnitFactory>> {
    for source in &node.locals {
        tried.push(format!("local:{}", source.id()));
        if let Some(factory) = source.resolve_factory(key) {
            return Some(factory);
        }
    }
    None
}

fn collect_in(
    nodes: &[LoaderNode],
    exports: &[Arc<dyn CodeSource>],
    id: NodeId,
    name: &str,
    hits: &mut Vec<ResourceHit>,
    seen: &mut HashSet<String>,
) -> Result<(), LoaderError> {
    let node = node_of(nodes, id)?;
    match node.policy {
        LoadPolicy::ParentFirst => {
            if let Some(parent) = node.parent {
                collect_in(nodes, exports, parent, name, hits, seen)?;
            }
            collect_locals(node, name, hits, seen);
        }
        LoadPolicy::ParentLast => {
            collect_locals(node, name, hits, seen);
            for export in exports {
                if is_local(node, export.id()) || !seen.insert(export.id().to_string()) {
                    continue;
                }
                hits.extend(export.find_resources(name));
            }
            if let Some(parent) = node.parent {
                collect_in(nodes, exports, parent, name, hits, seen)?;
            }
        }
    }
    Ok(())
}

fn collect_locals(
    node: &LoaderNode,
    name: &str,
    hits: &mut Vec<ResourceHit>,
    seen: &mut HashSet<String>,
) {
    for source in &node.locals {
        if seen.insert(source.id().to_string()) {
            hits.extend(source.find_resources(name));
        }
    }
}
