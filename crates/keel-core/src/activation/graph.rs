use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::units::descriptor::UnitDescriptor;

/// Per-batch dependency bookkeeping: for every unit in the batch, the
/// names it waits on and the reverse edges. Dependencies pointing outside
/// the batch are kept in the wait sets but form no graph edges; their
/// existence is checked against the registry separately.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    deps: HashMap<String, BTreeSet<String>>,
    dependents: HashMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn build(descriptors: &[UnitDescriptor]) -> Self {
        let mut graph = DependencyGraph::default();
        for descriptor in descriptors {
            graph.deps.entry(descriptor.name.clone()).or_default();
            graph
                .dependents
                .entry(descriptor.name.clone())
                .or_default();
        }
        for descriptor in descriptors {
            for dep in descriptor.dependency_names() {
                if let Some(dependents) = graph.dependents.get_mut(&dep) {
                    dependents.insert(descriptor.name.clone());
                }
                if let Some(deps) = graph.deps.get_mut(&descriptor.name) {
                    deps.insert(dep);
                }
            }
        }
        graph
    }

    pub fn contains(&self, name: &str) -> bool {
        self.deps.contains_key(name)
    }

    pub fn dependencies_of(&self, name: &str) -> BTreeSet<String> {
        self.deps.get(name).cloned().unwrap_or_default()
    }

    pub fn dependents_of(&self, name: &str) -> BTreeSet<String> {
        self.dependents.get(name).cloned().unwrap_or_default()
    }

    /// Units that can never activate because they sit on a dependency
    /// cycle within the batch. Kahn's algorithm: whatever never reaches
    /// in-degree zero is on (or strictly behind) a cycle.
    pub fn cycle_members(&self) -> BTreeSet<String> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        for (name, deps) in &self.deps {
            let in_batch = deps.iter().filter(|d| self.deps.contains_key(*d)).count();
            in_degree.insert(name.as_str(), in_batch);
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut resolved = 0usize;

        while let Some(name) = queue.pop_front() {
            resolved += 1;
            if let Some(dependents) = self.dependents.get(name) {
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(dependent.as_str());
                        }
                    }
                }
            }
        }

        if resolved == self.deps.len() {
            BTreeSet::new()
        } else {
            in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(name, _)| name.to_string())
                .collect()
        }
    }
}
