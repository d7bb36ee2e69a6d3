//! Dependency graph for workspace subprojects

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::error::GraphError;
use crate::project::{Subproject, TargetId};

/// A node in the dependency graph
#[derive(Debug, Clone)]
struct GraphNode {
    /// Subprojects this one depends on
    dependencies: Vec<TargetId>,
    /// Subprojects that depend on this one
    dependents: Vec<TargetId>,
    /// Declaration index, the deterministic tie-break
    decl_index: usize,
}

/// Dependency graph for workspace subprojects.
///
/// The topological order is deterministic: among mutually independent
/// subprojects, the one declared earlier in `fanout.toml` comes first.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Nodes indexed by target id
    nodes: HashMap<TargetId, GraphNode>,
    /// Topologically sorted order (dependencies before dependents)
    sorted_order: Vec<TargetId>,
}

impl DependencyGraph {
    /// Build a dependency graph from the declared subprojects.
    /// Fails if the declared dependencies form a cycle.
    pub fn build(subprojects: &[Subproject]) -> Result<Self, GraphError> {
        let mut nodes: HashMap<TargetId, GraphNode> = HashMap::new();

        for sub in subprojects {
            nodes.insert(
                sub.id.clone(),
                GraphNode {
                    dependencies: sub.dependencies.clone(),
                    dependents: Vec::new(),
                    decl_index: sub.decl_index,
                },
            );
        }

        // Reverse dependency mapping
        for sub in subprojects {
            for dep in &sub.dependencies {
                if let Some(dep_node) = nodes.get_mut(dep) {
                    dep_node.dependents.push(sub.id.clone());
                }
            }
        }

        let sorted_order = Self::topological_sort(subprojects, &nodes)?;
        debug!(subprojects = nodes.len(), "dependency graph built");

        Ok(Self {
            nodes,
            sorted_order,
        })
    }

    /// Kahn's algorithm with a deterministic ready set: among ready
    /// subprojects the lowest declaration index is drained first.
    fn topological_sort(
        subprojects: &[Subproject],
        nodes: &HashMap<TargetId, GraphNode>,
    ) -> Result<Vec<TargetId>, GraphError> {
        let by_index: HashMap<usize, &TargetId> = nodes
            .iter()
            .map(|(id, node)| (node.decl_index, id))
            .collect();

        let mut in_degree: HashMap<TargetId, usize> = HashMap::new();
        let mut ready: BinaryHeap<Reverse<usize>> = BinaryHeap::new();
        let mut sorted: Vec<TargetId> = Vec::with_capacity(nodes.len());

        for sub in subprojects {
            let node = &nodes[&sub.id];
            let degree = node
                .dependencies
                .iter()
                .filter(|d| nodes.contains_key(*d))
                .count();
            in_degree.insert(sub.id.clone(), degree);
            if degree == 0 {
                ready.push(Reverse(node.decl_index));
            }
        }

        while let Some(Reverse(index)) = ready.pop() {
            let id = by_index[&index];
            sorted.push(id.clone());

            for dependent in &nodes[id].dependents {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.push(Reverse(nodes[dependent].decl_index));
                    }
                }
            }
        }

        if sorted.len() != nodes.len() {
            let in_sorted: HashSet<_> = sorted.iter().collect();
            let mut cyclic: Vec<String> = nodes
                .keys()
                .filter(|id| !in_sorted.contains(id))
                .map(ToString::to_string)
                .collect();
            cyclic.sort();
            return Err(GraphError::CyclicDependency(cyclic.join(", ")));
        }

        Ok(sorted)
    }

    /// Subprojects in topologically sorted order (dependencies first)
    pub fn sorted(&self) -> &[TargetId] {
        &self.sorted_order
    }

    /// The full topological order restricted to a target set. A valid
    /// topological linearization of any subset, since dropping elements
    /// never reorders the rest.
    pub fn linearize(&self, set: &HashSet<TargetId>) -> Vec<TargetId> {
        self.sorted_order
            .iter()
            .filter(|id| set.contains(*id))
            .cloned()
            .collect()
    }

    /// Whether the graph contains a target
    pub fn contains(&self, id: &TargetId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of subprojects in the graph
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct dependencies of a target
    pub fn dependencies_of(&self, id: &TargetId) -> &[TargetId] {
        self.nodes
            .get(id)
            .map(|n| n.dependencies.as_slice())
            .unwrap_or_default()
    }

    /// All transitive dependencies of a target (the target excluded)
    pub fn upstream_keys(&self, id: &TargetId) -> HashSet<TargetId> {
        self.closure(id, |node| &node.dependencies)
    }

    /// All transitive dependents of a target (the target excluded)
    pub fn downstream_keys(&self, id: &TargetId) -> HashSet<TargetId> {
        self.closure(id, |node| &node.dependents)
    }

    fn closure<F>(&self, start: &TargetId, edges: F) -> HashSet<TargetId>
    where
        F: Fn(&GraphNode) -> &Vec<TargetId>,
    {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<TargetId> = VecDeque::new();
        queue.push_back(start.clone());

        while let Some(current) = queue.pop_front() {
            if let Some(node) = self.nodes.get(&current) {
                for next in edges(node) {
                    if seen.insert(next.clone()) {
                        queue.push_back(next.clone());
                    }
                }
            }
        }

        seen.remove(start);
        seen
    }

    /// Resolve a user-supplied name against the full candidate namespace.
    /// Qualified names (`group/name`) must match exactly; bare names match
    /// when exactly one subproject carries them.
    pub fn resolve_name(&self, raw: &str) -> Result<TargetId, GraphError> {
        let parsed = TargetId::parse(raw);
        if self.nodes.contains_key(&parsed) {
            return Ok(parsed);
        }
        if parsed.group.is_none() {
            let mut matches: Vec<&TargetId> = self
                .nodes
                .keys()
                .filter(|id| id.name == parsed.name)
                .collect();
            match matches.len() {
                1 => return Ok(matches.remove(0).clone()),
                0 => {}
                _ => {
                    matches.sort();
                    let candidates: Vec<String> =
                        matches.iter().map(ToString::to_string).collect();
                    return Err(GraphError::AmbiguousTarget {
                        name: raw.to_string(),
                        candidates: candidates.join(", "),
                    });
                }
            }
        }
        Err(GraphError::UnresolvedTarget(raw.to_string()))
    }
}
