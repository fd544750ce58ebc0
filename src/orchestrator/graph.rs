//! Dependency graph over the registry.
//!
//! Resources are stored in an arena indexed `0..n`; edges point from a
//! dependent to its dependencies. Construction rejects unknown dependencies
//! and cycles before anything is scheduled.

use std::collections::{BTreeSet, HashMap};

use crate::error::{DevhostError, Result};
use crate::resource::{ResourceId, ResourceRegistry, ResourceState};

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Validated directed acyclic graph of "depends on" edges.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    ids: Vec<ResourceId>,
    index: HashMap<ResourceId, usize>,
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    /// Dependencies always precede their dependents.
    order: Vec<usize>,
}

impl DependencyGraph {
    /// Build and validate the graph. Fails with `UnknownDependency` or `Cycle`.
    pub fn build(registry: &ResourceRegistry) -> Result<Self> {
        registry.validate()?;

        let ids: Vec<ResourceId> = registry.ids().cloned().collect();
        let index: HashMap<ResourceId, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let mut dependencies = vec![Vec::new(); ids.len()];
        let mut dependents = vec![Vec::new(); ids.len()];
        for (i, spec) in registry.iter().enumerate() {
            for dep in &spec.dependencies {
                let d = index[dep];
                dependencies[i].push(d);
                dependents[d].push(i);
            }
        }

        let mut graph = Self {
            ids,
            index,
            dependencies,
            dependents,
            order: Vec::new(),
        };
        graph.order = graph.sort()?;
        Ok(graph)
    }

    /// Depth-first post-order; a back edge to an in-progress node is a cycle.
    fn sort(&self) -> Result<Vec<usize>> {
        let mut marks = vec![Mark::Unvisited; self.ids.len()];
        let mut order = Vec::with_capacity(self.ids.len());
        let mut stack = Vec::new();
        for i in 0..self.ids.len() {
            if marks[i] == Mark::Unvisited {
                self.visit(i, &mut marks, &mut stack, &mut order)?;
            }
        }
        Ok(order)
    }

    fn visit(
        &self,
        node: usize,
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<()> {
        marks[node] = Mark::InProgress;
        stack.push(node);
        for &dep in &self.dependencies[node] {
            match marks[dep] {
                Mark::Unvisited => self.visit(dep, marks, stack, order)?,
                Mark::InProgress => {
                    let start = stack.iter().position(|&n| n == dep).unwrap_or(0);
                    let mut path: Vec<ResourceId> =
                        stack[start..].iter().map(|&n| self.ids[n].clone()).collect();
                    path.push(self.ids[dep].clone());
                    return Err(DevhostError::Cycle { path });
                }
                Mark::Done => {}
            }
        }
        stack.pop();
        marks[node] = Mark::Done;
        order.push(node);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    /// Ids in declaration order.
    pub fn ids(&self) -> &[ResourceId] {
        &self.ids
    }

    /// Direct dependencies of `id`.
    pub fn dependencies(&self, id: &ResourceId) -> Vec<&ResourceId> {
        self.neighbours(id, &self.dependencies)
    }

    /// Direct dependents of `id`, the resources to re-check when it changes state.
    pub fn dependents(&self, id: &ResourceId) -> Vec<&ResourceId> {
        self.neighbours(id, &self.dependents)
    }

    fn neighbours<'a>(&'a self, id: &ResourceId, edges: &'a [Vec<usize>]) -> Vec<&'a ResourceId> {
        self.index
            .get(id)
            .map(|&i| edges[i].iter().map(|&n| &self.ids[n]).collect())
            .unwrap_or_default()
    }

    /// Every resource `id` waits on, directly or transitively.
    pub fn transitive_dependencies(&self, id: &ResourceId) -> BTreeSet<ResourceId> {
        let mut seen = BTreeSet::new();
        let Some(&start) = self.index.get(id) else {
            return seen;
        };
        let mut queue: Vec<usize> = self.dependencies[start].clone();
        while let Some(n) = queue.pop() {
            if seen.insert(self.ids[n].clone()) {
                queue.extend(self.dependencies[n].iter().copied());
            }
        }
        seen
    }

    /// Ids with dependencies before dependents.
    pub fn topological_order(&self) -> Vec<&ResourceId> {
        self.order.iter().map(|&i| &self.ids[i]).collect()
    }

    /// Startup waves: wave `k` holds resources whose longest dependency chain
    /// has length `k`. Resources in one wave have no edges between them.
    pub fn waves(&self) -> Vec<Vec<ResourceId>> {
        let mut depth = vec![0usize; self.ids.len()];
        for &i in &self.order {
            depth[i] = self.dependencies[i]
                .iter()
                .map(|&d| depth[d] + 1)
                .max()
                .unwrap_or(0);
        }
        let levels = depth.iter().copied().max().map_or(0, |m| m + 1);
        let mut waves = vec![Vec::new(); levels];
        for (i, &d) in depth.iter().enumerate() {
            waves[d].push(self.ids[i].clone());
        }
        waves
    }

    /// Pending resources whose dependencies all satisfy dependents, in
    /// topological order.
    pub fn ready_to_start<F>(&self, state_of: F) -> Vec<ResourceId>
    where
        F: Fn(&ResourceId) -> ResourceState,
    {
        self.order
            .iter()
            .filter(|&&i| state_of(&self.ids[i]) == ResourceState::Pending)
            .filter(|&&i| {
                self.dependencies[i]
                    .iter()
                    .all(|&d| state_of(&self.ids[d]).satisfies_dependents())
            })
            .map(|&i| self.ids[i].clone())
            .collect()
    }

    /// Failed or stopped resources among the transitive dependencies of `id`.
    /// Empty when nothing upstream blocks it.
    pub fn blocking_failures<F>(&self, id: &ResourceId, state_of: F) -> Vec<ResourceId>
    where
        F: Fn(&ResourceId) -> ResourceState,
    {
        self.transitive_dependencies(id)
            .into_iter()
            .filter(|dep| state_of(dep).blocks_dependents())
            .collect()
    }
}
