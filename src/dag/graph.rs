// src/dag/graph.rs

use std::collections::{HashMap, VecDeque};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::target::TargetRef;

/// Directed graph of targets keyed by target name.
///
/// Edges point from a target to the prerequisites it depends on. Nodes are
/// created lazily the first time a target is mentioned on either side of an
/// edge, so every edge endpoint is always a node.
///
/// Acyclicity is not enforced on insertion; use [`Dag::find_cycle`] before
/// walking a graph built from untrusted rules.
#[derive(Debug, Clone, Default)]
pub struct Dag {
    nodes: Vec<TargetRef>,
    index: HashMap<String, usize>,
    /// `edges[i]` holds the indices of the prerequisites of `nodes[i]`.
    edges: Vec<Vec<usize>>,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `target` and an edge to each of `prerequisites`. Idempotent.
    pub fn add_target(&mut self, target: &TargetRef, prerequisites: &[TargetRef]) {
        let from = self.node(target);
        for prereq in prerequisites {
            let to = self.node(prereq);
            if !self.edges[from].contains(&to) {
                self.edges[from].push(to);
            }
        }
    }

    fn node(&mut self, target: &TargetRef) -> usize {
        if let Some(&idx) = self.index.get(target.name()) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(TargetRef::clone(target));
        self.index.insert(target.name().to_string(), idx);
        self.edges.push(Vec::new());
        idx
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All targets, in first-mention order.
    pub fn targets(&self) -> impl Iterator<Item = &TargetRef> {
        self.nodes.iter()
    }

    pub fn get(&self, name: &str) -> Option<&TargetRef> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Immediate prerequisites of `name`, in insertion order.
    pub fn prerequisites_of(&self, name: &str) -> Vec<&TargetRef> {
        match self.index.get(name) {
            Some(&i) => self.edges[i].iter().map(|&j| &self.nodes[j]).collect(),
            None => Vec::new(),
        }
    }

    /// Immediate dependents of `name` (targets listing it as a prerequisite).
    pub fn dependents_of(&self, name: &str) -> Vec<&TargetRef> {
        let Some(&target) = self.index.get(name) else {
            return Vec::new();
        };
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, prereqs)| prereqs.contains(&target))
            .map(|(i, _)| &self.nodes[i])
            .collect()
    }

    /// The same nodes with every edge flipped.
    pub fn reversed(&self) -> Dag {
        let mut edges = vec![Vec::new(); self.nodes.len()];
        for (from, prereqs) in self.edges.iter().enumerate() {
            for &to in prereqs {
                edges[to].push(from);
            }
        }
        Dag {
            nodes: self.nodes.clone(),
            index: self.index.clone(),
            edges,
        }
    }

    /// A build order: every target appears after all of its prerequisites.
    ///
    /// Kahn's algorithm over prerequisite counts. Nodes on a cycle (and
    /// everything depending on them) are left out of the result.
    pub fn topological_sort(&self) -> Vec<TargetRef> {
        let n = self.nodes.len();
        let mut pending: Vec<usize> = self.edges.iter().map(|p| p.len()).collect();
        let dependents = self.reversed().edges;

        let mut next: VecDeque<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(u) = next.pop_front() {
            order.push(TargetRef::clone(&self.nodes[u]));
            for &v in &dependents[u] {
                pending[v] -= 1;
                if pending[v] == 0 {
                    next.push_back(v);
                }
            }
        }

        order
    }

    /// Name of a target involved in a cycle, if the graph has one.
    pub fn find_cycle(&self) -> Option<String> {
        let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
        for i in 0..self.nodes.len() {
            graph.add_node(i);
        }
        for (from, prereqs) in self.edges.iter().enumerate() {
            for &to in prereqs {
                graph.add_edge(from, to, ());
            }
        }

        match toposort(&graph, None) {
            Ok(_) => None,
            Err(cycle) => Some(self.nodes[cycle.node_id()].name().to_string()),
        }
    }

    /// Raw adjacency for the walker.
    pub(crate) fn adjacency(&self) -> (&[TargetRef], &[Vec<usize>]) {
        (&self.nodes, &self.edges)
    }
}
