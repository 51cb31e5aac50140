//! Topological execution schedule.

use super::graph::DataflowGraph;

/// A validated execution plan for one acyclic dataflow graph.
///
/// Holds a topological order of task indices, each task's distinct
/// predecessors and successors, and a layering in which a task's layer is one
/// more than the highest layer among its predecessors. Tasks sharing a layer
/// have no path between them.
#[derive(Debug, Clone)]
pub struct Schedule {
    names: Vec<String>,
    order: Vec<usize>,
    predecessors: Vec<Vec<usize>>,
    successors: Vec<Vec<usize>>,
    layer_of: Vec<usize>,
    layers: Vec<Vec<usize>>,
}

impl Schedule {
    pub(crate) fn new(graph: &DataflowGraph, order: Vec<usize>) -> Self {
        let n = graph.len();
        let predecessors: Vec<Vec<usize>> = (0..n).map(|v| graph.predecessors(v)).collect();
        let successors: Vec<Vec<usize>> = (0..n).map(|v| graph.successors(v)).collect();

        let mut layer_of = vec![0usize; n];
        for &v in &order {
            layer_of[v] = predecessors[v]
                .iter()
                .map(|&p| layer_of[p] + 1)
                .max()
                .unwrap_or(0);
        }

        let depth = layer_of.iter().copied().max().map_or(0, |d| d + 1);
        let mut layers = vec![Vec::new(); depth];
        for &v in &order {
            layers[layer_of[v]].push(v);
        }

        Self {
            names: graph.nodes().iter().map(|n| n.name.clone()).collect(),
            order,
            predecessors,
            successors,
            layer_of,
            layers,
        }
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if there are no tasks.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Task indices in topological order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Task names in topological order.
    pub fn order_names(&self) -> Vec<&str> {
        self.order.iter().map(|&v| self.names[v].as_str()).collect()
    }

    /// Name of a task by index.
    pub fn name(&self, task: usize) -> &str {
        &self.names[task]
    }

    /// Position of a task in the topological order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|&v| self.names[v] == name)
    }

    /// Producers a task waits for within a cycle.
    pub fn predecessors(&self, task: usize) -> &[usize] {
        &self.predecessors[task]
    }

    /// Consumers released when a task completes.
    pub fn successors(&self, task: usize) -> &[usize] {
        &self.successors[task]
    }

    /// Initial pending-producer count of every task.
    pub fn pending_counts(&self) -> Vec<usize> {
        self.predecessors.iter().map(Vec::len).collect()
    }

    /// Layer of a task.
    pub fn layer_of(&self, task: usize) -> usize {
        self.layer_of[task]
    }

    /// Task indices grouped by layer, each layer in topological order.
    pub fn layers(&self) -> &[Vec<usize>] {
        &self.layers
    }

    /// Task names grouped by layer.
    pub fn layer_names(&self) -> Vec<Vec<&str>> {
        self.layers
            .iter()
            .map(|layer| layer.iter().map(|&v| self.names[v].as_str()).collect())
            .collect()
    }
}
