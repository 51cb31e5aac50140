//! Dataflow graph derived from task port declarations.

use super::schedule::Schedule;
use super::tarjan::strongly_connected;
use sluice_core::error::{Result, SluiceError};
use sluice_core::ports::{PortTable, TaskPorts};
use sluice_core::types::DataType;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

/// A producer → consumer edge carrying one store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Index of the task writing the key.
    pub from: usize,
    /// Index of the task reading the key.
    pub to: usize,
    /// The store key.
    pub key: String,
}

/// A task in the graph.
#[derive(Debug, Clone)]
pub struct GraphNode {
    /// Position in task creation order.
    pub index: usize,
    /// Instance name.
    pub name: String,
    /// Declared input keys, sorted.
    pub inputs: Vec<String>,
    /// Declared output keys, sorted.
    pub outputs: Vec<String>,
}

/// An input key with no producing task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalInput {
    /// The store key.
    pub key: String,
    /// The type the consumers expect.
    pub data_type: DataType,
    /// Tasks reading the key, in creation order.
    pub consumers: Vec<String>,
}

/// The task dependency graph.
///
/// Nodes are tasks in creation order; an edge runs from the task owning an
/// output key to every task declaring that key as input.
#[derive(Debug, Default)]
pub struct DataflowGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
    external: BTreeMap<String, ExternalInput>,
}

impl DataflowGraph {
    /// Build the graph from every task's declarations.
    ///
    /// Fails with `PortTypeMismatch` when a consumer's type differs from the
    /// producer's (or from another consumer's, for keys with no producer).
    /// With `strict_inputs`, an input without a producer fails with
    /// `MissingProducer`; otherwise it is recorded as external.
    pub fn build(ports: &PortTable, strict_inputs: bool) -> Result<Self> {
        let mut graph = Self::default();
        for task in ports.tasks() {
            graph.add_node(task);
        }

        for (to, task) in ports.tasks().iter().enumerate() {
            for (key, &found) in task.inputs() {
                match ports.producer_of(key) {
                    Some(producer) => {
                        let expected =
                            producer
                                .output(key)
                                .ok_or_else(|| SluiceError::MissingProducer {
                                    component: task.owner().to_string(),
                                    key: key.clone(),
                                })?;
                        if expected != found {
                            return Err(SluiceError::PortTypeMismatch {
                                key: key.clone(),
                                producer: producer.owner().to_string(),
                                expected: expected.to_string(),
                                consumer: task.owner().to_string(),
                                found: found.to_string(),
                            });
                        }
                        let from = graph.index[producer.owner()];
                        graph.add_edge(Edge {
                            from,
                            to,
                            key: key.clone(),
                        });
                    }
                    None if strict_inputs => {
                        return Err(SluiceError::MissingProducer {
                            component: task.owner().to_string(),
                            key: key.clone(),
                        });
                    }
                    None => graph.add_external(key, found, task.owner())?,
                }
            }
        }

        tracing::debug!(
            tasks = graph.nodes.len(),
            edges = graph.edges.len(),
            external_inputs = graph.external.len(),
            "Built dataflow graph"
        );

        Ok(graph)
    }

    fn add_node(&mut self, task: &TaskPorts) {
        let index = self.nodes.len();
        self.index.insert(task.owner().to_string(), index);
        self.nodes.push(GraphNode {
            index,
            name: task.owner().to_string(),
            inputs: task.inputs().keys().cloned().collect(),
            outputs: task.outputs().keys().cloned().collect(),
        });
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
    }

    fn add_edge(&mut self, edge: Edge) {
        let idx = self.edges.len();
        self.outgoing[edge.from].push(idx);
        self.incoming[edge.to].push(idx);
        self.edges.push(edge);
    }

    fn add_external(&mut self, key: &str, data_type: DataType, consumer: &str) -> Result<()> {
        let entry = self
            .external
            .entry(key.to_string())
            .or_insert_with(|| ExternalInput {
                key: key.to_string(),
                data_type,
                consumers: Vec::new(),
            });
        if entry.data_type != data_type {
            return Err(SluiceError::PortTypeMismatch {
                key: key.to_string(),
                producer: entry.consumers.first().cloned().unwrap_or_default(),
                expected: entry.data_type.to_string(),
                consumer: consumer.to_string(),
                found: data_type.to_string(),
            });
        }
        entry.consumers.push(consumer.to_string());
        Ok(())
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if there are no tasks.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All tasks in creation order.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Index of a task by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Name of a task by index.
    pub fn name(&self, index: usize) -> &str {
        &self.nodes[index].name
    }

    /// All edges.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edges leaving a task.
    pub fn outgoing_edges(&self, node: usize) -> impl Iterator<Item = &Edge> {
        self.outgoing[node].iter().map(|&i| &self.edges[i])
    }

    /// Edges entering a task.
    pub fn incoming_edges(&self, node: usize) -> impl Iterator<Item = &Edge> {
        self.incoming[node].iter().map(|&i| &self.edges[i])
    }

    /// Distinct producers a task depends on, self excluded.
    pub fn predecessors(&self, node: usize) -> Vec<usize> {
        let mut preds: Vec<usize> = self
            .incoming_edges(node)
            .map(|e| e.from)
            .filter(|&from| from != node)
            .collect();
        preds.sort_unstable();
        preds.dedup();
        preds
    }

    /// Distinct consumers of a task's outputs, self excluded.
    pub fn successors(&self, node: usize) -> Vec<usize> {
        let mut succs: Vec<usize> = self
            .outgoing_edges(node)
            .map(|e| e.to)
            .filter(|&to| to != node)
            .collect();
        succs.sort_unstable();
        succs.dedup();
        succs
    }

    /// Check if an edge exists between two tasks (any key).
    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        match (self.index_of(from), self.index_of(to)) {
            (Some(f), Some(t)) => self.outgoing_edges(f).any(|e| e.to == t),
            _ => false,
        }
    }

    /// Input keys with no producing task.
    pub fn external_inputs(&self) -> impl Iterator<Item = &ExternalInput> {
        self.external.values()
    }

    /// Detect cycles and compute the execution schedule.
    ///
    /// Every strongly-connected component with more than one task, and every
    /// task that consumes its own output, is reported in a single
    /// `CyclicDependency` error.
    pub fn schedule(&self) -> Result<Schedule> {
        let adjacency: Vec<Vec<usize>> = (0..self.len())
            .map(|v| self.outgoing_edges(v).map(|e| e.to).collect())
            .collect();
        let components = strongly_connected(&adjacency);

        let cycles: Vec<Vec<String>> = components
            .iter()
            .filter(|c| c.len() > 1 || adjacency[c[0]].contains(&c[0]))
            .map(|c| c.iter().map(|&v| self.nodes[v].name.clone()).collect())
            .collect();
        if !cycles.is_empty() {
            tracing::error!(cycles = ?cycles, "Cyclic dependency between tasks");
            return Err(SluiceError::CyclicDependency { cycles });
        }

        let order: Vec<usize> = components.iter().rev().map(|c| c[0]).collect();
        Ok(Schedule::new(self, order))
    }

    /// Render the graph in Graphviz DOT format.
    ///
    /// Tasks are boxes and keys are ellipses. A key without a producer is an
    /// external input.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph dataflow {\n");
        out.push_str("  rankdir=LR;\n");
        for node in &self.nodes {
            let _ = writeln!(out, "  \"task:{0}\" [shape=box, label=\"{0}\"];", node.name);
        }

        let mut keys: Vec<&str> = self
            .nodes
            .iter()
            .flat_map(|n| n.inputs.iter().chain(n.outputs.iter()))
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        keys.dedup();
        for key in keys {
            let style = if self.external.contains_key(key) {
                ", style=dashed"
            } else {
                ""
            };
            let _ = writeln!(
                out,
                "  \"key:{0}\" [shape=ellipse, label=\"{0}\"{1}];",
                key, style
            );
        }

        for node in &self.nodes {
            for key in &node.outputs {
                let _ = writeln!(out, "  \"task:{}\" -> \"key:{}\";", node.name, key);
            }
            for key in &node.inputs {
                let _ = writeln!(out, "  \"key:{}\" -> \"task:{}\";", key, node.name);
            }
        }
        out.push_str("}\n");
        out
    }
}
