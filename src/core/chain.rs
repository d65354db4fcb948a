//! The DAG executor.
//!
//! A [`Chain`] is validated once when it is built: every edge must connect
//! declared fields of known nodes, the graph must be acyclic and the main
//! input and output must name real fields. The topological order is computed
//! at the same time, so running a chain never re-checks its structure.
//!
//! Per run, each node gathers its inputs (edge values first, then the payload),
//! runs, and has its outputs recorded in a [`Trace`] under `"<node>/<field>"`.
//! The first failing node halts the run; the failure carries the partial trace.

use crate::core::error::{FuryError, Result};
use crate::core::field::FieldType;
use crate::core::node::Node;
use crate::core::trace::Trace;
use crate::core::validation::ValidationResult;
use crate::core::{NodeValue, Payload};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

/// Routes one output field of `source` into one input field of `target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub source_field: String,
    pub target_field: String,
}

impl Edge {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        source_field: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_field: source_field.into(),
            target_field: target_field.into(),
        }
    }

    /// Synthetic id, `"<source>/<source_field>-<target><target_field>"`.
    pub fn id(&self) -> String {
        format!(
            "{}/{}-{}{}",
            self.source, self.source_field, self.target, self.target_field
        )
    }

    pub fn source_key(&self) -> String {
        Trace::key(&self.source, &self.source_field)
    }
}

/// A halted run: which node stopped it, why, and everything produced before.
#[derive(Debug, Error)]
#[error("Chain halted at node '{node_id}': {error}")]
pub struct ChainFailure {
    pub node_id: String,
    #[source]
    pub error: FuryError,
    pub trace: Trace,
}

#[derive(Debug, Clone)]
pub struct Chain {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    sample: Payload,
    main_in: String,
    main_out: String,
    order: Vec<usize>,
    /// For every node, the edges feeding each of its inputs, in declaration order.
    inbound: Vec<HashMap<String, Vec<usize>>>,
}

/// Splits `"<node>/<field>"` on its last slash.
fn split_key(key: &str) -> Option<(&str, &str)> {
    key.rsplit_once('/')
        .filter(|(node, field)| !node.is_empty() && !field.is_empty())
}

impl Chain {
    pub fn new(
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        sample: Payload,
        main_in: impl Into<String>,
        main_out: impl Into<String>,
    ) -> Result<Self> {
        let main_in = main_in.into();
        let main_out = main_out.into();
        if sample.is_empty() {
            return Err(FuryError::Structural("chain has no sample payload".into()));
        }
        if main_in.is_empty() || main_out.is_empty() {
            return Err(FuryError::Structural(
                "chain needs both a main input and a main output".into(),
            ));
        }

        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.id.clone(), i).is_some() {
                return Err(FuryError::Structural(format!(
                    "node id '{}' appears more than once",
                    node.id
                )));
            }
        }

        let mut inbound: Vec<HashMap<String, Vec<usize>>> = vec![HashMap::new(); nodes.len()];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        let mut in_degree = vec![0usize; nodes.len()];
        for (e, edge) in edges.iter().enumerate() {
            let src = *index.get(&edge.source).ok_or_else(|| {
                FuryError::Structural(format!(
                    "edge {} starts at unknown node '{}'",
                    edge.id(),
                    edge.source
                ))
            })?;
            let tgt = *index.get(&edge.target).ok_or_else(|| {
                FuryError::Structural(format!(
                    "edge {} ends at unknown node '{}'",
                    edge.id(),
                    edge.target
                ))
            })?;
            if nodes[src].output(&edge.source_field).is_none() {
                return Err(FuryError::Structural(format!(
                    "node '{}' has no output '{}'",
                    edge.source, edge.source_field
                )));
            }
            if nodes[tgt].input(&edge.target_field).is_none() {
                return Err(FuryError::Structural(format!(
                    "node '{}' has no input '{}'",
                    edge.target, edge.target_field
                )));
            }
            inbound[tgt].entry(edge.target_field.clone()).or_default().push(e);
            successors[src].push(tgt);
            in_degree[tgt] += 1;
        }

        // Kahn's algorithm, ready nodes taken in declaration order.
        let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(nodes.len());
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &next in &successors[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(next);
                }
            }
        }
        if order.len() < nodes.len() {
            let stuck: Vec<&str> = (0..nodes.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| nodes[i].id.as_str())
                .collect();
            return Err(FuryError::Structural(format!(
                "edges form a cycle through [{}]",
                stuck.join(", ")
            )));
        }

        let (in_node, in_field) = split_key(&main_in).ok_or_else(|| {
            FuryError::Structural(format!("main input '{}' is not '<node>/<field>'", main_in))
        })?;
        match index.get(in_node) {
            Some(&i) if nodes[i].input(in_field).is_some() => {}
            _ => {
                return Err(FuryError::Structural(format!(
                    "main input '{}' does not name a node input",
                    main_in
                )));
            }
        }
        let (out_node, out_field) = split_key(&main_out).ok_or_else(|| {
            FuryError::Structural(format!("main output '{}' is not '<node>/<field>'", main_out))
        })?;
        match index.get(out_node) {
            Some(&i) if nodes[i].output(out_field).is_some() => {}
            _ => {
                return Err(FuryError::Structural(format!(
                    "main output '{}' does not name a node output",
                    main_out
                )));
            }
        }

        Ok(Self {
            nodes,
            edges,
            sample,
            main_in,
            main_out,
            order,
            inbound,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn sample(&self) -> &Payload {
        &self.sample
    }

    pub fn main_in(&self) -> &str {
        &self.main_in
    }

    pub fn main_out(&self) -> &str {
        &self.main_out
    }

    /// Node ids in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.nodes[i].id.as_str()).collect()
    }

    /// Runs the chain and returns the value at the main output.
    pub fn run(&self, payload: &Payload) -> std::result::Result<NodeValue, ChainFailure> {
        self.run_verbose(payload).map(|(out, _)| out)
    }

    /// Runs the chain and returns the main output together with the full trace.
    pub fn run_verbose(
        &self,
        payload: &Payload,
    ) -> std::result::Result<(NodeValue, Trace), ChainFailure> {
        let mut trace = Trace::new();
        for &i in &self.order {
            let node = &self.nodes[i];
            let outputs = match self
                .gather_inputs(i, payload, &trace)
                .and_then(|inputs| node.call(&inputs))
            {
                Ok(outputs) => outputs,
                Err(error) => {
                    log::debug!("Node '{}' failed, halting chain: {}", node.id, error);
                    return Err(ChainFailure {
                        node_id: node.id.clone(),
                        error,
                        trace,
                    });
                }
            };
            log::debug!(
                "Node '{}' produced {}",
                node.id,
                NodeValue::Object(outputs.clone())
            );
            trace.record(&node.id, outputs);
        }

        let out = trace.get_key(&self.main_out).cloned().unwrap_or(NodeValue::Null);
        Ok((out, trace))
    }

    /// Runs with the stored sample as base payload and `user_input` at the main input.
    pub fn invoke(
        &self,
        user_input: impl Into<NodeValue>,
    ) -> std::result::Result<NodeValue, ChainFailure> {
        self.run(&self.invoke_payload(user_input.into()))
    }

    pub fn invoke_verbose(
        &self,
        user_input: impl Into<NodeValue>,
    ) -> std::result::Result<(NodeValue, Trace), ChainFailure> {
        self.run_verbose(&self.invoke_payload(user_input.into()))
    }

    fn invoke_payload(&self, user_input: NodeValue) -> Payload {
        let mut payload = self.sample.clone();
        payload.insert(self.main_in.clone(), user_input);
        payload
    }

    /// Collects the inputs of node `i`. The last declared edge into a field
    /// wins, then `"<node>/<field>"` in the payload, then the bare field name.
    fn gather_inputs(&self, i: usize, payload: &Payload, trace: &Trace) -> Result<Payload> {
        let node = &self.nodes[i];
        let mut inputs = Payload::new();
        for field in &node.fields {
            let from_edge = self.inbound[i]
                .get(&field.name)
                .and_then(|edges| edges.last())
                .and_then(|&e| trace.get_key(&self.edges[e].source_key()));
            let value = from_edge
                .or_else(|| payload.get(&Trace::key(&node.id, &field.name)))
                .or_else(|| payload.get(&field.name));
            match value {
                Some(v) => {
                    inputs.insert(field.name.clone(), v.clone());
                }
                None if field.required => {
                    return Err(FuryError::MissingInput {
                        node_id: node.id.clone(),
                        field: field.name.clone(),
                    });
                }
                None => {}
            }
        }
        Ok(inputs)
    }

    /// Checks the wiring against the stored sample without running anything.
    pub fn lint(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        let supplied = |node_id: &str, field: &str| {
            let key = Trace::key(node_id, field);
            key == self.main_in || self.sample.contains_key(&key) || self.sample.contains_key(field)
        };

        for (i, node) in self.nodes.iter().enumerate() {
            for field in &node.fields {
                match self.inbound[i].get(&field.name) {
                    Some(edges) if edges.len() > 1 => result.add_warning(format!(
                        "input '{}/{}' is fed by {} edges, only the last one is used",
                        node.id,
                        field.name,
                        edges.len()
                    )),
                    Some(_) => {}
                    None if field.required && !supplied(&node.id, &field.name) => {
                        result.add_error(format!(
                            "required input '{}/{}' has no edge and is missing from the sample",
                            node.id, field.name
                        ))
                    }
                    None => {}
                }
            }
        }

        let (main_out_node, _) = split_key(&self.main_out).unwrap_or_default();
        let feeding: HashSet<&str> = self.edges.iter().map(|e| e.source.as_str()).collect();
        for node in &self.nodes {
            if node.id != main_out_node && !feeding.contains(node.id.as_str()) {
                result.add_warning(format!(
                    "outputs of node '{}' feed nothing and it is not the main output",
                    node.id
                ));
            }
        }

        for edge in &self.edges {
            let from = self.node(&edge.source).and_then(|n| n.output(&edge.source_field));
            let to = self.node(&edge.target).and_then(|n| n.input(&edge.target_field));
            if let (Some(from), Some(to)) = (from, to) {
                if from.ty != FieldType::Any && to.ty != FieldType::Any && from.ty != to.ty {
                    result.add_warning(format!(
                        "edge {} routes {} into {}",
                        edge.id(),
                        from.ty,
                        to.ty
                    ));
                }
            }
        }

        result
    }
}
