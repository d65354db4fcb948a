use crate::core::{NodeValue, Payload};
use serde::{Deserialize, Serialize};

/// Every value produced during one chain run, keyed `"<node id>/<field>"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    values: Payload,
    executed: Vec<String>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(node_id: &str, field: &str) -> String {
        format!("{}/{}", node_id, field)
    }

    /// Records the outputs of a node that finished successfully.
    pub fn record(&mut self, node_id: &str, outputs: Payload) {
        for (field, value) in outputs {
            self.values.insert(Self::key(node_id, &field), value);
        }
        self.executed.push(node_id.to_string());
    }

    pub fn get(&self, node_id: &str, field: &str) -> Option<&NodeValue> {
        self.values.get(&Self::key(node_id, field))
    }

    pub fn get_key(&self, key: &str) -> Option<&NodeValue> {
        self.values.get(key)
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.executed.iter().any(|id| id == node_id)
    }

    /// Node ids in the order they ran.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    pub fn values(&self) -> &Payload {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Payload {
        self.values
    }
}
