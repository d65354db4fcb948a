use crate::core::action::{AiAction, AiFnDefinition, DEFAULT_OUTPUT};
use crate::core::error::{BoxError, FuryError, Result};
use crate::core::field::{Field, find_field};
use crate::core::model::Model;
use crate::core::{NodeValue, Payload};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// What sits behind a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Programmatic,
    Ai,
    Model,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Programmatic => f.write_str("programmatic"),
            NodeKind::Ai => f.write_str("ai"),
            NodeKind::Model => f.write_str("model"),
        }
    }
}

/// A plain function node: gathered inputs in, raw result out.
pub type ActionFn = Arc<dyn Fn(&Payload) -> std::result::Result<NodeValue, BoxError> + Send + Sync>;

#[derive(Clone)]
pub enum NodeCallable {
    Function(ActionFn),
    Ai(Arc<AiAction>),
    Model(Arc<Model>),
}

/// A unit of work with typed inputs and outputs.
#[derive(Clone)]
pub struct Node {
    /// Id of this node inside a chain.
    pub id: String,
    /// Id the node is registered under. Equal to `id` until the node is instantiated.
    pub action_id: String,
    pub kind: NodeKind,
    pub description: String,
    pub fields: Vec<Field>,
    pub outputs: Vec<Field>,
    callable: NodeCallable,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("action_id", &self.action_id)
            .field("kind", &self.kind)
            .field("fields", &self.fields)
            .field("outputs", &self.outputs)
            .finish()
    }
}

impl Node {
    /// Creates a programmatic node around `callable`.
    pub fn programmatic<F>(
        id: impl Into<String>,
        description: impl Into<String>,
        fields: Vec<Field>,
        outputs: Vec<Field>,
        callable: F,
    ) -> Self
    where
        F: Fn(&Payload) -> std::result::Result<NodeValue, BoxError> + Send + Sync + 'static,
    {
        Self::from_parts(
            id.into(),
            NodeKind::Programmatic,
            description.into(),
            fields,
            outputs,
            NodeCallable::Function(Arc::new(callable)),
        )
    }

    pub(crate) fn from_parts(
        id: String,
        kind: NodeKind,
        description: String,
        fields: Vec<Field>,
        outputs: Vec<Field>,
        callable: NodeCallable,
    ) -> Self {
        Self {
            action_id: id.clone(),
            id,
            kind,
            description,
            fields,
            outputs,
            callable,
        }
    }

    pub fn from_ai_action(action: AiAction, description: impl Into<String>) -> Self {
        Self {
            id: action.node_id.clone(),
            action_id: action.node_id.clone(),
            kind: NodeKind::Ai,
            description: description.into(),
            fields: action.node_fields(),
            outputs: action.output_fields(),
            callable: NodeCallable::Ai(Arc::new(action)),
        }
    }

    /// Exposes a bare model as a node with a single `model_output` output.
    pub fn from_model(model: Arc<Model>) -> Self {
        Self {
            id: model.model_id.clone(),
            action_id: model.model_id.clone(),
            kind: NodeKind::Model,
            description: model.description.clone(),
            fields: model.fields.clone(),
            outputs: vec![Field::new(DEFAULT_OUTPUT)],
            callable: NodeCallable::Model(model),
        }
    }

    /// Overrides the chain-local id, keeping `action_id`.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// A copy with a fresh, unique chain-local id derived from `action_id`.
    pub fn instance(&self) -> Self {
        let id = format!("{}_{}", self.action_id, uuid::Uuid::new_v4().simple());
        self.clone().with_id(id)
    }

    pub fn callable(&self) -> &NodeCallable {
        &self.callable
    }

    pub fn input(&self, name: &str) -> Option<&Field> {
        find_field(&self.fields, name)
    }

    pub fn output(&self, name: &str) -> Option<&Field> {
        find_field(&self.outputs, name)
    }

    /// Runs the node and returns its named outputs.
    pub fn call(&self, inputs: &Payload) -> Result<Payload> {
        let missing = self
            .fields
            .iter()
            .find(|f| f.required && !inputs.contains_key(&f.name));
        if let Some(missing) = missing {
            return Err(FuryError::MissingField {
                node_id: self.id.clone(),
                field: missing.name.clone(),
            });
        }

        match &self.callable {
            NodeCallable::Function(f) => {
                let raw = f(inputs).map_err(|e| FuryError::upstream(&self.id, e))?;
                Ok(self.collect_outputs(&raw))
            }
            NodeCallable::Ai(action) => action.call(inputs).map_err(|e| e.at_node(&self.id)),
            NodeCallable::Model(model) => {
                let raw = model.call(inputs).map_err(|e| e.at_node(&self.id))?;
                let mut out = Payload::new();
                out.insert(DEFAULT_OUTPUT.to_string(), raw);
                Ok(out)
            }
        }
    }

    /// Maps a raw function result onto the declared outputs.
    ///
    /// An output with a `loc` is extracted by path; otherwise it is read from the
    /// top-level key of the same name, and a node with a single output falls back
    /// to the whole result.
    fn collect_outputs(&self, raw: &NodeValue) -> Payload {
        let mut out = Payload::new();
        for field in &self.outputs {
            let value = if field.loc.is_some() {
                field.extract_from(raw)
            } else {
                raw.get(&field.name)
                    .cloned()
                    .or_else(|| (self.outputs.len() == 1).then(|| raw.clone()))
            };
            let value = value.unwrap_or_else(|| {
                log::warn!("Node '{}' returned no value for output '{}'", self.id, field.name);
                NodeValue::Null
            });
            out.insert(field.name.clone(), value);
        }
        out
    }

    pub fn to_definition(&self) -> NodeDefinition {
        let ai = match &self.callable {
            NodeCallable::Ai(action) => action.definition(),
            _ => None,
        };
        NodeDefinition {
            id: self.id.clone(),
            action_id: self.action_id.clone(),
            kind: self.kind,
            description: self.description.clone(),
            fields: self.fields.clone(),
            outputs: self.outputs.clone(),
            ai,
        }
    }
}

/// Serializable node body, the `cf_data` of a stored chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action_id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub outputs: Vec<Field>,
    #[serde(rename = "fn", default, skip_serializing_if = "Option::is_none")]
    pub ai: Option<AiFnDefinition>,
}

impl NodeDefinition {
    /// The registry id this body refers to.
    pub fn registry_id(&self) -> &str {
        if self.action_id.is_empty() {
            &self.id
        } else {
            &self.action_id
        }
    }
}
