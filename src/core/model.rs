use crate::core::error::{BoxError, FuryError, Result};
use crate::core::field::Field;
use crate::core::{NodeValue, Payload};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// The function behind a model: merged request parameters in, raw backend response out.
pub type ModelFn = Arc<dyn Fn(&Payload) -> std::result::Result<NodeValue, BoxError> + Send + Sync>;

/// A callable that talks to a generative backend.
#[derive(Clone)]
pub struct Model {
    pub collection_name: String,
    pub model_id: String,
    pub description: String,
    pub fields: Vec<Field>,
    pub tags: Vec<String>,
    callable: ModelFn,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("collection_name", &self.collection_name)
            .field("model_id", &self.model_id)
            .field("fields", &self.fields)
            .field("tags", &self.tags)
            .finish()
    }
}

impl Model {
    pub fn new<F>(
        collection_name: impl Into<String>,
        model_id: impl Into<String>,
        description: impl Into<String>,
        fields: Vec<Field>,
        callable: F,
    ) -> Self
    where
        F: Fn(&Payload) -> std::result::Result<NodeValue, BoxError> + Send + Sync + 'static,
    {
        Self {
            collection_name: collection_name.into(),
            model_id: model_id.into(),
            description: description.into(),
            fields,
            tags: Vec::new(),
            callable: Arc::new(callable),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Calls the backend. Failures come back as [`FuryError::Upstream`] tagged with the model id.
    pub fn call(&self, params: &Payload) -> Result<NodeValue> {
        log::debug!("Calling model '{}' with {} params", self.model_id, params.len());
        (self.callable)(params).map_err(|e| FuryError::upstream(&self.model_id, e))
    }

    pub fn field_names(&self) -> HashSet<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn to_definition(&self) -> ModelDefinition {
        ModelDefinition {
            collection_name: self.collection_name.clone(),
            id: self.model_id.clone(),
            description: self.description.clone(),
            fields: self.fields.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Serializable description of a [`Model`], without its callable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    #[serde(default)]
    pub collection_name: String,
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "vars")]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_passes_params_through() {
        let model = Model::new("echo", "echo", "", crate::fields!("text"), |p: &Payload| {
            Ok(NodeValue::Object(p.clone()))
        });
        let mut params = Payload::new();
        params.insert("text".into(), json!("hi"));
        assert_eq!(model.call(&params).unwrap(), json!({"text": "hi"}));
    }

    #[test]
    fn test_call_wraps_backend_error() {
        let model = Model::new("broken", "broken", "", vec![], |_: &Payload| {
            Err("backend down".into())
        });
        let err = model.call(&Payload::new()).unwrap_err();
        match err {
            FuryError::Upstream { node_id, source } => {
                assert_eq!(node_id, "broken");
                assert_eq!(source.to_string(), "backend down");
            }
            other => panic!("Expected upstream error, got {other:?}"),
        }
    }

    #[test]
    fn test_definition_uses_id_key() {
        let fields = crate::fields!("model: string");
        let model = Model::new("openai", "openai-chat", "chat", fields, |_: &Payload| {
            Ok(NodeValue::Null)
        })
        .with_tags(["text"]);
        let def = serde_json::to_value(model.to_definition()).unwrap();
        assert_eq!(def["id"], json!("openai-chat"));
        assert_eq!(def["vars"][0]["name"], json!("model"));
        assert_eq!(def["tags"], json!(["text"]));
    }
}
