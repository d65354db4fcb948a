//! AI actions: a model call fed by a request template or a pre-processing function.

use crate::core::error::{BoxError, FuryError, Result};
use crate::core::field::{Field, FieldType, find_field};
use crate::core::model::{Model, ModelDefinition};
use crate::core::path::{kind_of, put_value_by_keys};
use crate::core::template::{self, TemplateSlot};
use crate::core::{NodeValue, Payload};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Output name used when an action declares no outputs of its own.
pub const DEFAULT_OUTPUT: &str = "model_output";

/// Turns the action's own inputs into (part of) the model request.
pub type PreprocessFn =
    Arc<dyn Fn(&Payload) -> std::result::Result<NodeValue, BoxError> + Send + Sync>;

/// How an [`AiAction`] produces its request body.
#[derive(Clone)]
pub enum RequestBody {
    /// A nested object whose string leaves may contain `{{ var }}` placeholders.
    Template(NodeValue),
    /// A function over the declared fields that must return an object.
    Function {
        fields: Vec<Field>,
        preprocess: PreprocessFn,
    },
}

impl RequestBody {
    pub fn template(template: NodeValue) -> Self {
        RequestBody::Template(template)
    }

    pub fn function<F>(fields: Vec<Field>, preprocess: F) -> Self
    where
        F: Fn(&Payload) -> std::result::Result<NodeValue, BoxError> + Send + Sync + 'static,
    {
        RequestBody::Function {
            fields,
            preprocess: Arc::new(preprocess),
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Template(t) => f.debug_tuple("Template").field(t).finish(),
            RequestBody::Function { fields, .. } => f
                .debug_struct("Function")
                .field("fields", fields)
                .finish_non_exhaustive(),
        }
    }
}

/// A model invocation composed with request building and output extraction.
#[derive(Clone)]
pub struct AiAction {
    pub node_id: String,
    pub model: Arc<Model>,
    pub model_params: Payload,
    pub fields: Vec<Field>,
    pub outputs: Vec<Field>,
    request: RequestBody,
    slots: Vec<TemplateSlot>,
}

impl fmt::Debug for AiAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiAction")
            .field("node_id", &self.node_id)
            .field("model", &self.model.model_id)
            .field("model_params", &self.model_params)
            .field("request", &self.request)
            .field("outputs", &self.outputs)
            .finish()
    }
}

impl AiAction {
    /// Validates the composition and derives the action's own input fields.
    ///
    /// Outputs declared without a `loc` are read from the top-level key of the same name.
    pub fn new(
        node_id: impl Into<String>,
        model: Arc<Model>,
        model_params: Payload,
        request: RequestBody,
        outputs: Vec<Field>,
    ) -> Result<Self> {
        let node_id = node_id.into();

        let model_fields = model.field_names();
        let mut unknown: Vec<&str> = model_params
            .keys()
            .map(String::as_str)
            .filter(|k| !model_fields.contains(k))
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(FuryError::Configuration(format!(
                "model params {:?} of '{}' are not fields of model '{}'",
                unknown, node_id, model.model_id
            )));
        }

        let (fields, slots) = match &request {
            RequestBody::Template(template) => {
                if !template.is_object() {
                    return Err(FuryError::Configuration(format!(
                        "request template of '{}' must be an object, got a {}",
                        node_id,
                        kind_of(template)
                    )));
                }
                let slots = template::scan(template);
                let mut fields: Vec<Field> = Vec::new();
                for var in slots.iter().flat_map(|s| s.vars.iter()) {
                    if find_field(&fields, var).is_none() {
                        fields.push(Field::typed(var.clone(), FieldType::Any));
                    }
                }
                (fields, slots)
            }
            RequestBody::Function { fields, .. } => (fields.clone(), Vec::new()),
        };

        let outputs = outputs
            .into_iter()
            .map(|f| match f.loc {
                Some(_) => f,
                None => {
                    let name = f.name.clone();
                    f.at(vec![name.into()])
                }
            })
            .collect();

        Ok(Self {
            node_id,
            model,
            model_params,
            fields,
            outputs,
            request,
            slots,
        })
    }

    pub fn request(&self) -> &RequestBody {
        &self.request
    }

    pub fn is_template(&self) -> bool {
        matches!(self.request, RequestBody::Template(_))
    }

    /// Outputs the action produces: the declared ones, or the single default output.
    pub fn output_fields(&self) -> Vec<Field> {
        if self.outputs.is_empty() {
            vec![Field::new(DEFAULT_OUTPUT)]
        } else {
            self.outputs.clone()
        }
    }

    /// Input fields of the node wrapping this action: the action's own fields
    /// followed by the model's. Model fields already satisfied by a static
    /// param or by a top-level key of the template become optional.
    pub fn node_fields(&self) -> Vec<Field> {
        let mut fields = self.fields.clone();
        let produced: Vec<&str> = match &self.request {
            RequestBody::Template(NodeValue::Object(map)) => {
                map.keys().map(String::as_str).collect()
            }
            _ => Vec::new(),
        };
        for field in &self.model.fields {
            if find_field(&fields, &field.name).is_some() {
                continue;
            }
            let mut field = field.clone();
            if self.model_params.contains_key(&field.name)
                || produced.contains(&field.name.as_str())
            {
                field.required = false;
            }
            fields.push(field);
        }
        fields
    }

    /// Splits a payload into this action's own inputs and the remainder meant for the model.
    fn partition(&self, payload: &Payload) -> Result<(Payload, Payload)> {
        let mut own = Payload::new();
        let mut rest = Payload::new();
        for (key, value) in payload {
            if find_field(&self.fields, key).is_some() {
                own.insert(key.clone(), value.clone());
            } else {
                rest.insert(key.clone(), value.clone());
            }
        }
        let missing = self
            .fields
            .iter()
            .find(|f| f.required && !own.contains_key(&f.name));
        if let Some(missing) = missing {
            return Err(FuryError::MissingField {
                node_id: self.node_id.clone(),
                field: missing.name.clone(),
            });
        }
        Ok((own, rest))
    }

    /// Renders the template or runs the pre-processor over `own`.
    pub fn build_request(&self, own: &Payload) -> Result<NodeValue> {
        match &self.request {
            RequestBody::Template(template) => {
                let mut out = template.clone();
                for slot in &self.slots {
                    put_value_by_keys(&mut out, &slot.path, NodeValue::String(slot.render(own)))?;
                }
                Ok(out)
            }
            RequestBody::Function { preprocess, .. } => {
                let out = preprocess(own).map_err(|e| FuryError::upstream(&self.node_id, e))?;
                if !out.is_object() {
                    return Err(FuryError::Type(format!(
                        "AI action preprocessor for '{}' did not return an object but a {}",
                        self.node_id,
                        kind_of(&out)
                    )));
                }
                Ok(out)
            }
        }
    }

    /// Builds the final model parameters: static params, then the rest of the
    /// payload, then the produced request. Later sources win.
    pub fn prepare(&self, payload: &Payload) -> Result<Payload> {
        let (own, rest) = self.partition(payload)?;
        let request = self.build_request(&own)?;

        let mut merged = self.model_params.clone();
        merged.extend(rest);
        if let NodeValue::Object(produced) = request {
            merged.extend(produced);
        }
        Ok(merged)
    }

    /// Runs the action and returns its named outputs.
    pub fn call(&self, payload: &Payload) -> Result<Payload> {
        let params = self.prepare(payload)?;
        let raw = self.model.call(&params)?;

        let mut out = Payload::new();
        if self.outputs.is_empty() {
            out.insert(DEFAULT_OUTPUT.to_string(), raw);
            return Ok(out);
        }
        for field in &self.outputs {
            let value = field.extract_from(&raw).unwrap_or_else(|| {
                log::warn!(
                    "Model '{}' result has no value for output '{}' of '{}'",
                    self.model.model_id,
                    field.name,
                    self.node_id
                );
                NodeValue::Null
            });
            out.insert(field.name.clone(), value);
        }
        Ok(out)
    }

    /// The inline body of a template action. Function actions have no portable form.
    pub fn definition(&self) -> Option<AiFnDefinition> {
        match &self.request {
            RequestBody::Template(template) => Some(AiFnDefinition {
                model: self.model.to_definition(),
                model_params: self.model_params.clone(),
                template: template.clone(),
            }),
            RequestBody::Function { .. } => None,
        }
    }
}

/// Serializable form of a template-mode action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiFnDefinition {
    pub model: ModelDefinition,
    #[serde(default)]
    pub model_params: Payload,
    #[serde(rename = "fn")]
    pub template: NodeValue,
}
