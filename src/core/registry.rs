//! Catalogs of models and actions, and the [`Context`] that carries them.

use crate::core::action::{AiAction, RequestBody};
use crate::core::error::{BoxError, FuryError, Result};
use crate::core::field::Field;
use crate::core::model::{Model, ModelDefinition};
use crate::core::node::{ActionFn, Node, NodeCallable, NodeDefinition, NodeKind};
use crate::core::path::PathKey;
use crate::core::{NodeValue, Payload};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

struct Entry<T> {
    value: Arc<T>,
    hits: AtomicU64,
}

struct Inner<T> {
    entries: HashMap<String, Entry<T>>,
    order: Vec<String>,
    tags: BTreeMap<String, Vec<String>>,
}

/// Id-keyed storage shared by the three registries.
///
/// Writes only happen in `insert`; lookups take the read lock and bump an atomic counter.
struct Catalog<T> {
    kind: &'static str,
    inner: RwLock<Inner<T>>,
}

impl<T> Catalog<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                order: Vec::new(),
                tags: BTreeMap::new(),
            }),
        }
    }

    fn insert(&self, id: &str, value: T, tags: &[String]) -> Result<Arc<T>> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.entries.contains_key(id) {
            return Err(FuryError::DuplicateId(format!("{} {}", self.kind, id)));
        }
        let value = Arc::new(value);
        inner.entries.insert(
            id.to_string(),
            Entry {
                value: Arc::clone(&value),
                hits: AtomicU64::new(0),
            },
        );
        inner.order.push(id.to_string());
        for tag in tags {
            inner.tags.entry(tag.clone()).or_default().push(id.to_string());
        }
        Ok(value)
    }

    fn get(&self, id: &str) -> Result<Arc<T>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let entry = inner
            .entries
            .get(id)
            .ok_or_else(|| FuryError::NotFound(format!("{} {}", self.kind, id)))?;
        entry.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::clone(&entry.value))
    }

    fn has(&self, id: &str) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.entries.contains_key(id)
    }

    fn count(&self, id: &str) -> u64 {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .entries
            .get(id)
            .map_or(0, |e| e.hits.load(Ordering::Relaxed))
    }

    fn tags(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.tags.keys().cloned().collect()
    }

    /// Entries in registration order, restricted to `tag` when given.
    fn values(&self, tag: Option<&str>) -> Vec<Arc<T>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let ids: &[String] = match tag {
            Some(tag) => inner.tags.get(tag).map(Vec::as_slice).unwrap_or_default(),
            None => &inner.order,
        };
        ids.iter()
            .filter_map(|id| inner.entries.get(id))
            .map(|e| Arc::clone(&e.value))
            .collect()
    }
}

// ============================================================================
// Models
// ============================================================================

pub struct ModelRegistry {
    catalog: Catalog<Model>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            catalog: Catalog::new("model"),
        }
    }

    pub fn register(&self, model: Model) -> Result<Arc<Model>> {
        log::debug!("Registering model '{}'", model.model_id);
        let id = model.model_id.clone();
        let tags = model.tags.clone();
        self.catalog.insert(&id, model, &tags)
    }

    pub fn get(&self, model_id: &str) -> Result<Arc<Model>> {
        self.catalog.get(model_id)
    }

    pub fn has(&self, model_id: &str) -> bool {
        self.catalog.has(model_id)
    }

    pub fn count(&self, model_id: &str) -> u64 {
        self.catalog.count(model_id)
    }

    pub fn get_tags(&self) -> Vec<String> {
        self.catalog.tags()
    }

    pub fn get_models(&self, tag: Option<&str>) -> Vec<ModelDefinition> {
        self.catalog
            .values(tag)
            .iter()
            .map(|m| m.to_definition())
            .collect()
    }
}

// ============================================================================
// Programmatic actions
// ============================================================================

/// Everything needed to register a plain-function node.
///
/// The outputs come from `output(..)` entries when present, else from `returns(..)`.
/// At least one of the two must be given.
pub struct ProgrammaticAction {
    node_id: String,
    description: String,
    fields: Vec<Field>,
    returns: Vec<String>,
    outputs: Vec<Field>,
    tags: Vec<String>,
    callable: ActionFn,
}

impl ProgrammaticAction {
    pub fn new<F>(node_id: impl Into<String>, callable: F) -> Self
    where
        F: Fn(&Payload) -> std::result::Result<NodeValue, BoxError> + Send + Sync + 'static,
    {
        Self {
            node_id: node_id.into(),
            description: String::new(),
            fields: Vec::new(),
            returns: Vec::new(),
            outputs: Vec::new(),
            tags: Vec::new(),
            callable: Arc::new(callable),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Parameters of the function, e.g. `fields!("url: string, headers?: object")`.
    pub fn fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = fields;
        self
    }

    pub fn returns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returns = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn output(mut self, name: impl Into<String>, loc: Vec<PathKey>) -> Self {
        self.outputs.push(Field::new(name).at(loc));
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

pub struct ProgrammaticRegistry {
    catalog: Catalog<Node>,
}

impl Default for ProgrammaticRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgrammaticRegistry {
    pub fn new() -> Self {
        Self {
            catalog: Catalog::new("p-node"),
        }
    }

    pub fn register(&self, action: ProgrammaticAction) -> Result<Node> {
        log::debug!("Registering p-node '{}'", action.node_id);
        let outputs = if !action.outputs.is_empty() {
            action.outputs
        } else if !action.returns.is_empty() {
            action.returns.into_iter().map(Field::new).collect()
        } else {
            return Err(FuryError::Configuration(format!(
                "p-node '{}' declares neither outputs nor returns",
                action.node_id
            )));
        };

        let node = Node::from_parts(
            action.node_id.clone(),
            NodeKind::Programmatic,
            action.description,
            action.fields,
            outputs,
            NodeCallable::Function(action.callable),
        );
        let stored = self.catalog.insert(&action.node_id, node, &action.tags)?;
        Ok((*stored).clone())
    }

    pub fn get(&self, node_id: &str) -> Result<Node> {
        self.catalog.get(node_id).map(|n| (*n).clone())
    }

    pub fn has(&self, node_id: &str) -> bool {
        self.catalog.has(node_id)
    }

    pub fn count(&self, node_id: &str) -> u64 {
        self.catalog.count(node_id)
    }

    pub fn get_tags(&self) -> Vec<String> {
        self.catalog.tags()
    }

    pub fn get_nodes(&self, tag: Option<&str>) -> Vec<NodeDefinition> {
        self.catalog
            .values(tag)
            .iter()
            .map(|n| n.to_definition())
            .collect()
    }
}

// ============================================================================
// AI actions
// ============================================================================

/// Everything needed to register an AI action against a registered model.
pub struct AiActionSpec {
    node_id: String,
    model_id: String,
    model_params: Payload,
    request: RequestBody,
    outputs: Vec<Field>,
    description: String,
    tags: Vec<String>,
}

impl AiActionSpec {
    pub fn new(
        node_id: impl Into<String>,
        model_id: impl Into<String>,
        request: RequestBody,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            model_id: model_id.into(),
            model_params: Payload::new(),
            request,
            outputs: Vec::new(),
            description: String::new(),
            tags: Vec::new(),
        }
    }

    pub fn model_param(mut self, key: impl Into<String>, value: impl Into<NodeValue>) -> Self {
        self.model_params.insert(key.into(), value.into());
        self
    }

    pub fn model_params(mut self, params: Payload) -> Self {
        self.model_params = params;
        self
    }

    /// Declares a named output extracted from the model result at `loc`,
    /// e.g. `output("chat_reply", loc!["choices", 0, "message", "content"])`.
    pub fn output(mut self, name: impl Into<String>, loc: Vec<PathKey>) -> Self {
        self.outputs.push(Field::new(name).at(loc));
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

pub struct AiActionRegistry {
    catalog: Catalog<Node>,
}

impl Default for AiActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AiActionRegistry {
    pub fn new() -> Self {
        Self {
            catalog: Catalog::new("ai-node"),
        }
    }

    /// Builds the action against `models` and catalogs the resulting node.
    pub fn register(&self, models: &ModelRegistry, spec: AiActionSpec) -> Result<Node> {
        log::debug!("Registering ai-node '{}'", spec.node_id);
        if self.catalog.has(&spec.node_id) {
            return Err(FuryError::DuplicateId(format!("ai-node {}", spec.node_id)));
        }
        let model = models.get(&spec.model_id)?;
        let action = AiAction::new(
            spec.node_id.clone(),
            model,
            spec.model_params,
            spec.request,
            spec.outputs,
        )?;
        let node = Node::from_ai_action(action, spec.description);
        let stored = self.catalog.insert(&spec.node_id, node, &spec.tags)?;
        Ok((*stored).clone())
    }

    pub fn get(&self, node_id: &str) -> Result<Node> {
        self.catalog.get(node_id).map(|n| (*n).clone())
    }

    pub fn has(&self, node_id: &str) -> bool {
        self.catalog.has(node_id)
    }

    pub fn count(&self, node_id: &str) -> u64 {
        self.catalog.count(node_id)
    }

    pub fn get_tags(&self) -> Vec<String> {
        self.catalog.tags()
    }

    pub fn get_nodes(&self, tag: Option<&str>) -> Vec<NodeDefinition> {
        self.catalog
            .values(tag)
            .iter()
            .map(|n| n.to_definition())
            .collect()
    }
}

// ============================================================================
// Context
// ============================================================================

/// The registries a caller works against. Pass it explicitly wherever nodes
/// are resolved by id; tests build a fresh one per case.
#[derive(Default)]
pub struct Context {
    pub models: ModelRegistry,
    pub programmatic: ProgrammaticRegistry,
    pub ai: AiActionRegistry,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_model(&self, model: Model) -> Result<Arc<Model>> {
        self.models.register(model)
    }

    pub fn register_action(&self, action: ProgrammaticAction) -> Result<Node> {
        self.programmatic.register(action)
    }

    pub fn register_ai_action(&self, spec: AiActionSpec) -> Result<Node> {
        self.ai.register(&self.models, spec)
    }

    /// Looks an id up in the AI registry, then the programmatic one, then the models.
    pub fn resolve(&self, id: &str) -> Result<Node> {
        if self.ai.has(id) {
            return self.ai.get(id);
        }
        if self.programmatic.has(id) {
            return self.programmatic.get(id);
        }
        if self.models.has(id) {
            return self.models.get(id).map(Node::from_model);
        }
        Err(FuryError::NotFound(format!("action {}", id)))
    }
}
