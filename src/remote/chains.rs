//! Fetching and publishing chains.

use crate::core::action::AiFnDefinition;
use crate::core::chain::Chain;
use crate::core::dag::{Dag, Placement};
use crate::core::field::Field;
use crate::core::model::ModelDefinition;
use crate::core::node::{Node, NodeDefinition, NodeKind};
use crate::core::registry::Context;
use crate::core::{NodeValue, Payload};
use crate::remote::{Client, Method, RemoteError};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

/// Engine tag stored alongside every chain this crate publishes.
pub const ENGINE: &str = "fury";

/// A chain as the store returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainRecord {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub dag: Dag,
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub meta: Option<NodeValue>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub deleted_at: Option<NaiveDateTime>,
}

/// An AI action as stored under `fury/actions/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default = "ai_kind")]
    pub kind: NodeKind,
    #[serde(rename = "fn")]
    pub function: ActionBody,
    #[serde(default)]
    pub outputs: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionBody {
    pub model_id: String,
    #[serde(default)]
    pub model_params: Payload,
    #[serde(rename = "fn")]
    pub template: NodeValue,
}

fn ai_kind() -> NodeKind {
    NodeKind::Ai
}

impl ActionRecord {
    /// The record to create for a template AI node, `None` for any other node.
    pub fn from_node(node: &Node) -> Option<Self> {
        let ai = node.to_definition().ai?;
        Some(ActionRecord {
            id: String::new(),
            name: node.action_id.clone(),
            description: Some(node.description.clone()).filter(|d| !d.is_empty()),
            kind: NodeKind::Ai,
            function: ActionBody {
                model_id: ai.model.id,
                model_params: ai.model_params,
                template: ai.template,
            },
            outputs: node.outputs.clone(),
        })
    }
}

impl From<ActionRecord> for NodeDefinition {
    fn from(record: ActionRecord) -> Self {
        NodeDefinition {
            id: record.id,
            action_id: record.name,
            kind: record.kind,
            description: record.description.unwrap_or_default(),
            fields: Vec::new(),
            outputs: record.outputs,
            ai: Some(AiFnDefinition {
                model: ModelDefinition {
                    collection_name: String::new(),
                    id: record.function.model_id,
                    description: String::new(),
                    fields: Vec::new(),
                    tags: Vec::new(),
                },
                model_params: record.function.model_params,
                template: record.function.template,
            }),
        }
    }
}

/// Bodies served by `fury/actions/<id>`: a store record or a full node definition.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredAction {
    Definition(NodeDefinition),
    Record(ActionRecord),
}

impl From<StoredAction> for NodeDefinition {
    fn from(stored: StoredAction) -> Self {
        match stored {
            StoredAction::Definition(definition) => definition,
            StoredAction::Record(record) => record.into(),
        }
    }
}

impl Client {
    pub async fn get_chain_record(&self, id: &str) -> Result<ChainRecord, RemoteError> {
        let body = self.path("chatbot").path(id).call(Method::GET, None).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// Loads chain `id` and resolves its nodes.
    ///
    /// References unknown to `ctx` are fetched from `fury/actions/<id>`, once
    /// per id. A definition without a sample, main input or main output is
    /// rejected before any action is fetched.
    pub async fn fetch_chain(&self, id: &str, ctx: &Context) -> Result<Chain, RemoteError> {
        let record = self.get_chain_record(id).await?;
        record.dag.check()?;

        let mut prefetched: HashMap<String, NodeDefinition> = HashMap::new();
        for cf_id in record.dag.unresolved_ids(ctx) {
            log::debug!("Fetching action '{}' for chain '{}'", cf_id, id);
            let body = self
                .path("fury")
                .path("actions")
                .path(&cf_id)
                .call(Method::GET, None)
                .await?;
            let stored: StoredAction = serde_json::from_value(body)?;
            prefetched.insert(cf_id, stored.into());
        }

        Ok(record.dag.into_chain(ctx, &prefetched)?)
    }

    /// Publishes `chain` under `name`.
    ///
    /// With `create_actions`, every template AI node is first created as a
    /// remote action and stored by reference, other nodes by their registry
    /// id. Without it every node body is stored inline.
    pub async fn create_chain(
        &self,
        name: &str,
        chain: &Chain,
        create_actions: bool,
    ) -> Result<ChainRecord, RemoteError> {
        let placement = if create_actions {
            Placement::References
        } else {
            Placement::Inline
        };
        let mut dag = chain.to_dag(placement);

        if create_actions {
            for (dag_node, node) in dag.nodes.iter_mut().zip(chain.nodes()) {
                let Some(record) = ActionRecord::from_node(node) else {
                    continue;
                };
                let body = serde_json::to_value(&record)?;
                let created = self
                    .path("fury")
                    .path("actions")
                    .trailing_slash()
                    .call(Method::POST, Some(body))
                    .await?;
                let action_id = created
                    .get("id")
                    .and_then(NodeValue::as_str)
                    .ok_or_else(|| {
                        RemoteError::InvalidResponse(format!(
                            "created action has no id: {}",
                            created
                        ))
                    })?;
                log::info!("Created remote action '{}' for node '{}'", action_id, node.id);
                dag_node.cf_id = Some(action_id.to_string());
            }
        }

        let body = json!({"name": name, "dag": dag, "engine": ENGINE});
        let created = self
            .path("chatbot")
            .trailing_slash()
            .call(Method::POST, Some(body))
            .await?;
        Ok(serde_json::from_value(created)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_record_decodes_to_definition() {
        let body = json!({
            "id": "act-1",
            "name": "summarise",
            "fn": {"model_id": "chat", "fn": {"prompt": "Sum up {{ text }}"}},
            "outputs": [{"name": "summary", "loc": ["choices", 0, "text"]}]
        });
        let stored: StoredAction = serde_json::from_value(body).unwrap();
        let definition = NodeDefinition::from(stored);
        assert_eq!(definition.kind, NodeKind::Ai);
        assert_eq!(definition.registry_id(), "summarise");
        let ai = definition.ai.unwrap();
        assert_eq!(ai.model.id, "chat");
        assert_eq!(ai.template, json!({"prompt": "Sum up {{ text }}"}));
        assert_eq!(definition.outputs[0].name, "summary");
    }

    #[test]
    fn test_node_definition_body_still_accepted() {
        let body = json!({
            "id": "act-2",
            "type": "programmatic",
            "action_id": "clean"
        });
        let stored: StoredAction = serde_json::from_value(body).unwrap();
        let definition = NodeDefinition::from(stored);
        assert_eq!(definition.kind, NodeKind::Programmatic);
        assert_eq!(definition.registry_id(), "clean");
        assert!(definition.ai.is_none());
    }
}
