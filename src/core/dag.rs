//! The stored form of a chain, as exchanged with a chain store.
//!
//! A [`Dag`] node carries either an inline body (`cf_data`) or a reference
//! (`cf_id`) into the registries. Loading resolves both into [`Node`]s and
//! hands the result to [`Chain::new`], so a loaded chain is validated exactly
//! like a hand-built one.

use crate::core::action::{AiAction, DEFAULT_OUTPUT, RequestBody};
use crate::core::chain::{Chain, Edge};
use crate::core::error::{FuryError, Result};
use crate::core::field::Field;
use crate::core::node::{Node, NodeDefinition, NodeKind};
use crate::core::registry::Context;
use crate::core::Payload;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Node `type` every stored node carries.
pub const ENGINE_NODE_TYPE: &str = "FuryEngineNode";

fn engine_node_type() -> String {
    ENGINE_NODE_TYPE.to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cf_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cf_data: Option<NodeDefinition>,
    #[serde(default)]
    pub position: Position,
    #[serde(rename = "type", default = "engine_node_type")]
    pub node_type: String,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub selected: bool,
    #[serde(default, alias = "positionAbsolute")]
    pub position_absolute: Option<Position>,
    #[serde(default)]
    pub dragging: bool,
    #[serde(default)]
    pub data: Payload,
}

impl DagNode {
    /// A node laid out on a diagonal, the way freshly published chains are.
    fn placed(id: &str, i: usize) -> Self {
        let offset = i as f64 * 100.0;
        let position = Position { x: offset, y: offset };
        Self {
            id: id.to_string(),
            cf_id: None,
            cf_data: None,
            position,
            node_type: engine_node_type(),
            width: 100.0,
            height: 100.0,
            selected: false,
            position_absolute: Some(position),
            dragging: false,
            data: Payload::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagEdge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    #[serde(rename = "sourceHandle")]
    pub source_handle: String,
    #[serde(rename = "targetHandle")]
    pub target_handle: String,
}

impl From<&Edge> for DagEdge {
    fn from(edge: &Edge) -> Self {
        Self {
            id: Some(edge.id()),
            source: edge.source.clone(),
            target: edge.target.clone(),
            source_handle: edge.source_field.clone(),
            target_handle: edge.target_field.clone(),
        }
    }
}

impl DagEdge {
    fn to_edge(&self) -> Result<Edge> {
        if self.source.is_empty()
            || self.target.is_empty()
            || self.source_handle.is_empty()
            || self.target_handle.is_empty()
        {
            return Err(FuryError::Structural(format!(
                "edge '{}/{}' -> '{}/{}' is incomplete",
                self.source, self.source_handle, self.target, self.target_handle
            )));
        }
        Ok(Edge::new(
            &self.source,
            &self.target,
            &self.source_handle,
            &self.target_handle,
        ))
    }
}

/// How node bodies are written when a chain is turned into a [`Dag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Every node carries its full body in `cf_data`.
    Inline,
    /// Every node carries only its registry id in `cf_id`.
    References,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dag {
    #[serde(default)]
    pub nodes: Vec<DagNode>,
    #[serde(default)]
    pub edges: Vec<DagEdge>,
    #[serde(default)]
    pub sample: Payload,
    #[serde(default)]
    pub main_in: String,
    #[serde(default)]
    pub main_out: String,
}

impl Dag {
    /// Rejects a definition without a sample, a main input or a main output.
    pub fn check(&self) -> Result<()> {
        if self.sample.is_empty() {
            return Err(FuryError::Structural("definition has no sample".into()));
        }
        if self.main_in.is_empty() {
            return Err(FuryError::Structural("definition has no main_in".into()));
        }
        if self.main_out.is_empty() {
            return Err(FuryError::Structural("definition has no main_out".into()));
        }
        Ok(())
    }

    /// Reference ids that none of the registries in `ctx` can resolve, in order of first use.
    pub fn unresolved_ids(&self, ctx: &Context) -> Vec<String> {
        let mut seen = HashSet::new();
        self.nodes
            .iter()
            .filter(|n| n.cf_data.is_none())
            .filter_map(|n| n.cf_id.as_deref())
            .filter(|id| !ctx.ai.has(id) && !ctx.programmatic.has(id) && !ctx.models.has(id))
            .filter(|id| seen.insert(*id))
            .map(str::to_string)
            .collect()
    }

    /// Resolves every node and builds the chain.
    ///
    /// References are looked up in `ctx` first and in `prefetched` second.
    pub fn into_chain(
        self,
        ctx: &Context,
        prefetched: &HashMap<String, NodeDefinition>,
    ) -> Result<Chain> {
        self.check()?;

        let mut nodes = Vec::with_capacity(self.nodes.len());
        for dag_node in &self.nodes {
            let node = match (&dag_node.cf_data, &dag_node.cf_id) {
                (Some(body), _) => node_from_definition(ctx, body)?,
                (None, Some(cf_id)) => match ctx.resolve(cf_id) {
                    Ok(node) => node,
                    Err(FuryError::NotFound(_)) => {
                        let body = prefetched
                            .get(cf_id)
                            .ok_or_else(|| FuryError::NotFound(format!("action {}", cf_id)))?;
                        node_from_definition(ctx, body)?
                    }
                    Err(e) => return Err(e),
                },
                (None, None) => {
                    return Err(FuryError::Structural(format!(
                        "node '{}' has neither cf_id nor cf_data",
                        dag_node.id
                    )));
                }
            };
            nodes.push(node.with_id(&dag_node.id));
        }

        let edges = self
            .edges
            .iter()
            .map(DagEdge::to_edge)
            .collect::<Result<Vec<_>>>()?;

        Chain::new(nodes, edges, self.sample, self.main_in, self.main_out)
    }

    pub fn from_chain(chain: &Chain, placement: Placement) -> Self {
        let nodes = chain
            .nodes()
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let mut dag_node = DagNode::placed(&node.id, i);
                match placement {
                    Placement::Inline => dag_node.cf_data = Some(node.to_definition()),
                    Placement::References => dag_node.cf_id = Some(node.action_id.clone()),
                }
                dag_node
            })
            .collect();

        Self {
            nodes,
            edges: chain.edges().iter().map(DagEdge::from).collect(),
            sample: chain.sample().clone(),
            main_in: chain.main_in().to_string(),
            main_out: chain.main_out().to_string(),
        }
    }
}

impl Chain {
    pub fn to_dag(&self, placement: Placement) -> Dag {
        Dag::from_chain(self, placement)
    }
}

/// Turns an inline body into a node.
///
/// Template AI bodies are rebuilt against the model registry; every other body
/// names a registered action.
pub fn node_from_definition(ctx: &Context, body: &NodeDefinition) -> Result<Node> {
    match (&body.kind, &body.ai) {
        (NodeKind::Ai, Some(ai)) => {
            let model = ctx.models.get(&ai.model.id)?;
            let outputs: Vec<Field> = body
                .outputs
                .iter()
                .filter(|f| f.loc.is_some() || f.name != DEFAULT_OUTPUT)
                .cloned()
                .collect();
            let action = AiAction::new(
                body.registry_id(),
                model,
                ai.model_params.clone(),
                RequestBody::template(ai.template.clone()),
                outputs,
            )?;
            Ok(Node::from_ai_action(action, body.description.clone()))
        }
        _ => ctx.resolve(body.registry_id()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Model;
    use crate::core::registry::AiActionSpec;
    use crate::core::NodeValue;
    use serde_json::json;

    fn context() -> Context {
        let ctx = Context::new();
        ctx.register_model(Model::new("test", "echo", "", crate::fields!("say?"), |p: &Payload| {
            Ok(NodeValue::Object(p.clone()))
        }))
        .unwrap();
        ctx.register_ai_action(
            AiActionSpec::new(
                "greet",
                "echo",
                RequestBody::template(json!({"say": "hello {{ name }}"})),
            )
            .output("said", crate::loc!["say"]),
        )
        .unwrap();
        ctx
    }

    fn stored(main_out: &str) -> NodeValue {
        json!({
            "nodes": [{
                "id": "greet_1",
                "cf_id": "greet",
                "position": {"x": 1.5, "y": 2},
                "type": "FuryEngineNode",
                "width": 350,
                "height": 553,
                "selected": true,
                "position_absolute": null,
                "dragging": false,
                "data": {}
            }],
            "edges": [],
            "sample": {"greet_1/name": "Ada"},
            "main_in": "greet_1/name",
            "main_out": main_out
        })
    }

    #[test]
    fn test_missing_main_out_rejected() {
        let dag: Dag = serde_json::from_value(stored("")).unwrap();
        let err = dag.into_chain(&context(), &HashMap::new()).unwrap_err();
        assert!(matches!(err, FuryError::Structural(ref msg) if msg.contains("main_out")));
    }

    #[test]
    fn test_reference_resolves_and_takes_dag_id() {
        let dag: Dag = serde_json::from_value(stored("greet_1/said")).unwrap();
        let chain = dag.into_chain(&context(), &HashMap::new()).unwrap();
        assert_eq!(chain.nodes()[0].id, "greet_1");
        assert_eq!(chain.nodes()[0].action_id, "greet");
        assert_eq!(chain.invoke("Grace").unwrap(), json!("hello Grace"));
    }

    #[test]
    fn test_unknown_reference_listed() {
        let mut dag: Dag = serde_json::from_value(stored("greet_1/said")).unwrap();
        dag.nodes[0].cf_id = Some("elsewhere".into());
        assert_eq!(dag.unresolved_ids(&context()), vec!["elsewhere".to_string()]);
        assert!(matches!(
            dag.into_chain(&context(), &HashMap::new()),
            Err(FuryError::NotFound(_))
        ));
    }

    #[test]
    fn test_inline_round_trip() {
        let ctx = context();
        let dag: Dag = serde_json::from_value(stored("greet_1/said")).unwrap();
        let chain = dag.into_chain(&ctx, &HashMap::new()).unwrap();

        let inline = serde_json::to_value(chain.to_dag(Placement::Inline)).unwrap();
        assert_eq!(inline["nodes"][0]["cf_data"]["fn"]["fn"], json!({"say": "hello {{ name }}"}));
        assert_eq!(inline["nodes"][0]["type"], json!(ENGINE_NODE_TYPE));

        let reloaded: Dag = serde_json::from_value(inline).unwrap();
        let chain = reloaded.into_chain(&ctx, &HashMap::new()).unwrap();
        assert_eq!(chain.invoke("Alan").unwrap(), json!("hello Alan"));
    }

    #[test]
    fn test_incomplete_edge_rejected() {
        let mut dag: Dag = serde_json::from_value(stored("greet_1/said")).unwrap();
        dag.edges.push(DagEdge {
            id: None,
            source: "greet_1".into(),
            target: "greet_1".into(),
            source_handle: String::new(),
            target_handle: "name".into(),
        });
        assert!(matches!(
            dag.into_chain(&context(), &HashMap::new()),
            Err(FuryError::Structural(_))
        ));
    }
}
