pub mod action;
pub mod chain;
pub mod dag;
pub mod error;
pub mod field;
pub mod model;
pub mod node;
pub mod path;
pub mod registry;
pub mod template;
pub mod trace;
pub mod validation;

/// The dynamically typed value every callable exchanges.
pub type NodeValue = serde_json::Value;

/// Named values: a node's inputs, its outputs, or a chain payload.
pub type Payload = serde_json::Map<String, NodeValue>;
