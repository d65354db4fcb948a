//! # ChainFury
//!
//! Compose model calls and plain functions into DAG chains whose edges route
//! named output fields into named input fields.
//!
//! ## Features
//!
//! - **Typed Nodes**: Every unit of work declares its input and output fields
//! - **Three Registries**: Models, programmatic actions and AI actions, held in an explicit
//!   [`Context`]
//! - **AI Actions**: A model call fed by a `{{ var }}` request template or a pre-processing
//!   function, with outputs extracted by path
//! - **Deterministic Execution**: Chains run in topological order and keep a full trace of every
//!   value
//! - **Remote Store Client**: Fetch and publish chain definitions (feature `remote`, on by default)
//!
//! ## Quick Start
//!
//! ```rust
//! use chainfury::prelude::*;
//! use serde_json::json;
//!
//! let ctx = Context::new();
//! let upper = ctx
//!     .register_action(
//!         ProgrammaticAction::new("upper", |p: &Payload| {
//!             Ok(json!(p["text"].as_str().unwrap_or_default().to_uppercase()))
//!         })
//!         .fields(fields!("text: string"))
//!         .returns(["text"]),
//!     )
//!     .unwrap();
//!
//! let mut sample = Payload::new();
//! sample.insert("upper/text".into(), json!("hello"));
//! let chain = Chain::new(vec![upper], vec![], sample, "upper/text", "upper/text").unwrap();
//! assert_eq!(chain.invoke("shout").unwrap(), json!("SHOUT"));
//! ```
//!
//! ## Module Organization
//!
//! - [`prelude`]: Commonly used types (import with `use chainfury::prelude::*`)
//! - [`remote`]: Client for a chain store (feature `remote`)

// ============================================================================
// Core Module
// ============================================================================

mod core;

// ============================================================================
// Public Re-exports - Granular Imports
// ============================================================================

// Values and errors
pub use crate::core::error::{BoxError, FuryError, Result};
pub use crate::core::{NodeValue, Payload};

// Fields and paths
pub use crate::core::field::{Field, FieldType, find_field};
pub use crate::core::path::{
    PathKey, display_path, get_value_by_keys, get_value_by_keys_mut, put_value_by_keys,
};
pub use crate::core::template::{TemplateSlot, placeholders, render, scan};

// Callables
pub use crate::core::action::{AiAction, AiFnDefinition, DEFAULT_OUTPUT, PreprocessFn, RequestBody};
pub use crate::core::model::{Model, ModelDefinition, ModelFn};
pub use crate::core::node::{ActionFn, Node, NodeCallable, NodeDefinition, NodeKind};

// Registries
pub use crate::core::registry::{
    AiActionRegistry, AiActionSpec, Context, ModelRegistry, ProgrammaticAction,
    ProgrammaticRegistry,
};

// Chains
pub use crate::core::chain::{Chain, ChainFailure, Edge};
pub use crate::core::dag::{
    Dag, DagEdge, DagNode, ENGINE_NODE_TYPE, Placement, Position, node_from_definition,
};
pub use crate::core::trace::Trace;
pub use crate::core::validation::{ValidationIssue, ValidationResult};

// ============================================================================
// Prelude Module - Convenient Bulk Imports
// ============================================================================

/// Imports everything needed to register actions and build and run chains.
///
/// # Example
/// ```rust
/// use chainfury::prelude::*;
/// ```
pub mod prelude {
    pub use super::{
        AiAction,
        AiActionSpec,
        BoxError,
        // Chains
        Chain,
        ChainFailure,
        // Registries
        Context,
        Dag,
        Edge,
        // Fields
        Field,
        FieldType,
        FuryError,
        Model,
        // Callables
        Node,
        NodeKind,
        // Values
        NodeValue,
        PathKey,
        Payload,
        Placement,
        ProgrammaticAction,
        RequestBody,
        Trace,
        ValidationResult,
    };
    pub use crate::{fields, loc};
}

// ============================================================================
// Remote Feature
// ============================================================================

#[cfg(feature = "remote")]
pub mod remote;

#[cfg(feature = "remote")]
pub use remote::{Client, ClientCache, ClientConfig, error::RemoteError};

// ============================================================================
// Library Metadata
// ============================================================================

/// The version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of this crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");
