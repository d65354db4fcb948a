use thiserror::Error;

/// Error type user callables (models, programmatic actions, pre-processors) return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience alias used throughout the core.
pub type Result<T> = std::result::Result<T, FuryError>;

#[derive(Debug, Error)]
pub enum FuryError {
    #[error("'{0}' is already registered")]
    DuplicateId(String),

    #[error("'{0}' not found")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Field '{field}' is required by '{node_id}' but not present")]
    MissingField { node_id: String, field: String },

    #[error("Type error: {0}")]
    Type(String),

    #[error("'{node_id}' failed: {source}")]
    Upstream {
        node_id: String,
        #[source]
        source: BoxError,
    },

    #[error("No payload value or edge supplies input '{field}' of node '{node_id}'")]
    MissingInput { node_id: String, field: String },

    #[error("Invalid chain: {0}")]
    Structural(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FuryError {
    pub(crate) fn upstream(node_id: impl Into<String>, source: BoxError) -> Self {
        FuryError::Upstream {
            node_id: node_id.into(),
            source,
        }
    }

    /// Re-tags a field or callable failure with the id of the node that ran it.
    pub(crate) fn at_node(self, id: &str) -> Self {
        match self {
            FuryError::MissingField { field, .. } => FuryError::MissingField {
                node_id: id.to_string(),
                field,
            },
            FuryError::Upstream { source, .. } => FuryError::upstream(id, source),
            other => other,
        }
    }

    /// Returns true for failures raised by a callable rather than by the chain machinery.
    pub fn is_upstream(&self) -> bool {
        matches!(self, FuryError::Upstream { .. })
    }
}
