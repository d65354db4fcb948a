use std::fmt;

/// An issue found while linting a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// The chain is guaranteed to fail for the stored sample.
    Error(String),
    /// Something that might be a wiring mistake but can still run.
    Warning(String),
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::Error(msg) => write!(f, "error: {}", msg),
            ValidationIssue::Warning(msg) => write!(f, "warning: {}", msg),
        }
    }
}

/// The result of a lint pass over a chain.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.issues.push(ValidationIssue::Error(msg.into()));
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.issues.push(ValidationIssue::Warning(msg.into()));
    }

    pub fn is_safe(&self) -> bool {
        !self.issues.iter().any(|i| matches!(i, ValidationIssue::Error(_)))
    }

    pub fn has_warnings(&self) -> bool {
        self.issues.iter().any(|i| matches!(i, ValidationIssue::Warning(_)))
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.issues.iter().filter_map(|i| match i {
            ValidationIssue::Warning(msg) => Some(msg.as_str()),
            ValidationIssue::Error(_) => None,
        })
    }

    /// Writes every issue to the log at the matching level.
    pub fn log_summary(&self) {
        if self.is_safe() && !self.has_warnings() {
            log::info!("Chain lint passed: every input has a source");
            return;
        }

        for issue in &self.issues {
            match issue {
                ValidationIssue::Error(msg) => log::error!("Chain lint: {}", msg),
                ValidationIssue::Warning(msg) => log::warn!("Chain lint: {}", msg),
            }
        }
    }
}
