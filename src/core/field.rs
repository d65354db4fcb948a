use crate::core::error::{FuryError, Result};
use crate::core::path::{PathKey, get_value_by_keys};
use crate::core::NodeValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type tag of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    #[default]
    Any,
}

impl FieldType {
    /// Whether `value` fits this tag. `null` never fits anything but `Any`.
    pub fn accepts(&self, value: &NodeValue) -> bool {
        match self {
            FieldType::Any => true,
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::Any => "any",
        };
        f.write_str(s)
    }
}

impl FromStr for FieldType {
    type Err = FuryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(FieldType::String),
            "number" | "float" => Ok(FieldType::Number),
            "integer" | "int" => Ok(FieldType::Integer),
            "boolean" | "bool" => Ok(FieldType::Boolean),
            "object" | "dict" => Ok(FieldType::Object),
            "array" | "list" => Ok(FieldType::Array),
            "any" | "" => Ok(FieldType::Any),
            other => Err(FuryError::Configuration(format!(
                "unknown field type '{}'",
                other
            ))),
        }
    }
}

fn default_required() -> bool {
    true
}

/// A named, typed parameter or output slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: FieldType,
    #[serde(default = "default_required")]
    pub required: bool,
    /// Where an output lives inside a raw result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<Vec<PathKey>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Field {
    /// A required field of type `any`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: FieldType::Any,
            required: true,
            loc: None,
            description: String::new(),
        }
    }

    pub fn typed(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            ty,
            ..Self::new(name)
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn at(mut self, loc: Vec<PathKey>) -> Self {
        self.loc = Some(loc);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Pulls this output out of `raw` by walking `loc`. Returns `None` when the
    /// field has no location or the location does not exist.
    pub fn extract_from(&self, raw: &NodeValue) -> Option<NodeValue> {
        let loc = self.loc.as_ref()?;
        get_value_by_keys(raw, loc).cloned()
    }

    /// Parses shorthand syntax: `"prompt: string, temperature?: number, extra"`.
    ///
    /// A `?` after the name marks the field optional; a missing type means `any`.
    pub fn parse_list(s: &str) -> Result<Vec<Field>> {
        let fields = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse::<Field>)
            .collect::<Result<Vec<_>>>()?;

        let mut seen = std::collections::HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(FuryError::Configuration(format!(
                    "field '{}' declared twice in '{}'",
                    field.name, s
                )));
            }
        }
        Ok(fields)
    }
}

impl FromStr for Field {
    type Err = FuryError;

    fn from_str(s: &str) -> Result<Self> {
        let (name, ty) = match s.split_once(':') {
            Some((name, ty)) => (name.trim(), ty.parse::<FieldType>()?),
            None => (s.trim(), FieldType::Any),
        };
        let (name, required) = match name.strip_suffix('?') {
            Some(stripped) => (stripped.trim(), false),
            None => (name, true),
        };
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(FuryError::Configuration(format!(
                "invalid field name '{}'",
                name
            )));
        }

        Ok(Field {
            name: name.to_string(),
            ty,
            required,
            loc: None,
            description: String::new(),
        })
    }
}

/// Looks a field up by name.
pub fn find_field<'a>(fields: &'a [Field], name: &str) -> Option<&'a Field> {
    fields.iter().find(|f| f.name == name)
}

/// Macro for rapid field list creation: `fields!("url: string, headers?: object")`
#[macro_export]
macro_rules! fields {
    ($s:expr) => {
        $crate::Field::parse_list($s).expect("Invalid field shorthand")
    };
}
