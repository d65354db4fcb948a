//! Nested get/set over [`NodeValue`] trees.
//!
//! A path is an ordered list of [`PathKey`]s: string keys walk into objects,
//! integer indices walk into arrays. Negative indices count from the end, so
//! `["choices", -1]` is the last choice.

use crate::core::error::{FuryError, Result};
use crate::core::NodeValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of an extraction path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathKey {
    Index(i64),
    Key(String),
}

impl PathKey {
    fn resolve_index(index: i64, len: usize) -> Option<usize> {
        let resolved = if index < 0 { len as i64 + index } else { index };
        (0..len as i64).contains(&resolved).then_some(resolved as usize)
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKey::Index(i) => write!(f, "[{}]", i),
            PathKey::Key(k) => write!(f, ".{}", k),
        }
    }
}

impl From<&str> for PathKey {
    fn from(key: &str) -> Self {
        PathKey::Key(key.to_string())
    }
}

impl From<String> for PathKey {
    fn from(key: String) -> Self {
        PathKey::Key(key)
    }
}

impl From<i64> for PathKey {
    fn from(index: i64) -> Self {
        PathKey::Index(index)
    }
}

impl From<i32> for PathKey {
    fn from(index: i32) -> Self {
        PathKey::Index(index as i64)
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        PathKey::Index(index as i64)
    }
}

/// Renders a path as `$.choices[0].message` for error messages.
pub fn display_path(keys: &[PathKey]) -> String {
    let mut out = String::from("$");
    for key in keys {
        out.push_str(&key.to_string());
    }
    out
}

/// Builds a `Vec<PathKey>` from mixed keys and indices: `loc!["choices", 0, "text"]`.
#[macro_export]
macro_rules! loc {
    ($($key:expr),* $(,)?) => {
        vec![$($crate::PathKey::from($key)),*]
    };
}

/// Returns the value at `keys`, or `None` when any step is missing or mistyped.
pub fn get_value_by_keys<'a>(value: &'a NodeValue, keys: &[PathKey]) -> Option<&'a NodeValue> {
    keys.iter().try_fold(value, |current, key| match (current, key) {
        (NodeValue::Object(map), PathKey::Key(k)) => map.get(k),
        (NodeValue::Array(items), PathKey::Index(i)) => {
            PathKey::resolve_index(*i, items.len()).and_then(|idx| items.get(idx))
        }
        _ => None,
    })
}

/// Mutable variant of [`get_value_by_keys`].
pub fn get_value_by_keys_mut<'a>(
    value: &'a mut NodeValue,
    keys: &[PathKey],
) -> Option<&'a mut NodeValue> {
    let mut current = value;
    for key in keys {
        current = match (current, key) {
            (NodeValue::Object(map), PathKey::Key(k)) => map.get_mut(k)?,
            (NodeValue::Array(items), PathKey::Index(i)) => {
                let idx = PathKey::resolve_index(*i, items.len())?;
                items.get_mut(idx)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Writes `new_value` at `keys`.
///
/// Every intermediate step must already exist. The last key may add a new
/// entry to an object but only replaces existing array slots.
pub fn put_value_by_keys(
    value: &mut NodeValue,
    keys: &[PathKey],
    new_value: NodeValue,
) -> Result<()> {
    let Some((last, parents)) = keys.split_last() else {
        *value = new_value;
        return Ok(());
    };

    let parent = get_value_by_keys_mut(value, parents).ok_or_else(|| {
        FuryError::InvalidPath(format!("{} does not exist", display_path(parents)))
    })?;

    match (parent, last) {
        (NodeValue::Object(map), PathKey::Key(k)) => {
            map.insert(k.clone(), new_value);
            Ok(())
        }
        (NodeValue::Array(items), PathKey::Index(i)) => {
            let idx = PathKey::resolve_index(*i, items.len()).ok_or_else(|| {
                FuryError::InvalidPath(format!("{} is out of bounds", display_path(keys)))
            })?;
            items[idx] = new_value;
            Ok(())
        }
        (other, key) => Err(FuryError::InvalidPath(format!(
            "cannot apply '{}' to a {} at {}",
            key,
            kind_of(other),
            display_path(parents)
        ))),
    }
}

pub(crate) fn kind_of(value: &NodeValue) -> &'static str {
    match value {
        NodeValue::Null => "null",
        NodeValue::Bool(_) => "boolean",
        NodeValue::Number(_) => "number",
        NodeValue::String(_) => "string",
        NodeValue::Array(_) => "array",
        NodeValue::Object(_) => "object",
    }
}
