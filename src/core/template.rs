//! `{{ var }}` placeholders inside nested request templates.

use crate::core::path::PathKey;
use crate::core::{NodeValue, Payload};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder regex is valid")
});

/// A string leaf of a template that contains at least one placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSlot {
    pub path: Vec<PathKey>,
    pub source: String,
    pub vars: Vec<String>,
}

impl TemplateSlot {
    pub fn render(&self, vars: &Payload) -> String {
        render(&self.source, vars)
    }
}

/// Variable names referenced by `s`, in first-seen order.
pub fn placeholders(s: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(s) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Finds every placeholder-bearing string leaf in `template`.
pub fn scan(template: &NodeValue) -> Vec<TemplateSlot> {
    let mut slots = Vec::new();
    let mut path = Vec::new();
    scan_into(template, &mut path, &mut slots);
    slots
}

fn scan_into(value: &NodeValue, path: &mut Vec<PathKey>, slots: &mut Vec<TemplateSlot>) {
    match value {
        NodeValue::String(s) => {
            let vars = placeholders(s);
            if !vars.is_empty() {
                slots.push(TemplateSlot {
                    path: path.clone(),
                    source: s.clone(),
                    vars,
                });
            }
        }
        NodeValue::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                path.push(PathKey::from(i));
                scan_into(item, path, slots);
                path.pop();
            }
        }
        NodeValue::Object(map) => {
            for (key, item) in map {
                path.push(PathKey::from(key.as_str()));
                scan_into(item, path, slots);
                path.pop();
            }
        }
        _ => {}
    }
}

/// Substitutes placeholders in `s`. Unknown and `null` variables render empty.
pub fn render(s: &str, vars: &Payload) -> String {
    PLACEHOLDER
        .replace_all(s, |caps: &Captures| match vars.get(&caps[1]) {
            None | Some(NodeValue::Null) => String::new(),
            Some(NodeValue::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: NodeValue) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_placeholders_dedup_and_whitespace() {
        assert_eq!(
            placeholders("{{a}} and {{ b }} and {{a}}"),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(placeholders("no vars { here }").is_empty());
    }

    #[test]
    fn test_scan_records_paths() {
        let template = json!({
            "model": "gpt",
            "messages": [
                {"role": "user", "content": "fixed"},
                {"role": "user", "content": "Tell a {{ size }} story about {{ who }}"}
            ]
        });
        let slots = scan(&template);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].path, crate::loc!["messages", 1, "content"]);
        assert_eq!(slots[0].vars, vec!["size".to_string(), "who".to_string()]);
    }

    #[test]
    fn test_render_values() {
        let v = vars(json!({"n": 4, "who": "Ada", "nothing": null}));
        assert_eq!(render("{{n}} lines about {{ who }}", &v), "4 lines about Ada");
        assert_eq!(render("[{{nothing}}{{missing}}]", &v), "[]");
    }
}
