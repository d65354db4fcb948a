//! Integration tests for the registries and AI action composition.

use chainfury::prelude::*;
use chainfury::{DEFAULT_OUTPUT, NodeCallable};
use serde_json::json;
use std::sync::Arc;
use std::sync::Mutex;

fn payload(value: NodeValue) -> Payload {
    value.as_object().cloned().unwrap_or_default()
}

/// A model that records the params it was last called with and echoes them back.
fn recording_model(id: &str, fields: Vec<Field>) -> (Model, Arc<Mutex<Option<Payload>>>) {
    let last = Arc::new(Mutex::new(None));
    let seen = Arc::clone(&last);
    let model = Model::new("test", id, "records its params", fields, move |p: &Payload| {
        *seen.lock().unwrap() = Some(p.clone());
        Ok(NodeValue::Object(p.clone()))
    });
    (model, last)
}

#[test]
fn test_template_renders_request() {
    let ctx = Context::new();
    let (model, last) = recording_model("echo", fields!("text?"));
    ctx.register_model(model).unwrap();
    let body = RequestBody::template(json!({"say": "{{text}}"}));
    let node = ctx.register_ai_action(AiActionSpec::new("say", "echo", body)).unwrap();

    let out = node.call(&payload(json!({"text": "hi"}))).unwrap();
    let sent = last.lock().unwrap().clone().unwrap();
    assert_eq!(sent.get("say"), Some(&json!("hi")));
    assert_eq!(out[DEFAULT_OUTPUT], json!({"say": "hi"}));
}

#[test]
fn test_template_keeps_structure_outside_placeholders() {
    let ctx = Context::new();
    let fields = fields!("model: string, messages?: array, temperature?: number");
    let (model, last) = recording_model("chat", fields);
    ctx.register_model(model).unwrap();
    let node = ctx
        .register_ai_action(
            AiActionSpec::new(
                "story",
                "chat",
                RequestBody::template(json!({
                    "messages": [
                        {"role": "system", "content": "You are terse."},
                        {
                            "role": "user",
                            "content": "A {{ n }} line story about {{ who }}, by {{who}}"
                        }
                    ],
                    "n_keep": 3,
                    "flags": [true, null]
                })),
            )
            .model_param("model", "gpt-3.5-turbo"),
        )
        .unwrap();

    node.call(&payload(json!({"n": 2, "who": "Ada", "temperature": 0.1}))).unwrap();
    let sent = NodeValue::Object(last.lock().unwrap().clone().unwrap());
    assert_eq!(
        sent,
        json!({
            "model": "gpt-3.5-turbo",
            "temperature": 0.1,
            "messages": [
                {"role": "system", "content": "You are terse."},
                {"role": "user", "content": "A 2 line story about Ada, by Ada"}
            ],
            "n_keep": 3,
            "flags": [true, null]
        })
    );
}

#[test]
fn test_function_request_body() {
    let ctx = Context::new();
    let (model, last) = recording_model("chat", fields!("prompt?, max_tokens?"));
    ctx.register_model(model).unwrap();
    let node = ctx
        .register_ai_action(
            AiActionSpec::new(
                "shout",
                "chat",
                RequestBody::function(fields!("text: string"), |p: &Payload| {
                    Ok(json!({"prompt": p["text"].as_str().unwrap_or_default().to_uppercase()}))
                }),
            )
            .model_param("max_tokens", 16)
            .output("prompt", loc!["prompt"]),
        )
        .unwrap();

    assert!(node.input("text").unwrap().required);
    assert!(!node.input("prompt").unwrap().required);

    let out = node.call(&payload(json!({"text": "quiet"}))).unwrap();
    assert_eq!(out["prompt"], json!("QUIET"));
    let sent = last.lock().unwrap().clone().unwrap();
    assert_eq!(sent.get("max_tokens"), Some(&json!(16)));
    assert!(!sent.contains_key("text"));
}

#[test]
fn test_function_body_must_return_object() {
    let ctx = Context::new();
    let (model, _) = recording_model("m", fields!("prompt?"));
    ctx.register_model(model).unwrap();
    let node = ctx
        .register_ai_action(AiActionSpec::new(
            "bad",
            "m",
            RequestBody::function(fields!("text"), |_: &Payload| Ok(json!("not an object"))),
        ))
        .unwrap();
    let err = node.call(&payload(json!({"text": "x"}))).unwrap_err();
    assert!(matches!(err, FuryError::Type(_)));
}

#[test]
fn test_model_params_must_be_model_fields() {
    let ctx = Context::new();
    let (model, _) = recording_model("m", fields!("prompt?"));
    ctx.register_model(model).unwrap();
    let err = ctx
        .register_ai_action(
            AiActionSpec::new("a", "m", RequestBody::template(json!({"prompt": "{{x}}"})))
                .model_param("seed", 7),
        )
        .unwrap_err();
    assert!(matches!(err, FuryError::Configuration(ref msg) if msg.contains("seed")));
}

#[test]
fn test_duplicate_registration_keeps_first() {
    let ctx = Context::new();
    let constant = |value: &'static str| {
        ProgrammaticAction::new("p", move |_: &Payload| Ok(json!(value))).returns(["v"])
    };
    let first = ctx.register_action(constant("first")).unwrap();
    let err = ctx.register_action(constant("second")).unwrap_err();
    assert!(matches!(err, FuryError::DuplicateId(_)));

    let stored = ctx.programmatic.get("p").unwrap();
    assert_eq!(stored.to_definition(), first.to_definition());
    assert_eq!(stored.call(&Payload::new()).unwrap()["v"], json!("first"));
}

#[test]
fn test_get_returns_equal_data_and_counts() {
    let ctx = Context::new();
    ctx.register_action(
        ProgrammaticAction::new("p", |_: &Payload| Ok(json!(1)))
            .description("one")
            .returns(["v"]),
    )
    .unwrap();

    let a = ctx.programmatic.get("p").unwrap();
    assert_eq!(ctx.programmatic.count("p"), 1);
    let b = ctx.programmatic.get("p").unwrap();
    assert_eq!(ctx.programmatic.count("p"), 2);
    assert_eq!(a.to_definition(), b.to_definition());

    ctx.resolve("p").unwrap();
    assert_eq!(ctx.programmatic.count("p"), 3);
}

#[test]
fn test_model_enumeration_by_tag() {
    let ctx = Context::new();
    let models = [
        ("chat", vec!["text"]),
        ("draw", vec!["image"]),
        ("embed", vec!["text", "vector"]),
    ];
    for (id, tags) in models {
        let (model, _) = recording_model(id, vec![]);
        ctx.register_model(model.with_tags(tags)).unwrap();
    }
    let ids = |tag: Option<&str>| -> Vec<String> {
        ctx.models.get_models(tag).into_iter().map(|m| m.id).collect()
    };
    assert_eq!(ids(None), vec!["chat", "draw", "embed"]);
    assert_eq!(ids(Some("text")), vec!["chat", "embed"]);
    assert_eq!(ctx.models.get_tags(), vec!["image", "text", "vector"]);
}

#[test]
fn test_ai_node_exposes_its_action() {
    let ctx = Context::new();
    let (model, _) = recording_model("m", fields!("prompt?"));
    ctx.register_model(model).unwrap();
    let body = RequestBody::template(json!({"prompt": "{{ q }}"}));
    let node = ctx.register_ai_action(AiActionSpec::new("a", "m", body)).unwrap();
    let NodeCallable::Ai(action) = node.callable() else {
        panic!("Expected an AI callable");
    };
    assert!(action.is_template());
    let request = action.build_request(&payload(json!({"q": "why?"}))).unwrap();
    assert_eq!(request, json!({"prompt": "why?"}));
}
