//! Integration tests for fetching and publishing chains over an in-memory transport.
#![cfg(feature = "remote")]

use async_trait::async_trait;
use chainfury::prelude::*;
use chainfury::remote::{Client, ClientConfig, Method, RemoteError, Transport};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const ROOT: &str = "http://store/api/v1";

/// Answers requests from a fixed table and records every request it sees.
#[derive(Default)]
struct MockTransport {
    routes: HashMap<(Method, String), NodeValue>,
    requests: Mutex<Vec<(Method, String, Option<NodeValue>)>>,
}

impl MockTransport {
    fn route(mut self, method: Method, path: &str, body: NodeValue) -> Self {
        self.routes.insert((method, format!("{}/{}", ROOT, path)), body);
        self
    }

    fn requests(&self) -> Vec<(Method, String, Option<NodeValue>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&NodeValue>,
    ) -> Result<NodeValue, RemoteError> {
        assert_eq!(token, "secret");
        self.requests
            .lock()
            .unwrap()
            .push((method.clone(), url.to_string(), body.cloned()));
        self.routes
            .get(&(method, url.to_string()))
            .cloned()
            .ok_or_else(|| RemoteError::Status {
                status: 404,
                body: format!("no route for {}", url),
            })
    }
}

fn client(transport: Arc<MockTransport>) -> Client {
    let config = ClientConfig::resolve("http://store", "secret").unwrap();
    Client::with_transport(config, transport)
}

fn context() -> Context {
    let ctx = Context::new();
    ctx.register_model(Model::new("test", "echo", "", fields!("prompt?"), |p: &Payload| {
        Ok(NodeValue::Object(p.clone()))
    }))
    .unwrap();
    ctx.register_action(
        ProgrammaticAction::new("shout", |p: &Payload| {
            Ok(json!(p["text"].as_str().unwrap_or_default().to_uppercase()))
        })
        .fields(fields!("text: string"))
        .returns(["text"]),
    )
    .unwrap();
    ctx
}

fn record(dag: NodeValue) -> NodeValue {
    json!({
        "name": "funny-bot-1",
        "description": null,
        "dag": dag,
        "engine": "fury",
        "deleted_at": null,
        "created_by": "cihua4hh",
        "id": "l6lnksln",
        "meta": null,
        "created_at": "2023-06-27T18:05:17.395260"
    })
}

fn remote_action() -> NodeValue {
    json!({
        "id": "remote-echo",
        "name": "remote-echo",
        "description": null,
        "fn": {
            "model_id": "echo",
            "model_params": {},
            "fn": {"prompt": "Say {{ word }}"}
        },
        "outputs": [{"name": "said", "loc": ["prompt"]}]
    })
}

#[tokio::test]
async fn test_fetch_rejects_missing_main_out() {
    let transport = Arc::new(MockTransport::default().route(
        Method::GET,
        "chatbot/l6lnksln",
        record(json!({
            "nodes": [{"id": "n1", "cf_id": "unknown-action"}],
            "edges": [],
            "sample": {"n1/word": "hi"},
            "main_in": "n1/word"
        })),
    ));

    let err = client(Arc::clone(&transport))
        .fetch_chain("l6lnksln", &context())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RemoteError::Chain(FuryError::Structural(ref msg)) if msg.contains("main_out")
    ));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_fetch_resolves_registry_then_remote() {
    let transport = Arc::new(
        MockTransport::default()
            .route(
                Method::GET,
                "chatbot/l6lnksln",
                record(json!({
                    "nodes": [
                        {"id": "say_1", "cf_id": "remote-echo"},
                        {"id": "say_2", "cf_id": "remote-echo"},
                        {"id": "loud", "cf_id": "shout", "type": "FuryEngineNode"}
                    ],
                    "edges": [
                        {
                            "source": "say_1",
                            "target": "loud",
                            "sourceHandle": "said",
                            "targetHandle": "text"
                        }
                    ],
                    "sample": {"say_1/word": "hi", "say_2/word": "bye"},
                    "main_in": "say_1/word",
                    "main_out": "loud/text"
                })),
            )
            .route(Method::GET, "fury/actions/remote-echo", remote_action()),
    );

    let ctx = context();
    let chain = client(Arc::clone(&transport)).fetch_chain("l6lnksln", &ctx).await.unwrap();

    let urls: Vec<String> = transport.requests().into_iter().map(|(_, url, _)| url).collect();
    assert_eq!(
        urls,
        vec![
            format!("{}/chatbot/l6lnksln", ROOT),
            format!("{}/fury/actions/remote-echo", ROOT)
        ]
    );
    assert_eq!(chain.node("loud").unwrap().action_id, "shout");
    assert_eq!(chain.node("say_2").unwrap().action_id, "remote-echo");
    assert_eq!(ctx.programmatic.count("shout"), 1);

    assert_eq!(chain.invoke("hello").unwrap(), json!("SAY HELLO"));
}

#[tokio::test]
async fn test_record_parses_timestamps() {
    let transport = Arc::new(MockTransport::default().route(
        Method::GET,
        "chatbot/l6lnksln",
        record(json!({"sample": {"a/b": 1}, "main_in": "a/b", "main_out": "a/c"})),
    ));
    let record = client(transport).get_chain_record("l6lnksln").await.unwrap();
    let created = record.created_at.unwrap();
    assert_eq!(created.format("%Y-%m-%d %H:%M").to_string(), "2023-06-27 18:05");
    assert!(record.deleted_at.is_none());
}

fn publishable(ctx: &Context) -> Chain {
    let say = ctx
        .register_ai_action(
            AiActionSpec::new(
                "say",
                "echo",
                RequestBody::template(json!({"prompt": "Say {{ word }}"})),
            )
            .output("said", loc!["prompt"]),
        )
        .unwrap()
        .with_id("say_1");
    let loud = ctx.programmatic.get("shout").unwrap().instance();
    let loud_id = loud.id.clone();
    let mut sample = Payload::new();
    sample.insert("say_1/word".into(), json!("hi"));
    Chain::new(
        vec![say, loud],
        vec![Edge::new("say_1", &loud_id, "said", "text")],
        sample,
        "say_1/word",
        format!("{}/text", loud_id),
    )
    .unwrap()
}

#[tokio::test]
async fn test_create_chain_inline() {
    let transport = Arc::new(MockTransport::default().route(
        Method::POST,
        "chatbot/",
        record(json!({"sample": {"a/b": 1}, "main_in": "a/b", "main_out": "a/c"})),
    ));
    let ctx = context();
    let chain = publishable(&ctx);

    let created = client(Arc::clone(&transport)).create_chain("bot", &chain, false).await.unwrap();
    assert_eq!(created.id, "l6lnksln");

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    let body = requests[0].2.clone().unwrap();
    assert_eq!(body["engine"], json!("fury"));
    assert_eq!(body["dag"]["nodes"][0]["cf_data"]["fn"]["fn"], json!({"prompt": "Say {{ word }}"}));
    assert_eq!(body["dag"]["nodes"][1]["cf_data"]["action_id"], json!("shout"));
    let edge_id = format!("say_1/said-{}text", chain.nodes()[1].id);
    assert_eq!(body["dag"]["edges"][0]["id"], json!(edge_id));

    let dag: Dag = serde_json::from_value(body["dag"].clone()).unwrap();
    let reloaded = dag.into_chain(&ctx, &HashMap::new()).unwrap();
    assert_eq!(reloaded.invoke("yes").unwrap(), json!("SAY YES"));
}

#[tokio::test]
async fn test_create_chain_with_remote_actions() {
    let transport = Arc::new(
        MockTransport::default()
            .route(Method::POST, "fury/actions/", json!({"id": "act-42"}))
            .route(
                Method::POST,
                "chatbot/",
                record(json!({"sample": {"a/b": 1}, "main_in": "a/b", "main_out": "a/c"})),
            ),
    );
    let ctx = context();
    let chain = publishable(&ctx);

    client(Arc::clone(&transport)).create_chain("bot", &chain, true).await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let action = requests[0].2.clone().unwrap();
    assert_eq!(action["name"], json!("say"));
    assert_eq!(action["fn"]["model_id"], json!("echo"));
    assert_eq!(action["fn"]["fn"], json!({"prompt": "Say {{ word }}"}));

    let dag = &requests[1].2.as_ref().unwrap()["dag"];
    assert_eq!(dag["nodes"][0]["cf_id"], json!("act-42"));
    assert_eq!(dag["nodes"][1]["cf_id"], json!("shout"));
    assert!(dag["nodes"][0].get("cf_data").is_none());
}

#[tokio::test]
async fn test_store_errors_surface() {
    let transport = Arc::new(MockTransport::default());
    let err = client(transport).get_chain_record("missing").await.unwrap_err();
    assert!(matches!(err, RemoteError::Status { status: 404, .. }));
}

#[tokio::test]
async fn test_published_chain_fetches_back() {
    let publisher = Arc::new(
        MockTransport::default()
            .route(Method::POST, "fury/actions/", json!({"id": "act-42"}))
            .route(
                Method::POST,
                "chatbot/",
                record(json!({"sample": {"a/b": 1}, "main_in": "a/b", "main_out": "a/c"})),
            ),
    );
    let chain = publishable(&context());
    client(Arc::clone(&publisher)).create_chain("bot", &chain, true).await.unwrap();

    let posted = publisher.requests();
    let mut action = posted[0].2.clone().unwrap();
    action["id"] = json!("act-42");
    let dag = posted[1].2.as_ref().unwrap()["dag"].clone();

    let store = Arc::new(
        MockTransport::default()
            .route(Method::GET, "chatbot/c1", record(dag))
            .route(Method::GET, "fury/actions/act-42", action),
    );
    let fresh = context();
    let fetched = client(Arc::clone(&store)).fetch_chain("c1", &fresh).await.unwrap();

    assert_eq!(fetched.node("say_1").unwrap().action_id, "say");
    assert_eq!(fetched.invoke("again").unwrap(), json!("SAY AGAIN"));
    assert_eq!(store.requests().len(), 2);
}
