//! A complete example showing how to build a small chatbot chain with ChainFury.
//!
//! This example demonstrates:
//! - Registering a model, a programmatic action and an AI action
//! - Wiring them together with field-routing edges
//! - Linting a chain before running it
//! - Running it and inspecting the trace
//! - What a failing node leaves behind

use chainfury::prelude::*;
use serde_json::json;

// ============================================================================
// Step 1: A stand-in model
// ============================================================================

/// Pretends to be a chat completion endpoint: it answers by reversing the
/// last user message, wrapped the way OpenAI-style APIs wrap their replies.
fn mirror_model() -> Model {
    Model::new(
        "demo",
        "mirror-chat",
        "Reverses the last user message",
        fields!("model: string, messages: array, temperature?: number"),
        |params: &Payload| {
            let last = params["messages"]
                .as_array()
                .and_then(|m| m.last())
                .and_then(|m| m["content"].as_str())
                .unwrap_or_default();
            if last.is_empty() {
                return Err("empty prompt".into());
            }
            let reply: String = last.chars().rev().collect();
            Ok(json!({"choices": [{"message": {"role": "assistant", "content": reply}}]}))
        },
    )
}

// ============================================================================
// Step 2: Register everything
// ============================================================================

fn build(ctx: &Context) -> Result<Chain, FuryError> {
    ctx.register_model(mirror_model())?;

    let clean = ctx.register_action(
        ProgrammaticAction::new("clean-text", |p: &Payload| {
            let text = p["text"].as_str().unwrap_or_default();
            Ok(json!(text.split_whitespace().collect::<Vec<_>>().join(" ")))
        })
        .description("Collapses whitespace")
        .fields(fields!("text: string"))
        .returns(["text"]),
    )?;

    let reply = ctx.register_ai_action(
        AiActionSpec::new(
            "mirror-reply",
            "mirror-chat",
            RequestBody::template(json!({
                "messages": [
                    {"role": "system", "content": "You speak backwards."},
                    {"role": "user", "content": "{{ message }}"}
                ]
            })),
        )
        .description("Answers a message")
        .model_param("model", "mirror-1")
        .output("reply", loc!["choices", 0, "message", "content"]),
    )?;

    let mut sample = Payload::new();
    sample.insert("clean-text/text".into(), json!("  hello   there "));

    Chain::new(
        vec![clean, reply],
        vec![Edge::new("clean-text", "mirror-reply", "text", "message")],
        sample,
        "clean-text/text",
        "mirror-reply/reply",
    )
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    println!("=== ChainFury Basic Chain Example ===\n");

    let ctx = Context::new();
    let chain = match build(&ctx) {
        Ok(chain) => chain,
        Err(e) => {
            eprintln!("Could not build the chain: {}", e);
            return;
        }
    };

    println!("Execution order: {:?}", chain.order());
    let report = chain.lint();
    for issue in &report.issues {
        println!("  {}", issue);
    }

    // --- Example 1: Run with the stored sample ---
    println!("\n--- Example 1: Sample input ---");
    match chain.run_verbose(chain.sample()) {
        Ok((reply, trace)) => {
            println!("Reply: {}", reply);
            for (key, value) in trace.values() {
                println!("  {} = {}", key, value);
            }
        }
        Err(failure) => println!("Failed: {}", failure),
    }

    // --- Example 2: Run with user input ---
    println!("\n--- Example 2: User input ---");
    match chain.invoke("was it a   car or a cat i saw") {
        Ok(reply) => println!("Reply: {}", reply),
        Err(failure) => println!("Failed: {}", failure),
    }

    // --- Example 3: A failing model keeps the partial trace ---
    println!("\n--- Example 3: Empty input ---");
    match chain.invoke("   ") {
        Ok(reply) => println!("Reply: {}", reply),
        Err(failure) => {
            println!("Failed: {}", failure);
            println!("Nodes that finished: {:?}", failure.trace.executed());
        }
    }

    println!("\n=== Example Complete ===");
}
