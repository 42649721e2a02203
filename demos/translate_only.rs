//! Demonstrate using the translation layer without a server.
//!
//! Usage:
//!   `cargo run --example translate_only`

use messages_bridge::translate::responses_types::ResponsesStreamEvent;
use messages_bridge::translate::streaming::ResponsesToMessagesStream;
use messages_bridge::{request_convert, response_convert, ConvertOptions, Direction};
use serde_json::json;

fn main() -> anyhow::Result<()> {
    // An Anthropic Messages API request, as Claude Code would send it
    let messages_req = json!({
        "model": "claude-sonnet-4-20250514",
        "max_tokens": 1024,
        "system": "You are a geography expert. Be concise.",
        "messages": [
            {"role": "user", "content": "What is the capital of France?"},
            {"role": "assistant", "content": "The capital of France is Paris."},
            {"role": "user", "content": "And Germany?"}
        ],
        "temperature": 0.7,
        "stream": true
    });

    let opts = ConvertOptions::default();
    let responses_req = request_convert(Direction::MessagesToResponses, &messages_req, &opts)?;

    println!("=== Translated Request (Responses format) ===");
    println!("{}", serde_json::to_string_pretty(&responses_req)?);

    // A completed Responses reply, translated back
    let responses_resp = json!({
        "id": "resp_demo",
        "object": "response",
        "status": "completed",
        "model": "gpt-4.1",
        "output": [{
            "type": "message", "id": "msg_demo", "role": "assistant",
            "content": [{"type": "output_text", "text": "The capital of Germany is Berlin."}]
        }],
        "usage": {"input_tokens": 42, "output_tokens": 8, "total_tokens": 50}
    });

    let opts = ConvertOptions {
        model: Some("claude-sonnet-4-20250514".to_string()),
        ..ConvertOptions::default()
    };
    let messages_resp = response_convert(Direction::ResponsesToMessages, &responses_resp, &opts)?;

    println!();
    println!("=== Translated Response (Messages format) ===");
    println!("{}", serde_json::to_string_pretty(&messages_resp)?);

    println!();
    println!("=== Streaming Translation Demo ===");

    let mut translator = ResponsesToMessagesStream::new(&opts);
    let upstream = vec![
        json!({"type": "response.created",
               "response": {"id": "resp_demo", "status": "in_progress", "model": "gpt-4.1"}}),
        json!({"type": "response.output_item.added", "output_index": 0,
               "item": {"type": "message", "id": "msg_demo", "role": "assistant", "content": []}}),
        json!({"type": "response.output_text.delta", "item_id": "msg_demo",
               "output_index": 0, "content_index": 0, "delta": "The capital"}),
        json!({"type": "response.output_text.delta", "item_id": "msg_demo",
               "output_index": 0, "content_index": 0, "delta": " is Berlin."}),
        json!({"type": "response.completed",
               "response": {"id": "resp_demo", "status": "completed", "model": "gpt-4.1", "output": [],
                            "usage": {"input_tokens": 42, "output_tokens": 4, "total_tokens": 46}}}),
    ];

    for payload in upstream {
        let event: ResponsesStreamEvent = serde_json::from_value(payload)?;
        let name = event.event_name();
        for out in translator.process(&event)? {
            println!("  {} -> {}", name, out.event_name());
        }
    }

    println!();
    println!("Done! The translation layer works without any network calls.");
    Ok(())
}
