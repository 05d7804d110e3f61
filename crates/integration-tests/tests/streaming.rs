//! Streaming translation through the full HTTP stack

mod harness;

use bytes::{Bytes, BytesMut};
use harness::config::{ConfigBuilder, route};
use harness::mock_upstream::{MockReply, MockUpstream};
use harness::server::TestServer;
use polyglot_config::{AwsCredentials, ProtocolAuth, ProtocolId};
use polyglot_llm::codec::eventstream::encode_chunk;
use reqwest::StatusCode;
use serde_json::{Value, json};

/// Parse SSE `data:` payloads from raw response text, dropping `[DONE]`
fn sse_data(text: &str) -> Vec<Value> {
    text.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter(|data| *data != "[DONE]")
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

/// SSE `event:` names in order
fn sse_event_names(text: &str) -> Vec<&str> {
    text.lines().filter_map(|line| line.strip_prefix("event: ")).collect()
}

fn header<'a>(resp: &'a reqwest::Response, name: &str) -> &'a str {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn bedrock_stream() -> Bytes {
    let events = [
        json!({"type": "message_start", "message": {"id": "msg_b", "type": "message", "role": "assistant", "model": "claude", "content": [], "usage": {"input_tokens": 11, "output_tokens": 0}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hello"}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": " there"}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 4}}),
        json!({"type": "message_stop"}),
    ];

    let mut body = BytesMut::new();
    for event in &events {
        body.extend_from_slice(&encode_chunk(event));
    }
    body.freeze()
}

#[tokio::test]
async fn openai_client_streams_from_bedrock() {
    let mock = MockUpstream::start(MockReply::stream("application/vnd.amazon.eventstream", bedrock_stream()))
        .await
        .unwrap();
    let mut target = route(Some(ProtocolId::Openai), ProtocolId::Bedrock, &mock.base_url());
    target.auth = ProtocolAuth::Aws(AwsCredentials {
        access_key_id: "AKIDEXAMPLE".to_owned(),
        secret_access_key: secrecy::SecretString::from("secret"),
        session_token: None,
        region: "us-east-1".to_owned(),
    });
    let server = TestServer::start(ConfigBuilder::new().with_route("tok", target).build())
        .await
        .unwrap();

    let resp = server
        .client()
        .post(server.url("/proxy/tok/v1/chat/completions"))
        .json(&json!({
            "model": "anthropic.claude-v2",
            "stream": true,
            "messages": [{"role": "user", "content": "Hello"}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(header(&resp, "content-type").starts_with("text/event-stream"));
    assert_eq!(header(&resp, "cache-control"), "no-cache");

    let text = resp.text().await.unwrap();
    assert!(text.trim_end().ends_with("data: [DONE]"));

    let chunks = sse_data(&text);
    let content: String = chunks
        .iter()
        .filter_map(|c| c["choices"][0]["delta"]["content"].as_str())
        .collect();
    assert_eq!(content, "Hello there");
    assert!(chunks.iter().all(|c| c["model"] == "anthropic.claude-v2"));

    let last = chunks.last().unwrap();
    assert_eq!(last["choices"][0]["finish_reason"], "stop");
    assert_eq!(last["usage"]["prompt_tokens"], 11);
    assert_eq!(last["usage"]["completion_tokens"], 4);

    let upstream = mock.only_request();
    assert_eq!(upstream.uri, "/model/anthropic.claude-v2/invoke-with-response-stream");
    assert!(upstream.header("authorization").starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
    assert!(!upstream.header("x-amz-date").is_empty());
    assert_eq!(upstream.body["anthropic_version"], "bedrock-2023-05-31");
    assert!(upstream.body.get("stream").is_none());
}

#[tokio::test]
async fn anthropic_client_streams_from_ollama() {
    let ndjson = concat!(
        "{\"model\":\"llama3.2\",\"created_at\":\"2026-01-01T00:00:00Z\",\"message\":{\"role\":\"assistant\",\"content\":\"Hi\"},\"done\":false}\n",
        "{\"model\":\"llama3.2\",\"created_at\":\"2026-01-01T00:00:00Z\",\"message\":{\"role\":\"assistant\",\"content\":\" friend\"},\"done\":false}\n",
        "{\"model\":\"llama3.2\",\"created_at\":\"2026-01-01T00:00:00Z\",\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"done_reason\":\"stop\",\"prompt_eval_count\":7,\"eval_count\":2}\n",
    );
    let mock = MockUpstream::start(MockReply::stream("application/x-ndjson", ndjson))
        .await
        .unwrap();
    let target = route(None, ProtocolId::Ollama, &mock.base_url());
    let server = TestServer::start(ConfigBuilder::new().with_route("tok", target).build())
        .await
        .unwrap();

    let resp = server
        .client()
        .post(server.url("/proxy/tok/v1/messages"))
        .json(&json!({
            "model": "llama3.2",
            "max_tokens": 64,
            "stream": true,
            "messages": [{"role": "user", "content": "Hello"}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(header(&resp, "content-type").starts_with("text/event-stream"));

    let text = resp.text().await.unwrap();
    let names = sse_event_names(&text);
    assert_eq!(names.first(), Some(&"message_start"));
    assert_eq!(names.last(), Some(&"message_stop"));
    assert_eq!(names.iter().filter(|n| **n == "message_stop").count(), 1);

    let data = sse_data(&text);
    let content: String = data
        .iter()
        .filter(|d| d["type"] == "content_block_delta")
        .filter_map(|d| d["delta"]["text"].as_str())
        .collect();
    assert_eq!(content, "Hi friend");

    let delta = data.iter().find(|d| d["type"] == "message_delta").unwrap();
    assert_eq!(delta["delta"]["stop_reason"], "end_turn");
    assert_eq!(delta["usage"]["output_tokens"], 2);

    let upstream = mock.only_request();
    assert_eq!(upstream.uri, "/api/chat");
    assert_eq!(upstream.body["stream"], true);
    assert_eq!(upstream.body["model"], "llama3.2");
}

#[tokio::test]
async fn ollama_client_receives_ndjson_from_openai() {
    let sse = concat!(
        "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Bonjour\"}}]}\n\n",
        "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[],\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":1,\"total_tokens\":4}}\n\n",
        "data: [DONE]\n\n",
    );
    let mock = MockUpstream::start(MockReply::stream("text/event-stream", sse))
        .await
        .unwrap();
    let target = route(None, ProtocolId::Openai, &mock.base_url());
    let server = TestServer::start(ConfigBuilder::new().with_route("tok", target).build())
        .await
        .unwrap();

    let resp = server
        .client()
        .post(server.url("/proxy/tok/api/chat"))
        .json(&json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "Salut"}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header(&resp, "content-type"), "application/x-ndjson");

    let text = resp.text().await.unwrap();
    let lines: Vec<Value> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    let content: String = lines
        .iter()
        .filter_map(|l| l["message"]["content"].as_str())
        .collect();
    assert_eq!(content, "Bonjour");

    let last = lines.last().unwrap();
    assert_eq!(last["done"], true);
    assert_eq!(last["prompt_eval_count"], 3);
    assert_eq!(last["eval_count"], 1);
    assert_eq!(lines.iter().filter(|l| l["done"] == true).count(), 1);

    let upstream = mock.only_request();
    assert_eq!(upstream.uri, "/v1/chat/completions");
    assert_eq!(upstream.body["stream"], true);
    assert_eq!(upstream.body["stream_options"]["include_usage"], true);
}
