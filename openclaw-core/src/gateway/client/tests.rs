use std::cell::RefCell;
use std::time::Duration;

use futures::StreamExt;
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::message::Role;

fn config_for(server: &MockServer) -> Config {
    Config::new(server.uri())
}

async fn mount(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn last_request_body(server: &MockServer) -> Value {
    let requests = server.received_requests().await.unwrap();
    let request = requests.last().unwrap();
    serde_json::from_slice(&request.body).unwrap()
}

fn completion(content: Value) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "openclaw",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
    })
}

fn sse_body(fragments: &[&str], done: bool) -> String {
    let mut body = String::new();
    for fragment in fragments {
        let chunk = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000,
            "model": "openclaw",
            "choices": [{"index": 0, "delta": {"content": fragment}, "finish_reason": null}]
        });
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    if done {
        body.push_str("data: [DONE]\n\n");
    }
    body
}

fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

/// Records callback invocations in order.
#[derive(Default)]
struct Calls(RefCell<Vec<String>>);

impl Calls {
    fn chunk(&self, text: &str) {
        self.0.borrow_mut().push(format!("chunk:{text}"));
    }

    fn done(&self) {
        self.0.borrow_mut().push("done".to_string());
    }

    fn take(&self) -> Vec<String> {
        self.0.take()
    }
}

async fn stream_calls(
    client: &GatewayClient,
    config: &Config,
    cancel: Option<CancellationToken>,
) -> (Result<(), GatewayError>, Vec<String>) {
    let calls = Calls::default();
    let result = client
        .stream_with_callbacks(
            config,
            &[Message::user("Hi")],
            |text| calls.chunk(text),
            || calls.done(),
            cancel,
        )
        .await;
    (result, calls.take())
}

// -- URL, headers, model --

#[test]
fn test_endpoint_url_single_slash() {
    for base in [
        "http://127.0.0.1:18789",
        "http://127.0.0.1:18789/",
        "http://127.0.0.1:18789///",
    ] {
        assert_eq!(
            endpoint_url(&Config::new(base)),
            "http://127.0.0.1:18789/v1/chat/completions"
        );
    }
}

#[test]
fn test_endpoint_url_keeps_base_path() {
    let config = Config::new("https://claw.example.com/gateway/");
    assert_eq!(
        endpoint_url(&config),
        "https://claw.example.com/gateway/v1/chat/completions"
    );
}

#[test]
fn test_headers_without_token_or_agent() {
    let headers = build_headers(&Config::default()).unwrap();
    assert_eq!(headers.len(), 1);
    assert_eq!(headers[CONTENT_TYPE], "application/json");
    assert!(headers.get(AUTHORIZATION).is_none());
    assert!(headers.get(AGENT_HEADER).is_none());
}

#[test]
fn test_headers_with_token_and_agent() {
    let config = Config {
        auth_token: Some("s3cret".to_string()),
        agent_id: Some("main".to_string()),
        ..Config::default()
    };
    let headers = build_headers(&config).unwrap();
    assert_eq!(headers[AUTHORIZATION], "Bearer s3cret");
    assert_eq!(headers[AGENT_HEADER], "main");
    assert_eq!(headers, build_headers(&config).unwrap());
}

#[test]
fn test_headers_ignore_empty_values() {
    let config = Config {
        auth_token: Some(String::new()),
        agent_id: Some(String::new()),
        ..Config::default()
    };
    assert_eq!(build_headers(&config).unwrap().len(), 1);
}

#[test]
fn test_headers_reject_invalid_token() {
    let config = Config {
        auth_token: Some("bad\ntoken".to_string()),
        ..Config::default()
    };
    assert!(matches!(
        build_headers(&config),
        Err(GatewayError::InvalidHeader(_))
    ));
}

#[test]
fn test_resolve_model() {
    let mut config = Config::default();
    assert_eq!(resolve_model(&config), "openclaw");

    config.agent_id = Some("beta".to_string());
    assert_eq!(resolve_model(&config), "openclaw:beta");

    config.model = Some("custom-model".to_string());
    assert_eq!(resolve_model(&config), "custom-model");
}

// -- Request / response types --

#[test]
fn test_chat_request_serialization() {
    let messages = vec![
        Message::new(Role::System, "Be brief."),
        Message::user("Hello"),
        Message::assistant("Hi!"),
        Message::user("Again"),
    ];
    let request = ChatRequest::new("openclaw".to_string(), &messages, true);

    let json = serde_json::to_value(&request).unwrap();
    assert_eq!(json["model"], "openclaw");
    assert_eq!(json["stream"], true);
    assert!(json.get("max_tokens").is_none());
    let roles: Vec<_> = json["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, ["system", "user", "assistant", "user"]);
    assert_eq!(json["messages"][3]["content"], "Again");
}

#[test]
fn test_completion_response_content() {
    let response: ChatCompletionResponse =
        serde_json::from_value(completion(json!("hello"))).unwrap();
    assert_eq!(response.into_content().as_deref(), Some("hello"));

    let response: ChatCompletionResponse =
        serde_json::from_value(completion(Value::Null)).unwrap();
    assert_eq!(response.into_content(), None);

    let response: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
    assert_eq!(response.into_content(), None);
}

#[test]
fn test_completion_ignores_unread_field_types() {
    let body = json!({
        "id": 42,
        "object": null,
        "created": 1.7e9,
        "model": ["openclaw"],
        "choices": [{
            "index": null,
            "message": {"role": 3, "content": "still read"},
            "finish_reason": {"kind": "stop"}
        }],
        "usage": "unknown"
    });
    let response: ChatCompletionResponse = serde_json::from_value(body).unwrap();
    assert_eq!(response.into_content().as_deref(), Some("still read"));
}

#[test]
fn test_status_error_classification() {
    assert!(matches!(
        status_error(StatusCode::METHOD_NOT_ALLOWED, String::new(), false),
        GatewayError::AuthRequired { .. }
    ));
    assert!(matches!(
        status_error(StatusCode::METHOD_NOT_ALLOWED, String::new(), true),
        GatewayError::InvalidToken { .. }
    ));
    assert!(matches!(
        status_error(StatusCode::UNAUTHORIZED, "nope".to_string(), true),
        GatewayError::HttpStatus { status: 401, ref body } if body == "nope"
    ));
}

// -- complete --

#[tokio::test]
async fn test_complete_returns_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(header("authorization", "Bearer tok"))
        .and(header(AGENT_HEADER, "main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!("hello"))))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config {
        auth_token: Some("tok".to_string()),
        agent_id: Some("main".to_string()),
        ..config_for(&server)
    };
    let reply = GatewayClient::new()
        .complete(&config, &[Message::user("Hi")])
        .await
        .unwrap();
    assert_eq!(reply, "hello");

    let body = last_request_body(&server).await;
    assert_eq!(body["model"], "openclaw:main");
    assert_eq!(body["stream"], false);
    assert_eq!(body["messages"][0]["content"], "Hi");
}

#[tokio::test]
async fn test_complete_ignores_unread_field_types() {
    let server = MockServer::start().await;
    let body = json!({
        "id": 7,
        "created": 1.7e9,
        "choices": [{"index": null, "message": {"content": "hi"}, "finish_reason": 7}],
        "usage": {"prompt_tokens": "3"}
    });
    mount(&server, ResponseTemplate::new(200).set_body_json(body)).await;

    let reply = GatewayClient::new()
        .complete(&config_for(&server), &[Message::user("Hi")])
        .await
        .unwrap();
    assert_eq!(reply, "hi");
}

#[tokio::test]
async fn test_complete_trailing_slash_base_url() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_body_json(completion(json!("ok"))),
    )
    .await;

    let config = Config::new(format!("{}//", server.uri()));
    let reply = GatewayClient::new()
        .complete(&config, &[Message::user("Hi")])
        .await
        .unwrap();
    assert_eq!(reply, "ok");
}

#[tokio::test]
async fn test_complete_empty_content_is_error() {
    for body in [
        completion(json!("")),
        completion(Value::Null),
        json!({"choices": []}),
        json!({}),
    ] {
        let server = MockServer::start().await;
        mount(&server, ResponseTemplate::new(200).set_body_json(body)).await;

        let err = GatewayClient::new()
            .complete(&config_for(&server), &[Message::user("Hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::EmptyResponse), "{err:?}");
    }
}

#[tokio::test]
async fn test_complete_malformed_body_is_empty_response() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(200).set_body_string("<html>")).await;

    let err = GatewayClient::new()
        .complete(&config_for(&server), &[Message::user("Hi")])
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::EmptyResponse));
    assert_eq!(err.to_string(), "No response content from OpenClaw");
}

#[tokio::test]
async fn test_complete_405_without_token() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(405).set_body_string("")).await;

    let err = GatewayClient::new()
        .complete(&config_for(&server), &[Message::user("Hi")])
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::AuthRequired { .. }));
    assert!(err.to_string().contains("authentication is required"));
}

#[tokio::test]
async fn test_complete_405_with_token() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(405)).await;

    let config = Config {
        auth_token: Some("stale".to_string()),
        ..config_for(&server)
    };
    let err = GatewayClient::new()
        .complete(&config, &[Message::user("Hi")])
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidToken { .. }));
    assert!(err.to_string().contains("token may be invalid"));
}

#[tokio::test]
async fn test_complete_other_status_includes_body() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(500).set_body_string("agent crashed"),
    )
    .await;

    let err = GatewayClient::new()
        .complete(&config_for(&server), &[Message::user("Hi")])
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(
        err.to_string(),
        "OpenClaw Gateway error (500): agent crashed"
    );
}

#[tokio::test]
async fn test_complete_transport_error() {
    // Port 1 is never listening.
    let config = Config::new("http://127.0.0.1:1");
    let err = GatewayClient::new()
        .complete(&config, &[Message::user("Hi")])
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Transport(_)));
}

// -- stream --

#[tokio::test]
async fn test_stream_fragments_then_done() {
    let server = MockServer::start().await;
    mount(&server, sse_response(sse_body(&["Hel", "lo"], true))).await;

    let (result, calls) = stream_calls(&GatewayClient::new(), &config_for(&server), None).await;
    result.unwrap();
    assert_eq!(calls, ["chunk:Hel", "chunk:lo", "done"]);

    let body = last_request_body(&server).await;
    assert_eq!(body["stream"], true);
    assert_eq!(body["model"], "openclaw");
}

#[tokio::test]
async fn test_stream_ignores_data_after_done() {
    let server = MockServer::start().await;
    let mut body = sse_body(&["a"], true);
    body.push_str(&sse_body(&["never"], false));
    mount(&server, sse_response(body)).await;

    let (result, calls) = stream_calls(&GatewayClient::new(), &config_for(&server), None).await;
    result.unwrap();
    assert_eq!(calls, ["chunk:a", "done"]);
}

#[tokio::test]
async fn test_stream_without_done_marker_still_completes() {
    let server = MockServer::start().await;
    mount(&server, sse_response(sse_body(&["x", "y"], false))).await;

    let (result, calls) = stream_calls(&GatewayClient::new(), &config_for(&server), None).await;
    result.unwrap();
    assert_eq!(calls, ["chunk:x", "chunk:y", "done"]);
}

#[tokio::test]
async fn test_stream_skips_malformed_chunks() {
    let server = MockServer::start().await;
    let body = format!(
        ": keep-alive\n\ndata: {{broken\n\n{}",
        sse_body(&["fine"], true)
    );
    mount(&server, sse_response(body)).await;

    let (result, calls) = stream_calls(&GatewayClient::new(), &config_for(&server), None).await;
    result.unwrap();
    assert_eq!(calls, ["chunk:fine", "done"]);
}

#[tokio::test]
async fn test_stream_strict_parsing_fails() {
    let server = MockServer::start().await;
    mount(&server, sse_response("data: {broken\n\n".to_string())).await;

    let config = Config {
        stream_parsing: crate::config::StreamParsing::Strict,
        ..config_for(&server)
    };
    let (result, calls) = stream_calls(&GatewayClient::new(), &config, None).await;
    assert!(matches!(result, Err(GatewayError::MalformedChunk(_))));
    assert!(calls.is_empty());
}

#[tokio::test]
async fn test_stream_405_before_streaming() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(405)).await;

    let (result, calls) = stream_calls(&GatewayClient::new(), &config_for(&server), None).await;
    assert!(matches!(result, Err(GatewayError::AuthRequired { .. })));
    assert!(calls.is_empty());
}

#[tokio::test]
async fn test_stream_cancel_while_waiting_for_headers() {
    let server = MockServer::start().await;
    mount(
        &server,
        sse_response(sse_body(&["late"], true)).set_delay(Duration::from_secs(10)),
    )
    .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let (result, calls) =
        stream_calls(&GatewayClient::new(), &config_for(&server), Some(cancel)).await;
    let err = result.unwrap_err();
    assert!(err.is_aborted());
    assert!(calls.is_empty());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_stream_cancel_while_reading_error_body() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Sends the head of a 500 response and then stalls mid-body.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;
        socket
            .write_all(b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 1000\r\n\r\npartial")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(socket);
    });

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let config = Config::new(format!("http://{addr}"));
    let started = std::time::Instant::now();
    let (result, calls) = stream_calls(&GatewayClient::new(), &config, Some(cancel)).await;
    assert!(matches!(result, Err(GatewayError::Aborted)));
    assert!(calls.is_empty());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_stream_reads_chunks_with_unread_field_types() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"id\":7,\"created\":1.7e9,\"choices\":[{\"index\":null,\"delta\":{\"content\":\"A\"}}]}\n\n",
        "data: {\"model\":false,\"choices\":[{\"delta\":{\"content\":\"B\"},\"finish_reason\":7}]}\n\n",
        "data: [DONE]\n\n",
    );
    mount(&server, sse_response(body.to_string())).await;

    let (result, calls) = stream_calls(&GatewayClient::new(), &config_for(&server), None).await;
    result.unwrap();
    assert_eq!(calls, ["chunk:A", "chunk:B", "done"]);
}

#[tokio::test]
async fn test_stream_already_cancelled() {
    let server = MockServer::start().await;
    mount(&server, sse_response(sse_body(&["x"], true))).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let (result, calls) =
        stream_calls(&GatewayClient::new(), &config_for(&server), Some(cancel)).await;
    assert!(matches!(result, Err(GatewayError::Aborted)));
    assert!(calls.is_empty());
}

#[tokio::test]
async fn test_stream_as_sequence() {
    let server = MockServer::start().await;
    mount(&server, sse_response(sse_body(&["ab", "cd"], true))).await;

    let events: Vec<_> = GatewayClient::new()
        .stream(&config_for(&server), &[Message::user("Hi")], None)
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(
        events,
        vec![
            StreamEvent::TextDelta("ab".to_string()),
            StreamEvent::TextDelta("cd".to_string()),
            StreamEvent::Done,
        ]
    );
}

// -- probe --

#[tokio::test]
async fn test_probe_success() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_body_json(completion(json!("p"))),
    )
    .await;

    assert!(GatewayClient::new().probe(&config_for(&server)).await);

    let body = last_request_body(&server).await;
    assert_eq!(body["max_tokens"], 1);
    assert_eq!(body["messages"], json!([{"role": "user", "content": "ping"}]));
}

#[tokio::test]
async fn test_probe_non_success_status() {
    for status in [401u16, 405, 500] {
        let server = MockServer::start().await;
        mount(&server, ResponseTemplate::new(status)).await;
        assert!(!GatewayClient::new().probe(&config_for(&server)).await);
    }
}

#[tokio::test]
async fn test_probe_unreachable() {
    let config = Config::new("http://127.0.0.1:1");
    assert!(!GatewayClient::new().probe(&config).await);
}

#[tokio::test]
async fn test_probe_timeout() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_delay(Duration::from_secs(2)),
    )
    .await;

    let up = GatewayClient::new()
        .probe_with_timeout(&config_for(&server), Duration::from_millis(100))
        .await;
    assert!(!up);
}

#[tokio::test]
async fn test_probe_invalid_header_is_unreachable() {
    let config = Config {
        agent_id: Some("bad\r\nagent".to_string()),
        ..Config::default()
    };
    assert!(!GatewayClient::new().probe(&config).await);
}
