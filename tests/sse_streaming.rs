//! End-to-end: a GET request answered with `text/event-stream` is
//! classified as a long-lived stream and forwarded untouched.

mod common;

use common::{http_client, start_proxy};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn get_with_event_stream_response_is_forwarded_as_sse() {
    let upstream = MockServer::start().await;
    let sse_body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n";
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body, "text/event-stream"),
        )
        .mount(&upstream)
        .await;

    let proxy = start_proxy(upstream.address().to_owned()).await;
    let client = http_client();

    let response = client
        .get(format!("{}/mcp/stream", proxy.proxy_url()))
        .send()
        .await
        .expect("request failed");

    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let body = response.text().await.expect("failed to read body");
    assert_eq!(body, sse_body);
}

#[tokio::test]
async fn post_with_event_stream_response_is_not_classified_as_sse() {
    // The classifier requires a GET request; a POST answered with
    // text/event-stream still gets buffered, not streamed, since the
    // sidecar only treats the GET+event-stream combination as long-lived.
    let upstream = MockServer::start().await;
    let sse_body = "data: hello\n\n";
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
        .mount(&upstream)
        .await;

    let proxy = start_proxy(upstream.address().to_owned()).await;
    let client = http_client();

    let response = client
        .post(format!("{}/mcp", proxy.proxy_url()))
        .json(&serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
        .send()
        .await
        .expect("request failed");

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert_eq!(body, sse_body);
}
