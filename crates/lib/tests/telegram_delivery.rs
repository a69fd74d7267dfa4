//! Integration test: point the Telegram channel at a local axum server standing in for the
//! Bot API and check what sendMessage receives. Does not require network access.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use lib::channels::{ChannelError, ChannelHandle, TelegramChannel};
use lib::delivery;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

const TOKEN: &str = "TESTTOKEN";

#[derive(Default)]
struct FakeBotApi {
    requests: Mutex<Vec<Value>>,
    /// 0-based request index that gets a 400 response.
    fail_at: Option<usize>,
}

async fn send_message(
    State(api): State<Arc<FakeBotApi>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut requests = api.requests.lock().expect("lock");
    let index = requests.len();
    requests.push(body);
    if api.fail_at == Some(index) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })),
        );
    }
    (StatusCode::OK, Json(json!({ "ok": true, "result": { "message_id": index } })))
}

async fn spawn_bot_api(api: Arc<FakeBotApi>) -> String {
    let app = Router::new()
        .route(&format!("/bot{}/sendMessage", TOKEN), post(send_message))
        .with_state(api);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind free port");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

fn channel(base: String, parse_mode: Option<&str>) -> TelegramChannel {
    TelegramChannel::with_api_base(
        TOKEN.to_string(),
        "-100200".to_string(),
        parse_mode.map(str::to_string),
        base,
    )
}

#[tokio::test]
async fn send_message_posts_chat_text_and_parse_mode() {
    let api = Arc::new(FakeBotApi::default());
    let base = spawn_bot_api(api.clone()).await;

    channel(base, Some("HTML"))
        .send_message("hello")
        .await
        .expect("send");

    let requests = api.requests.lock().expect("lock").clone();
    assert_eq!(
        requests,
        vec![json!({ "chat_id": "-100200", "text": "hello", "parse_mode": "HTML" })]
    );
}

#[tokio::test]
async fn rejected_message_reports_telegram_description() {
    let api = Arc::new(FakeBotApi {
        fail_at: Some(0),
        ..Default::default()
    });
    let base = spawn_bot_api(api).await;

    let err = channel(base, None).send_message("hello").await.unwrap_err();
    match err {
        ChannelError::Api {
            status,
            description,
        } => {
            assert_eq!(status, 400);
            assert!(description.contains("chat not found"), "{description}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn long_payload_is_sent_as_ordered_parts() {
    let api = Arc::new(FakeBotApi::default());
    let base = spawn_bot_api(api.clone()).await;
    let ch = channel(base, None);

    let text = format!("{}{}", "a".repeat(4000), "b".repeat(500));
    let parts = delivery::send(&text, &ch).await.expect("send");
    assert_eq!(parts, 2);

    let requests = api.requests.lock().expect("lock").clone();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].get("parse_mode").is_none());
    let first = requests[0]["text"].as_str().expect("text");
    let second = requests[1]["text"].as_str().expect("text");
    assert_eq!(first, format!("Part 1/2\n\n{}", "a".repeat(4000)));
    assert_eq!(second, format!("Part 2/2\n\n{}", "b".repeat(500)));
}

#[tokio::test]
async fn failed_part_stops_the_rest() {
    let api = Arc::new(FakeBotApi {
        fail_at: Some(1),
        ..Default::default()
    });
    let base = spawn_bot_api(api.clone()).await;
    let ch = channel(base, None);

    let text = "z".repeat(9000);
    let err = delivery::send(&text, &ch).await.unwrap_err();
    assert_eq!((err.part, err.total), (2, 3));
    // part 1 delivered, part 2 rejected, part 3 never attempted
    assert_eq!(api.requests.lock().expect("lock").len(), 2);
}
