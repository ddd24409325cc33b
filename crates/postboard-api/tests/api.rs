use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Body,
    http::{Method, Request, StatusCode, header::CONTENT_TYPE},
    routing::{get, post},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use postboard_api::assets::{AssetPolicy, AssetValidator};
use postboard_api::transcribe::{DisabledTranscriber, HttpTranscriber, TRANSCRIPT_UNAVAILABLE, Transcriber};
use postboard_api::{AppState, AppStateInner, router};
use postboard_db::Database;

const MAX_IMAGE_BYTES: u64 = 1024;

struct Fixed(&'static str);

#[async_trait]
impl Transcriber for Fixed {
    async fn transcribe(&self, _video_url: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

struct Failing;

#[async_trait]
impl Transcriber for Failing {
    async fn transcribe(&self, _video_url: &str) -> Result<String> {
        bail!("model crashed")
    }
}

fn client() -> reqwest::Client {
    client_with_timeout(Duration::from_secs(5))
}

fn client_with_timeout(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(timeout)
        .build()
        .unwrap()
}

fn app_with(transcriber: Arc<dyn Transcriber>) -> Router {
    app_with_fetch_timeout(transcriber, Duration::from_secs(5))
}

fn app_with_fetch_timeout(transcriber: Arc<dyn Transcriber>, timeout: Duration) -> Router {
    let state: AppState = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        assets: AssetValidator::new(
            client_with_timeout(timeout),
            AssetPolicy {
                image_formats: vec!["image/png".into(), "image/jpeg".into()],
                video_formats: vec!["video/mp4".into()],
                max_image_bytes: MAX_IMAGE_BYTES,
            },
        ),
        transcriber,
    });
    router(state)
}

fn app() -> Router {
    app_with(Arc::new(DisabledTranscriber))
}

/// Serves fake remote assets on an ephemeral loopback port.
async fn asset_host() -> String {
    let app = Router::new()
        .route("/ok.png", get(|| async { ([(CONTENT_TYPE, "image/png")], vec![0u8; 64]) }))
        .route("/ok-charset.png", get(|| async {
            ([(CONTENT_TYPE, "image/png; charset=binary")], vec![0u8; 64])
        }))
        .route("/big.png", get(|| async { ([(CONTENT_TYPE, "image/png")], vec![0u8; 4096]) }))
        .route("/doc.pdf", get(|| async { ([(CONTENT_TYPE, "application/pdf")], "%PDF") }))
        .route("/missing.png", get(|| async { StatusCode::NOT_FOUND }))
        .route("/slow.png", get(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            ([(CONTENT_TYPE, "image/png")], vec![0u8; 64])
        }))
        .route("/clip.mp4", get(|| async { ([(CONTENT_TYPE, "video/mp4")], "frames") }))
        .route("/untyped", get(|| async { Body::from("raw") }))
        .route("/transcribe", post(|Json(body): Json<Value>| async move {
            Json(json!({ "text": format!("heard {}", body["video_url"].as_str().unwrap_or("")) }))
        }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Streams `chunks` pieces of 512 bytes with chunked transfer encoding, so
/// the response carries no `Content-Length`.
async fn chunked_image_host(chunks: usize) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let head = "HTTP/1.1 200 OK\r\ncontent-type: image/png\r\n\
                            transfer-encoding: chunked\r\nconnection: close\r\n\r\n";
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                for _ in 0..chunks {
                    let mut chunk = b"200\r\n".to_vec();
                    chunk.extend_from_slice(&[0u8; 512]);
                    chunk.extend_from_slice(b"\r\n");
                    if socket.write_all(&chunk).await.is_err() {
                        return;
                    }
                }
                let _ = socket.write_all(b"0\r\n\r\n").await;
            });
        }
    });
    format!("http://{}/stream.png", addr)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn get_json(app: &Router, uri: &str) -> Value {
    let (status, body) = send(app, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::OK, "GET {uri} -> {body}");
    body
}

async fn create(app: &Router, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, "/messages", Some(body)).await
}

fn titles(body: &Value) -> Vec<String> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["title"].as_str().unwrap().to_string())
        .collect()
}

// -- Messages --

#[tokio::test]
async fn created_message_is_listed_without_tags() {
    let app = app();
    let (status, body) = create(&app, json!({ "title": "T", "description": "D" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["msg"], "Message added successfully: T");

    let body = get_json(&app, "/messages?title=T").await;
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["title"], "T");
    assert_eq!(data[0]["description"], "D");
    assert_eq!(data[0]["tags"], json!([]));
    assert_eq!(data[0]["thumbnail"], Value::Null);
    assert_eq!(data[0]["transcript"], Value::Null);
}

#[tokio::test]
async fn duplicate_title_is_rejected_and_not_persisted() {
    let app = app();
    create(&app, json!({ "title": "T", "description": "first" })).await;
    let (status, body) = create(&app, json!({ "title": "T", "description": "second" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "A message with this title already exists");

    let body = get_json(&app, "/messages").await;
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["description"], "first");
}

#[tokio::test]
async fn missing_required_fields_are_rejected() {
    let app = app();
    let (status, body) = create(&app, json!({ "description": "D" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Title is required");

    let (status, body) = create(&app, json!({ "title": "T", "description": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Description is required");
}

#[tokio::test]
async fn bad_query_string_gets_a_msg_body() {
    let app = app();
    create(&app, json!({ "title": "T", "description": "D" })).await;

    let (status, body) = send(&app, Method::GET, "/messages?id=1&id=2", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["msg"].as_str().unwrap().starts_with("Invalid query string"));

    let (status, body) = send(
        &app,
        Method::PUT,
        "/messages?id=1&id=2",
        Some(json!({ "description": "D2" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["msg"].as_str().unwrap().starts_with("Invalid query string"));

    let (status, body) = send(&app, Method::GET, "/tags?name=a&name=b", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["msg"].is_string());
}

#[tokio::test]
async fn malformed_json_gets_a_msg_body() {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/messages")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["msg"].as_str().unwrap().starts_with("Invalid request body"));
}

#[tokio::test]
async fn tag_filter_returns_each_message_once() {
    let app = app();
    create(&app, json!({ "title": "both", "description": "d", "tags": ["a", "b"] })).await;
    create(&app, json!({ "title": "only-a", "description": "d", "tags": [" a "] })).await;
    create(&app, json!({ "title": "none", "description": "d" })).await;

    let body = get_json(&app, "/messages?tag=a,b").await;
    assert_eq!(titles(&body), vec!["both", "only-a"]);
    assert_eq!(body["data"][0]["tags"], json!(["a", "b"]));
    assert_eq!(body["data"][1]["tags"], json!(["a"]));

    let body = get_json(&app, "/messages?tag=a&title=none").await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn id_filter_ignores_non_numeric_ids() {
    let app = app();
    create(&app, json!({ "title": "one", "description": "d" })).await;
    create(&app, json!({ "title": "two", "description": "d" })).await;

    let body = get_json(&app, "/messages?id=2,x").await;
    assert_eq!(titles(&body), vec!["two"]);

    let body = get_json(&app, "/messages?id=abc").await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn update_replaces_everything_but_the_title() {
    let host = asset_host().await;
    let app = app();
    create(
        &app,
        json!({
            "title": "T",
            "description": "D",
            "thumbnail": format!("{host}/ok.png"),
            "tags": ["keep", "me"],
        }),
    )
    .await;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/messages?id=1",
        Some(json!({ "description": "D2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg"], "Message updated successfully: T");

    let body = get_json(&app, "/messages?id=1").await;
    let msg = &body["data"][0];
    assert_eq!(msg["title"], "T");
    assert_eq!(msg["description"], "D2");
    assert_eq!(msg["thumbnail"], Value::Null);
    assert_eq!(msg["tags"], json!([]));
}

#[tokio::test]
async fn update_with_new_tags_replaces_the_set() {
    let app = app();
    create(&app, json!({ "title": "T", "description": "D", "tags": ["old"] })).await;

    let (status, _) = send(
        &app,
        Method::PUT,
        "/messages?id=1",
        Some(json!({ "description": "D", "tags": ["new", "new "] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let body = get_json(&app, "/messages?id=1").await;
    assert_eq!(body["data"][0]["tags"], json!(["new"]));

    // The old tag survives on its own.
    let body = get_json(&app, "/tags?name=old").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn update_errors() {
    let app = app();
    create(&app, json!({ "title": "T", "description": "D" })).await;

    let (status, body) = send(&app, Method::PUT, "/messages", Some(json!({ "description": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Id is required");

    let (status, body) = send(&app, Method::PUT, "/messages?id=1", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Description is required");

    let (status, body) =
        send(&app, Method::PUT, "/messages?id=99", Some(json!({ "description": "x" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["msg"], "Message not found");

    let (status, _) =
        send(&app, Method::PUT, "/messages?id=abc", Some(json!({ "description": "x" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// -- Assets --

#[tokio::test]
async fn valid_thumbnail_is_stored() {
    let host = asset_host().await;
    let app = app();
    let url = format!("{host}/ok-charset.png");
    let (status, _) = create(&app, json!({ "title": "T", "description": "D", "thumbnail": url })).await;
    assert_eq!(status, StatusCode::CREATED);

    let body = get_json(&app, "/messages").await;
    assert_eq!(body["data"][0]["thumbnail"], url.as_str());
}

#[tokio::test]
async fn non_url_thumbnail_is_dropped() {
    let app = app();
    let (status, _) =
        create(&app, json!({ "title": "T", "description": "D", "thumbnail": "not a url" })).await;
    assert_eq!(status, StatusCode::CREATED);

    let body = get_json(&app, "/messages").await;
    assert_eq!(body["data"][0]["thumbnail"], Value::Null);
}

#[tokio::test]
async fn rejected_thumbnails_fail_the_request() {
    let host = asset_host().await;
    let app = app();

    let cases = [
        ("missing.png", "Failed to fetch thumbnail image from URL"),
        ("doc.pdf", "Only image/png, image/jpeg formats are allowed."),
        ("big.png", "Image size must be less than 1024 bytes."),
    ];
    for (path, expected) in cases {
        let (status, body) = create(
            &app,
            json!({ "title": path, "description": "D", "thumbnail": format!("{host}/{path}") }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{path}");
        assert_eq!(body["msg"], expected, "{path}");
    }

    let body = get_json(&app, "/messages").await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn slow_thumbnail_times_out_as_a_fetch_failure() {
    let host = asset_host().await;
    let app = app_with_fetch_timeout(Arc::new(DisabledTranscriber), Duration::from_millis(300));

    let (status, body) = create(
        &app,
        json!({ "title": "T", "description": "D", "thumbnail": format!("{host}/slow.png") }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Failed to fetch thumbnail image from URL");
}

#[tokio::test]
async fn streamed_thumbnail_over_the_cap_is_too_large() {
    let app = app();

    let (status, body) = create(
        &app,
        json!({ "title": "big", "description": "D", "thumbnail": chunked_image_host(10).await }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Image size must be less than 1024 bytes.");

    let (status, _) = create(
        &app,
        json!({ "title": "small", "description": "D", "thumbnail": chunked_image_host(1).await }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn rejected_thumbnail_on_update_keeps_the_old_row() {
    let host = asset_host().await;
    let app = app();
    create(&app, json!({ "title": "T", "description": "D", "tags": ["x"] })).await;

    let (status, _) = send(
        &app,
        Method::PUT,
        "/messages?id=1",
        Some(json!({ "description": "changed", "thumbnail": format!("{host}/doc.pdf") })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = get_json(&app, "/messages?id=1").await;
    assert_eq!(body["data"][0]["description"], "D");
    assert_eq!(body["data"][0]["tags"], json!(["x"]));
}

#[tokio::test]
async fn video_without_content_type_is_rejected() {
    let host = asset_host().await;
    let app = app();
    let (status, body) = create(
        &app,
        json!({ "title": "T", "description": "D", "video": format!("{host}/untyped") }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Only video/mp4 formats are allowed.");
}

// -- Transcripts --

#[tokio::test]
async fn transcript_is_generated_on_request() {
    let host = asset_host().await;
    let app = app_with(Arc::new(Fixed("hello world")));
    let video = format!("{host}/clip.mp4");

    create(&app, json!({ "title": "with", "description": "D", "video": video, "gen_transcript": true })).await;
    create(&app, json!({ "title": "without", "description": "D", "video": video })).await;

    let body = get_json(&app, "/messages").await;
    assert_eq!(body["data"][0]["video"], video.as_str());
    assert_eq!(body["data"][0]["transcript"], "hello world");
    assert_eq!(body["data"][1]["transcript"], Value::Null);
}

#[tokio::test]
async fn failed_transcription_stores_placeholder() {
    let host = asset_host().await;
    let app = app_with(Arc::new(Failing));
    let (status, _) = create(
        &app,
        json!({
            "title": "T",
            "description": "D",
            "video": format!("{host}/clip.mp4"),
            "gen_transcript": true,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let body = get_json(&app, "/messages").await;
    assert_eq!(body["data"][0]["transcript"], TRANSCRIPT_UNAVAILABLE);
}

#[tokio::test]
async fn http_transcriber_reads_text_field() {
    let host = asset_host().await;
    let transcriber = HttpTranscriber::new(client(), format!("{host}/transcribe"), Some("key".into()));
    let app = app_with(Arc::new(transcriber));
    let video = format!("{host}/clip.mp4");

    create(&app, json!({ "title": "T", "description": "D", "video": video, "gen_transcript": true })).await;

    let body = get_json(&app, "/messages").await;
    assert_eq!(body["data"][0]["transcript"], format!("heard {video}").as_str());
}

#[tokio::test]
async fn removing_the_video_clears_the_transcript() {
    let host = asset_host().await;
    let app = app_with(Arc::new(Fixed("words")));
    create(
        &app,
        json!({
            "title": "T",
            "description": "D",
            "video": format!("{host}/clip.mp4"),
            "gen_transcript": true,
        }),
    )
    .await;

    send(&app, Method::PUT, "/messages?id=1", Some(json!({ "description": "D" }))).await;

    let body = get_json(&app, "/messages").await;
    assert_eq!(body["data"][0]["video"], Value::Null);
    assert_eq!(body["data"][0]["transcript"], Value::Null);
}

// -- Tags --

#[tokio::test]
async fn repeated_tag_names_create_one_tag() {
    let app = app();
    let (status, _) = send(&app, Method::POST, "/tags", Some(json!({ "tags": ["x", "x", " x "] }))).await;
    assert_eq!(status, StatusCode::CREATED);
    send(&app, Method::POST, "/tags", Some(json!({ "tags": ["x"] }))).await;

    let body = get_json(&app, "/tags?name=x").await;
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["name"], "x");
}

#[tokio::test]
async fn tag_list_is_required() {
    let app = app();
    for payload in [json!({}), json!({ "tags": [] })] {
        let (status, body) = send(&app, Method::POST, "/tags", Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["msg"], "A list of tags is required");
    }

    let (status, _) = send(&app, Method::POST, "/tags", Some(json!({ "tags": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tags_filter_by_message_title_fragment() {
    let app = app();
    create(&app, json!({ "title": "Weekly Digest", "description": "d", "tags": ["weekly", "digest"] })).await;
    create(&app, json!({ "title": "Release notes", "description": "d", "tags": ["release", "weekly"] })).await;
    send(&app, Method::POST, "/tags", Some(json!({ "tags": ["unused"] }))).await;

    let body = get_json(&app, "/tags?message=digest").await;
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["weekly", "digest"]);

    let body = get_json(&app, "/tags").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 4);
}

// -- Message tags --

#[tokio::test]
async fn linking_existing_pairs_does_not_count() {
    let app = app();
    create(&app, json!({ "title": "a", "description": "d", "tags": ["x"] })).await;
    create(&app, json!({ "title": "b", "description": "d" })).await;
    send(&app, Method::POST, "/tags", Some(json!({ "tags": ["y"] }))).await;

    let payload = json!({ "message_ids": [1, 2], "tag_ids": [1, 2] });
    let (status, body) = send(&app, Method::POST, "/message_tags", Some(payload.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["count"], 3);
    assert_eq!(body["msg"], "Message Tags assigned successfully: 3");

    let (status, body) = send(&app, Method::POST, "/message_tags", Some(payload)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["count"], 0);

    let body = get_json(&app, "/messages?tag=y").await;
    assert_eq!(titles(&body), vec!["a", "b"]);
}

#[tokio::test]
async fn linking_requires_ids() {
    let app = app();
    let (status, body) =
        send(&app, Method::POST, "/message_tags", Some(json!({ "tag_ids": [1] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "message_ids is required and cannot be empty");

    let (status, body) = send(
        &app,
        Method::POST,
        "/message_tags",
        Some(json!({ "message_ids": [1], "tag_ids": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "tag_ids is required and cannot be empty");

    let (status, body) = send(
        &app,
        Method::POST,
        "/message_tags",
        Some(json!({ "message_ids": [7], "tag_ids": [1] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["msg"], "Message not found: 7");
}

// -- Index --

#[tokio::test]
async fn index_lists_routes() {
    let app = app();
    let body = get_json(&app, "/").await;
    let routes = body["data"].as_array().unwrap();
    assert!(routes.iter().any(|r| r["url"] == "/message_tags" && r["methods"] == json!(["POST"])));
    assert!(routes.iter().any(|r| r["endpoint"] == "update_message"));
}
