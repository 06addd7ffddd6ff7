use std::net::SocketAddr;
use std::path::Path;

use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use base64::Engine;
use image::{DynamicImage, RgbaImage};
use reqwest::multipart::{Form, Part};
use retouch::Action;
use retouch_server::{
    config::{ImageGenConfig, LlmConfig},
    dispatch::Dispatcher,
    interpreter::CommandInterpreter,
    routes::{router, AppState},
    storage::Storage,
    transforms::encode_png,
};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

const BODY_LIMIT: usize = 5_000_000;

fn png(width: u32, height: u32) -> Vec<u8> {
    encode_png(&DynamicImage::ImageRgba8(RgbaImage::new(width, height))).expect("encode png")
}

async fn start_server(router: Router) -> (SocketAddr, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    (addr, server)
}

async fn state_with(
    storage_dir: &Path,
    interpreter: CommandInterpreter,
    dispatcher: Dispatcher,
) -> AppState {
    AppState {
        interpreter,
        dispatcher,
        storage: Storage::open(storage_dir).await.expect("storage"),
    }
}

async fn keyword_server(storage_dir: &Path) -> (SocketAddr, JoinHandle<()>) {
    let state = state_with(
        storage_dir,
        CommandInterpreter::keyword_only(),
        Dispatcher::new(None),
    )
    .await;
    start_server(router(state, BODY_LIMIT)).await
}

/// A chat-completions endpoint that always gives the same reply.
async fn mock_llm(reply: &'static str) -> (SocketAddr, JoinHandle<()>) {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move || async move {
            Json(json!({
                "id": "chatcmpl-test",
                "object": "chat.completion",
                "created": 0,
                "model": "test-model",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": reply},
                    "finish_reason": "stop",
                    "logprobs": null
                }],
                "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
            }))
        }),
    );
    start_server(app).await
}

/// An image generation endpoint that returns a 3x3 PNG to callers holding `test-key`.
async fn mock_image_api() -> (SocketAddr, JoinHandle<()>) {
    let app = Router::new().route(
        "/v1/images/generations",
        post(|headers: HeaderMap, Json(body): Json<Value>| async move {
            let authorized = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                == Some("Bearer test-key");
            if !authorized || body["response_format"] != "b64_json" {
                return (StatusCode::UNAUTHORIZED, Json(json!({"error": "nope"})));
            }
            let encoded = base64::engine::general_purpose::STANDARD.encode(png(3, 3));
            (StatusCode::OK, Json(json!({"data": [{"b64_json": encoded}]})))
        }),
    );
    start_server(app).await
}

fn llm_interpreter(addr: SocketAddr) -> CommandInterpreter {
    CommandInterpreter::from_config(&LlmConfig {
        api_key: Some("test-key".into()),
        api_base: format!("http://{addr}/v1"),
        ..Default::default()
    })
    .expect("interpreter")
}

async fn send_command(
    addr: SocketAddr,
    command: &str,
    image: Option<Vec<u8>>,
) -> reqwest::Response {
    let mut form = Form::new().text("command", command.to_string());
    if let Some(image) = image {
        form = form.part(
            "image",
            Part::bytes(image)
                .file_name("input.png")
                .mime_str("image/png")
                .expect("mime"),
        );
    }
    reqwest::Client::new()
        .post(format!("http://{addr}/voice-command"))
        .multipart(form)
        .send()
        .await
        .expect("http")
}

async fn png_dimensions(response: reqwest::Response) -> (u32, u32) {
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().expect("header"),
        "image/png"
    );
    let bytes = response.bytes().await.expect("body");
    let img = image::load_from_memory(&bytes).expect("decodable image");
    (img.width(), img.height())
}

#[tokio::test]
async fn rotate_zero_keeps_dimensions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (addr, server) = keyword_server(dir.path()).await;

    let response = send_command(addr, "rotate 0", Some(png(6, 4))).await;
    assert_eq!(png_dimensions(response).await, (6, 4));

    let response = send_command(addr, "please rotate by 90 degrees", Some(png(6, 4))).await;
    assert_eq!(png_dimensions(response).await, (4, 6));

    server.abort();
}

#[tokio::test]
async fn every_edit_is_reachable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (addr, server) = keyword_server(dir.path()).await;

    for (command, expected) in [
        ("blur 2", (8, 8)),
        ("brightness 150", (8, 8)),
        ("contrast 50", (8, 8)),
        ("crop left 2 top 2 right 6 bottom 5", (4, 3)),
    ] {
        let response = send_command(addr, command, Some(png(8, 8))).await;
        assert_eq!(png_dimensions(response).await, expected, "{command}");
    }

    server.abort();
}

#[tokio::test]
async fn unknown_commands_are_client_errors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (addr, server) = keyword_server(dir.path()).await;

    let response = send_command(addr, "xyzzy", Some(png(2, 2))).await;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("json");
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));

    server.abort();
}

#[tokio::test]
async fn edits_without_an_image_are_client_errors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (addr, server) = keyword_server(dir.path()).await;

    let response = send_command(addr, "crop left 1 top 1 right 2 bottom 2", None).await;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("json");
    assert!(body["error"]
        .as_str()
        .is_some_and(|e| e.contains("No image provided")));

    server.abort();
}

#[tokio::test]
async fn broken_images_are_server_errors_with_details() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (addr, server) = keyword_server(dir.path()).await;

    let response = send_command(addr, "blur 3", Some(b"this is not a picture".to_vec())).await;
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["error"], "Image processing failed");
    assert!(body["details"].as_str().is_some_and(|d| !d.is_empty()));

    server.abort();
}

#[tokio::test]
async fn generate_without_credential_is_a_server_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (addr, server) = keyword_server(dir.path()).await;

    let response = send_command(addr, "generate a lighthouse at dusk", None).await;
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.expect("json");
    assert!(body["error"]
        .as_str()
        .is_some_and(|e| e.contains("not configured")));

    server.abort();
}

#[tokio::test]
async fn generate_calls_the_provider() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (image_addr, image_api) = mock_image_api().await;
    let dispatcher = Dispatcher::from_config(&ImageGenConfig {
        api_key: Some("test-key".into()),
        endpoint: format!("http://{image_addr}/v1/images/generations"),
        ..Default::default()
    })
    .expect("dispatcher");
    let state = state_with(dir.path(), CommandInterpreter::keyword_only(), dispatcher).await;
    let (addr, server) = start_server(router(state, BODY_LIMIT)).await;

    let response = send_command(addr, "Generate a lighthouse at dusk", None).await;
    assert_eq!(png_dimensions(response).await, (3, 3));

    server.abort();
    image_api.abort();
}

#[tokio::test]
async fn generate_with_a_rejected_credential_reports_upstream() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (image_addr, image_api) = mock_image_api().await;
    let dispatcher = Dispatcher::from_config(&ImageGenConfig {
        api_key: Some("wrong-key".into()),
        endpoint: format!("http://{image_addr}/v1/images/generations"),
        ..Default::default()
    })
    .expect("dispatcher");
    let state = state_with(dir.path(), CommandInterpreter::keyword_only(), dispatcher).await;
    let (addr, server) = start_server(router(state, BODY_LIMIT)).await;

    let response = send_command(addr, "generate a lighthouse", None).await;
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["error"], "Image generation failed");
    assert!(body["details"]
        .as_str()
        .is_some_and(|d| d.contains("401")));

    server.abort();
    image_api.abort();
}

#[tokio::test]
async fn model_answers_drive_the_edit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (llm_addr, llm) = mock_llm("```json\n{\"action\": \"rotate\", \"angle\": 90}\n```").await;
    let state = state_with(
        dir.path(),
        llm_interpreter(llm_addr),
        Dispatcher::new(None),
    )
    .await;
    let (addr, server) = start_server(router(state, BODY_LIMIT)).await;

    // keyword parsing alone would not understand this
    let response = send_command(addr, "turn it on its side", Some(png(6, 4))).await;
    assert_eq!(png_dimensions(response).await, (4, 6));

    server.abort();
    llm.abort();
}

#[tokio::test]
async fn unusable_model_answers_fall_back_to_keywords() {
    let (llm_addr, llm) = mock_llm("Sorry, I can only chat about the weather.").await;
    let interpreter = llm_interpreter(llm_addr);
    assert!(interpreter.has_language_model());
    assert_eq!(
        interpreter.interpret("blur 10").await,
        Action::Blur { radius: 10.0 }
    );
    assert_eq!(interpreter.interpret("xyzzy").await, Action::Unknown);
    llm.abort();
}

#[tokio::test]
async fn unreachable_model_falls_back_to_keywords() {
    // Grab a free port, then close it so nothing is listening
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let interpreter = llm_interpreter(addr);
    for text in ["rotate 45", "brightness 120", "xyzzy"] {
        assert_eq!(
            interpreter.interpret(text).await,
            retouch::simple_parse(text),
            "{text}"
        );
    }
}

#[tokio::test]
async fn upload_list_download() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (addr, server) = keyword_server(dir.path()).await;
    let client = reqwest::Client::new();

    let form = Form::new().part(
        "image",
        Part::bytes(png(5, 5))
            .file_name("holiday photo.png")
            .mime_str("image/png")
            .expect("mime"),
    );
    let stored: Value = client
        .post(format!("http://{addr}/upload"))
        .multipart(form)
        .send()
        .await
        .expect("upload")
        .json()
        .await
        .expect("json");
    let name = stored["name"].as_str().expect("name").to_string();
    assert!(name.ends_with("holiday_photo.png"));

    let listed: Vec<Value> = client
        .get(format!("http://{addr}/uploads"))
        .send()
        .await
        .expect("list")
        .json()
        .await
        .expect("json");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["name"], name.as_str());

    let download = client
        .get(format!("http://{addr}/uploads/{name}"))
        .send()
        .await
        .expect("download");
    assert_eq!(download.status(), reqwest::StatusCode::OK);
    assert_eq!(
        download.headers()["content-type"].to_str().expect("header"),
        "image/png"
    );
    assert_eq!(download.bytes().await.expect("body").to_vec(), png(5, 5));

    let missing = client
        .get(format!("http://{addr}/uploads/nothing-here.png"))
        .send()
        .await
        .expect("download");
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    server.abort();
}

#[tokio::test]
async fn upload_without_a_file_is_a_client_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (addr, server) = keyword_server(dir.path()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/upload"))
        .multipart(Form::new().text("note", "hello"))
        .send()
        .await
        .expect("upload");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    server.abort();
}

#[tokio::test]
async fn oversized_uploads_are_too_large() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = state_with(
        dir.path(),
        CommandInterpreter::keyword_only(),
        Dispatcher::new(None),
    )
    .await;
    let (addr, server) = start_server(router(state, 1024)).await;

    let form = Form::new().part(
        "file",
        Part::bytes(vec![7u8; 16 * 1024]).file_name("big.bin"),
    );
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/upload"))
        .multipart(form)
        .send()
        .await
        .expect("upload");
    assert_eq!(response.status(), reqwest::StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = response.json().await.expect("json body");
    assert!(body["error"].as_str().is_some(), "{body}");

    server.abort();
}

#[tokio::test]
async fn health() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (addr, server) = keyword_server(dir.path()).await;
    let response = reqwest::get(format!("http://{addr}/health"))
        .await
        .expect("health");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    server.abort();
}
