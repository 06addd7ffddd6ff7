use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::{
    config::Config,
    dispatch::Dispatcher,
    errors::{WebError, WebResult},
    interpreter::CommandInterpreter,
    storage::{content_type, Storage, StoredFile},
};

/// Everything a handler needs. Cheap to clone; nothing in here is mutated after startup.
#[derive(Clone)]
pub struct AppState {
    pub interpreter: CommandInterpreter,
    pub dispatcher: Dispatcher,
    pub storage: Storage,
}

impl AppState {
    pub async fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            interpreter: CommandInterpreter::from_config(&config.interpreter)?,
            dispatcher: Dispatcher::from_config(&config.generator)?,
            storage: Storage::open(&config.storage.path).await?,
        })
    }
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        // `GET /health` goes to `health`
        .route("/health", get(health))
        // `POST /voice-command` goes to `voice_command`
        .route("/voice-command", post(voice_command))
        // `POST /upload` goes to `upload`
        .route("/upload", post(upload))
        // `GET /uploads` goes to `list_uploads`
        .route("/uploads", get(list_uploads))
        // `GET /uploads/:name` goes to `download`
        .route("/uploads/:name", get(download))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(
            tower_http::compression::CompressionLayer::new()
                .quality(tower_http::CompressionLevel::Fastest),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

// Just reply that everything is okay
async fn health() -> StatusCode {
    StatusCode::OK
}

/// Interpret the `command` field and apply it to the optional `image` field, replying with a PNG.
async fn voice_command(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> WebResult<impl IntoResponse> {
    let mut command = String::new();
    let mut image: Option<Bytes> = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "command" => command = field.text().await?,
            "image" => image = Some(field.bytes().await?),
            _ => {}
        }
    }
    tracing::info!(command = %command, "Voice command received");

    let action = state.interpreter.interpret(&command).await;
    tracing::info!(?action, "Command interpreted");

    let edited = state.dispatcher.dispatch(&action, image.as_deref()).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], edited))
}

/// Save the `image` (or `file`) field to storage.
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> WebResult<Json<StoredFile>> {
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name != "image" && name != "file" {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content = field.bytes().await?;
        if content.is_empty() {
            return Err(WebError::BadRequest("Uploaded file is empty".into()));
        }
        return Ok(Json(state.storage.save(&file_name, &content).await?));
    }
    Err(WebError::BadRequest("No file provided".into()))
}

async fn list_uploads(State(state): State<AppState>) -> WebResult<Json<Vec<StoredFile>>> {
    Ok(Json(state.storage.list().await?))
}

async fn download(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> WebResult<impl IntoResponse> {
    let bytes = state.storage.read(&name).await?;
    Ok(([(header::CONTENT_TYPE, content_type(&name))], bytes))
}
