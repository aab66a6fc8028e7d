//! HTTP API used by the browser front end.
//!
//! Thin JSON handlers over the core providers: speech synthesis, dialogue
//! turns, character and topic generation, the CSV news database and Reddit.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use newsdebate_core::news::{FALLBACK_DESCRIPTION, FALLBACK_TITLE, parse_csv_news, random_item};
use newsdebate_core::reddit::RedditClient;
use newsdebate_core::{
    CharacterGenerator, Config, DebateError, DialogueGenerator, ElevenLabsClient, OpenAiChat,
    Secrets, SpeechError, SpeechSynthesizer, TopicGenerator, TurnRequest,
};

const ENDPOINTS: &[&str] = &[
    "/api/text-to-speech",
    "/api/news",
    "/api/debate",
    "/api/generate-characters",
    "/api/generate-topic",
    "/api/stories",
];

/// Shared handles for every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub dialogue: Arc<dyn DialogueGenerator>,
    pub characters: Arc<dyn CharacterGenerator>,
    pub topics: Arc<dyn TopicGenerator>,
    pub reddit: Arc<RedditClient>,
}

impl AppState {
    /// Build the production providers. Missing API keys are reported per
    /// request, so the server starts without them.
    pub fn from_config(config: Config, secrets: &Secrets) -> Result<Self, DebateError> {
        let chat = Arc::new(OpenAiChat::new(&config, secrets)?);
        let speech = Arc::new(ElevenLabsClient::new(
            config.elevenlabs.clone(),
            secrets.eleven_labs_api_key.clone(),
        )?);
        let reddit = Arc::new(RedditClient::new(config.reddit.clone())?);

        if !chat.has_api_key() {
            tracing::warn!("OPENAI_API_KEY not set; generation routes will fail");
        }
        if !speech.has_api_key() {
            tracing::warn!("ELEVEN_LABS_API_KEY not set; text-to-speech will fail");
        }

        Ok(Self {
            config: Arc::new(config),
            speech,
            dialogue: chat.clone(),
            characters: chat.clone(),
            topics: chat,
            reddit,
        })
    }
}

/// A JSON error response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": error.into() }),
        }
    }

    fn with_details(status: StatusCode, error: &str, details: &str) -> Self {
        Self {
            status,
            body: json!({ "error": error, "details": details }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn status_or_bad_gateway(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_GATEWAY)
}

impl From<SpeechError> for ApiError {
    fn from(err: SpeechError) -> Self {
        let status = status_or_bad_gateway(err.status());
        match &err {
            SpeechError::MissingApiKey | SpeechError::EmptyAudio => Self::new(status, err.to_string()),
            SpeechError::Transport(_) => Self::new(status, "Internal server error"),
            _ => Self::with_details(status, "ElevenLabs API error", err.details().unwrap_or_default()),
        }
    }
}

impl From<DebateError> for ApiError {
    fn from(err: DebateError) -> Self {
        match err {
            DebateError::InvalidInput(msg) => Self::new(StatusCode::BAD_REQUEST, msg),
            DebateError::ConfigError(msg) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg),
            DebateError::Speech(e) => e.into(),
            DebateError::Upstream { status, body } => {
                Self::with_details(status_or_bad_gateway(status), "Upstream API error", &body)
            }
            other => Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

/// CORS per config: `"*"` allows any origin, otherwise the listed origins
/// with credentials.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(86400))
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.allowed_origins);

    Router::new()
        .route("/", get(api_status))
        .route("/api/text-to-speech", get(tts_status).post(text_to_speech))
        .route("/api/news", get(random_news))
        .route("/api/debate", post(debate_turn))
        .route("/api/generate-characters", post(generate_characters))
        .route("/api/generate-topic", post(generate_topic))
        .route("/api/stories", get(top_stories))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(state: AppState) -> Result<(), DebateError> {
    let bind = state.config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(%bind, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}

async fn api_status() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "API is running",
        "endpoints": ENDPOINTS,
    }))
}

async fn tts_status() -> Json<Value> {
    Json(json!({ "status": "Text-to-speech API is running" }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeechBody {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    voice_id: Option<String>,
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn text_to_speech(
    State(state): State<AppState>,
    Json(body): Json<SpeechBody>,
) -> Result<Json<Value>, ApiError> {
    let (Some(text), Some(voice_id)) = (required(body.text), required(body.voice_id)) else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Text and voiceId are required",
        ));
    };

    let audio = state.speech.synthesize(&text, &voice_id).await.map_err(|e| {
        tracing::error!(error = %e, "text-to-speech failed");
        ApiError::from(e)
    })?;
    Ok(Json(json!({ "audioContent": audio })))
}

fn news_fallback(status: StatusCode, error: Option<&str>) -> (StatusCode, Json<Value>) {
    let mut body = json!({
        "title": FALLBACK_TITLE,
        "description": FALLBACK_DESCRIPTION,
    });
    if let Some(error) = error {
        body["error"] = json!(error);
    }
    (status, Json(body))
}

async fn random_news(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let path = &state.config.news.csv_path;
    if !path.exists() {
        return news_fallback(StatusCode::NOT_FOUND, Some("News database file not found"));
    }

    let items = match tokio::fs::read_to_string(path)
        .await
        .map_err(DebateError::from)
        .and_then(|text| parse_csv_news(&text))
    {
        Ok(items) => items,
        Err(e) => {
            tracing::error!(error = %e, path = %path.display(), "failed to read news database");
            return news_fallback(StatusCode::INTERNAL_SERVER_ERROR, Some("Internal server error"));
        }
    };

    match random_item(&items, &mut rand::thread_rng()) {
        Some(item) => (
            StatusCode::OK,
            Json(json!({ "title": item.title, "description": item.description })),
        ),
        None => news_fallback(StatusCode::OK, None),
    }
}

async fn debate_turn(
    State(state): State<AppState>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.topic.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Topic is required"));
    }
    let text = state.dialogue.generate_turn(&request).await?;
    Ok(Json(json!({ "text": text })))
}

#[derive(Deserialize)]
struct TopicBody {
    #[serde(default)]
    topic: Option<String>,
}

async fn generate_characters(
    State(state): State<AppState>,
    Json(body): Json<TopicBody>,
) -> Result<Json<Value>, ApiError> {
    let Some(topic) = required(body.topic) else {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Topic is required"));
    };
    let characters = state.characters.generate_characters(&topic).await?;
    Ok(Json(json!({ "characters": characters })))
}

async fn generate_topic(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match state.topics.generate_topic().await {
        Ok(topic) => Ok(Json(json!({ "topic": topic }))),
        Err(e) => {
            tracing::error!(error = %e, "topic generation failed");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate topic",
            ))
        }
    }
}

#[derive(Deserialize)]
struct StoriesQuery {
    limit: Option<usize>,
}

async fn top_stories(
    State(state): State<AppState>,
    Query(query): Query<StoriesQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let stories = state.reddit.fetch_top_posts(limit).await?;
    Ok(Json(json!(stories)))
}
