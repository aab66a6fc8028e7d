use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use newsdebate_core::config::ElevenLabsConfig;
use newsdebate_core::reddit::RedditClient;
use newsdebate_core::{
    Character, CharacterGenerator, Config, DebateError, DialogueGenerator, ElevenLabsClient,
    SpeechSynthesizer, Slot, TopicGenerator, TurnRequest,
};
use newsdebate_server::{AppState, router};

struct EchoChat;

#[async_trait]
impl DialogueGenerator for EchoChat {
    async fn generate_turn(&self, request: &TurnRequest) -> Result<String, DebateError> {
        Ok(format!(
            "Character {} on {}",
            request.character.number(),
            request.topic
        ))
    }
}

#[async_trait]
impl CharacterGenerator for EchoChat {
    async fn generate_characters(&self, _topic: &str) -> Result<Vec<Character>, DebateError> {
        Ok(vec![
            Character::new(Slot::One, "Ada", "v1"),
            Character::new(Slot::Two, "Grace", "v2"),
        ])
    }
}

#[async_trait]
impl TopicGenerator for EchoChat {
    async fn generate_topic(&self) -> Result<String, DebateError> {
        Err(DebateError::ConfigError("OpenAI API key not configured".to_string()))
    }
}

struct TestApp {
    dir: TempDir,
    config: Config,
}

impl TestApp {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.news.csv_path = dir.path().join("news_database.csv");
        Self { dir, config }
    }

    fn state(&self, speech: Arc<dyn SpeechSynthesizer>) -> AppState {
        let chat = Arc::new(EchoChat);
        AppState {
            config: Arc::new(self.config.clone()),
            speech,
            dialogue: chat.clone(),
            characters: chat.clone(),
            topics: chat,
            reddit: Arc::new(RedditClient::new(self.config.reddit.clone()).unwrap()),
        }
    }

    fn without_speech_key(&self) -> AppState {
        self.state(Arc::new(
            ElevenLabsClient::new(ElevenLabsConfig::default(), None).unwrap(),
        ))
    }
}

fn elevenlabs_at(server: &MockServer) -> Arc<dyn SpeechSynthesizer> {
    let config = ElevenLabsConfig {
        base_url: server.uri(),
        ..ElevenLabsConfig::default()
    };
    Arc::new(ElevenLabsClient::new(config, Some("secret".to_string())).unwrap())
}

async fn send(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_status_routes() {
    let app = TestApp::new();

    let (status, body) = send(app.without_speech_key(), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["message"], "API is running");
    assert!(
        body["endpoints"]
            .as_array()
            .unwrap()
            .contains(&json!("/api/news"))
    );

    let (status, body) = send(app.without_speech_key(), get("/api/text-to-speech")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Text-to-speech API is running");
}

#[tokio::test]
async fn test_tts_requires_text_and_voice() {
    let app = TestApp::new();
    for body in [
        json!({"text": "hello"}),
        json!({"voiceId": "v"}),
        json!({"text": "  ", "voiceId": "v"}),
    ] {
        let (status, body) = send(
            app.without_speech_key(),
            post_json("/api/text-to-speech", body),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Text and voiceId are required");
    }
}

#[tokio::test]
async fn test_tts_without_key_is_server_error() {
    let app = TestApp::new();
    let (status, body) = send(
        app.without_speech_key(),
        post_json("/api/text-to-speech", json!({"text": "hi", "voiceId": "v"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "ElevenLabs API key not configured");
}

#[tokio::test]
async fn test_tts_passes_upstream_status_through() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/text-to-speech/limited"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/text-to-speech/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp3".to_vec()))
        .mount(&server)
        .await;

    let app = TestApp::new();
    let (status, body) = send(
        app.state(elevenlabs_at(&server)),
        post_json("/api/text-to-speech", json!({"text": "hi", "voiceId": "limited"})),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "ElevenLabs API error");
    assert_eq!(body["details"], "slow down");

    let (status, body) = send(
        app.state(elevenlabs_at(&server)),
        post_json("/api/text-to-speech", json!({"text": "hi", "voiceId": "ok"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["audioContent"], "bXAz");
}

#[tokio::test]
async fn test_news_falls_back_when_database_missing_or_empty() {
    let app = TestApp::new();

    let (status, body) = send(app.without_speech_key(), get("/api/news")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "News database file not found");
    assert_eq!(
        body["title"],
        "Breaking: Technical Difficulties at AI News Network"
    );

    std::fs::write(&app.config.news.csv_path, "").unwrap();
    let (status, body) = send(app.without_speech_key(), get("/api/news")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("error").is_none());
    assert_eq!(
        body["description"],
        "Our AI anchors are experiencing temporary issues."
    );
}

#[tokio::test]
async fn test_news_returns_a_database_item() {
    let app = TestApp::new();
    std::fs::write(
        app.dir.path().join("news_database.csv"),
        "\"title\",\"content\"\n\"Only headline\",\"Only body\"\n",
    )
    .unwrap();

    let (status, body) = send(app.without_speech_key(), get("/api/news")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"title": "Only headline", "description": "Only body"}));
}

#[tokio::test]
async fn test_generation_routes() {
    let app = TestApp::new();

    let (status, body) = send(
        app.without_speech_key(),
        post_json(
            "/api/debate",
            json!({"topic": "Cats", "messages": [], "character": 2}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "Character 2 on Cats");

    let (status, body) = send(
        app.without_speech_key(),
        post_json("/api/generate-characters", json!({"topic": "Cats"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["characters"][1]["character_number"], 2);
    assert_eq!(body["characters"][0]["name"], "Ada");

    let (status, _) = send(
        app.without_speech_key(),
        post_json("/api/generate-characters", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        app.without_speech_key(),
        post_json("/api/generate-topic", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to generate topic");
}

#[tokio::test]
async fn test_cors_preflight_allows_configured_origin() {
    let app = TestApp::new();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/text-to-speech")
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = router(app.without_speech_key())
        .oneshot(request)
        .await
        .unwrap();
    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:5173"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "86400");
}
