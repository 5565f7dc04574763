use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use storyforge_core::providers::{
    OllamaStoryboardProvider, OpenAiCompatibleStoryboardProvider, ProviderError,
    StoryboardProvider, StoryboardRequest,
};

use super::config_for;

fn request() -> StoryboardRequest {
    StoryboardRequest {
        story: "A fox ran. It hid.".to_string(),
        style: Some("watercolor".to_string()),
        scene_count: 2,
    }
}

#[tokio::test]
async fn test_ollama_chat_in_json_mode() {
    let server = MockServer::start().await;
    let content = json!({
        "storyboard": [
            {"scene_id": "s1", "title": "Run", "prompt": "fox, running", "narration": "A fox ran.", "bgm": ""},
            {"scene_id": "s2", "title": "", "description": "fox, burrow", "voiceover": "It hid.", "bgm": "calm"}
        ]
    })
    .to_string();
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "qwen2.5:0.5b",
            "format": "json",
            "stream": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": content}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OllamaStoryboardProvider::new(&config_for("ollama", &server)).unwrap();
    let scenes = provider.generate_storyboard(&request()).await.unwrap();

    assert_eq!(scenes.len(), 2);
    assert_eq!(scenes[0].title, "Run");
    assert_eq!(scenes[0].bgm, None);
    assert_eq!(scenes[1].title, "Scene 2");
    assert_eq!(scenes[1].prompt, "fox, burrow");
    assert_eq!(scenes[1].narration, "It hid.");
    assert_eq!(scenes[1].bgm.as_deref(), Some("calm"));
}

#[tokio::test]
async fn test_ollama_user_prompt_carries_story_style_and_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"content": "{\"storyboard\": []}"}
        })))
        .mount(&server)
        .await;

    let provider = OllamaStoryboardProvider::new(&config_for("ollama", &server)).unwrap();
    provider.generate_storyboard(&request()).await.unwrap();

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    let user = body["messages"][1]["content"].as_str().unwrap();
    assert_eq!(
        user,
        "Story: A fox ran. It hid.\nStyle: watercolor\nScenes: 2"
    );
    assert_eq!(body["messages"][0]["role"], "system");
}

#[tokio::test]
async fn test_ollama_empty_message_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": {"content": "  "}})))
        .mount(&server)
        .await;

    let provider = OllamaStoryboardProvider::new(&config_for("ollama", &server)).unwrap();
    let err = provider.generate_storyboard(&request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::MalformedResponse { .. }), "{err}");
    assert_eq!(err.backend(), "ollama");
}

#[tokio::test]
async fn test_openai_compatible_completion_with_bearer_key() {
    let server = MockServer::start().await;
    let content = "```json\n{\"scenes\": [{\"title\": \"Dawn\", \"prompt\": \"fox\", \"narration\": \"It wakes.\"}]}\n```";
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "local-model",
            "response_format": {"type": "json_object"},
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config_for("openai_compatible", &server);
    config.model = Some("local-model".to_string());
    config.api_key = Some("sk-test".to_string());
    let provider = OpenAiCompatibleStoryboardProvider::new(&config).unwrap();

    let scenes = provider.generate_storyboard(&request()).await.unwrap();
    assert_eq!(scenes.len(), 1);
    assert_eq!(scenes[0].title, "Dawn");
    assert_eq!(scenes[0].narration, "It wakes.");
}

#[tokio::test]
async fn test_openai_compatible_without_choices_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let mut config = config_for("openai_compatible", &server);
    config.model = Some("local-model".to_string());
    let provider = OpenAiCompatibleStoryboardProvider::new(&config).unwrap();

    let err = provider.generate_storyboard(&request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::MalformedResponse { .. }), "{err}");
}

#[tokio::test]
async fn test_hosted_backend_requires_api_key() {
    if std::env::var("DEEPSEEK_API_KEY").is_ok() {
        return;
    }
    let server = MockServer::start().await;
    let err = OpenAiCompatibleStoryboardProvider::new(&config_for("deepseek", &server)).unwrap_err();
    assert!(err.to_string().contains("providers.storyboard.api_key"), "{err}");
}

#[tokio::test]
async fn test_rate_limit_is_bad_request_and_outage_is_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
        .mount(&server)
        .await;

    let provider = OllamaStoryboardProvider::new(&config_for("ollama", &server)).unwrap();

    let first = provider.generate_storyboard(&request()).await.unwrap_err();
    assert_eq!(
        first,
        ProviderError::BadRequest {
            backend: "ollama".to_string(),
            status: 429,
            body: "slow down".to_string(),
        }
    );
    assert!(!first.is_retryable());

    let second = provider.generate_storyboard(&request()).await.unwrap_err();
    assert!(matches!(second, ProviderError::Upstream { status: 503, .. }));
    assert!(second.is_retryable());
}
