use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;
use std::path::PathBuf;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use storyforge_core::providers::{
    AnimationProvider, AnimationRequest, ClipOutput, HttpAnimationProvider, HttpImageProvider,
    HttpSpeechProvider, ImageProvider, ImageRequest, ProviderError, SpeechProvider, SpeechRequest,
};

use super::config_for;
use crate::common::{FAKE_MP4, FAKE_PNG, FAKE_WAV};

fn image_request() -> ImageRequest {
    ImageRequest {
        prompt: "fox, forest, watercolor".to_string(),
        negative_prompt: Some("blurry".to_string()),
        width: 384,
        height: 256,
        scene_id: Some("s1".to_string()),
    }
}

fn speech_request() -> SpeechRequest {
    SpeechRequest {
        text: "A fox ran.".to_string(),
        voice: None,
        speed: 1.0,
    }
}

fn animation_request() -> AnimationRequest {
    AnimationRequest {
        image_path: PathBuf::from("/data/p1/images/shot_001.png"),
        duration: 5.0,
        fps: 12,
    }
}

#[tokio::test]
async fn test_image_raw_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .and(body_partial_json(json!({
            "prompt": "fox, forest, watercolor",
            "negative_prompt": "blurry",
            "style": {"width": 384, "height": 256},
            "scene_id": "s1",
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(FAKE_PNG),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = HttpImageProvider::new(&config_for("http", &server)).unwrap();
    let bytes = provider.generate_image(&image_request()).await.unwrap();
    assert_eq!(bytes, FAKE_PNG);
}

#[tokio::test]
async fn test_image_base64_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"image_base64": STANDARD.encode(FAKE_PNG)})),
        )
        .mount(&server)
        .await;

    let provider = HttpImageProvider::new(&config_for("http", &server)).unwrap();
    assert_eq!(provider.generate_image(&image_request()).await.unwrap(), FAKE_PNG);
}

#[tokio::test]
async fn test_image_path_on_shared_volume() {
    let dir = tempfile::tempdir().unwrap();
    let shared = dir.path().join("out.png");
    std::fs::write(&shared, FAKE_PNG).unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "images": [{"path": shared.display().to_string()}]
        })))
        .mount(&server)
        .await;

    let provider = HttpImageProvider::new(&config_for("http", &server)).unwrap();
    assert_eq!(provider.generate_image(&image_request()).await.unwrap(), FAKE_PNG);
}

#[tokio::test]
async fn test_image_envelope_without_payload_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;

    let provider = HttpImageProvider::new(&config_for("http", &server)).unwrap();
    let err = provider.generate_image(&image_request()).await.unwrap_err();
    assert_eq!(
        err,
        ProviderError::MalformedResponse {
            backend: "http".to_string(),
            message: "no image in response".to_string(),
        }
    );
}

#[tokio::test]
async fn test_image_empty_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(Vec::<u8>::new()))
        .mount(&server)
        .await;

    let provider = HttpImageProvider::new(&config_for("http", &server)).unwrap();
    let err = provider.generate_image(&image_request()).await.unwrap_err();
    assert!(err.to_string().contains("empty media body"), "{err}");
}

#[tokio::test]
async fn test_image_service_error_carries_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("CUDA out of memory"))
        .mount(&server)
        .await;

    let provider = HttpImageProvider::new(&config_for("http", &server)).unwrap();
    let err = provider.generate_image(&image_request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::Upstream { status: 500, .. }));
    assert!(err.to_string().contains("CUDA out of memory"));
}

#[tokio::test]
async fn test_speech_sample_rate_from_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/synthesize"))
        .and(body_partial_json(json!({"text": "A fox ran.", "speed": 1.0})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/wav")
                .insert_header("x-sample-rate", "16000")
                .set_body_bytes(FAKE_WAV),
        )
        .mount(&server)
        .await;

    let provider = HttpSpeechProvider::new(&config_for("http", &server)).unwrap();
    let audio = provider.synthesize_speech(&speech_request()).await.unwrap();
    assert_eq!(audio.bytes, FAKE_WAV);
    assert_eq!(audio.sample_rate, 16000);
}

#[tokio::test]
async fn test_speech_envelope_sample_rate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/synthesize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "audio_base64": STANDARD.encode(FAKE_WAV),
            "sample_rate": 44100,
        })))
        .mount(&server)
        .await;

    let provider = HttpSpeechProvider::new(&config_for("http", &server)).unwrap();
    let audio = provider.synthesize_speech(&speech_request()).await.unwrap();
    assert_eq!(audio.bytes, FAKE_WAV);
    assert_eq!(audio.sample_rate, 44100);
}

#[tokio::test]
async fn test_speech_rejected_text_is_bad_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/synthesize"))
        .respond_with(ResponseTemplate::new(422).set_body_string("text too long"))
        .mount(&server)
        .await;

    let provider = HttpSpeechProvider::new(&config_for("http", &server)).unwrap();
    let err = provider.synthesize_speech(&speech_request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::BadRequest { status: 422, .. }));
}

#[tokio::test]
async fn test_animation_video_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/animate"))
        .and(body_partial_json(json!({
            "image_path": "/data/p1/images/shot_001.png",
            "fps": 12,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "video_path": "/shared/clips/shot_001.mp4"
        })))
        .mount(&server)
        .await;

    let provider = HttpAnimationProvider::new(&config_for("http", &server)).unwrap();
    let clip = provider.animate_image(&animation_request()).await.unwrap();
    assert_eq!(clip, ClipOutput::Path(PathBuf::from("/shared/clips/shot_001.mp4")));
}

#[tokio::test]
async fn test_animation_raw_clip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/animate"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "video/mp4")
                .set_body_bytes(FAKE_MP4),
        )
        .mount(&server)
        .await;

    let provider = HttpAnimationProvider::new(&config_for("http", &server)).unwrap();
    let clip = provider.animate_image(&animation_request()).await.unwrap();
    assert_eq!(clip, ClipOutput::Bytes(FAKE_MP4.to_vec()));
}

#[tokio::test]
async fn test_unreachable_service_is_transport_error() {
    let server = MockServer::start().await;
    let config = config_for("http", &server);
    drop(server);

    let provider = HttpAnimationProvider::new(&config).unwrap();
    let err = provider.animate_image(&animation_request()).await.unwrap_err();
    assert!(err.is_retryable(), "{err}");
    assert_eq!(err.backend(), "http");
}
