//! HTTP backends for the local media model services.
//!
//! Each service takes a JSON request and answers with either the raw media body
//! or a JSON document carrying a base64 payload or a path on a shared volume.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Response;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;

use super::errors::{ProviderError, ProviderResult};
use super::http::{is_json, HttpBackend};
use super::traits::{
    AnimationProvider, AnimationRequest, ClipOutput, ImageProvider, ImageRequest, SpeechProvider,
    SpeechRequest, SynthesizedAudio,
};
use crate::config::{ConfigResult, ProviderConfig};
use crate::constants::DEFAULT_SAMPLE_RATE;

/// Header carrying the sample rate of a raw audio body
pub const SAMPLE_RATE_HEADER: &str = "x-sample-rate";

#[derive(Debug, Default, Deserialize)]
struct MediaEnvelope {
    image_base64: Option<String>,
    audio_base64: Option<String>,
    video_base64: Option<String>,
    video_path: Option<String>,
    path: Option<String>,
    #[serde(default)]
    images: Vec<PathItem>,
    sample_rate: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PathItem {
    path: String,
}

impl MediaEnvelope {
    fn first_path(&self) -> Option<&str> {
        self.video_path
            .as_deref()
            .or(self.path.as_deref())
            .or_else(|| self.images.first().map(|i| i.path.as_str()))
    }
}

fn decode_base64(backend: &str, payload: &str) -> ProviderResult<Vec<u8>> {
    STANDARD
        .decode(payload.trim())
        .map_err(|e| ProviderError::malformed(backend, format!("invalid base64 payload: {e}")))
}

async fn read_shared_file(backend: &str, path: &str) -> ProviderResult<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| ProviderError::malformed(backend, format!("cannot read {path}: {e}")))
}

async fn envelope_or_bytes(
    backend: &HttpBackend,
    response: Response,
) -> ProviderResult<Result<MediaEnvelope, Vec<u8>>> {
    if is_json(&response) {
        Ok(Ok(backend.read_json(response).await?))
    } else {
        Ok(Err(backend.read_bytes(response).await?))
    }
}

fn non_empty(backend: &str, bytes: Vec<u8>) -> ProviderResult<Vec<u8>> {
    if bytes.is_empty() {
        return Err(ProviderError::malformed(backend, "empty media body"));
    }
    Ok(bytes)
}

/// Text-to-image service (`POST /generate`)
#[derive(Debug, Clone)]
pub struct HttpImageProvider {
    backend: HttpBackend,
}

impl HttpImageProvider {
    pub fn new(config: &ProviderConfig) -> ConfigResult<Self> {
        Ok(Self {
            backend: HttpBackend::new("image", config)?,
        })
    }
}

#[async_trait]
impl ImageProvider for HttpImageProvider {
    fn name(&self) -> &str {
        self.backend.name()
    }

    async fn generate_image(&self, request: &ImageRequest) -> ProviderResult<Vec<u8>> {
        let body = json!({
            "prompt": request.prompt,
            "negative_prompt": request.negative_prompt,
            "width": request.width,
            "height": request.height,
            "style": {"width": request.width, "height": request.height},
            "scene_id": request.scene_id,
        });
        let response = self.backend.post_json("generate", &body, &[]).await?;

        let bytes = match envelope_or_bytes(&self.backend, response).await? {
            Err(raw) => raw,
            Ok(envelope) => {
                if let Some(b64) = &envelope.image_base64 {
                    decode_base64(self.name(), b64)?
                } else if let Some(path) = envelope.first_path() {
                    read_shared_file(self.name(), path).await?
                } else {
                    return Err(ProviderError::malformed(self.name(), "no image in response"));
                }
            }
        };
        non_empty(self.name(), bytes)
    }
}

/// Text-to-speech service (`POST /synthesize`)
#[derive(Debug, Clone)]
pub struct HttpSpeechProvider {
    backend: HttpBackend,
}

impl HttpSpeechProvider {
    pub fn new(config: &ProviderConfig) -> ConfigResult<Self> {
        Ok(Self {
            backend: HttpBackend::new("speech", config)?,
        })
    }
}

#[async_trait]
impl SpeechProvider for HttpSpeechProvider {
    fn name(&self) -> &str {
        self.backend.name()
    }

    async fn synthesize_speech(&self, request: &SpeechRequest) -> ProviderResult<SynthesizedAudio> {
        let response = self.backend.post_json("synthesize", request, &[]).await?;
        let header_rate = response
            .headers()
            .get(SAMPLE_RATE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok());

        let (bytes, sample_rate) = match envelope_or_bytes(&self.backend, response).await? {
            Err(raw) => (raw, header_rate),
            Ok(envelope) => {
                let bytes = if let Some(b64) = &envelope.audio_base64 {
                    decode_base64(self.name(), b64)?
                } else if let Some(path) = envelope.first_path() {
                    read_shared_file(self.name(), path).await?
                } else {
                    return Err(ProviderError::malformed(self.name(), "no audio in response"));
                };
                (bytes, envelope.sample_rate.or(header_rate))
            }
        };

        Ok(SynthesizedAudio {
            bytes: non_empty(self.name(), bytes)?,
            sample_rate: sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
        })
    }
}

/// Image-to-video service (`POST /animate`)
#[derive(Debug, Clone)]
pub struct HttpAnimationProvider {
    backend: HttpBackend,
}

impl HttpAnimationProvider {
    pub fn new(config: &ProviderConfig) -> ConfigResult<Self> {
        Ok(Self {
            backend: HttpBackend::new("animation", config)?,
        })
    }
}

#[async_trait]
impl AnimationProvider for HttpAnimationProvider {
    fn name(&self) -> &str {
        self.backend.name()
    }

    async fn animate_image(&self, request: &AnimationRequest) -> ProviderResult<ClipOutput> {
        let response = self.backend.post_json("animate", request, &[]).await?;

        match envelope_or_bytes(&self.backend, response).await? {
            Err(raw) => Ok(ClipOutput::Bytes(non_empty(self.name(), raw)?)),
            Ok(envelope) => {
                if let Some(b64) = &envelope.video_base64 {
                    Ok(ClipOutput::Bytes(non_empty(
                        self.name(),
                        decode_base64(self.name(), b64)?,
                    )?))
                } else if let Some(path) = envelope.first_path() {
                    Ok(ClipOutput::Path(PathBuf::from(path)))
                } else {
                    Err(ProviderError::malformed(self.name(), "no clip in response"))
                }
            }
        }
    }
}
