//! Prompt and response format shared by the chat-completion storyboard backends.
//!
//! Backends are asked for `{"storyboard": [{"title", "prompt", "narration", "bgm"}]}`.
//! Parsing is lenient about the field names models commonly substitute.

use serde_json::Value;

use super::errors::{ProviderError, ProviderResult};
use super::traits::{SceneDraft, StoryboardRequest};

pub const SYSTEM_PROMPT: &str = "You are a storyboard assistant for short video production. \
Split the story into EXACTLY the requested number of scenes. \
Reply with JSON only, in the form \
{\"storyboard\": [{\"scene_id\": \"s1\", \"title\": \"...\", \"prompt\": \"...\", \"narration\": \"...\", \"bgm\": \"\"}]}. \
title: a 2-5 word scene title. \
prompt: comma-separated English keywords for a text-to-image model (subject, action, setting, lighting, mood, camera, style). \
narration: one or two sentences read aloud over the scene, in the story's language. \
bgm: empty or a single mood keyword.";

pub fn user_prompt(request: &StoryboardRequest) -> String {
    let mut prompt = format!("Story: {}\n", request.story);
    if let Some(style) = request.style.as_deref().filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!("Style: {style}\n"));
    }
    prompt.push_str(&format!("Scenes: {}", request.scene_count));
    prompt
}

/// Chat messages for the request, system prompt first
pub fn messages(request: &StoryboardRequest) -> Value {
    serde_json::json!([
        {"role": "system", "content": SYSTEM_PROMPT},
        {"role": "user", "content": user_prompt(request)},
    ])
}

/// Parse model output into scene drafts
pub fn parse_storyboard(backend: &str, content: &str) -> ProviderResult<Vec<SceneDraft>> {
    let content = strip_code_fence(content);
    if content.is_empty() {
        return Err(ProviderError::malformed(backend, "empty completion"));
    }

    let parsed: Value = serde_json::from_str(content)
        .map_err(|e| ProviderError::malformed(backend, format!("completion is not JSON: {e}")))?;

    let items = match &parsed {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("storyboard").or_else(|| map.get("scenes")) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ProviderError::malformed(
                    backend,
                    "completion is missing the storyboard list",
                ))
            }
        },
        _ => {
            return Err(ProviderError::malformed(
                backend,
                "completion is missing the storyboard list",
            ))
        }
    };

    Ok(items
        .iter()
        .enumerate()
        .map(|(idx, raw)| scene_from_value(idx + 1, raw))
        .collect())
}

fn scene_from_value(index: usize, raw: &Value) -> SceneDraft {
    // Some models wrap each scene in a one-element list
    let item = match raw {
        Value::Array(inner) => inner.first().unwrap_or(&Value::Null),
        other => other,
    };

    let field = |names: &[&str]| -> String {
        names
            .iter()
            .filter_map(|name| item.get(*name).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())
            .unwrap_or_default()
            .to_string()
    };

    let title = field(&["title"]);
    SceneDraft {
        title: if title.is_empty() {
            format!("Scene {index}")
        } else {
            title
        },
        prompt: field(&["prompt", "description"]),
        narration: field(&["narration", "voiceover"]),
        bgm: Some(field(&["bgm"])).filter(|b| !b.is_empty()),
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
