//! # Scene Normalizer
//!
//! Storyboard backends rarely return exactly what was asked for. This module
//! turns raw [`SceneDraft`]s into exactly `scene_count` shots:
//!
//! - extra scenes are truncated
//! - missing scenes are padded with placeholders narrated from the story's sentences
//! - empty titles become `Scene {n}`, empty prompts fall back to the title
//! - a style is appended to prompts that do not already mention it
//!
//! Zero scenes is a provider failure, not something to pad over.

use crate::models::NewShot;
use crate::providers::{ProviderError, ProviderResult, SceneDraft};

const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', '。', '！', '？', '\n'];

/// Split a story into trimmed, non-empty sentences
pub fn story_sentences(story: &str) -> Vec<String> {
    story
        .split(SENTENCE_TERMINATORS)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn normalize_scenes(
    backend: &str,
    drafts: Vec<SceneDraft>,
    scene_count: u32,
    story: &str,
    style: Option<&str>,
) -> ProviderResult<Vec<NewShot>> {
    if drafts.is_empty() {
        return Err(ProviderError::generation(
            backend,
            "storyboard backend returned no scenes",
        ));
    }

    let target = scene_count as usize;
    let sentences = story_sentences(story);
    let style = style.map(str::trim).filter(|s| !s.is_empty());

    let mut scenes: Vec<SceneDraft> = drafts.into_iter().take(target).collect();
    while scenes.len() < target {
        let index = scenes.len();
        let narration = if sentences.is_empty() {
            story.trim().to_string()
        } else {
            sentences[index % sentences.len()].clone()
        };
        scenes.push(SceneDraft {
            title: String::new(),
            prompt: narration.clone(),
            narration,
            bgm: None,
        });
    }

    Ok(scenes
        .into_iter()
        .enumerate()
        .map(|(index, draft)| to_new_shot(index as u32 + 1, draft, style))
        .collect())
}

/// Append `style` to `prompt` unless the prompt already mentions it
pub fn apply_style(prompt: &str, style: Option<&str>) -> String {
    match style.map(str::trim).filter(|s| !s.is_empty()) {
        Some(style) if !prompt.to_lowercase().contains(&style.to_lowercase()) => {
            format!("{prompt}, {style}")
        }
        _ => prompt.to_string(),
    }
}

fn to_new_shot(order: u32, draft: SceneDraft, style: Option<&str>) -> NewShot {
    let title = match draft.title.trim() {
        "" => format!("Scene {order}"),
        title => title.to_string(),
    };
    let prompt = match draft.prompt.trim() {
        "" => title.clone(),
        prompt => prompt.to_string(),
    };
    let prompt = apply_style(&prompt, style);

    NewShot {
        title,
        description: draft.prompt.trim().to_string(),
        narration: draft.narration.trim().to_string(),
        prompt,
        negative_prompt: None,
        bgm: draft.bgm.filter(|b| !b.trim().is_empty()),
    }
}
