//! Defaults and limits shared by parameter normalization and configuration.

/// Scene count bounds for a storyboard
pub const MIN_SCENE_COUNT: u32 = 1;
pub const MAX_SCENE_COUNT: u32 = 20;
pub const DEFAULT_SCENE_COUNT: u32 = 4;

/// Image dimension bounds, in pixels
pub const MIN_IMAGE_DIMENSION: u32 = 256;
pub const MAX_IMAGE_DIMENSION: u32 = 2048;
pub const DEFAULT_IMAGE_WIDTH: u32 = 384;
pub const DEFAULT_IMAGE_HEIGHT: u32 = 256;

/// Clip frame rate bounds
pub const MIN_FPS: u32 = 4;
pub const MAX_FPS: u32 = 30;
pub const DEFAULT_FPS: u32 = 12;

/// Seconds of video per shot
pub const MIN_CLIP_SECONDS: f64 = 1.0;
pub const MAX_CLIP_SECONDS: f64 = 30.0;
pub const DEFAULT_CLIP_SECONDS: f64 = 5.0;

/// Speech speed multiplier bounds
pub const MIN_SPEECH_SPEED: f32 = 0.5;
pub const MAX_SPEECH_SPEED: f32 = 2.0;
pub const DEFAULT_SPEECH_SPEED: f32 = 1.0;

pub const DEFAULT_SAMPLE_RATE: u32 = 22_050;
pub const DEFAULT_VIDEO_FORMAT: &str = "mp4";
pub const DEFAULT_RESOLUTION: &str = "1280x720";

/// Progress checkpoints reported by the engine
pub mod progress {
    pub const CLAIMED: u8 = 0;
    pub const PROVIDER_CALLED: u8 = 10;
    pub const PROVIDER_RETURNED: u8 = 60;
    pub const OUTPUT_PERSISTED: u8 = 80;
    pub const ASSEMBLING: u8 = 85;
    pub const DONE: u8 = 100;
}

/// Resource type tags used in task results
pub mod resource_types {
    pub const STORYBOARD: &str = "storyboard";
    pub const IMAGE: &str = "image";
    pub const AUDIO: &str = "audio";
    pub const CLIP: &str = "clip";
    pub const VIDEO: &str = "video";
}
