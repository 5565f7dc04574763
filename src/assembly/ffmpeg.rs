//! `ffmpeg` invocation via `tokio::process`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use super::{AssemblyError, AssemblyRequest, AssemblyResult, MediaAssembler};
use crate::storage::absolutize;

#[derive(Debug, Clone)]
pub struct FfmpegAssembler {
    program: String,
}

impl FfmpegAssembler {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    async fn execute(&self, args: Vec<String>) -> AssemblyResult<()> {
        let started = Instant::now();
        debug!(program = %self.program, args = ?args, "Running media tool");

        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AssemblyError::Spawn {
                program: self.program.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(AssemblyError::CommandFailed {
                program: self.program.clone(),
                code: output.status.code(),
                stderr: tail(&String::from_utf8_lossy(&output.stderr), 2000),
            });
        }
        debug!(
            program = %self.program,
            duration_ms = started.elapsed().as_millis() as u64,
            "Media tool finished"
        );
        Ok(())
    }
}

impl Default for FfmpegAssembler {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl MediaAssembler for FfmpegAssembler {
    #[instrument(skip(self, request), fields(clips = request.clips.len(), output = %request.output.display()))]
    async fn assemble(&self, request: &AssemblyRequest) -> AssemblyResult<PathBuf> {
        if request.clips.is_empty() {
            return Err(AssemblyError::NoClips);
        }
        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let list_path = request.output.with_extension("concat.txt");
        tokio::fs::write(&list_path, concat_list(&request.clips)).await?;

        let result = self.execute(assemble_args(request, &list_path)).await;
        // The list file is scratch either way
        let _ = tokio::fs::remove_file(&list_path).await;
        result?;

        info!(output = %request.output.display(), "🎬 Final video assembled");
        Ok(request.output.clone())
    }

    async fn still_clip(
        &self,
        image: &Path,
        duration: f64,
        fps: u32,
        output: &Path,
    ) -> AssemblyResult<PathBuf> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.execute(still_clip_args(image, duration, fps, output))
            .await?;
        Ok(output.to_path_buf())
    }
}

/// Concat-demuxer list file body.
///
/// The demuxer resolves relative entries against the list file's directory, so
/// every entry is written absolute.
pub fn concat_list(clips: &[PathBuf]) -> String {
    clips
        .iter()
        .map(|clip| {
            let path = absolutize(clip.clone())
                .display()
                .to_string()
                .replace('\'', "'\\''");
            format!("file '{path}'\n")
        })
        .collect()
}

fn scale_filter(resolution: &str) -> Option<String> {
    let (w, h) = resolution.split_once('x')?;
    let (w, h) = (w.trim().parse::<u32>().ok()?, h.trim().parse::<u32>().ok()?);
    Some(format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"
    ))
}

/// Arguments for the final concat + narration mux
pub fn assemble_args(request: &AssemblyRequest, list_path: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        list_path.display().to_string(),
    ];
    if let Some(audio) = &request.audio {
        args.extend(["-i".into(), audio.display().to_string()]);
    }
    if let Some(filter) = scale_filter(&request.resolution) {
        args.extend(["-vf".into(), filter]);
    }
    args.extend([
        "-r".into(),
        request.fps.to_string(),
        "-c:v".into(),
        "libx264".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
    ]);
    if request.audio.is_some() {
        args.extend([
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "1:a:0".into(),
            "-c:a".into(),
            "aac".into(),
            "-shortest".into(),
        ]);
    }
    args.extend(["-f".into(), request.format.clone()]);
    args.push(request.output.display().to_string());
    args
}

/// Arguments rendering a looped still image into a clip
pub fn still_clip_args(image: &Path, duration: f64, fps: u32, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-loop".into(),
        "1".into(),
        "-i".into(),
        image.display().to_string(),
        "-t".into(),
        format!("{duration:.2}"),
        "-r".into(),
        fps.to_string(),
        "-c:v".into(),
        "libx264".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        output.display().to_string(),
    ]
}

fn tail(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= max {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - max;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}
