//! Post-download clip conversion.
//!
//! The cameras record raw H.264 at a reduced frame rate. `ffmpeg` rewrites
//! the presentation timestamps so the clip plays back at 30 fps speed and
//! wraps it in an `.mp4` next to the original.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Converts a downloaded clip.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Convert `clip`, returning the path of the new file if one was made.
    async fn transcode(&self, clip: &Path) -> Result<Option<PathBuf>>;
}

/// Leaves clips as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTranscoder;

#[async_trait]
impl Transcoder for NoopTranscoder {
    async fn transcode(&self, _clip: &Path) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// Playback rate clips are re-timed to.
pub const PLAYBACK_FPS: f64 = 30.0;

/// Runs `ffmpeg -i in.h264 -vf setpts=N*PTS in.mp4`.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
    fps: u32,
}

impl FfmpegTranscoder {
    /// Transcode clips recorded at `fps` using `ffmpeg` from `PATH`.
    pub fn new(fps: u32) -> Self {
        Self::with_program("ffmpeg", fps)
    }

    pub fn with_program(program: impl Into<PathBuf>, fps: u32) -> Self {
        Self {
            program: program.into(),
            fps: fps.max(1),
        }
    }

    /// The `setpts` filter for this frame rate.
    pub fn filter(&self) -> String {
        format!("setpts={}*PTS", PLAYBACK_FPS / f64::from(self.fps))
    }

    fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            // Never overwrite, never prompt
            "-n".into(),
            "-i".into(),
            input.into(),
            "-vf".into(),
            self.filter().into(),
            output.into(),
        ]
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, clip: &Path) -> Result<Option<PathBuf>> {
        if clip.extension().is_none_or(|ext| ext != "h264") {
            debug!("Not transcoding {}", clip.display());
            return Ok(None);
        }
        let output = clip.with_extension("mp4");

        let result = Command::new(&self.program)
            .args(self.args(clip, &output))
            .stdin(Stdio::null())
            // An abandoned replication tick must not leave ffmpeg running
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Transcode {
                path: clip.to_path_buf(),
                reason: format!("failed to run {}: {}", self.program.display(), e),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(Error::Transcode {
                path: clip.to_path_buf(),
                reason: format!("{}: {}", result.status, stderr.trim()),
            });
        }

        info!("Transcoded {}", output.display());
        Ok(Some(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_filter_scales_to_playback_rate() {
        assert_eq!(FfmpegTranscoder::new(3).filter(), "setpts=10*PTS");
        assert_eq!(FfmpegTranscoder::new(30).filter(), "setpts=1*PTS");
        assert_eq!(FfmpegTranscoder::new(60).filter(), "setpts=0.5*PTS");
    }

    #[test]
    fn test_args() {
        let transcoder = FfmpegTranscoder::new(3);
        let args = transcoder.args(Path::new("/c/a.h264"), Path::new("/c/a.mp4"));
        let args: Vec<_> = args.iter().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(
            &args[4..],
            &["-i", "/c/a.h264", "-vf", "setpts=10*PTS", "/c/a.mp4"]
        );
        assert!(args.contains(&"-n"));
    }

    #[tokio::test]
    async fn test_skips_non_h264() {
        let transcoder = FfmpegTranscoder::with_program("/nonexistent/ffmpeg", 3);
        let result = transcoder
            .transcode(Path::new("/c/2024-01-01T000000.mp4"))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_missing_program_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("2024-01-01T000000.h264");
        std::fs::write(&clip, b"").unwrap();

        let transcoder = FfmpegTranscoder::with_program(dir.path().join("no-ffmpeg"), 3);
        let err = transcoder.transcode(&clip).await.unwrap_err();
        assert!(matches!(err, Error::Transcode { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_abandoned_transcode_kills_child() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let program = dir.path().join("slow-ffmpeg");
        std::fs::write(
            &program,
            format!("#!/bin/sh\nsleep 1\ntouch '{}'\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let clip = dir.path().join("2024-01-01T000000.h264");
        std::fs::write(&clip, b"").unwrap();

        let transcoder = FfmpegTranscoder::with_program(&program, 3);
        let result =
            tokio::time::timeout(Duration::from_millis(100), transcoder.transcode(&clip)).await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_millis(1800)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_noop() {
        assert!(
            NoopTranscoder
                .transcode(Path::new("a.h264"))
                .await
                .unwrap()
                .is_none()
        );
    }
}
