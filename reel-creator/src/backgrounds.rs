//! Background video and music preparation.
//!
//! Sources are local paths or http(s) URLs. Downloads are cached under the
//! temp base so repeated runs do not fetch the same file again. Each track is
//! cut to the total narration length from a random offset, or looped when the
//! source is shorter than the narration.

use crate::encoder::{probe_duration, run_ffmpeg_checked, seconds_arg, EncoderRunner};
use crossposter_core::{AssemblyError, BackgroundConfig, VideoConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// Prepared tracks for one reel. Either may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackgroundTracks {
    pub video: Option<PathBuf>,
    pub audio: Option<PathBuf>,
}

/// Where to start reading a source of `source_len` seconds so that `needed`
/// seconds are available. `None` means the source has to be looped.
pub fn pick_start(source_len: f64, needed: f64) -> Option<f64> {
    if source_len > needed {
        Some(fastrand::f64() * (source_len - needed))
    } else {
        None
    }
}

fn input_args(input: &Path, start: Option<f64>, duration: f64) -> Vec<String> {
    let mut args = vec!["-y".to_string()];
    match start {
        Some(offset) => {
            args.push("-ss".to_string());
            args.push(seconds_arg(offset));
        }
        None => {
            args.push("-stream_loop".to_string());
            args.push("-1".to_string());
        }
    }
    args.extend([
        "-t".to_string(),
        seconds_arg(duration),
        "-i".to_string(),
        input.display().to_string(),
    ]);
    args
}

/// ffmpeg arguments that cut, crop and scale the background video to the
/// frame size. Audio is dropped; narration and music are mixed later.
pub fn video_cut_args(
    input: &Path,
    start: Option<f64>,
    duration: f64,
    already_vertical: bool,
    video: &VideoConfig,
    output: &Path,
) -> Vec<String> {
    let mut filters = Vec::new();
    if !already_vertical {
        filters.push(format!(
            "crop=trunc(ih*{}/{}/2)*2:ih",
            video.width, video.height
        ));
    }
    filters.push(format!("scale={}:{}", video.width, video.height));
    filters.push(format!("fps={}", video.fps));
    filters.push("setsar=1".to_string());

    let mut args = input_args(input, start, duration);
    args.extend([
        "-vf".to_string(),
        filters.join(","),
        "-an".to_string(),
        "-c:v".to_string(),
        video.video_codec.clone(),
        "-preset".to_string(),
        video.preset.clone(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        output.display().to_string(),
    ]);
    args
}

pub fn audio_cut_args(
    input: &Path,
    start: Option<f64>,
    duration: f64,
    video: &VideoConfig,
    output: &Path,
) -> Vec<String> {
    let mut args = input_args(input, start, duration);
    args.extend([
        "-vn".to_string(),
        "-c:a".to_string(),
        video.audio_codec.clone(),
        "-ar".to_string(),
        "44100".to_string(),
        "-ac".to_string(),
        "2".to_string(),
        output.display().to_string(),
    ]);
    args
}

pub struct BackgroundPreparer {
    runner: Arc<dyn EncoderRunner>,
    client: reqwest::Client,
    cache_dir: PathBuf,
    background: BackgroundConfig,
    video: VideoConfig,
}

impl BackgroundPreparer {
    pub fn new(
        runner: Arc<dyn EncoderRunner>,
        temp_base: &Path,
        background: BackgroundConfig,
        video: VideoConfig,
    ) -> Result<Self, AssemblyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| AssemblyError::BackgroundUnavailable {
                source_path: "http client".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            runner,
            client,
            cache_dir: temp_base.join("backgrounds"),
            background,
            video,
        })
    }

    /// Prepares both tracks for `duration` seconds into `<work_dir>/background/`.
    /// A broken video source fails the reel; a broken music source only
    /// drops the music.
    pub async fn prepare(&self, duration: f64, work_dir: &Path) -> Result<BackgroundTracks, AssemblyError> {
        let out_dir = work_dir.join("background");
        let mut tracks = BackgroundTracks::default();

        if let Some(source) = self.background.video() {
            tokio::fs::create_dir_all(&out_dir)
                .await
                .map_err(|e| unavailable(source, e))?;
            let input = self.resolve(source).await?;
            let output = out_dir.join("video.mp4");
            let start = self.start_for(&input, duration).await?;
            let args = video_cut_args(
                &input,
                start,
                duration,
                self.background.already_vertical,
                &self.video,
                &output,
            );
            run_ffmpeg_checked(self.runner.as_ref(), args).await?;
            info!("Background video ready: {}", output.display());
            tracks.video = Some(output);
        }

        if let Some(source) = self.background.audio() {
            match self.prepare_audio(source, duration, &out_dir).await {
                Ok(output) => {
                    info!("Background audio ready: {}", output.display());
                    tracks.audio = Some(output);
                }
                Err(e) => warn!("Continuing without background audio: {}", e),
            }
        }

        Ok(tracks)
    }

    async fn prepare_audio(&self, source: &str, duration: f64, out_dir: &Path) -> Result<PathBuf, AssemblyError> {
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|e| unavailable(source, e))?;
        let input = self.resolve(source).await?;
        let output = out_dir.join("audio.m4a");
        let start = self.start_for(&input, duration).await?;
        let args = audio_cut_args(&input, start, duration, &self.video, &output);
        run_ffmpeg_checked(self.runner.as_ref(), args).await?;
        Ok(output)
    }

    async fn start_for(&self, input: &Path, needed: f64) -> Result<Option<f64>, AssemblyError> {
        let length = probe_duration(self.runner.as_ref(), input).await?;
        if length <= 0.0 {
            return Err(AssemblyError::BackgroundUnavailable {
                source_path: input.display().to_string(),
                reason: "source has zero duration".to_string(),
            });
        }
        Ok(pick_start(length, needed))
    }

    /// Local file, or a URL downloaded once into the cache directory.
    pub async fn resolve(&self, source: &str) -> Result<PathBuf, AssemblyError> {
        let url = match Url::parse(source) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            _ => {
                let path = PathBuf::from(source);
                if path.is_file() {
                    return Ok(path);
                }
                return Err(AssemblyError::BackgroundUnavailable {
                    source_path: source.to_string(),
                    reason: "file does not exist".to_string(),
                });
            }
        };

        let file_name = url
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|name| !name.is_empty())
            .unwrap_or("background")
            .to_string();
        let cached = self.cache_dir.join(file_name);
        if let Ok(meta) = tokio::fs::metadata(&cached).await {
            if meta.len() > 0 {
                return Ok(cached);
            }
        }

        info!("Downloading background {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| unavailable(source, e))?;
        if !response.status().is_success() {
            return Err(AssemblyError::BackgroundUnavailable {
                source_path: source.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }
        let bytes = response.bytes().await.map_err(|e| unavailable(source, e))?;
        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| unavailable(source, e))?;
        tokio::fs::write(&cached, &bytes)
            .await
            .map_err(|e| unavailable(source, e))?;
        Ok(cached)
    }
}

fn unavailable(source: &str, e: impl std::fmt::Display) -> AssemblyError {
    AssemblyError::BackgroundUnavailable {
        source_path: source.to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::test_support::create_mock_output;
    use crate::encoder::MockEncoderRunner;

    #[test]
    fn test_pick_start_within_bounds() {
        for _ in 0..100 {
            let start = pick_start(60.0, 20.0).unwrap();
            assert!((0.0..=40.0).contains(&start));
        }
        assert_eq!(pick_start(10.0, 20.0), None);
        assert_eq!(pick_start(20.0, 20.0), None);
    }

    #[test]
    fn test_video_args_crop_unless_vertical() {
        let video = VideoConfig::default();
        let args = video_cut_args(
            Path::new("bg.mp4"),
            Some(5.0),
            12.5,
            false,
            &video,
            Path::new("out.mp4"),
        );
        let joined = args.join(" ");
        assert!(joined.contains("-ss 5.000 -t 12.500 -i bg.mp4"));
        assert!(joined.contains("crop=trunc(ih*1080/1920/2)*2:ih,scale=1080:1920"));
        assert!(args.contains(&"-an".to_string()));
        assert_eq!(args.last().unwrap(), "out.mp4");

        let vertical = video_cut_args(Path::new("bg.mp4"), None, 3.0, true, &video, Path::new("o.mp4"));
        let joined = vertical.join(" ");
        assert!(joined.contains("-stream_loop -1"));
        assert!(!joined.contains("crop="));
    }

    #[test]
    fn test_audio_args_drop_video() {
        let args = audio_cut_args(
            Path::new("music.mp3"),
            None,
            8.0,
            &VideoConfig::default(),
            Path::new("a.m4a"),
        );
        assert!(args.contains(&"-vn".to_string()));
        assert!(args.join(" ").contains("-stream_loop -1 -t 8.000 -i music.mp3"));
    }

    #[tokio::test]
    async fn test_missing_local_source_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let preparer = BackgroundPreparer::new(
            Arc::new(MockEncoderRunner::new()),
            dir.path(),
            BackgroundConfig::default(),
            VideoConfig::default(),
        )
        .unwrap();
        let result = preparer.resolve("/nope/background.mp4").await;
        assert!(matches!(result, Err(AssemblyError::BackgroundUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_prepare_local_video_without_music() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.mp4");
        std::fs::write(&source, b"fake video").unwrap();

        let mut runner = MockEncoderRunner::new();
        runner
            .expect_run_ffprobe_for_duration()
            .times(1)
            .returning(|_| Ok(create_mock_output("120.0\n", "", true)));
        runner
            .expect_run_ffmpeg()
            .times(1)
            .withf(|args| args.iter().any(|a| a == "-an"))
            .returning(|_| Ok(create_mock_output("", "", true)));

        let background = BackgroundConfig {
            use_video: true,
            video_source: Some(source.display().to_string()),
            use_audio: false,
            ..BackgroundConfig::default()
        };
        let preparer =
            BackgroundPreparer::new(Arc::new(runner), dir.path(), background, VideoConfig::default()).unwrap();

        let work = dir.path().join("reel_1");
        let tracks = preparer.prepare(10.0, &work).await.unwrap();
        assert_eq!(tracks.video, Some(work.join("background").join("video.mp4")));
        assert_eq!(tracks.audio, None);
    }

    #[tokio::test]
    async fn test_broken_music_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let background = BackgroundConfig {
            use_video: false,
            use_audio: true,
            audio_source: Some("/missing/music.mp3".to_string()),
            ..BackgroundConfig::default()
        };
        let preparer = BackgroundPreparer::new(
            Arc::new(MockEncoderRunner::new()),
            dir.path(),
            background,
            VideoConfig::default(),
        )
        .unwrap();

        let tracks = preparer.prepare(10.0, dir.path()).await.unwrap();
        assert_eq!(tracks, BackgroundTracks::default());
    }
}
