pub mod assembler;
pub mod backgrounds;
pub mod cleanup;
pub mod encoder;
pub mod imagemaker;
pub mod segmenter;
pub mod tts;

pub use assembler::{Assembler, AssemblyReport};
pub use backgrounds::{BackgroundPreparer, BackgroundTracks};
pub use cleanup::{cleanup_all, cleanup_reel};
pub use encoder::{probe_duration, EncoderRunner, RealEncoderRunner};
pub use imagemaker::{ImageMaker, SlideRenderer};
pub use segmenter::{segment_post, split_text};
pub use tts::{build_engine, TtsEngine, TtsRenderer};

use crossposter_core::{AssemblyError, CoreError, RedditPost, ReelConfig, Segment};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ReelOutput {
    pub path: PathBuf,
    pub reel_id: String,
    pub segments: Vec<Segment>,
    pub duration: f64,
}

/// Turns a fetched post into a narrated vertical video.
pub struct ReelCreator {
    config: ReelConfig,
    tts: TtsRenderer,
    slides: Box<dyn SlideRenderer>,
    backgrounds: BackgroundPreparer,
    assembler: Assembler,
}

impl ReelCreator {
    pub fn new(
        config: ReelConfig,
        engine: Box<dyn TtsEngine>,
        slides: Box<dyn SlideRenderer>,
        runner: Arc<dyn EncoderRunner>,
    ) -> Result<Self, CoreError> {
        let tts = TtsRenderer::new(engine, runner.clone(), config.video.fallback_segment_secs);
        let backgrounds = BackgroundPreparer::new(
            runner.clone(),
            &config.temp_dir,
            config.background.clone(),
            config.video.clone(),
        )?;
        let assembler = Assembler::new(runner, config.video.clone(), config.background.audio_volume);
        Ok(Self {
            config,
            tts,
            slides,
            backgrounds,
            assembler,
        })
    }

    /// Wires the real TTS engine, font renderer and ffmpeg install.
    pub fn from_config(config: ReelConfig) -> Result<Self, CoreError> {
        let runner = RealEncoderRunner::locate(&config.video)?;
        let engine = build_engine(&config.tts)?;
        let slides = ImageMaker::new(
            &config.fonts,
            &config.text,
            config.video.width,
            config.video.height,
        )?;
        Self::new(config, engine, Box::new(slides), Arc::new(runner))
    }

    pub async fn generate_reel(&self, post: &RedditPost, output: &Path) -> Result<ReelOutput, CoreError> {
        let reel_id = reel_id_for(post);
        let work_dir = self.config.temp_dir.join(&reel_id);
        let audio_dir = work_dir.join("audio");
        let img_dir = work_dir.join("img");
        tokio::fs::create_dir_all(&audio_dir).await?;
        tokio::fs::create_dir_all(&img_dir).await?;
        info!("Generating reel {} for post {}", reel_id, post.id);

        let texts = segment_post(
            post,
            self.config.text.max_segment_chars,
            self.config.text.max_comments,
        );
        if texts.is_empty() {
            return Err(AssemblyError::NoSegments.into());
        }

        let mut segments = Vec::with_capacity(texts.len());
        for text in &texts {
            let (audio_clip_path, duration) = self.tts.render(text, &audio_dir).await?;
            let image_path = img_dir.join(format!("{}.png", text.file_stem()));
            self.slides.render(text, &image_path)?;
            segments.push(Segment {
                kind: text.kind,
                text: text.text.clone(),
                audio_clip_path,
                image_path,
                duration,
            });
        }

        let total: f64 = segments.iter().map(|s| s.duration).sum();
        info!("{} segments, {:.2}s of narration", segments.len(), total);

        let tracks = self.backgrounds.prepare(total, &work_dir).await?;
        let assembled = work_dir.join(format!("reel_{}.mp4", reel_id));
        let report = self
            .assembler
            .assemble(&segments, &tracks, &work_dir, &assembled)
            .await?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        move_file(&assembled, output).await?;
        info!("Reel saved to {}", output.display());

        if self.config.keep_temp_files {
            info!("Keeping temp files in {}", work_dir.display());
        } else if let Err(e) = cleanup_reel(&self.config.temp_dir, &reel_id).await {
            warn!("Could not clean up {}: {}", work_dir.display(), e);
        }

        Ok(ReelOutput {
            path: output.to_path_buf(),
            reel_id,
            segments,
            duration: report.duration,
        })
    }
}

/// Temp directory name for a post: its id when it has a usable one.
fn reel_id_for(post: &RedditPost) -> String {
    let id: String = post
        .id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if id.is_empty() {
        uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
    } else {
        id
    }
}

/// Renames, falling back to copy + remove across filesystems.
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::test_support::create_mock_output;
    use crate::encoder::MockEncoderRunner;
    use crate::imagemaker::MockSlideRenderer;
    use crate::tts::MockTtsEngine;
    use crossposter_core::{SegmentKind, TtsError};

    fn post() -> RedditPost {
        RedditPost {
            id: "abc".to_string(),
            title: "A great story".to_string(),
            selftext: "Hello world.".to_string(),
            ..Default::default()
        }
    }

    fn config(base: &Path) -> ReelConfig {
        let mut config = ReelConfig::default();
        config.temp_dir = base.join("temp");
        config.background.use_video = false;
        config.background.use_audio = false;
        config
    }

    fn engine() -> MockTtsEngine {
        let mut engine = MockTtsEngine::new();
        engine.expect_name().return_const("mock");
        engine.expect_file_extension().return_const("mp3");
        engine.expect_synthesize().returning(|_, _| Ok(()));
        engine
    }

    fn runner() -> MockEncoderRunner {
        let mut runner = MockEncoderRunner::new();
        runner.expect_run_ffmpeg().returning(|args| {
            std::fs::write(args.last().unwrap(), b"mp4").unwrap();
            Ok(create_mock_output("", "", true))
        });
        runner
            .expect_run_ffprobe_for_duration()
            .returning(|_| Ok(create_mock_output("1.5\n", "", true)));
        runner
    }

    fn slides() -> MockSlideRenderer {
        let mut slides = MockSlideRenderer::new();
        slides.expect_render().times(2).returning(|_, _| Ok(()));
        slides
    }

    #[tokio::test]
    async fn test_generate_reel_end_to_end_with_doubles() {
        let dir = tempfile::tempdir().unwrap();
        let creator = ReelCreator::new(
            config(dir.path()),
            Box::new(engine()),
            Box::new(slides()),
            Arc::new(runner()),
        )
        .unwrap();

        let output = dir.path().join("reels_output").join("abc.mp4");
        let reel = creator.generate_reel(&post(), &output).await.unwrap();

        assert!(output.exists());
        assert_eq!(reel.reel_id, "abc");
        let kinds: Vec<SegmentKind> = reel.segments.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SegmentKind::Title, SegmentKind::Body]);
        assert!(reel.segments[0].image_path.ends_with("img/title_000.png"));
        assert!(reel.segments[1].audio_clip_path.ends_with("audio/body_001.mp3"));
        assert!(!dir.path().join("temp").join("abc").exists());
    }

    #[tokio::test]
    async fn test_keep_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.keep_temp_files = true;
        let creator =
            ReelCreator::new(config, Box::new(engine()), Box::new(slides()), Arc::new(runner())).unwrap();

        creator
            .generate_reel(&post(), &dir.path().join("out.mp4"))
            .await
            .unwrap();
        assert!(dir.path().join("temp").join("abc").join("clips").exists());
    }

    #[tokio::test]
    async fn test_failure_leaves_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = MockTtsEngine::new();
        engine.expect_name().return_const("mock");
        engine.expect_file_extension().return_const("mp3");
        engine.expect_synthesize().returning(|_, _| {
            Err(TtsError::RequestFailed {
                provider: "mock".to_string(),
                reason: "offline".to_string(),
            })
        });

        let creator = ReelCreator::new(
            config(dir.path()),
            Box::new(engine),
            Box::new(MockSlideRenderer::new()),
            Arc::new(MockEncoderRunner::new()),
        )
        .unwrap();

        let result = creator.generate_reel(&post(), &dir.path().join("out.mp4")).await;
        assert!(matches!(result, Err(CoreError::Tts(_))));
        assert!(dir.path().join("temp").join("abc").exists());
        assert!(!dir.path().join("out.mp4").exists());
    }

    #[test]
    fn test_reel_id_falls_back_to_uuid() {
        assert_eq!(reel_id_for(&post()), "abc");
        let anonymous = RedditPost::default();
        assert_eq!(reel_id_for(&anonymous).len(), 8);
    }
}
