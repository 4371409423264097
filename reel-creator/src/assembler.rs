use crate::backgrounds::BackgroundTracks;
use crate::encoder::{probe_duration, run_ffmpeg_checked, seconds_arg, EncoderRunner};
use crossposter_core::{AssemblyError, Segment, VideoConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drift between the probed output and the summed segment durations that is
/// still put down to encoder rounding.
const DURATION_TOLERANCE_SECS: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyReport {
    pub output: PathBuf,
    pub clip_count: usize,
    pub expected_duration: f64,
    pub duration: f64,
}

pub struct Assembler {
    runner: Arc<dyn EncoderRunner>,
    video: VideoConfig,
    audio_volume: f32,
}

impl Assembler {
    pub fn new(runner: Arc<dyn EncoderRunner>, video: VideoConfig, audio_volume: f32) -> Self {
        Self {
            runner,
            video,
            audio_volume,
        }
    }

    /// Encodes one clip per segment, then joins them and mixes in the
    /// background music. Clips are written to `<work_dir>/clips/`.
    pub async fn assemble(
        &self,
        segments: &[Segment],
        background: &BackgroundTracks,
        work_dir: &Path,
        output: &Path,
    ) -> Result<AssemblyReport, AssemblyError> {
        if segments.is_empty() {
            return Err(AssemblyError::NoSegments);
        }

        let clips_dir = work_dir.join("clips");
        tokio::fs::create_dir_all(&clips_dir)
            .await
            .map_err(|e| io_failure(&clips_dir, e))?;

        let mut clips = Vec::with_capacity(segments.len());
        let mut offset = 0.0;
        for (i, segment) in segments.iter().enumerate() {
            let clip = clips_dir.join(format!("clip_{:03}.mp4", i));
            let args = self.clip_args(segment, background.video.as_deref(), offset, &clip);
            run_ffmpeg_checked(self.runner.as_ref(), args).await?;
            debug!("Clip {} covers {:.2}s at {:.2}s", i, segment.duration, offset);
            offset += segment.duration;
            clips.push(clip);
        }
        let expected = offset;

        let list = work_dir.join("concat_list.txt");
        tokio::fs::write(&list, concat_list(&clips))
            .await
            .map_err(|e| io_failure(&list, e))?;

        let args = self.concat_args(&list, background.audio.as_deref(), output);
        run_ffmpeg_checked(self.runner.as_ref(), args).await?;

        let size = tokio::fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(AssemblyError::EmptyOutput {
                path: output.display().to_string(),
            });
        }

        let duration = probe_duration(self.runner.as_ref(), output).await?;
        if (duration - expected).abs() > DURATION_TOLERANCE_SECS {
            warn!(
                "Output runs {:.2}s, segments add up to {:.2}s",
                duration, expected
            );
        }
        info!(
            "Assembled {} clips into {} ({:.2}s)",
            clips.len(),
            output.display(),
            duration
        );

        Ok(AssemblyReport {
            output: output.to_path_buf(),
            clip_count: clips.len(),
            expected_duration: expected,
            duration,
        })
    }

    fn clip_args(&self, segment: &Segment, background: Option<&Path>, offset: f64, clip: &Path) -> Vec<String> {
        let (w, h, fps) = (self.video.width, self.video.height, self.video.fps);
        let length = seconds_arg(segment.duration);
        let mut args = vec!["-y".to_string()];

        // Input order decides the stream labels used in the filter graph.
        if let Some(bg) = background {
            args.extend([
                "-ss".to_string(),
                seconds_arg(offset),
                "-t".to_string(),
                length.clone(),
                "-i".to_string(),
                bg.display().to_string(),
            ]);
        }
        args.extend([
            "-loop".to_string(),
            "1".to_string(),
            "-framerate".to_string(),
            fps.to_string(),
            "-t".to_string(),
            length.clone(),
            "-i".to_string(),
            segment.image_path.display().to_string(),
            "-i".to_string(),
            segment.audio_clip_path.display().to_string(),
        ]);

        let graph = match background {
            Some(_) => format!(
                "[1:v]scale={w}:{h}:force_original_aspect_ratio=decrease[fg];\
                 [0:v][fg]overlay=(W-w)/2:(H-h)/2,format=yuv420p[v];\
                 [2:a]apad,aresample=44100[a]"
            ),
            None => format!(
                "[0:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
                 pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,format=yuv420p[v];\
                 [1:a]apad,aresample=44100[a]"
            ),
        };

        args.extend([
            "-filter_complex".to_string(),
            graph,
            "-map".to_string(),
            "[v]".to_string(),
            "-map".to_string(),
            "[a]".to_string(),
            "-c:v".to_string(),
            self.video.video_codec.clone(),
            "-preset".to_string(),
            self.video.preset.clone(),
            "-r".to_string(),
            fps.to_string(),
            "-c:a".to_string(),
            self.video.audio_codec.clone(),
            "-ac".to_string(),
            "2".to_string(),
            "-t".to_string(),
            length,
            clip.display().to_string(),
        ]);
        args
    }

    fn concat_args(&self, list: &Path, music: Option<&Path>, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = [
            "-y", "-f", "concat", "-safe", "0", "-i",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(list.display().to_string());

        match music {
            Some(music) => args.extend([
                "-i".to_string(),
                music.display().to_string(),
                "-filter_complex".to_string(),
                format!(
                    "[1:a]volume={:.2}[bg];[0:a][bg]amix=inputs=2:duration=first:dropout_transition=0:normalize=0[a]",
                    self.audio_volume
                ),
                "-map".to_string(),
                "0:v".to_string(),
                "-map".to_string(),
                "[a]".to_string(),
                "-c:v".to_string(),
                "copy".to_string(),
                "-c:a".to_string(),
                self.video.audio_codec.clone(),
            ]),
            None => args.extend(["-c".to_string(), "copy".to_string()]),
        }
        args.extend([
            "-movflags".to_string(),
            "+faststart".to_string(),
            output.display().to_string(),
        ]);
        args
    }
}

/// Concat demuxer input listing every clip in order.
pub fn concat_list(clips: &[PathBuf]) -> String {
    clips
        .iter()
        .map(|clip| {
            let path = std::fs::canonicalize(clip).unwrap_or_else(|_| clip.clone());
            format!("file '{}'\n", path.display().to_string().replace('\'', r"'\''"))
        })
        .collect()
}

fn io_failure(path: &Path, e: std::io::Error) -> AssemblyError {
    AssemblyError::WorkspaceIo {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::test_support::create_mock_output;
    use crate::encoder::MockEncoderRunner;
    use crossposter_core::SegmentKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn segments(durations: &[f64]) -> Vec<Segment> {
        durations
            .iter()
            .enumerate()
            .map(|(i, d)| Segment {
                kind: if i == 0 { SegmentKind::Title } else { SegmentKind::Body },
                text: format!("segment {}", i),
                audio_clip_path: PathBuf::from(format!("audio/{}.mp3", i)),
                image_path: PathBuf::from(format!("img/{}.png", i)),
                duration: *d,
            })
            .collect()
    }

    /// Writes a stand-in file to the output path ffmpeg would have produced.
    fn touch_output(args: &[String]) {
        if let Some(path) = args.last() {
            std::fs::write(path, b"mp4").unwrap();
        }
    }

    #[tokio::test]
    async fn test_one_clip_per_segment_plus_concat() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut runner = MockEncoderRunner::new();
        runner.expect_run_ffmpeg().times(4).returning(move |args| {
            counter.fetch_add(1, Ordering::SeqCst);
            touch_output(&args);
            Ok(create_mock_output("", "", true))
        });
        runner
            .expect_run_ffprobe_for_duration()
            .times(1)
            .returning(|_| Ok(create_mock_output("6.75\n", "", true)));

        let assembler = Assembler::new(Arc::new(runner), VideoConfig::default(), 0.1);
        let output = dir.path().join("reel.mp4");
        let report = assembler
            .assemble(
                &segments(&[2.0, 3.5, 1.25]),
                &BackgroundTracks::default(),
                dir.path(),
                &output,
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(report.clip_count, 3);
        assert!((report.expected_duration - 6.75).abs() < 1e-9);
        assert!((report.duration - report.expected_duration).abs() < DURATION_TOLERANCE_SECS);

        let list = std::fs::read_to_string(dir.path().join("concat_list.txt")).unwrap();
        assert_eq!(list.lines().count(), 3);
        assert!(list.lines().next().unwrap().contains("clip_000.mp4"));
    }

    #[tokio::test]
    async fn test_background_overlay_uses_running_offset() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockEncoderRunner::new();
        runner
            .expect_run_ffmpeg()
            .withf(|args| args.iter().any(|a| a.contains("clip_001")))
            .times(1)
            .returning(|args| {
                let joined = args.join(" ");
                assert!(joined.starts_with("-y -ss 2.000 -t 3.000 -i bg.mp4"));
                assert!(joined.contains("overlay="));
                touch_output(&args);
                Ok(create_mock_output("", "", true))
            });
        runner
            .expect_run_ffmpeg()
            .withf(|args| args.iter().any(|a| a.contains("amix")))
            .times(1)
            .returning(|args| {
                assert!(args.join(" ").contains("volume=0.25"));
                touch_output(&args);
                Ok(create_mock_output("", "", true))
            });
        runner.expect_run_ffmpeg().returning(|args| {
            touch_output(&args);
            Ok(create_mock_output("", "", true))
        });
        runner
            .expect_run_ffprobe_for_duration()
            .returning(|_| Ok(create_mock_output("5.0\n", "", true)));

        let tracks = BackgroundTracks {
            video: Some(PathBuf::from("bg.mp4")),
            audio: Some(PathBuf::from("music.m4a")),
        };
        let assembler = Assembler::new(Arc::new(runner), VideoConfig::default(), 0.25);
        assembler
            .assemble(&segments(&[2.0, 3.0]), &tracks, dir.path(), &dir.path().join("out.mp4"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unwritable_work_dir_is_not_an_encoder_failure() {
        let dir = tempfile::tempdir().unwrap();
        // A plain file where the working directory should be.
        let work_dir = dir.path().join("work");
        std::fs::write(&work_dir, b"not a directory").unwrap();

        let mut runner = MockEncoderRunner::new();
        runner.expect_run_ffmpeg().never();

        let assembler = Assembler::new(Arc::new(runner), VideoConfig::default(), 0.1);
        let result = assembler
            .assemble(
                &segments(&[1.0]),
                &BackgroundTracks::default(),
                &work_dir,
                &dir.path().join("out.mp4"),
            )
            .await;
        match result {
            Err(AssemblyError::WorkspaceIo { path, .. }) => assert!(path.ends_with("clips")),
            other => panic!("expected a workspace error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_encoder_failure_propagates_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockEncoderRunner::new();
        runner.expect_run_ffmpeg().times(1).returning(|_| {
            Ok(create_mock_output(
                "",
                "img/0.png: No such file or directory",
                false,
            ))
        });

        let assembler = Assembler::new(Arc::new(runner), VideoConfig::default(), 0.1);
        let result = assembler
            .assemble(
                &segments(&[1.0, 1.0]),
                &BackgroundTracks::default(),
                dir.path(),
                &dir.path().join("out.mp4"),
            )
            .await;

        match result {
            Err(AssemblyError::EncoderFailed { stderr, .. }) => {
                assert!(stderr.contains("No such file or directory"))
            }
            other => panic!("expected EncoderFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_segments() {
        let assembler = Assembler::new(Arc::new(MockEncoderRunner::new()), VideoConfig::default(), 0.1);
        let result = assembler
            .assemble(&[], &BackgroundTracks::default(), Path::new("/tmp"), Path::new("/tmp/x.mp4"))
            .await;
        assert!(matches!(result, Err(AssemblyError::NoSegments)));
    }

    #[tokio::test]
    async fn test_empty_output_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockEncoderRunner::new();
        // Succeeds without writing anything.
        runner
            .expect_run_ffmpeg()
            .returning(|_| Ok(create_mock_output("", "", true)));

        let assembler = Assembler::new(Arc::new(runner), VideoConfig::default(), 0.1);
        let result = assembler
            .assemble(
                &segments(&[1.0]),
                &BackgroundTracks::default(),
                dir.path(),
                &dir.path().join("out.mp4"),
            )
            .await;
        assert!(matches!(result, Err(AssemblyError::EmptyOutput { .. })));
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&[PathBuf::from("/tmp/it's/clip_000.mp4")]);
        assert_eq!(list, "file '/tmp/it'\\''s/clip_000.mp4'\n");
    }
}
