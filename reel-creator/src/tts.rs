use crate::encoder::{probe_duration, EncoderRunner};
use crate::segmenter::split_text;
use async_trait::async_trait;
use crossposter_core::{CoreError, TextSegment, TtsConfig, TtsError};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

/// Google's endpoint rejects requests longer than this.
const GOOGLE_TTS_MAX_CHARS: usize = 100;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TtsEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Extension of the files this engine writes, without the dot.
    fn file_extension(&self) -> &'static str;

    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), TtsError>;
}

pub fn build_engine(config: &TtsConfig) -> Result<Box<dyn TtsEngine>, TtsError> {
    match config.provider.to_ascii_lowercase().as_str() {
        "gtts" | "google" => Ok(Box::new(GoogleTts::new(config)?)),
        "piper" => Ok(Box::new(PiperTts::new(config)?)),
        other => Err(TtsError::UnknownProvider {
            provider: other.to_string(),
        }),
    }
}

pub struct GoogleTts {
    client: reqwest::Client,
    language: String,
    tld: String,
    slow: bool,
}

impl GoogleTts {
    pub fn new(config: &TtsConfig) -> Result<Self, TtsError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TtsError::RequestFailed {
                provider: "gtts".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            language: config.language.clone(),
            tld: config.tld.clone(),
            slow: config.slow,
        })
    }

    fn endpoint(&self) -> String {
        format!("https://translate.google.{}/translate_tts", self.tld)
    }
}

#[async_trait]
impl TtsEngine for GoogleTts {
    fn name(&self) -> &'static str {
        "gtts"
    }

    fn file_extension(&self) -> &'static str {
        "mp3"
    }

    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), TtsError> {
        let request_failed = |reason: String| TtsError::RequestFailed {
            provider: "gtts".to_string(),
            reason,
        };

        let chunks = split_text(text, GOOGLE_TTS_MAX_CHARS);
        let total = chunks.len().to_string();
        let speed = if self.slow { "0.3" } else { "1" };
        let mut audio = Vec::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            let idx = idx.to_string();
            let response = self
                .client
                .get(self.endpoint())
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", self.language.as_str()),
                    ("q", chunk.as_str()),
                    ("ttsspeed", speed),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                ])
                .send()
                .await
                .map_err(|e| request_failed(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(request_failed(format!("HTTP {}", status)));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| request_failed(e.to_string()))?;
            audio.extend_from_slice(&bytes);
        }

        if audio.is_empty() {
            return Err(request_failed("empty audio response".to_string()));
        }
        // MP3 frames are self-delimiting, so chunk responses can be appended.
        tokio::fs::write(output, &audio)
            .await
            .map_err(|e| request_failed(format!("writing {}: {}", output.display(), e)))?;
        Ok(())
    }
}

pub struct PiperTts {
    binary: String,
    model: PathBuf,
}

impl PiperTts {
    pub fn new(config: &TtsConfig) -> Result<Self, TtsError> {
        let model = config
            .piper_model
            .clone()
            .ok_or_else(|| TtsError::RequestFailed {
                provider: "piper".to_string(),
                reason: "tts.piper_model is not set".to_string(),
            })?;
        Ok(Self {
            binary: config.piper_bin.clone(),
            model,
        })
    }
}

#[async_trait]
impl TtsEngine for PiperTts {
    fn name(&self) -> &'static str {
        "piper"
    }

    fn file_extension(&self) -> &'static str {
        "wav"
    }

    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), TtsError> {
        let mut child = TokioCommand::new(&self.binary)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_file")
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => TtsError::EngineNotFound {
                    engine: self.binary.clone(),
                },
                _ => TtsError::RequestFailed {
                    provider: "piper".to_string(),
                    reason: e.to_string(),
                },
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| TtsError::RequestFailed {
                    provider: "piper".to_string(),
                    reason: e.to_string(),
                })?;
        }

        let result = child
            .wait_with_output()
            .await
            .map_err(|e| TtsError::RequestFailed {
                provider: "piper".to_string(),
                reason: e.to_string(),
            })?;
        if !result.status.success() {
            return Err(TtsError::EngineFailed {
                engine: self.binary.clone(),
                status: result.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Produces one audio clip per segment and measures how long it plays.
pub struct TtsRenderer {
    engine: Box<dyn TtsEngine>,
    runner: Arc<dyn EncoderRunner>,
    fallback_secs: f64,
}

impl TtsRenderer {
    pub fn new(
        engine: Box<dyn TtsEngine>,
        runner: Arc<dyn EncoderRunner>,
        fallback_secs: f64,
    ) -> Self {
        Self {
            engine,
            runner,
            fallback_secs,
        }
    }

    pub async fn render(
        &self,
        segment: &TextSegment,
        audio_dir: &Path,
    ) -> Result<(PathBuf, f64), CoreError> {
        if segment.text.trim().is_empty() {
            return Err(TtsError::EmptyText {
                index: segment.index,
            }
            .into());
        }

        let path = audio_dir.join(format!(
            "{}.{}",
            segment.file_stem(),
            self.engine.file_extension()
        ));
        debug!(
            "Synthesizing {} chars with {} into {}",
            segment.text.len(),
            self.engine.name(),
            path.display()
        );
        self.engine.synthesize(&segment.text, &path).await?;

        let mut duration = probe_duration(self.runner.as_ref(), &path)
            .await
            .map_err(|e| TtsError::DurationUnavailable {
                path: path.display().to_string(),
                details: e.to_string(),
            })?;
        if duration <= 0.0 {
            warn!(
                "{} reports zero duration, showing the slide for {:.1}s",
                path.display(),
                self.fallback_secs
            );
            duration = self.fallback_secs;
        } else {
            info!("Segment {} audio: {:.2}s", segment.index, duration);
        }
        Ok((path, duration))
    }
}
