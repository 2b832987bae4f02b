use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use greenroom_core::config::SessionConfig;
use greenroom_core::types::{
    CaptureConstraints, EncodedAsset, Question, RawArtifact, TranscriptionOutcome,
};
use greenroom_engine::engine::SessionEngine;
use greenroom_engine::session::Phase;
use greenroom_engine::traits::{
    AcquiredMedia, AssetEncoder, EncodedAudio, FeedbackEvent, FeedbackGenerator, MediaSource,
    MediaSourceError, MediaStreamHandle, Transcriber,
};
use greenroom_media::capture::{CaptureError, CaptureErrorKind, ChunkSink, MicSource};
use greenroom_providers::generate::{GenerateConfig, build_generate_request};
use greenroom_providers::parse::parse_transcription;
use greenroom_providers::runtime::{self, StreamEvent};
use greenroom_providers::transcribe::{AudioUpload, TranscribeConfig, build_transcribe_request};

struct MicMediaSource {
    device_name: Option<String>,
}

fn media_source_error(e: CaptureError) -> MediaSourceError {
    match e.kind() {
        CaptureErrorKind::PermissionDenied => MediaSourceError::PermissionDenied,
        CaptureErrorKind::DeviceUnavailable | CaptureErrorKind::Other => {
            MediaSourceError::DeviceUnavailable
        }
    }
}

#[async_trait::async_trait]
impl MediaSource for MicMediaSource {
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<AcquiredMedia, MediaSourceError> {
        let (tx, rx) = mpsc::channel::<Vec<u8>>(64);

        // The capture callback must never block the audio worker; on a full
        // channel the chunk is dropped and the recorder just sees a gap.
        let sink: ChunkSink = Arc::new(move |chunk: &[u8]| {
            let _ = tx.try_send(chunk.to_vec());
        });

        let source = MicSource::open_named(self.device_name.as_deref(), constraints, sink)
            .map_err(media_source_error)?;
        let container = source.container();

        Ok(AcquiredMedia {
            container,
            chunks: rx,
            stream: Box::new(MicStream {
                source: Some(source),
            }),
        })
    }
}

struct MicStream {
    source: Option<MicSource>,
}

impl MediaStreamHandle for MicStream {
    fn start(&mut self) -> anyhow::Result<()> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("stream already released"))?;
        source.start()?;
        Ok(())
    }

    fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            let _ = source.stop();
            source.close();
        }
    }
}

struct WavEncoder;

#[async_trait::async_trait]
impl AssetEncoder for WavEncoder {
    async fn encode(&self, artifact: &RawArtifact) -> anyhow::Result<EncodedAudio> {
        let artifact = artifact.clone();
        let bytes = tokio::task::spawn_blocking(move || {
            greenroom_media::encode::encode_wav_mono_16k(&artifact)
        })
        .await??;

        Ok(EncodedAudio {
            mime_type: greenroom_media::encode::OUTPUT_MIME_TYPE.into(),
            bytes,
        })
    }
}

struct HttpTranscriber {
    cfg: TranscribeConfig,
}

#[async_trait::async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(
        &self,
        asset: &EncodedAsset,
        question: &Question,
    ) -> anyhow::Result<TranscriptionOutcome> {
        let upload = AudioUpload::for_asset(asset);
        let req = build_transcribe_request(&self.cfg, &upload, &question.text)?;
        let resp = runtime::execute(&req).await?;
        if !(200..=299).contains(&resp.status) {
            return Err(anyhow::anyhow!(
                "transcription upload failed: status={} body={}",
                resp.status,
                String::from_utf8_lossy(&resp.body)
            ));
        }
        parse_transcription(&resp.body)
    }
}

struct HttpFeedback {
    cfg: GenerateConfig,
}

#[async_trait::async_trait]
impl FeedbackGenerator for HttpFeedback {
    async fn stream_feedback(
        &self,
        prompt: &str,
    ) -> anyhow::Result<mpsc::Receiver<FeedbackEvent>> {
        let req = build_generate_request(&self.cfg, prompt);
        let streaming = runtime::execute_streaming(&req).await?;
        if !(200..=299).contains(&streaming.status) {
            return Err(anyhow::anyhow!(
                "feedback generation failed: status={}",
                streaming.status
            ));
        }

        let (tx, rx) = mpsc::channel(16);
        let mut events = streaming.events;
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let mapped = match event {
                    StreamEvent::Fragment(s) => FeedbackEvent::Fragment(s),
                    StreamEvent::Completed => FeedbackEvent::Completed,
                    StreamEvent::Interrupted(r) => FeedbackEvent::Interrupted(r),
                };
                if tx.send(mapped).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Demo behavior: record the default microphone for RECORD_SECS seconds,
    // then run the full transcribe + feedback pipeline against the endpoints.

    let defaults = SessionConfig::default();
    let question_text =
        std::env::var("QUESTION").unwrap_or_else(|_| "Tell me about yourself.".into());
    let transcribe_endpoint =
        std::env::var("TRANSCRIBE_URL").unwrap_or(defaults.transcribe_endpoint);
    let generate_endpoint = std::env::var("GENERATE_URL").unwrap_or(defaults.generate_endpoint);
    let record_secs: u64 = std::env::var("RECORD_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8);
    let device_name = std::env::var("MIC_DEVICE").ok();

    let cfg = SessionConfig {
        transcribe_endpoint: transcribe_endpoint.clone(),
        generate_endpoint: generate_endpoint.clone(),
        ..SessionConfig::default()
    };

    let engine = SessionEngine::new(
        cfg.clone(),
        Arc::new(MicMediaSource { device_name }),
        Arc::new(WavEncoder),
        Arc::new(HttpTranscriber {
            cfg: TranscribeConfig {
                endpoint: transcribe_endpoint,
            },
        }),
        Arc::new(HttpFeedback {
            cfg: GenerateConfig {
                endpoint: generate_endpoint,
            },
        }),
    );

    let snap = engine.begin(Question::new(question_text.clone())).await;
    if let Phase::Failed(kind) = snap.phase {
        anyhow::bail!(
            "could not start session ({kind:?}): {}",
            snap.error.unwrap_or_default()
        );
    }

    println!("Question: {question_text}");
    println!(
        "Recording {record_secs}s (session cap {}s)...",
        cfg.max_recording_secs
    );

    engine.start_recording().await?;
    tokio::time::sleep(Duration::from_secs(record_secs)).await;
    engine.stop_recording().await;

    engine.process().await?;

    // Poll the snapshot and print the feedback as it streams in.
    let mut transcript_shown = false;
    let mut feedback_printed = 0usize;
    loop {
        let snap = engine.snapshot().await;

        if !transcript_shown {
            if let Some(t) = &snap.transcript {
                println!("Transcript: {t}");
                println!("Feedback:");
                transcript_shown = true;
            }
        }

        // Prefix lengths are fragment-aligned, so slicing is safe.
        if snap.feedback_text.len() > feedback_printed {
            print!("{}", &snap.feedback_text[feedback_printed..]);
            std::io::stdout().flush().ok();
            feedback_printed = snap.feedback_text.len();
        }

        match snap.phase {
            Phase::Completed => {
                println!();
                break;
            }
            Phase::Failed(kind) => {
                anyhow::bail!(
                    "session failed ({kind:?}): {}",
                    snap.error.unwrap_or_default()
                );
            }
            _ => {}
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    engine.cancel().await;
    Ok(())
}
