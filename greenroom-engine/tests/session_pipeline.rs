use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use greenroom_core::config::SessionConfig;
use greenroom_core::types::{
    CaptureConstraints, EncodedAsset, Question, RawArtifact, RawContainer, SampleFormat,
    TranscriptionOutcome,
};
use greenroom_engine::engine::SessionEngine;
use greenroom_engine::session::{FailureKind, Phase};
use greenroom_engine::traits::{
    AcquiredMedia, AssetEncoder, EncodedAudio, FeedbackEvent, FeedbackGenerator, MediaSource,
    MediaSourceError, MediaStreamHandle, Transcriber,
};
use greenroom_providers::generate::{GenerateConfig, build_generate_request};
use greenroom_providers::parse::parse_transcription;
use greenroom_providers::runtime::{self, StreamEvent};
use greenroom_providers::transcribe::{AudioUpload, TranscribeConfig, build_transcribe_request};
use tokio::sync::mpsc;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct ScriptedStream {
    to_send: Option<(Vec<Vec<u8>>, mpsc::Sender<Vec<u8>>)>,
    released: Arc<AtomicBool>,
}

impl MediaStreamHandle for ScriptedStream {
    fn start(&mut self) -> anyhow::Result<()> {
        if let Some((chunks, tx)) = self.to_send.take() {
            tokio::spawn(async move {
                for chunk in chunks {
                    if tx.send(chunk).await.is_err() {
                        return;
                    }
                }
            });
        }
        Ok(())
    }

    fn release(&mut self) {
        self.to_send = None;
        self.released.store(true, Ordering::SeqCst);
    }
}

struct ScriptedMedia {
    chunks: Vec<Vec<u8>>,
    deny: Option<fn() -> MediaSourceError>,
    acquisitions: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

impl ScriptedMedia {
    fn with_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks,
            deny: None,
            acquisitions: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    fn denying(err: fn() -> MediaSourceError) -> Self {
        Self {
            chunks: vec![],
            deny: Some(err),
            acquisitions: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait::async_trait]
impl MediaSource for ScriptedMedia {
    async fn acquire(
        &self,
        _constraints: &CaptureConstraints,
    ) -> Result<AcquiredMedia, MediaSourceError> {
        if let Some(err) = self.deny {
            return Err(err());
        }
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        self.released.store(false, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(16);
        Ok(AcquiredMedia {
            container: RawContainer {
                sample_rate_hz: 16_000,
                channels: 1,
                sample_format: SampleFormat::F32Le,
            },
            chunks: rx,
            stream: Box::new(ScriptedStream {
                to_send: Some((self.chunks.clone(), tx)),
                released: self.released.clone(),
            }),
        })
    }
}

struct PassthroughEncoder;

#[async_trait::async_trait]
impl AssetEncoder for PassthroughEncoder {
    async fn encode(&self, artifact: &RawArtifact) -> anyhow::Result<EncodedAudio> {
        Ok(EncodedAudio {
            mime_type: "audio/wav".into(),
            bytes: artifact.bytes.clone(),
        })
    }
}

struct FailingEncoder;

#[async_trait::async_trait]
impl AssetEncoder for FailingEncoder {
    async fn encode(&self, _artifact: &RawArtifact) -> anyhow::Result<EncodedAudio> {
        Err(anyhow::anyhow!("malformed container: truncated frame"))
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

/// Emits fragments with an artificial delay between them.
struct ScriptedFeedback {
    fragments: Vec<&'static str>,
    interrupt_after: Option<usize>,
}

#[async_trait::async_trait]
impl FeedbackGenerator for ScriptedFeedback {
    async fn stream_feedback(
        &self,
        _prompt: &str,
    ) -> anyhow::Result<mpsc::Receiver<FeedbackEvent>> {
        let fragments = self.fragments.clone();
        let interrupt_after = self.interrupt_after;
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for (i, fragment) in fragments.iter().enumerate() {
                if interrupt_after == Some(i) {
                    let _ = tx
                        .send(FeedbackEvent::Interrupted("connection reset".into()))
                        .await;
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
                if tx
                    .send(FeedbackEvent::Fragment(fragment.to_string()))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            let _ = tx.send(FeedbackEvent::Completed).await;
        });
        Ok(rx)
    }
}

fn question() -> Question {
    Question::new("Tell me about yourself.").with_video_url("https://cdn.example.com/q1.mp4")
}

fn config(server: &MockServer) -> SessionConfig {
    SessionConfig {
        transcribe_endpoint: format!("{}/api/transcribe", server.uri()),
        generate_endpoint: format!("{}/api/generate", server.uri()),
        ..SessionConfig::default()
    }
}

fn engine_with(
    cfg: SessionConfig,
    media: ScriptedMedia,
    encoder: Arc<dyn AssetEncoder>,
    feedback: Arc<dyn FeedbackGenerator>,
) -> SessionEngine {
    let transcriber = HttpTranscriber {
        cfg: TranscribeConfig {
            endpoint: cfg.transcribe_endpoint.clone(),
        },
    };
    SessionEngine::new(cfg, Arc::new(media), encoder, Arc::new(transcriber), feedback)
}

async fn wait_for_phase(engine: &SessionEngine, phase: Phase) {
    for _ in 0..500 {
        if engine.snapshot().await.phase == phase {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "timed out waiting for {phase:?}; currently {:?}",
        engine.snapshot().await.phase
    );
}

async fn record_and_stop(engine: &SessionEngine) {
    engine.start_recording().await.unwrap();
    // Let the scripted chunks drain through the pump.
    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.stop_recording().await;
}

#[tokio::test]
async fn full_session_completes_with_streamed_feedback() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/transcribe"))
        .and(query_param("question", "Tell me about yourself."))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"transcript":"I am a systems engineer."}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_string_contains("Tell me about yourself."))
        .and(body_string_contains("I am a systems engineer."))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("Good start. Consider depth.", "text/plain"),
        )
        .mount(&server)
        .await;

    let cfg = config(&server);
    let feedback = Arc::new(HttpFeedback {
        cfg: GenerateConfig {
            endpoint: cfg.generate_endpoint.clone(),
        },
    });
    let media = ScriptedMedia::with_chunks(vec![vec![1, 2], vec![3, 4]]);
    let engine = engine_with(cfg, media, Arc::new(PassthroughEncoder), feedback);

    let snap = engine.begin(question()).await;
    assert_eq!(snap.phase, Phase::Ready);

    record_and_stop(&engine).await;
    assert_eq!(engine.snapshot().await.phase, Phase::Stopped);

    engine.process().await.unwrap();
    wait_for_phase(&engine, Phase::Completed).await;

    let snap = engine.snapshot().await;
    assert_eq!(snap.transcript.as_deref(), Some("I am a systems engineer."));
    assert_eq!(snap.feedback_text, "Good start. Consider depth.");
    assert!(snap.feedback_complete);
    assert_eq!(snap.error, None);

    // One asset per completed recording, carrying the concatenated chunks.
    let asset = engine.encoded_asset().await.unwrap();
    assert_eq!(asset.bytes, vec![1, 2, 3, 4]);
    assert_eq!(asset.mime_type, "audio/wav");
}

#[tokio::test]
async fn soft_error_becomes_transcript_and_skips_feedback() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/transcribe"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(r#"{"error":"too short"}"#, "application/json"),
        )
        .mount(&server)
        .await;

    // Feedback generation must not be attempted for soft-error text.
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("nope", "text/plain"))
        .expect(0)
        .mount(&server)
        .await;

    let cfg = config(&server);
    let feedback = Arc::new(HttpFeedback {
        cfg: GenerateConfig {
            endpoint: cfg.generate_endpoint.clone(),
        },
    });
    let media = ScriptedMedia::with_chunks(vec![vec![9, 9]]);
    let engine = engine_with(cfg, media, Arc::new(PassthroughEncoder), feedback);

    engine.begin(question()).await;
    record_and_stop(&engine).await;
    engine.process().await.unwrap();
    wait_for_phase(&engine, Phase::Completed).await;

    let snap = engine.snapshot().await;
    assert_eq!(snap.transcript.as_deref(), Some("too short"));
    assert!(snap.feedback_text.is_empty());
}

#[tokio::test]
async fn upload_failure_is_surfaced_and_restart_rearms() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/transcribe"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let cfg = config(&server);
    let feedback = Arc::new(HttpFeedback {
        cfg: GenerateConfig {
            endpoint: cfg.generate_endpoint.clone(),
        },
    });
    let media = ScriptedMedia::with_chunks(vec![vec![1]]);
    let acquisitions = media.acquisitions.clone();
    let engine = engine_with(cfg, media, Arc::new(PassthroughEncoder), feedback);

    engine.begin(question()).await;
    record_and_stop(&engine).await;
    engine.process().await.unwrap();
    wait_for_phase(&engine, Phase::Failed(FailureKind::UploadFailed)).await;

    let snap = engine.snapshot().await;
    assert_eq!(snap.transcript, None);
    assert!(snap.feedback_text.is_empty());
    assert!(snap.error.is_some());

    let snap = engine.restart().await.unwrap();
    assert_eq!(snap.phase, Phase::Ready);
    assert_eq!(snap.transcript, None);
    assert_eq!(acquisitions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn encoding_failure_is_recoverable() {
    let server = MockServer::start().await;

    let cfg = config(&server);
    let feedback = Arc::new(ScriptedFeedback {
        fragments: vec![],
        interrupt_after: None,
    });
    let media = ScriptedMedia::with_chunks(vec![vec![1]]);
    let acquisitions = media.acquisitions.clone();
    let engine = engine_with(cfg, media, Arc::new(FailingEncoder), feedback);

    engine.begin(question()).await;
    record_and_stop(&engine).await;
    engine.process().await.unwrap();
    wait_for_phase(&engine, Phase::Failed(FailureKind::EncodingFailed)).await;

    let snap = engine.restart().await.unwrap();
    assert_eq!(snap.phase, Phase::Ready);
    assert_eq!(acquisitions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn permission_denied_fails_the_session_before_recording() {
    let server = MockServer::start().await;

    let cfg = config(&server);
    let feedback = Arc::new(ScriptedFeedback {
        fragments: vec![],
        interrupt_after: None,
    });
    let media = ScriptedMedia::denying(|| MediaSourceError::PermissionDenied);
    let engine = engine_with(cfg, media, Arc::new(PassthroughEncoder), feedback);

    let snap = engine.begin(question()).await;
    assert_eq!(snap.phase, Phase::Failed(FailureKind::PermissionDenied));
    assert!(snap.error.is_some());
    assert!(engine.start_recording().await.is_err());
}

#[tokio::test]
async fn delayed_fragments_are_applied_in_arrival_order() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/transcribe"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"transcript":"I shipped the feature."}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let cfg = config(&server);
    let feedback = Arc::new(ScriptedFeedback {
        fragments: vec!["Good ", "start.", " Consider depth."],
        interrupt_after: None,
    });
    let media = ScriptedMedia::with_chunks(vec![vec![1]]);
    let engine = engine_with(cfg, media, Arc::new(PassthroughEncoder), feedback);

    engine.begin(question()).await;
    record_and_stop(&engine).await;
    engine.process().await.unwrap();
    wait_for_phase(&engine, Phase::Completed).await;

    let snap = engine.snapshot().await;
    assert_eq!(snap.feedback_text, "Good start. Consider depth.");
    assert!(snap.feedback_complete);
}

#[tokio::test]
async fn interrupted_stream_keeps_partial_feedback() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/transcribe"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"transcript":"I shipped the feature."}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let cfg = config(&server);
    let feedback = Arc::new(ScriptedFeedback {
        fragments: vec!["Good ", "start.", " Consider depth."],
        interrupt_after: Some(2),
    });
    let media = ScriptedMedia::with_chunks(vec![vec![1]]);
    let engine = engine_with(cfg, media, Arc::new(PassthroughEncoder), feedback);

    engine.begin(question()).await;
    record_and_stop(&engine).await;
    engine.process().await.unwrap();
    wait_for_phase(&engine, Phase::Completed).await;

    let snap = engine.snapshot().await;
    assert_eq!(snap.feedback_text, "Good start.");
    assert!(snap.feedback_complete);
}

#[tokio::test]
async fn second_stop_is_a_no_op() {
    let server = MockServer::start().await;

    let cfg = config(&server);
    let feedback = Arc::new(ScriptedFeedback {
        fragments: vec![],
        interrupt_after: None,
    });
    let media = ScriptedMedia::with_chunks(vec![vec![1, 2], vec![3]]);
    let engine = engine_with(cfg, media, Arc::new(PassthroughEncoder), feedback);

    engine.begin(question()).await;
    record_and_stop(&engine).await;
    engine.stop_recording().await; // expiry racing a manual stop

    assert_eq!(engine.snapshot().await.phase, Phase::Stopped);
}

#[tokio::test]
async fn restart_after_completion_clears_all_session_data() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/transcribe"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"transcript":"First answer."}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let cfg = config(&server);
    let feedback = Arc::new(ScriptedFeedback {
        fragments: vec!["Solid."],
        interrupt_after: None,
    });
    let media = ScriptedMedia::with_chunks(vec![vec![1]]);
    let engine = engine_with(cfg.clone(), media, Arc::new(PassthroughEncoder), feedback);

    engine.begin(question()).await;
    record_and_stop(&engine).await;
    engine.process().await.unwrap();
    wait_for_phase(&engine, Phase::Completed).await;

    let snap = engine.restart().await.unwrap();
    assert_eq!(snap.phase, Phase::Ready);
    assert_eq!(snap.transcript, None);
    assert!(snap.feedback_text.is_empty());
    assert!(!snap.feedback_complete);
    assert_eq!(snap.error, None);
    assert_eq!(snap.remaining_secs, cfg.max_recording_secs);
    assert!(engine.encoded_asset().await.is_none());
}

#[tokio::test]
async fn cancel_releases_the_media_source() {
    let server = MockServer::start().await;

    let cfg = config(&server);
    let feedback = Arc::new(ScriptedFeedback {
        fragments: vec![],
        interrupt_after: None,
    });
    let media = ScriptedMedia::with_chunks(vec![vec![1]]);
    let released = media.released.clone();
    let engine = engine_with(cfg, media, Arc::new(PassthroughEncoder), feedback);

    engine.begin(question()).await;
    assert!(!released.load(Ordering::SeqCst));

    engine.cancel().await;
    assert_eq!(engine.snapshot().await.phase, Phase::Idle);
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn countdown_expiry_auto_stops_the_recording() {
    // No network in this test; paused tokio time drives the countdown.
    let cfg = SessionConfig {
        max_recording_secs: 3,
        ..SessionConfig::default()
    };
    let feedback = Arc::new(ScriptedFeedback {
        fragments: vec![],
        interrupt_after: None,
    });
    let media = ScriptedMedia::with_chunks(vec![vec![1, 2]]);
    let engine = engine_with(cfg, media, Arc::new(PassthroughEncoder), feedback);

    engine.begin(question()).await;
    engine.start_recording().await.unwrap();
    assert_eq!(engine.snapshot().await.phase, Phase::Recording);

    wait_for_phase(&engine, Phase::Stopped).await;
    assert_eq!(engine.snapshot().await.remaining_secs, 0);
}
