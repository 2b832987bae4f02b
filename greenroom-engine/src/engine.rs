use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use greenroom_core::config::SessionConfig;
use greenroom_core::feedback::{FeedbackStream, build_feedback_prompt};
use greenroom_core::recording::RecordingController;
use greenroom_core::text::normalize_transcript;
use greenroom_core::types::{
    EncodedAsset, Question, RawArtifact, SessionId, TranscriptionOutcome,
};

use crate::session::{FailureKind, Phase, SessionSnapshot};
use crate::timer::{Countdown, TimerEvent};
use crate::traits::{
    AssetEncoder, FeedbackEvent, FeedbackGenerator, MediaSource, MediaSourceError,
    MediaStreamHandle, Transcriber,
};

#[derive(Default)]
struct Inner {
    phase: Phase,

    // Bumped on every begin/restart/cancel; async results from an abandoned
    // session compare against it and are discarded.
    generation: u64,

    session: Option<SessionId>,
    question: Option<Question>,
    remaining_secs: u32,

    recorder: RecordingController,
    countdown: Countdown,
    media_stream: Option<Box<dyn MediaStreamHandle>>,
    chunk_rx: Option<mpsc::Receiver<Vec<u8>>>,

    asset: Option<EncodedAsset>,
    transcript: Option<String>,
    feedback: FeedbackStream,
    error: Option<String>,

    processing_task: Option<JoinHandle<()>>,
}

/// The session coordinator: sequences capture, encoding, transcription and
/// feedback streaming, and owns the one authoritative phase.
///
/// All mutation paths serialize through the inner mutex, so racing event
/// sources (timer expiry vs. manual stop, late chunks, stale responses)
/// collapse to well-ordered transitions.
#[derive(Clone)]
pub struct SessionEngine {
    cfg: SessionConfig,
    media: Arc<dyn MediaSource>,
    encoder: Arc<dyn AssetEncoder>,
    transcriber: Arc<dyn Transcriber>,
    feedback: Arc<dyn FeedbackGenerator>,
    inner: Arc<Mutex<Inner>>,
}

impl SessionEngine {
    pub fn new(
        cfg: SessionConfig,
        media: Arc<dyn MediaSource>,
        encoder: Arc<dyn AssetEncoder>,
        transcriber: Arc<dyn Transcriber>,
        feedback: Arc<dyn FeedbackGenerator>,
    ) -> Self {
        Self {
            cfg,
            media,
            encoder,
            transcriber,
            feedback,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// The upload asset for the current session, once encoding has finished.
    /// Exactly one exists per completed recording; discarded on restart.
    pub async fn encoded_asset(&self) -> Option<EncodedAsset> {
        self.inner.lock().await.asset.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        SessionSnapshot {
            phase: inner.phase,
            phase_label: inner.phase.label().into(),
            remaining_secs: inner.remaining_secs,
            transcript: inner.transcript.clone(),
            feedback_text: inner.feedback.text().to_string(),
            feedback_complete: inner.feedback.is_complete(),
            error: inner.error.clone(),
        }
    }

    /// Take a question from the selection flow and bring the session to
    /// `Ready` (or a failed phase if the platform refuses capture). Any
    /// previous session is torn down first.
    pub async fn begin(&self, question: Question) -> SessionSnapshot {
        {
            let mut inner = self.inner.lock().await;
            Self::teardown(&mut inner);
            inner.question = Some(question);
            inner.session = Some(SessionId::new());
            inner.remaining_secs = self.cfg.max_recording_secs;
        }
        self.acquire_media().await;
        self.snapshot().await
    }

    /// Discard chunks, asset, transcript and feedback, keep the question, and
    /// re-acquire media back to `Ready`.
    pub async fn restart(&self) -> anyhow::Result<SessionSnapshot> {
        {
            let mut inner = self.inner.lock().await;
            if !inner.phase.can_restart() {
                anyhow::bail!("cannot restart from {:?}", inner.phase);
            }
            let question = inner.question.take();
            Self::teardown(&mut inner);
            inner.question = question;
            inner.session = Some(SessionId::new());
            inner.remaining_secs = self.cfg.max_recording_secs;
        }
        self.acquire_media().await;
        Ok(self.snapshot().await)
    }

    /// Release the media source, cancel the countdown, abandon in-flight work
    /// and hand control back to the selection flow. Safe from any state.
    pub async fn cancel(&self) {
        let mut inner = self.inner.lock().await;
        Self::teardown(&mut inner);
    }

    /// Explicit start from `Ready`: begins chunk delivery and the countdown.
    pub async fn start_recording(&self) -> anyhow::Result<()> {
        let (generation, chunk_rx, timer_rx) = {
            let mut inner = self.inner.lock().await;
            if inner.phase != Phase::Ready {
                anyhow::bail!("cannot start recording from {:?}", inner.phase);
            }

            let stream = inner
                .media_stream
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("no media stream acquired"))?;
            stream.start()?;
            inner.recorder.start()?;

            let chunk_rx = inner
                .chunk_rx
                .take()
                .ok_or_else(|| anyhow::anyhow!("chunk feed already consumed"))?;
            let timer_rx = inner.countdown.start(self.cfg.max_recording_secs);
            inner.remaining_secs = self.cfg.max_recording_secs;
            Self::set_phase(&mut inner, Phase::Recording);
            (inner.generation, chunk_rx, timer_rx)
        };

        self.spawn_chunk_pump(generation, chunk_rx);
        self.spawn_countdown_pump(generation, timer_rx);
        Ok(())
    }

    /// Stop capture. A no-op outside `Recording`, so a manual stop racing the
    /// countdown expiry results in exactly one transition.
    pub async fn stop_recording(&self) {
        let mut inner = self.inner.lock().await;
        Self::stop_locked(&mut inner);
    }

    /// Run encode -> transcribe -> (maybe) stream-feedback in the background.
    /// Valid only from `Stopped`.
    pub async fn process(&self) -> anyhow::Result<()> {
        let (generation, session, question, artifact) = {
            let mut inner = self.inner.lock().await;
            if inner.phase != Phase::Stopped {
                anyhow::bail!("cannot process from {:?}", inner.phase);
            }
            let artifact = inner.recorder.artifact()?;
            let session = inner
                .session
                .ok_or_else(|| anyhow::anyhow!("no active session"))?;
            let question = inner
                .question
                .clone()
                .ok_or_else(|| anyhow::anyhow!("no question for this session"))?;
            Self::set_phase(&mut inner, Phase::Uploading);
            (inner.generation, session, question, artifact)
        };

        let engine = self.clone();
        let handle = tokio::spawn(async move {
            engine
                .run_pipeline(generation, session, question, artifact)
                .await;
        });

        let mut inner = self.inner.lock().await;
        if let Some(prev) = inner.processing_task.take() {
            prev.abort();
        }
        inner.processing_task = Some(handle);
        Ok(())
    }

    async fn acquire_media(&self) {
        let constraints = self.cfg.capture_profile.constraints();
        let generation = { self.inner.lock().await.generation };

        match self.media.acquire(&constraints).await {
            Ok(acquired) => {
                let mut inner = self.inner.lock().await;
                if inner.generation != generation {
                    // The session moved on while we were acquiring.
                    let mut stream = acquired.stream;
                    stream.release();
                    return;
                }
                inner.recorder.arm(acquired.container);
                inner.chunk_rx = Some(acquired.chunks);
                inner.media_stream = Some(acquired.stream);
                Self::set_phase(&mut inner, Phase::Ready);
            }
            Err(e) => {
                let kind = match e {
                    MediaSourceError::PermissionDenied => FailureKind::PermissionDenied,
                    MediaSourceError::DeviceUnavailable => FailureKind::DeviceUnavailable,
                };
                let mut inner = self.inner.lock().await;
                if inner.generation != generation {
                    return;
                }
                Self::fail(&mut inner, kind, e.to_string());
            }
        }
    }

    fn spawn_chunk_pump(&self, generation: u64, mut chunk_rx: mpsc::Receiver<Vec<u8>>) {
        let engine = self.clone();
        tokio::spawn(async move {
            while let Some(chunk) = chunk_rx.recv().await {
                let mut inner = engine.inner.lock().await;
                if inner.generation != generation {
                    return;
                }
                // The recorder discards anything outside the recording window.
                inner.recorder.on_chunk(chunk);
            }
        });
    }

    fn spawn_countdown_pump(&self, generation: u64, mut timer_rx: mpsc::Receiver<TimerEvent>) {
        let engine = self.clone();
        tokio::spawn(async move {
            while let Some(event) = timer_rx.recv().await {
                match event {
                    TimerEvent::Tick { remaining_secs } => {
                        let mut inner = engine.inner.lock().await;
                        if inner.generation != generation {
                            return;
                        }
                        if inner.phase == Phase::Recording {
                            inner.remaining_secs = remaining_secs;
                        }
                    }
                    TimerEvent::Expired => {
                        let mut inner = engine.inner.lock().await;
                        if inner.generation != generation {
                            return;
                        }
                        Self::stop_locked(&mut inner);
                        return;
                    }
                }
            }
        });
    }

    async fn run_pipeline(
        &self,
        generation: u64,
        session: SessionId,
        question: Question,
        artifact: RawArtifact,
    ) {
        // 1) Encode.
        let encoded = match self.encoder.encode(&artifact).await {
            Ok(e) => e,
            Err(e) => {
                self.fail_if_current(generation, FailureKind::EncodingFailed, e.to_string())
                    .await;
                return;
            }
        };
        let asset = EncodedAsset {
            session,
            mime_type: encoded.mime_type,
            bytes: encoded.bytes,
        };

        {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                return;
            }
            inner.asset = Some(asset.clone());
            Self::set_phase(&mut inner, Phase::Transcribing);
        }

        // 2) Upload + transcribe.
        let outcome = match self.transcriber.transcribe(&asset, &question).await {
            Ok(o) => o,
            Err(e) => {
                self.fail_if_current(generation, FailureKind::UploadFailed, e.to_string())
                    .await;
                return;
            }
        };

        let (transcript, soft_error) = match outcome {
            TranscriptionOutcome::Transcript(t) => (normalize_transcript(&t), false),
            // A service-reported error becomes the displayed transcript.
            TranscriptionOutcome::ServiceError(e) => (e, true),
        };

        {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                return;
            }
            inner.transcript = Some(transcript.clone());
        }

        // 3) Feedback, only for a non-empty transcript from the success path
        // (soft-error text opts in via config).
        let wants_feedback =
            !transcript.is_empty() && (!soft_error || self.cfg.feedback_on_soft_error);
        if !wants_feedback {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                return;
            }
            Self::set_phase(&mut inner, Phase::Completed);
            return;
        }

        {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                return;
            }
            Self::set_phase(&mut inner, Phase::GeneratingFeedback);
        }

        let prompt = build_feedback_prompt(&question, &transcript);
        let mut events = match self.feedback.stream_feedback(&prompt).await {
            Ok(rx) => rx,
            Err(e) => {
                self.fail_if_current(generation, FailureKind::GenerationFailed, e.to_string())
                    .await;
                return;
            }
        };

        while let Some(event) = events.recv().await {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                return;
            }
            match event {
                FeedbackEvent::Fragment(text) => inner.feedback.push_fragment(&text),
                FeedbackEvent::Completed => break,
                FeedbackEvent::Interrupted(reason) => {
                    // Keep whatever arrived; the stream is not replayed.
                    log::warn!("feedback stream interrupted: {reason}");
                    break;
                }
            }
        }

        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            return;
        }
        inner.feedback.mark_complete();
        Self::set_phase(&mut inner, Phase::Completed);
    }

    fn stop_locked(inner: &mut Inner) {
        if inner.phase != Phase::Recording {
            return;
        }
        inner.countdown.cancel();
        inner.recorder.stop();
        Self::set_phase(inner, Phase::Stopped);
    }

    fn teardown(inner: &mut Inner) {
        inner.generation = inner.generation.wrapping_add(1);
        if let Some(task) = inner.processing_task.take() {
            task.abort();
        }
        inner.countdown.cancel();
        inner.recorder.reset();
        inner.chunk_rx = None;
        if let Some(mut stream) = inner.media_stream.take() {
            stream.release();
        }
        inner.session = None;
        inner.question = None;
        inner.asset = None;
        inner.transcript = None;
        inner.feedback = FeedbackStream::new();
        inner.error = None;
        inner.remaining_secs = 0;
        Self::set_phase(inner, Phase::Idle);
    }

    async fn fail_if_current(&self, generation: u64, kind: FailureKind, message: String) {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            return;
        }
        Self::fail(&mut inner, kind, message);
    }

    fn fail(inner: &mut Inner, kind: FailureKind, message: String) {
        log::error!("session failed ({kind:?}): {message}");
        inner.error = Some(message);
        Self::set_phase(inner, Phase::Failed(kind));
    }

    fn set_phase(inner: &mut Inner, phase: Phase) {
        if inner.phase != phase {
            log::info!("session phase: {} -> {}", inner.phase.label(), phase.label());
        }
        inner.phase = phase;
    }
}
