use async_trait::async_trait;
use greenroom_core::types::{
    CaptureConstraints, EncodedAsset, Question, RawArtifact, RawContainer, TranscriptionOutcome,
};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum MediaSourceError {
    #[error("camera/microphone permission denied")]
    PermissionDenied,

    #[error("no usable capture device")]
    DeviceUnavailable,
}

/// Exclusive handle over a live capture stream.
///
/// Owned by the engine for the lifetime of the acquisition; no other
/// component may touch the underlying stream.
pub trait MediaStreamHandle: Send {
    /// Begin chunk delivery.
    fn start(&mut self) -> anyhow::Result<()>;

    /// Stop all tracks. Implementations must be safe to call repeatedly.
    fn release(&mut self);
}

/// A successful acquisition: format metadata, the chunk feed, and the stream
/// handle that controls it.
pub struct AcquiredMedia {
    pub container: RawContainer,
    pub chunks: mpsc::Receiver<Vec<u8>>,
    pub stream: Box<dyn MediaStreamHandle>,
}

#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Request a capture stream matching the given constraints. At most one
    /// acquisition is live per session.
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<AcquiredMedia, MediaSourceError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait AssetEncoder: Send + Sync {
    /// Normalize a raw recorded container into the upload asset. The call may
    /// take seconds; implementations must push the heavy work onto a blocking
    /// pool rather than stall the cooperative thread.
    async fn encode(&self, artifact: &RawArtifact) -> anyhow::Result<EncodedAudio>;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Upload the asset and the question; an `Err` is a transport-level
    /// failure, a `ServiceError` outcome is the service talking.
    async fn transcribe(
        &self,
        asset: &EncodedAsset,
        question: &Question,
    ) -> anyhow::Result<TranscriptionOutcome>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackEvent {
    Fragment(String),
    Completed,
    /// The transport dropped mid-stream; fragments already delivered stand.
    Interrupted(String),
}

#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    /// Submit the prompt and return a finite, non-restartable fragment
    /// sequence in strict arrival order.
    async fn stream_feedback(&self, prompt: &str) -> anyhow::Result<mpsc::Receiver<FeedbackEvent>>;
}
