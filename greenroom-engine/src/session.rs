use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The platform refused the capture request; recording cannot proceed.
    PermissionDenied,
    DeviceUnavailable,
    EncodingFailed,
    UploadFailed,
    GenerationFailed,
}

impl FailureKind {
    /// Whether `restart()` can reasonably succeed in the same environment.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, Self::PermissionDenied | Self::DeviceUnavailable)
    }
}

/// The single authoritative session phase. Every event source funnels into a
/// transition on this value; nothing else carries session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No session; the selection flow has control.
    Idle,
    /// Media acquired, recorder armed, awaiting an explicit start.
    Ready,
    Recording,
    Stopped,
    /// Encoding the artifact and assembling the upload.
    Uploading,
    /// Upload+transcription request in flight.
    Transcribing,
    GeneratingFeedback,
    Completed,
    Failed(FailureKind),
}

impl Default for Phase {
    fn default() -> Self {
        Self::Idle
    }
}

impl Phase {
    // Stable strings for UI display; intentionally not derived from `Debug`.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ready => "ready",
            Self::Recording => "recording",
            Self::Stopped => "stopped",
            Self::Uploading => "uploading",
            Self::Transcribing => "transcribing",
            Self::GeneratingFeedback => "generating_feedback",
            Self::Completed => "completed",
            Self::Failed(_) => "failed",
        }
    }

    pub fn can_restart(self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Failed(_))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }

    /// A network/pipeline stage whose in-flight work must be abandoned on
    /// cancel or restart.
    pub fn is_pipeline_active(self) -> bool {
        matches!(
            self,
            Self::Uploading | Self::Transcribing | Self::GeneratingFeedback
        )
    }
}

/// What the presentation layer sees.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub phase_label: String,
    pub remaining_secs: u32,
    pub transcript: Option<String>,
    pub feedback_text: String,
    pub feedback_complete: bool,
    pub error: Option<String>,
}
