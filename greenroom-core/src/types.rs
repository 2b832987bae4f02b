use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One complete attempt at answering a single interview question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The interview question handed over by the selection flow.
///
/// Immutable for the lifetime of a session; the optional video URL points at
/// the interviewer clip the presentation layer plays before recording starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub video_url: Option<String>,
}

impl Question {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            video_url: None,
        }
    }

    pub fn with_video_url(mut self, url: impl Into<String>) -> Self {
        self.video_url = Some(url.into());
        self
    }
}

/// Capture resolution presets, selected by viewport class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureProfile {
    /// Portrait-ish preset for narrow viewports.
    Compact,
    /// 16:9 preset for desktop-class viewports.
    Wide,
}

impl CaptureProfile {
    /// Viewports at least this wide get the `Wide` preset.
    pub const WIDE_VIEWPORT_MIN_PX: u32 = 768;

    pub fn for_viewport_width(px: u32) -> Self {
        if px >= Self::WIDE_VIEWPORT_MIN_PX {
            Self::Wide
        } else {
            Self::Compact
        }
    }

    pub fn constraints(self) -> CaptureConstraints {
        match self {
            Self::Compact => CaptureConstraints {
                width: 480,
                height: 640,
                facing: Facing::User,
            },
            Self::Wide => CaptureConstraints {
                width: 1280,
                height: 720,
                facing: Facing::User,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Facing {
    User,
    Environment,
}

/// Resolution/facing request handed to a media source on acquisition.
///
/// Audio-only backends honor what they can and ignore the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub width: u32,
    pub height: u32,
    pub facing: Facing,
}

/// How the capture backend encodes samples inside its raw chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    F32Le,
    I16Le,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::F32Le => 4,
            Self::I16Le => 2,
        }
    }
}

/// Metadata describing the raw recorded byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawContainer {
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

impl RawContainer {
    pub fn bytes_per_frame(&self) -> usize {
        self.sample_format.bytes_per_sample() * self.channels as usize
    }
}

/// The raw recorded container: every chunk in arrival order, concatenated.
#[derive(Debug, Clone, PartialEq)]
pub struct RawArtifact {
    pub container: RawContainer,
    pub bytes: Vec<u8>,
}

/// The transcoded, upload-ready audio object. Exactly one per completed
/// recording; discarded on restart.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedAsset {
    pub session: SessionId,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for EncodedAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedAsset")
            .field("session", &self.session)
            .field("mime_type", &self.mime_type)
            .field("bytes_len", &self.bytes.len())
            .finish()
    }
}

/// Outcome of one transcription request.
///
/// The two variants are mutually exclusive: a service-reported error is
/// surfaced as display text instead of a transcript, never alongside one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranscriptionOutcome {
    Transcript(String),
    ServiceError(String),
}

impl TranscriptionOutcome {
    /// The text shown to the user either way.
    pub fn display_text(&self) -> &str {
        match self {
            Self::Transcript(t) | Self::ServiceError(t) => t,
        }
    }
}
