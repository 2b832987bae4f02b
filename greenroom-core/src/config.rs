use crate::types::CaptureProfile;
use serde::{Deserialize, Serialize};

/// Session knobs. Everything has a default so the pipeline can run against a
/// local backend without any configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Hard cap on recording length; the countdown auto-stops at zero.
    pub max_recording_secs: u32,

    pub capture_profile: CaptureProfile,

    /// Upload endpoint; the question is appended as a query parameter.
    pub transcribe_endpoint: String,

    /// Streaming critique endpoint.
    pub generate_endpoint: String,

    /// Whether a service-reported transcription error (surfaced as transcript
    /// text) should still be sent for feedback generation.
    #[serde(default)]
    pub feedback_on_soft_error: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_recording_secs: 150,
            capture_profile: CaptureProfile::Wide,
            transcribe_endpoint: "http://localhost:3000/api/transcribe".into(),
            generate_endpoint: "http://localhost:3000/api/generate".into(),
            feedback_on_soft_error: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cap_recording_at_150s() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.max_recording_secs, 150);
        assert_eq!(cfg.capture_profile, CaptureProfile::Wide);
        assert!(!cfg.feedback_on_soft_error);
    }

    #[test]
    fn soft_error_flag_defaults_off_when_absent_from_json() {
        let json = r#"{
            "max_recording_secs": 60,
            "capture_profile": "Compact",
            "transcribe_endpoint": "http://h/api/transcribe",
            "generate_endpoint": "http://h/api/generate"
        }"#;
        let cfg: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.max_recording_secs, 60);
        assert!(!cfg.feedback_on_soft_error);
    }
}
