use anyhow::{Context, anyhow};
use greenroom_core::types::TranscriptionOutcome;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TranscriptionReply {
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Decode a 2xx transcription body into its outcome.
///
/// A service-reported `error` wins even when a `transcript` is also present;
/// it is surfaced as display text, not as a transport failure.
pub fn parse_transcription(body: &[u8]) -> anyhow::Result<TranscriptionOutcome> {
    let reply: TranscriptionReply =
        serde_json::from_slice(body).context("decode transcription JSON")?;

    if let Some(error) = reply.error {
        return Ok(TranscriptionOutcome::ServiceError(error));
    }

    reply
        .transcript
        .map(TranscriptionOutcome::Transcript)
        .ok_or_else(|| anyhow!("neither transcript nor error in transcription response"))
}
