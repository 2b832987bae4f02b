use crate::types::{RawArtifact, RawContainer};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Armed,
    Recording,
    Stopped,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecorderError {
    #[error("no media source armed")]
    NotArmed,

    #[error("recording already started")]
    AlreadyStarted,

    #[error("recording artifact is not ready")]
    ArtifactNotReady,
}

/// Chunk-accumulating recording controller.
///
/// The capture backend is the producer; whoever drives this controller is the
/// consumer. Chunks are appended in arrival order and only while recording;
/// anything delivered outside the recording window is dropped rather than
/// allowed to corrupt the artifact.
#[derive(Debug)]
pub struct RecordingController {
    state: RecorderState,
    container: Option<RawContainer>,
    chunks: Vec<Vec<u8>>,
}

impl Default for RecordingController {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingController {
    pub fn new() -> Self {
        Self {
            state: RecorderState::Idle,
            container: None,
            chunks: Vec::new(),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Media acquisition succeeded; remember the container and await an
    /// explicit start.
    pub fn arm(&mut self, container: RawContainer) {
        self.state = RecorderState::Armed;
        self.container = Some(container);
        self.chunks.clear();
    }

    pub fn start(&mut self) -> Result<(), RecorderError> {
        match self.state {
            RecorderState::Armed => {
                self.state = RecorderState::Recording;
                Ok(())
            }
            RecorderState::Idle => Err(RecorderError::NotArmed),
            RecorderState::Recording | RecorderState::Stopped => {
                Err(RecorderError::AlreadyStarted)
            }
        }
    }

    /// Append a raw chunk. Silently discarded unless recording: the upstream
    /// should not emit outside the window, but a late chunk must not land in
    /// the artifact.
    pub fn on_chunk(&mut self, bytes: Vec<u8>) {
        if self.state != RecorderState::Recording {
            return;
        }
        if bytes.is_empty() {
            return;
        }
        self.chunks.push(bytes);
    }

    /// Stop accepting chunks. A second stop (timer expiry racing a manual
    /// stop) is a no-op, so the pair collapses to a single transition.
    pub fn stop(&mut self) {
        if self.state == RecorderState::Recording {
            self.state = RecorderState::Stopped;
        }
    }

    /// The concatenated chunk sequence, valid only once stopped.
    pub fn artifact(&self) -> Result<RawArtifact, RecorderError> {
        if self.state != RecorderState::Stopped {
            return Err(RecorderError::ArtifactNotReady);
        }
        let container = self.container.ok_or(RecorderError::NotArmed)?;

        let total: usize = self.chunks.iter().map(|c| c.len()).sum();
        let mut bytes = Vec::with_capacity(total);
        for chunk in &self.chunks {
            bytes.extend_from_slice(chunk);
        }

        Ok(RawArtifact { container, bytes })
    }

    /// Back to idle, discarding everything.
    pub fn reset(&mut self) {
        self.state = RecorderState::Idle;
        self.container = None;
        self.chunks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SampleFormat;

    fn container() -> RawContainer {
        RawContainer {
            sample_rate_hz: 48_000,
            channels: 1,
            sample_format: SampleFormat::F32Le,
        }
    }

    #[test]
    fn artifact_before_stop_is_not_ready() {
        let mut rec = RecordingController::new();
        rec.arm(container());
        rec.start().unwrap();
        rec.on_chunk(vec![1, 2]);
        assert_eq!(rec.artifact().unwrap_err(), RecorderError::ArtifactNotReady);
    }

    #[test]
    fn artifact_is_chunks_in_arrival_order() {
        let mut rec = RecordingController::new();
        rec.arm(container());
        rec.start().unwrap();
        rec.on_chunk(vec![1, 2]);
        rec.on_chunk(vec![3]);
        rec.on_chunk(vec![4, 5, 6]);
        rec.stop();

        let artifact = rec.artifact().unwrap();
        assert_eq!(artifact.bytes, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(artifact.container, container());
    }

    #[test]
    fn chunks_outside_recording_are_discarded() {
        let mut rec = RecordingController::new();
        rec.arm(container());
        rec.on_chunk(vec![9, 9]); // armed, not yet recording
        rec.start().unwrap();
        rec.on_chunk(vec![1]);
        rec.stop();
        rec.on_chunk(vec![8, 8]); // stopped

        assert_eq!(rec.artifact().unwrap().bytes, vec![1]);
    }

    #[test]
    fn double_stop_is_single_transition() {
        let mut rec = RecordingController::new();
        rec.arm(container());
        rec.start().unwrap();
        rec.on_chunk(vec![1]);
        rec.stop();
        rec.stop(); // expiry racing a manual stop

        assert_eq!(rec.state(), RecorderState::Stopped);
        assert_eq!(rec.artifact().unwrap().bytes, vec![1]);
    }

    #[test]
    fn start_requires_armed_media() {
        let mut rec = RecordingController::new();
        assert_eq!(rec.start().unwrap_err(), RecorderError::NotArmed);

        rec.arm(container());
        rec.start().unwrap();
        assert_eq!(rec.start().unwrap_err(), RecorderError::AlreadyStarted);
    }

    #[test]
    fn reset_discards_chunks_and_container() {
        let mut rec = RecordingController::new();
        rec.arm(container());
        rec.start().unwrap();
        rec.on_chunk(vec![1, 2, 3]);
        rec.stop();
        rec.reset();

        assert_eq!(rec.state(), RecorderState::Idle);
        assert_eq!(rec.chunk_count(), 0);
        assert_eq!(rec.artifact().unwrap_err(), RecorderError::ArtifactNotReady);
    }
}
