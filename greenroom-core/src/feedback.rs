use crate::text::normalize_transcript;
use crate::types::Question;
use serde::{Deserialize, Serialize};

/// Build the critique prompt from the question and the (normalized)
/// transcript. The generation service receives this as a single
/// natural-language prompt.
pub fn build_feedback_prompt(question: &Question, transcript: &str) -> String {
    let transcript = normalize_transcript(transcript);
    format!(
        "Please give feedback on the following interview question: {} - given the following transcript: {}",
        question.text, transcript
    )
}

/// Incrementally assembled critique text.
///
/// Append-only: fragments are applied strictly in arrival order, and nothing
/// is accepted after the stream is marked complete. A transport drop
/// mid-stream leaves the partial text in place and completes the stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackStream {
    accumulated_text: String,
    complete: bool,
}

impl FeedbackStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.accumulated_text
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn push_fragment(&mut self, fragment: &str) {
        if self.complete {
            return;
        }
        self.accumulated_text.push_str(fragment);
    }

    pub fn mark_complete(&mut self) {
        self.complete = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_question_and_transcript() {
        let q = Question::new("Tell me about a conflict you resolved.");
        let p = build_feedback_prompt(&q, "I  talked to\nboth sides.");
        assert_eq!(
            p,
            "Please give feedback on the following interview question: \
             Tell me about a conflict you resolved. - given the following \
             transcript: I talked to both sides."
        );
    }

    #[test]
    fn fragments_accumulate_in_order() {
        let mut fb = FeedbackStream::new();
        fb.push_fragment("Good ");
        fb.push_fragment("start.");
        fb.push_fragment(" Consider depth.");
        assert_eq!(fb.text(), "Good start. Consider depth.");
        assert!(!fb.is_complete());
    }

    #[test]
    fn complete_stream_rejects_late_fragments() {
        let mut fb = FeedbackStream::new();
        fb.push_fragment("partial");
        fb.mark_complete();
        fb.push_fragment(" late");
        assert_eq!(fb.text(), "partial");
        assert!(fb.is_complete());
    }
}
