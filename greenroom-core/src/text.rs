use regex::Regex;
use std::sync::OnceLock;

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{2,}").expect("valid whitespace regex"))
}

/// Normalize a transcript for display and prompting.
///
/// Speech-to-text output tends to carry stray newlines and doubled spaces;
/// collapse runs and trim so the emptiness gate sees real content only.
pub fn normalize_transcript(text: &str) -> String {
    let out = whitespace_re().replace_all(text, " ");
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(
            normalize_transcript("  I led   a\n\nproject "),
            "I led a project"
        );
    }

    #[test]
    fn whitespace_only_normalizes_to_empty() {
        assert_eq!(normalize_transcript(" \n\t "), "");
    }
}
