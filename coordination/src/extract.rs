//! Numeric answer extraction from free-text oracle output.
//!
//! Agents are instructed to end with `{{answer}}`, e.g. `The answer is {{42}}.`
//! The first `{{...}}` holding a signed integer or decimal is the answer.

use std::sync::LazyLock;

use regex::Regex;

use crate::protocol::AnswerToken;

static ANSWER_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(-?\d+(?:\.\d+)?)\s*\}\}").expect("ANSWER_MARKER regex should compile")
});

/// The oracle output carried no answer marker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("response does not contain an answer marker: {preview:?}")]
pub struct ExtractionError {
    /// First characters of the offending response.
    pub preview: String,
}

/// Extract the numeric token, failing when no marker is present.
pub fn extract_answer(text: &str) -> Result<String, ExtractionError> {
    ANSWER_MARKER
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ExtractionError {
            preview: text.chars().take(80).collect(),
        })
}

/// Extract the numeric token, degrading to [`AnswerToken::NotFound`].
pub fn extract_or_sentinel(text: &str) -> AnswerToken {
    match extract_answer(text) {
        Ok(value) => AnswerToken::Value(value),
        Err(_) => AnswerToken::NotFound,
    }
}

/// The format instruction appended to every answer-producing prompt.
pub const ANSWER_FORMAT: &str = "Your final answer should be a single numerical number, \
in the form of {{answer}}, at the end of your response.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_integer() {
        assert_eq!(
            extract_answer("April 48, May 24, so the total is {{72}}.").unwrap(),
            "72"
        );
    }

    #[test]
    fn test_extracts_signed_decimal() {
        assert_eq!(extract_answer("It drops to {{-3.5}}").unwrap(), "-3.5");
        assert_eq!(extract_answer("{{ 100 }}").unwrap(), "100");
    }

    #[test]
    fn test_first_marker_wins() {
        assert_eq!(extract_answer("{{1}} then {{2}}").unwrap(), "1");
    }

    #[test]
    fn test_missing_marker_is_error() {
        let err = extract_answer("The answer is 72.").unwrap_err();
        assert!(err.preview.starts_with("The answer"));
        assert!(extract_answer("{{seventy-two}}").is_err());
        assert!(extract_answer("{72}").is_err());
    }

    #[test]
    fn test_sentinel_on_missing_marker() {
        assert_eq!(extract_or_sentinel("no idea"), AnswerToken::NotFound);
        assert_eq!(
            extract_or_sentinel("{{8}}"),
            AnswerToken::Value("8".to_string())
        );
    }
}
