//! Human-friendly translation of raw provider errors.
//!
//! Background failures store the provider's message verbatim; anything
//! surfaced to a person goes through this translation, which keeps the
//! original text for diagnostics.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Broad category of a processing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    RateLimit,
    FileTooLarge,
    UnsupportedFormat,
    Network,
    Auth,
    Storage,
    NotFound,
    Download,
    Generic,
}

/// What the user should do about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    Wait,
    ContactSupport,
    CheckSettings,
    Retry,
}

/// A user-facing rendering of a raw error message.
#[derive(Debug, Clone, Serialize)]
pub struct UserFacingError {
    pub category: ErrorCategory,
    pub friendly_message: String,
    pub suggested_action: SuggestedAction,
    /// Original technical message, preserved for diagnostics.
    pub original_error: String,
}

/// Translate a raw error message into an actionable user-facing one.
pub fn format_for_user(error_message: &str) -> UserFacingError {
    let lower = error_message.to_lowercase();

    let (category, friendly, action) = if lower.contains("rate limit")
        || lower.contains("too many requests")
    {
        (
            ErrorCategory::RateLimit,
            "Processing limit reached. The system retries automatically; just wait a moment."
                .to_string(),
            SuggestedAction::Wait,
        )
    } else if lower.contains("file")
        && (lower.contains("large") || lower.contains("size") || lower.contains("limit"))
    {
        (
            ErrorCategory::FileTooLarge,
            "This audio file is too large. It will be compressed and retried automatically."
                .to_string(),
            SuggestedAction::Retry,
        )
    } else if lower.contains("format") || lower.contains("codec") || lower.contains("invalid audio")
    {
        (
            ErrorCategory::UnsupportedFormat,
            "This audio format isn't supported. Please use MP3, WAV, or M4A files.".to_string(),
            SuggestedAction::Retry,
        )
    } else if ["network", "connection", "timeout", "timed out", "unreachable"]
        .iter()
        .any(|w| lower.contains(w))
    {
        (
            ErrorCategory::Network,
            "Connection issue detected. Check your internet connection and retry.".to_string(),
            SuggestedAction::Retry,
        )
    } else if lower.contains("api key")
        || lower.contains("authentication")
        || lower.contains("unauthorized")
    {
        (
            ErrorCategory::Auth,
            "API authentication issue. This is a configuration problem; check your API key."
                .to_string(),
            SuggestedAction::CheckSettings,
        )
    } else if lower.contains("disk") || lower.contains("no space") || lower.contains("storage") {
        (
            ErrorCategory::Storage,
            "Server storage is full. Please contact support to free up space.".to_string(),
            SuggestedAction::ContactSupport,
        )
    } else if lower.contains("not found")
        && (lower.contains("episode") || lower.contains("podcast"))
    {
        (
            ErrorCategory::NotFound,
            "This episode is no longer available in the podcast feed. It may have been removed \
             by the publisher."
                .to_string(),
            SuggestedAction::ContactSupport,
        )
    } else if lower.contains("download") {
        (
            ErrorCategory::Download,
            "Failed to download the audio file. The podcast URL may be broken or the file may \
             have been removed."
                .to_string(),
            SuggestedAction::Retry,
        )
    } else {
        (
            ErrorCategory::Generic,
            generic_message(error_message),
            SuggestedAction::Retry,
        )
    };

    UserFacingError {
        category,
        friendly_message: friendly,
        suggested_action: action,
        original_error: error_message.to_string(),
    }
}

/// Strip technical junk from an unrecognized message and cap its length.
fn generic_message(message: &str) -> String {
    if message.is_empty() {
        return "An unexpected error occurred. Please try again.".to_string();
    }

    static ERROR_CODE: OnceLock<Regex> = OnceLock::new();
    static JSON_BLOB: OnceLock<Regex> = OnceLock::new();
    static ORG_ID: OnceLock<Regex> = OnceLock::new();

    let error_code =
        ERROR_CODE.get_or_init(|| Regex::new(r"Error code: \d+\s*-\s*").expect("valid regex"));
    let json_blob = JSON_BLOB.get_or_init(|| Regex::new(r"\{[^}]*\}").expect("valid regex"));
    let org_id = ORG_ID.get_or_init(|| Regex::new(r"org_[a-zA-Z0-9]+").expect("valid regex"));

    let cleaned = error_code.replace_all(message, "");
    let cleaned = json_blob.replace_all(&cleaned, "");
    let cleaned = org_id.replace_all(&cleaned, "");
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return "An unexpected error occurred. Please try again.".to_string();
    }

    if cleaned.chars().count() > 200 {
        let truncated: String = cleaned.chars().take(200).collect();
        return format!("{truncated}... If this persists, please contact support.");
    }

    cleaned.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_suggest_waiting() {
        let formatted =
            format_for_user("Rate limit reached for whisper-large-v3: try again in 1m59.5s");
        assert_eq!(formatted.category, ErrorCategory::RateLimit);
        assert_eq!(formatted.suggested_action, SuggestedAction::Wait);
        assert!(formatted.original_error.contains("1m59.5s"));
    }

    #[test]
    fn auth_problems_point_at_settings() {
        let formatted = format_for_user("401 Unauthorized: invalid api key provided");
        assert_eq!(formatted.category, ErrorCategory::Auth);
        assert_eq!(formatted.suggested_action, SuggestedAction::CheckSettings);
    }

    #[test]
    fn oversized_files_are_categorized() {
        let formatted = format_for_user("File exceeds the 25MB size limit");
        assert_eq!(formatted.category, ErrorCategory::FileTooLarge);
    }

    #[test]
    fn download_failures_suggest_retry() {
        let formatted = format_for_user("Audio download failed: Server returned 404");
        assert_eq!(formatted.category, ErrorCategory::Download);
        assert_eq!(formatted.suggested_action, SuggestedAction::Retry);
    }

    #[test]
    fn generic_errors_lose_technical_junk() {
        let formatted = format_for_user(
            r#"Error code: 400 - {"error": "detail"} something went wrong for org_abc123"#,
        );
        assert_eq!(formatted.category, ErrorCategory::Generic);
        assert!(!formatted.friendly_message.contains("org_abc123"));
        assert!(!formatted.friendly_message.contains('{'));
        assert!(formatted.friendly_message.contains("something went wrong"));
        // The raw message survives for diagnostics.
        assert!(formatted.original_error.contains("org_abc123"));
    }

    #[test]
    fn long_generic_messages_are_truncated() {
        let formatted = format_for_user(&"x".repeat(500));
        assert!(formatted.friendly_message.len() < 300);
        assert!(formatted.friendly_message.contains("contact support"));
    }

    #[test]
    fn empty_message_gets_a_fallback() {
        let formatted = format_for_user("");
        assert_eq!(formatted.category, ErrorCategory::Generic);
        assert!(!formatted.friendly_message.is_empty());
    }
}
