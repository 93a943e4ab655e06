//! Media URL helpers shared by the publish and image-download queues.

use crate::error::CoreError;

/// Split a stored media-URL string into individual URLs.
///
/// Accepts comma- and newline-separated lists; empty segments are dropped.
pub fn split_media_urls(raw: &str) -> Vec<String> {
    raw.split([',', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Validate that a download URL is non-empty and starts with `http`.
pub fn validate_download_url(url: &str) -> Result<(), CoreError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(
            "Download URL must not be empty".to_string(),
        ));
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(CoreError::Validation(format!(
            "Download URL must start with http:// or https://, got: '{trimmed}'"
        )));
    }
    Ok(())
}

/// Guess a file extension from an image URL, defaulting to `webp`.
pub fn guess_extension_from_url(url: &str) -> &'static str {
    let lower = url.to_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or("");
    for ext in ["jpeg", "jpg", "png", "gif", "webp", "bmp"] {
        if path.ends_with(&format!(".{ext}")) {
            return match ext {
                "jpeg" | "jpg" => "jpg",
                "png" => "png",
                "gif" => "gif",
                "bmp" => "bmp",
                _ => "webp",
            };
        }
    }
    if lower.contains("webp") {
        return "webp";
    }
    "webp"
}
