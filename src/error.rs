//! Error types for playback and article loading.

use serde::Serialize;

/// Errors surfaced by the playback controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaybackError {
    /// The platform has no speech synthesis engine.
    #[error("Speech synthesis is not supported on this platform")]
    UnsupportedPlatform,

    /// The engine reported a failure while speaking a chunk.
    #[error("Speech synthesis failed on chunk {}: {message}", chunk_index + 1)]
    ChunkPlayback { chunk_index: usize, message: String },
}

/// Errors produced while turning a URL into a readable article.
///
/// The messages are shown to the user as-is.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    /// Not an http(s) URL.
    #[error("Please enter a valid URL (e.g., https://example.com)")]
    InvalidUrl,

    /// Every proxy refused the request and the direct fetch was blocked.
    #[error("Cannot access this website due to security restrictions. Try a different URL or try using our alternative CORS proxies.")]
    Blocked,

    /// The site could not be reached at all.
    #[error("Could not connect to the website. Please check the URL and try again.")]
    Unreachable(#[source] reqwest::Error),

    /// The site answered with a non-success status.
    #[error("Failed to fetch URL: {0}")]
    Http(reqwest::StatusCode),

    /// The page had too little text, or the extractor found no article.
    #[error("No readable content found on this page. Try a different URL or check if the site allows content extraction.")]
    NoReadableContent,

    /// The extractor itself failed.
    #[error("Content extraction failed: {0}")]
    Extraction(#[from] anyhow::Error),
}
