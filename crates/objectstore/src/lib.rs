//! Content-addressed payload store backends for the Meteorite indexer.
//!
//! Inscription content is stored by SHA-256 under
//! `inscriptions/<hash><ext>`, so identical bytes always map to the same
//! path and `put` is a safe no-op on replay.

mod memory;
mod s3;

pub use memory::MemoryPayloadStore;
pub use s3::{S3Config, S3PayloadStore};

/// File extension for an advertised MIME type.
///
/// Only types the explorer actually serves get an extension; everything
/// else is stored bare.
pub fn mime_extension(mime: &str) -> &'static str {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/png" => ".png",
        "image/jpeg" | "image/jpg" => ".jpg",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/svg+xml" => ".svg",
        "text/plain" => ".txt",
        "text/html" => ".html",
        "text/markdown" => ".md",
        "application/json" => ".json",
        "audio/mpeg" => ".mp3",
        "video/mp4" => ".mp4",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_mime_types() {
        assert_eq!(mime_extension("image/png"), ".png");
        assert_eq!(mime_extension(" IMAGE/JPEG "), ".jpg");
        assert_eq!(mime_extension("application/octet-stream"), "");
    }
}
