//! Helpers for turning URL path pieces into safe file names

use sha2::{Digest, Sha256};

/// Characters that are rejected by at least one common filesystem
const UNSAFE_CHARS: &[char] = &[':', '*', '?', '"', '<', '>', '|'];

/// Hex-encoded SHA-256 of `input`, truncated to `len` characters
pub fn short_hash(input: &str, len: usize) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(len);
    encoded
}

/// Splits a path into segments that cannot escape the mirror root
///
/// Empty, `.` and `..` segments are dropped and unsafe characters are
/// replaced with `_`.
pub fn sanitize_segments(path: &str) -> Vec<String> {
    path.split(['/', '\\'])
        .filter(|segment| !matches!(*segment, "" | "." | ".."))
        .map(sanitize_segment)
        .filter(|segment| !segment.is_empty())
        .collect()
}

fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| {
            if c.is_control() || UNSAFE_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Trailing dots and spaces are silently stripped on some platforms
    let trimmed = cleaned.trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Splits a file name into stem and extension (with its leading dot)
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(idx) => name.split_at(idx),
    }
}

/// Returns true if the file name carries an extension
pub fn has_extension(name: &str) -> bool {
    !split_extension(name).1.is_empty()
}

/// Truncates to at most `max` bytes on a char boundary
pub fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Shortens a segment longer than `limit` bytes
///
/// The extension is kept and a hash of the full segment is appended to a
/// readable prefix, so distinct long names stay distinct.
pub fn shorten_segment(segment: &str, limit: usize) -> String {
    if segment.len() <= limit {
        return segment.to_string();
    }
    let (stem, ext) = split_extension(segment);
    let ext = if ext.len() > limit / 4 { "" } else { ext };
    let hash = short_hash(segment, 12);
    let keep = limit.saturating_sub(ext.len() + hash.len() + 1);
    format!("{}-{}{}", truncate_bytes(stem, keep), hash, ext)
}

/// Inserts `suffix` between the stem and the extension of a file name
pub fn with_stem_suffix(name: &str, suffix: &str) -> String {
    let (stem, ext) = split_extension(name);
    format!("{}{}{}", stem, suffix, ext)
}

/// Maps a Content-Type to the file extension used for assets without one
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    let ext = match mime.as_str() {
        "text/css" => "css",
        "text/javascript" | "application/javascript" | "application/x-javascript" => "js",
        "text/html" | "application/xhtml+xml" => "html",
        "text/plain" => "txt",
        "text/xml" | "application/xml" => "xml",
        "application/json" | "application/manifest+json" => "json",
        "application/pdf" => "pdf",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "image/webp" => "webp",
        "image/avif" => "avif",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        "font/woff" | "application/font-woff" => "woff",
        "font/woff2" => "woff2",
        "font/ttf" | "application/x-font-ttf" => "ttf",
        "font/otf" => "otf",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "audio/mpeg" => "mp3",
        _ => return None,
    };
    Some(ext)
}
