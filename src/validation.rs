//! Input validation shared by the registration, upload, and search paths.
//!
//! Grounded on the original's `utils/input_validation.py` / `utils/
//! file_validation.py`, re-expressed with `regex` the way the teacher crate
//! validates identifiers inline (see `peer_health.rs`'s config bounds checks).

use once_cell::sync::Lazy;
use regex::Regex;

static PEER_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{3,50}$").unwrap());

const FORBIDDEN_NAME_CHARS: &[char] = &['.', '/', '\\', ':', '*', '?', '"', '<', '>', '|'];

const ALLOWED_EXTENSIONS: &[&str] = &[
    "txt", "md", "pdf", "doc", "docx", "zip", "tar", "gz", "png", "jpg", "jpeg", "gif", "mp3",
    "mp4", "mkv", "json", "csv", "bin", "iso",
];

pub const MIN_UPLOAD_SIZE: u64 = 1;
pub const MAX_UPLOAD_SIZE: u64 = 100 * 1024 * 1024;

pub fn validate_peer_id(peer_id: &str) -> Result<(), String> {
    if PEER_ID_RE.is_match(peer_id) {
        Ok(())
    } else {
        Err(format!(
            "peer_id must be 3-50 chars of [A-Za-z0-9_-], got {peer_id:?}"
        ))
    }
}

pub fn validate_host(host: &str) -> Result<(), String> {
    if host.trim().is_empty() {
        return Err("host must not be empty".to_string());
    }
    Ok(())
}

pub fn validate_port(port: u16) -> Result<(), String> {
    if port == 0 {
        return Err("port must be nonzero".to_string());
    }
    Ok(())
}

/// Validates an upload's declared filename. Note: the leading `.` check
/// also rejects directory traversal (`..`), matching the spec's combined
/// character blocklist rather than a separate path-traversal check.
pub fn validate_filename(filename: &str) -> Result<(), String> {
    if filename.trim().is_empty() {
        return Err("filename must not be empty".to_string());
    }
    if filename.chars().any(|c| FORBIDDEN_NAME_CHARS.contains(&c)) {
        return Err(format!(
            "filename {filename:?} contains a forbidden character"
        ));
    }
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase());
    match ext {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(format!(
            "filename {filename:?} has an extension not in the allow-list"
        )),
    }
}

pub fn validate_size(size: u64) -> Result<(), String> {
    if size < MIN_UPLOAD_SIZE || size > MAX_UPLOAD_SIZE {
        return Err(format!(
            "size {size} out of bounds [{MIN_UPLOAD_SIZE}, {MAX_UPLOAD_SIZE}]"
        ));
    }
    Ok(())
}

pub fn validate_file_hash(hash: &str) -> Result<(), String> {
    if hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(format!("file_hash must be 64 hex chars, got {hash:?}"))
    }
}

/// Clamp pagination parameters per spec.md §6/§8: out-of-range silently
/// clamps to defaults rather than erroring.
pub fn clamp_pagination(page: Option<u32>, limit: Option<u32>) -> (u32, u32) {
    let page = match page {
        Some(p) if p >= 1 => p,
        _ => 1,
    };
    let limit = match limit {
        Some(l) if (1..=100).contains(&l) => l,
        _ => 50,
    };
    (page, limit)
}
