// src/util.rs — Shared utility functions

/// Truncate a string for display/logging (UTF-8 safe).
///
/// Returns a substring of at most `max_len` bytes, ensuring the cut
/// point falls on a valid UTF-8 character boundary.
pub fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        s
    } else {
        let mut end = max_len;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }
}

/// Derive a conversation title from its first message: a bounded prefix
/// with an ellipsis marker when the text was cut.
pub fn title_from_seed(seed: &str, max_len: usize) -> String {
    let trimmed = seed.trim();
    let cut = truncate_str(trimmed, max_len);
    if cut.len() < trimmed.len() {
        format!("{cut}...")
    } else {
        cut.to_string()
    }
}

/// Human-readable file size ("1.50 MB").
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".into();
    }
    let exp = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exp as i32);
    if exp == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[exp])
    }
}
