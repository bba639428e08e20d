//! Deterministic, lightweight normalization used for stable fixture keys.

/// Normalize a query for fixture-key matching.
///
/// Goals:
/// - never panic
/// - lowercase, whitespace-normalized
/// - punctuation acts as a separator, so "Who won? (1983)" and
///   "who won 1983" produce the same key
pub fn scrub(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_space = true;
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            for c in ch.to_lowercase() {
                out.push(c);
            }
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim().to_string()
}
