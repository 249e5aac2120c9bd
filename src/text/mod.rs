// Text normalization module
// Canonicalizes question text so corpus entries and queries compare consistently


/// Normalize raw question text into its canonical form.
///
/// Lowercases, strips every character outside the alphanumeric/whitespace
/// class, collapses whitespace runs to single spaces, and trims the ends.
/// The same function is applied to corpus documents and to incoming queries,
/// so paraphrases that differ only in casing or punctuation map to the same
/// key. Idempotent: `normalize(normalize(s)) == normalize(s)`.
#[inline]
#[must_use]
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
        } else if ch.is_alphanumeric() {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        }
        // Everything else (punctuation, symbols) is dropped.
    }

    out
}

/// Count whitespace-delimited tokens in already-normalized text.
#[inline]
#[must_use]
pub fn token_count(normalized: &str) -> usize {
    normalized.split_whitespace().count()
}
