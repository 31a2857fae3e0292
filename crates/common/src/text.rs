//! Query text normalization
//!
//! Lowercases, splits on anything that is not a letter, digit or `_`, and
//! rejoins the tokens with single spaces. Apostrophes and hyphens split words,
//! so `"what's"` becomes `"what s"` and `"follow-up"` becomes `"follow up"`.

/// Split text into lowercase word tokens
pub fn tokenize(raw: &str) -> Vec<String> {
    raw.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalize text into its canonical lookup form
pub fn normalize(raw: &str) -> String {
    tokenize(raw).join(" ")
}
