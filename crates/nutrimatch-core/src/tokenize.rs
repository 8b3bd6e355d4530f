//! The single tokenization scheme shared by corpus build and query time.
//!
//! Whitespace split, surrounding ASCII punctuation trimmed, lowercased.
//! No stemming, so `"mushrooms"` and `"mushroom"` stay distinct terms.

pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|raw| raw.trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
