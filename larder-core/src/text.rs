//! Word-boundary string helpers shared by the resolver and matcher.

/// True when `needle` occurs in `haystack` on word boundaries, case-insensitively.
///
/// A plural suffix ("s" / "es") directly after the needle still counts as a
/// boundary, so "bun" matches "Hot Dog Buns" but "flour" does not match
/// "flourless".
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    let haystack = haystack.to_lowercase();
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return false;
    }

    haystack.match_indices(&needle).any(|(start, matched)| {
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !is_word_char(c));
        let rest = &haystack[start + matched.len()..];
        let rest = rest
            .strip_prefix("es")
            .filter(|r| !r.starts_with(is_word_char))
            .or_else(|| rest.strip_prefix('s'))
            .unwrap_or(rest);
        let after_ok = rest.chars().next().map_or(true, |c| !is_word_char(c));
        before_ok && after_ok
    })
}

/// Lowercase word tokens, keeping `&` and apostrophes inside words ("m&m's").
pub fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(is_word_char(c) || c == '&' || c == '\''))
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}
