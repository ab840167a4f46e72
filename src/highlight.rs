use regex::{Regex, RegexBuilder};

/// Case-insensitive literal matcher for the deck search term. Returns `None`
/// when the trimmed term is empty.
pub fn build_search_regex(term: &str) -> Option<Regex> {
    let trimmed = term.trim();
    if trimmed.is_empty() {
        return None;
    }
    RegexBuilder::new(&regex::escape(trimmed))
        .case_insensitive(true)
        .build()
        .ok()
}

/// Splits `text` into `(segment, matched)` pairs covering the whole string.
pub fn split_matches<'t>(text: &'t str, regex: Option<&Regex>) -> Vec<(&'t str, bool)> {
    let Some(re) = regex else {
        return vec![(text, false)];
    };
    let mut parts = Vec::new();
    let mut last = 0;
    for mat in re.find_iter(text) {
        if mat.start() > last {
            parts.push((&text[last..mat.start()], false));
        }
        parts.push((mat.as_str(), true));
        last = mat.end();
    }
    if last < text.len() {
        parts.push((&text[last..], false));
    }
    if parts.is_empty() {
        parts.push((text, false));
    }
    parts
}
