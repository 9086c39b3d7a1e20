//! Context windows around a search hit.

/// Extract a window of `context` characters on either side of the first
/// case-insensitive occurrence of `query` in `content`, wrapped in `...`.
///
/// Returns `None` for an empty query or when there is no match.
pub fn snippet(content: &str, query: &str, context: usize) -> Option<String> {
    let needle: Vec<char> = query.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return None;
    }

    let chars: Vec<char> = content.chars().collect();
    (0..chars.len()).find_map(|start| {
        let end = match_at(&chars, start, &needle)?;
        let from = start.saturating_sub(context);
        let to = (end + context).min(chars.len());
        let window: String = chars[from..to].iter().collect();
        Some(format!("...{}...", window))
    })
}

/// Index one past the last char of a match beginning at `start`.
fn match_at(chars: &[char], start: usize, needle: &[char]) -> Option<usize> {
    let mut matched = 0;
    let mut pos = start;
    while matched < needle.len() {
        let c = *chars.get(pos)?;
        for lower in c.to_lowercase() {
            if needle.get(matched) != Some(&lower) {
                return None;
            }
            matched += 1;
        }
        pos += 1;
    }
    Some(pos)
}
