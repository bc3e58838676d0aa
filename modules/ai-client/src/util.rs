/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Clip prompt input to `max_bytes`, marking the cut so the model knows text is missing.
pub fn clip_for_prompt(s: &str, max_bytes: usize) -> String {
    let clipped = truncate_to_char_boundary(s, max_bytes);
    if clipped.len() == s.len() {
        clipped.to_string()
    } else {
        format!("{clipped}\n[... truncated {} bytes]", s.len() - clipped.len())
    }
}

/// Strip markdown code fences from a response.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}
