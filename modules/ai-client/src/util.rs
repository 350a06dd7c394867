/// Truncate `s` to at most `max_bytes` bytes without splitting a character.
///
/// Used to keep provider error bodies readable in logs.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let end = (0..=max_bytes)
        .rev()
        .find(|&i| s.is_char_boundary(i))
        .unwrap_or(0);
    &s[..end]
}

/// Strip a markdown code fence some models put around JSON content.
pub fn strip_code_blocks(response: &str) -> &str {
    let trimmed = response.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_multibyte_characters() {
        let text = "عاجل: breaking";
        let truncated = truncate_to_char_boundary(text, 3);
        assert!(truncated.len() <= 3);
        assert!(text.starts_with(truncated));
    }

    #[test]
    fn short_strings_are_untouched() {
        assert_eq!(truncate_to_char_boundary("ok", 100), "ok");
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        assert_eq!(strip_code_blocks("```json\n{\"items\":[]}\n```"), "{\"items\":[]}");
        assert_eq!(strip_code_blocks("```\n[]\n```"), "[]");
        assert_eq!(strip_code_blocks("  {}  "), "{}");
    }
}
