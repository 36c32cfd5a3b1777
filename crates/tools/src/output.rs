/// Cut `text` to at most `max_bytes`, backing off to a char boundary.
/// Returns the kept prefix and whether anything was dropped.
pub fn truncate_utf8(text: &str, max_bytes: usize) -> (&str, bool) {
    if text.len() <= max_bytes {
        return (text, false);
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    (&text[..end], true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(truncate_utf8("abc", 10), ("abc", false));
    }

    #[test]
    fn test_cut_lands_on_char_boundary() {
        // Each of these is three bytes in UTF-8.
        let (kept, cut) = truncate_utf8("回收站", 4);
        assert_eq!(kept, "回");
        assert!(cut);
    }
}
