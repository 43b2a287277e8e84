use once_cell::sync::Lazy;
use regex::Regex;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));

/// Tag-stripped, whitespace-collapsed, trimmed rendering of a markup
/// fragment. Tags are replaced by a single space so adjacent words do not
/// fuse across element boundaries.
pub fn visible_text(fragment: &str) -> String {
    let stripped = TAG_RE.replace_all(fragment, " ");
    WS_RE.replace_all(&stripped, " ").trim().to_string()
}

pub fn visible_len(fragment: &str) -> usize {
    visible_text(fragment).chars().count()
}

/// Whitespace-delimited token count used for the prompt budget check.
pub fn count_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn contains_unsubscribe(text: &str) -> bool {
    text.to_lowercase().contains("unsubscribe")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_text_strips_tags_and_collapses_whitespace() {
        assert_eq!(visible_text("<b>Hello</b>\n  <i>there</i>"), "Hello there");
        assert_eq!(visible_text("  plain  text "), "plain text");
        assert_eq!(visible_text("<img src=\"x.png\">"), "");
    }

    #[test]
    fn visible_len_counts_chars_not_bytes() {
        assert_eq!(visible_len("<p>héllo</p>"), 5);
    }

    #[test]
    fn token_count_is_whitespace_delimited() {
        assert_eq!(count_tokens("a b\n c\t d"), 4);
        assert_eq!(count_tokens(""), 0);
    }

    #[test]
    fn unsubscribe_match_is_case_insensitive() {
        assert!(contains_unsubscribe("Click here to UNSUBSCRIBE now"));
        assert!(!contains_unsubscribe("subscribe"));
    }
}
