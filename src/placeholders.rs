use once_cell::sync::Lazy;
use regex::Regex;

pub const BUTTON_PLACEHOLDER_PREFIX: &str = "BUTTON_PLACEHOLDER_";

pub static BUTTON_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"BUTTON_PLACEHOLDER_\d+").expect("button token regex"));

pub fn button_token(index: usize) -> String {
    format!("{BUTTON_PLACEHOLDER_PREFIX}{index}")
}

/// A button element lifted out of the document before chunking. `markup` is
/// the original serialized element, byte-for-byte.
#[derive(Clone, Debug)]
pub struct ButtonOriginal {
    pub token: String,
    pub markup: String,
}

/// Substitutes each placeholder token back with its original button markup,
/// matched by exact token text. Tokens the generator dropped or mangled are
/// returned so the caller can surface them; the output is left as-is for
/// those.
pub fn restore_buttons(html: &str, originals: &[ButtonOriginal]) -> (String, Vec<String>) {
    let mut out = html.to_string();
    let mut unresolved: Vec<String> = Vec::new();
    for orig in originals {
        if out.contains(orig.token.as_str()) {
            out = out.replacen(orig.token.as_str(), &orig.markup, 1);
        } else {
            unresolved.push(orig.token.clone());
        }
    }
    (out, unresolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_indexed_and_detectable() {
        assert_eq!(button_token(0), "BUTTON_PLACEHOLDER_0");
        assert!(BUTTON_TOKEN_RE.is_match("xx BUTTON_PLACEHOLDER_12 yy"));
        assert!(!BUTTON_TOKEN_RE.is_match("BUTTON_PLACEHOLDER_"));
    }

    #[test]
    fn restore_replaces_each_token_once() {
        let originals = vec![
            ButtonOriginal {
                token: button_token(0),
                markup: "<button>Buy</button>".to_string(),
            },
            ButtonOriginal {
                token: button_token(1),
                markup: "<button>Sell</button>".to_string(),
            },
        ];
        let (out, unresolved) =
            restore_buttons("a BUTTON_PLACEHOLDER_0 b BUTTON_PLACEHOLDER_1 c", &originals);
        assert_eq!(out, "a <button>Buy</button> b <button>Sell</button> c");
        assert!(unresolved.is_empty());
    }

    #[test]
    fn restore_reports_dropped_tokens() {
        let originals = vec![ButtonOriginal {
            token: button_token(0),
            markup: "<button>Buy</button>".to_string(),
        }];
        let (out, unresolved) = restore_buttons("the generator ate it", &originals);
        assert_eq!(out, "the generator ate it");
        assert_eq!(unresolved, vec!["BUTTON_PLACEHOLDER_0".to_string()]);
    }
}
