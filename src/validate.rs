use anyhow::anyhow;

use crate::textutil::visible_len;

/// Markup markers that must survive a rewrite: if a marker occurs in the
/// original fragment it must occur in the candidate. Presence only; counts
/// and positions are not checked.
const REQUIRED_MARKERS: [&str; 10] = [
    "<a", "</a>", "<b", "</b>", "<i", "</i>", "<button>", "</button>", "<img>", "<video>",
];

/// Decides whether `candidate` is an acceptable substitute for `original`.
///
/// The length bound compares visible characters (tags stripped, whitespace
/// collapsed) and rejects only when the delta exceeds the original length.
/// The bound is deliberately permissive: it catches gross truncation or
/// runaway expansion, nothing subtler.
pub fn validate_rewrite(original: &str, candidate: &str) -> anyhow::Result<()> {
    let len_o = visible_len(original);
    let len_c = visible_len(candidate);
    if len_o.abs_diff(len_c) > len_o {
        return Err(anyhow!("length_out_of_bounds src={len_o} tgt={len_c}"));
    }

    for marker in REQUIRED_MARKERS {
        if original.contains(marker) && !candidate.contains(marker) {
            return Err(anyhow!("missing_markup:{marker}"));
        }
    }
    Ok(())
}

pub fn is_valid(original: &str, candidate: &str) -> bool {
    validate_rewrite(original, candidate).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_candidate_within_bound_is_accepted() {
        // visible lengths: 11 vs 3, delta 8 <= 11
        assert!(is_valid("Hello there", "Hi!"));
    }

    #[test]
    fn runaway_expansion_is_rejected() {
        // visible lengths: 11 vs 35, delta 24 > 11
        let long = "a much much longer candidate string";
        assert_eq!(long.len(), 35);
        assert!(!is_valid("Hello there", long));
    }

    #[test]
    fn boundary_equality_is_accepted() {
        // delta == len_o exactly: 4 vs 8
        assert!(is_valid("abcd", "abcdabcd"));
        // and the degenerate zero-length candidate sits on the boundary too
        assert!(is_valid("abcd", ""));
    }

    #[test]
    fn length_uses_visible_text_not_markup() {
        let original = "<b>hi</b>";
        let candidate = "<b>hi there, way way way more visible text than before</b>";
        assert!(!is_valid(original, candidate));
        assert!(is_valid("<b>hi</b>", "<b>ho</b>"));
    }

    #[test]
    fn markers_present_in_original_must_survive() {
        assert!(!is_valid("see <a href=\"x\">this</a>", "see this"));
        assert!(!is_valid("<b>bold</b> word", "bold word"));
        assert!(is_valid(
            "see <a href=\"x\">this</a>",
            "check <a href=\"x\">that</a>"
        ));
    }

    #[test]
    fn markers_absent_from_original_are_unconstrained() {
        assert!(is_valid("plain words", "other <b>bolder</b> words"));
    }

    #[test]
    fn rejection_reasons_are_reportable() {
        let err = validate_rewrite("<i>x</i>", "y").unwrap_err();
        assert!(err.to_string().starts_with("missing_markup:"));
    }
}
