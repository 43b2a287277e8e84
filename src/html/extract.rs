use crate::html::dom::{HtmlDocument, HtmlEvent};
use crate::textutil::{contains_unsubscribe, visible_text};

/// Tag kinds whose text content is eligible for per-unit rewriting.
pub const PERSONALIZABLE_TAGS: [&str; 4] = ["p", "b", "i", "span"];

/// Tag kinds that are never rewritten and shield everything inside them.
pub const OPAQUE_TAGS: [&str; 4] = ["a", "button", "img", "video"];

/// One rewritable text unit. The owning node is referenced by event index
/// range into the [`HtmlDocument`], not by pointer, so units can be built,
/// retried and discarded while the document stays immutable.
#[derive(Clone, Debug)]
pub struct RewritableUnit {
    pub unit_id: usize,
    pub tag: String,
    pub start_index: usize,
    pub end_index: usize,
    /// Serialized content between the element's tags, byte-for-byte.
    pub original_inner: String,
    /// Tag-stripped, whitespace-collapsed, trimmed text of the unit.
    pub original_text: String,
}

/// Extraction result. `cleared` holds element ranges whose text turned out
/// to be pure whitespace; they are normalized to empty by the reassembler,
/// not rewritten. The document itself is not touched here.
#[derive(Clone, Debug, Default)]
pub struct Extraction {
    pub units: Vec<RewritableUnit>,
    pub cleared: Vec<(usize, usize)>,
}

pub fn extract_rewritable_units(doc: &HtmlDocument) -> Extraction {
    let ranges = doc.element_ranges();
    let mut out = Extraction::default();
    let mut next_id = 1usize;

    // Everything below `opaque_until` sits inside a link/button/media
    // element; everything below `unit_until` sits inside an already
    // selected (or cleared) unit and is covered by its rewrite.
    let mut opaque_until = 0usize;
    let mut unit_until = 0usize;

    for (idx, ev) in doc.events.iter().enumerate() {
        let HtmlEvent::StartTag { name, .. } = ev else {
            continue;
        };

        if OPAQUE_TAGS.contains(&name.as_str()) {
            if let Some(&end) = ranges.get(&idx) {
                opaque_until = opaque_until.max(end);
            }
            continue;
        }
        if idx < opaque_until || idx < unit_until {
            continue;
        }
        if !PERSONALIZABLE_TAGS.contains(&name.as_str()) {
            continue;
        }
        let Some(&end) = ranges.get(&idx) else {
            continue;
        };

        let original_inner = doc.inner_raw(idx, end);
        let original_text = visible_text(&original_inner);

        if original_text.is_empty() {
            out.cleared.push((idx, end));
            unit_until = unit_until.max(end);
            continue;
        }
        if contains_unsubscribe(&original_text) {
            continue;
        }

        out.units.push(RewritableUnit {
            unit_id: next_id,
            tag: name.clone(),
            start_index: idx,
            end_index: end,
            original_inner,
            original_text,
        });
        next_id += 1;
        unit_until = unit_until.max(end);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str) -> Extraction {
        extract_rewritable_units(&HtmlDocument::parse(html))
    }

    #[test]
    fn only_personalizable_tags_produce_units() {
        let ex = extract(
            "<p>intro</p><a href=\"x\">link text</a><button>Buy now</button>\
             <img src=\"x.png\"><video src=\"v.mp4\"></video><div>div text</div>",
        );
        assert_eq!(ex.units.len(), 1);
        assert_eq!(ex.units[0].tag, "p");
        assert_eq!(ex.units[0].original_text, "intro");
    }

    #[test]
    fn units_come_in_tree_order_with_stable_ids() {
        let ex = extract("<p>one</p><span>two</span><i>three</i>");
        let texts: Vec<&str> = ex.units.iter().map(|u| u.original_text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        let ids: Vec<usize> = ex.units.iter().map(|u| u.unit_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn nested_eligible_elements_fold_into_the_outer_unit() {
        let ex = extract("<p>one <b>two</b></p>");
        assert_eq!(ex.units.len(), 1);
        assert_eq!(ex.units[0].original_inner, "one <b>two</b>");
    }

    #[test]
    fn spans_inside_buttons_and_links_are_shielded() {
        let ex = extract(
            "<button><span>Buy now</span></button><a href=\"x\"><span>go</span></a><span>free</span>",
        );
        assert_eq!(ex.units.len(), 1);
        assert_eq!(ex.units[0].original_text, "free");
    }

    #[test]
    fn unsubscribe_units_are_left_verbatim() {
        let ex = extract("<p>Buy things</p><p>Click to Unsubscribe anytime</p>");
        assert_eq!(ex.units.len(), 1);
        assert_eq!(ex.units[0].original_text, "Buy things");
    }

    #[test]
    fn whitespace_only_units_are_cleared_not_rewritten() {
        let ex = extract("<p>   </p><p>real</p>");
        assert_eq!(ex.units.len(), 1);
        assert_eq!(ex.units[0].original_text, "real");
        assert_eq!(ex.cleared.len(), 1);
    }

    #[test]
    fn unclosed_elements_are_not_extracted() {
        let ex = extract("<p>dangling");
        assert!(ex.units.is_empty());
    }
}
