use std::collections::HashMap;

use anyhow::anyhow;
use sha2::{Digest, Sha256};

use crate::html::dom::{HtmlDocument, HtmlEvent};

/// Final content for one unit, produced by the retry controller: either the
/// accepted candidate or the unit's original inner markup.
#[derive(Clone, Debug)]
pub struct UnitReplacement {
    pub start_index: usize,
    pub end_index: usize,
    pub final_inner: String,
}

/// Splices every unit's final content back into the document, normalizes
/// cleared (whitespace-only) elements, and serializes once. Button and
/// media markup outside the rewritten ranges is covered by a signature
/// taken before and after the rebuild; a mismatch means the reassembly
/// itself corrupted protected markup and fails the segment.
pub fn reassemble_with_units(
    doc: &HtmlDocument,
    cleared: &[(usize, usize)],
    replacements: &[UnitReplacement],
) -> anyhow::Result<String> {
    let unit_ranges: Vec<(usize, usize)> = replacements
        .iter()
        .map(|r| (r.start_index, r.end_index))
        .collect();
    let baseline = opaque_signature(&doc.events, &unit_ranges);

    let by_start: HashMap<usize, &UnitReplacement> =
        replacements.iter().map(|r| (r.start_index, r)).collect();

    let mut new_events: Vec<HtmlEvent> = Vec::with_capacity(doc.events.len());
    let mut new_ranges: Vec<(usize, usize)> = Vec::new();

    let mut i = 0usize;
    while i < doc.events.len() {
        if let Some(rep) = by_start.get(&i) {
            new_events.push(doc.events[i].clone());
            let start = new_events.len() - 1;
            new_events.extend(HtmlDocument::parse(&rep.final_inner).events);
            let end = new_events.len();
            new_ranges.push((start, end));
            new_events.push(doc.events[rep.end_index].clone());
            i = rep.end_index + 1;
            continue;
        }
        let mut ev = doc.events[i].clone();
        if let HtmlEvent::Text { raw } = &mut ev {
            if cleared.iter().any(|&(s, e)| i > s && i < e) {
                raw.clear();
            }
        }
        new_events.push(ev);
        i += 1;
    }

    let current = opaque_signature(&new_events, &new_ranges);
    if current != baseline {
        return Err(anyhow!(
            "protected markup changed during reassembly (baseline={baseline} current={current})"
        ));
    }

    let rebuilt = HtmlDocument { events: new_events };
    Ok(rebuilt.serialize())
}

/// Hash over button/video elements (tags and full content) and image tags,
/// skipping events inside the given inner ranges.
fn opaque_signature(events: &[HtmlEvent], excluded: &[(usize, usize)]) -> String {
    let mut hasher = Sha256::new();
    let mut opaque_depth = 0usize;
    for (idx, ev) in events.iter().enumerate() {
        if excluded.iter().any(|&(s, e)| idx > s && idx < e) {
            continue;
        }
        match ev {
            HtmlEvent::StartTag {
                name,
                raw,
                self_closing,
            } if name == "button" || name == "video" => {
                hasher.update(raw.as_bytes());
                hasher.update(b"\n");
                if !self_closing {
                    opaque_depth += 1;
                }
            }
            HtmlEvent::EndTag { name, raw } if name == "button" || name == "video" => {
                hasher.update(raw.as_bytes());
                hasher.update(b"\n");
                opaque_depth = opaque_depth.saturating_sub(1);
            }
            HtmlEvent::StartTag { name, raw, .. } if name == "img" => {
                hasher.update(raw.as_bytes());
                hasher.update(b"\n");
            }
            _ if opaque_depth > 0 => {
                hasher.update(ev.raw().as_bytes());
                hasher.update(b"\n");
            }
            _ => {}
        }
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::extract::extract_rewritable_units;

    const SRC: &str =
        "<p>Hello there</p><button class=\"cta\">Buy now</button><p>Second paragraph</p>";

    fn replacements_for(src: &str, texts: &[&str]) -> (HtmlDocument, Vec<UnitReplacement>) {
        let doc = HtmlDocument::parse(src);
        let ex = extract_rewritable_units(&doc);
        assert_eq!(ex.units.len(), texts.len());
        let reps = ex
            .units
            .iter()
            .zip(texts)
            .map(|(u, t)| UnitReplacement {
                start_index: u.start_index,
                end_index: u.end_index,
                final_inner: t.to_string(),
            })
            .collect();
        (doc, reps)
    }

    #[test]
    fn rewritten_units_are_spliced_in_order() {
        let (doc, reps) = replacements_for(SRC, &["Hi you", "Another one"]);
        let out = reassemble_with_units(&doc, &[], &reps).unwrap();
        assert_eq!(
            out,
            "<p>Hi you</p><button class=\"cta\">Buy now</button><p>Another one</p>"
        );
    }

    #[test]
    fn reverting_every_unit_reproduces_the_input() {
        let doc = HtmlDocument::parse(SRC);
        let ex = extract_rewritable_units(&doc);
        let reps: Vec<UnitReplacement> = ex
            .units
            .iter()
            .map(|u| UnitReplacement {
                start_index: u.start_index,
                end_index: u.end_index,
                final_inner: u.original_inner.clone(),
            })
            .collect();
        let out = reassemble_with_units(&doc, &ex.cleared, &reps).unwrap();
        assert_eq!(out, SRC);
    }

    #[test]
    fn button_markup_survives_any_rewrite() {
        let (doc, reps) = replacements_for(SRC, &["x", "y"]);
        let out = reassemble_with_units(&doc, &[], &reps).unwrap();
        assert!(out.contains("<button class=\"cta\">Buy now</button>"));
    }

    #[test]
    fn cleared_elements_serialize_empty() {
        let src = "<p>  \n </p><p>kept</p>";
        let doc = HtmlDocument::parse(src);
        let ex = extract_rewritable_units(&doc);
        let reps: Vec<UnitReplacement> = ex
            .units
            .iter()
            .map(|u| UnitReplacement {
                start_index: u.start_index,
                end_index: u.end_index,
                final_inner: u.original_inner.clone(),
            })
            .collect();
        let out = reassemble_with_units(&doc, &ex.cleared, &reps).unwrap();
        assert_eq!(out, "<p></p><p>kept</p>");
    }

    #[test]
    fn fragments_with_markup_parse_into_the_tree() {
        let (doc, reps) = replacements_for(
            "<p>plain</p>",
            &["now with <b>bold</b> inside"],
        );
        let out = reassemble_with_units(&doc, &[], &reps).unwrap();
        assert_eq!(out, "<p>now with <b>bold</b> inside</p>");
    }
}
