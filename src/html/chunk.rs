use crate::html::dom::{HtmlDocument, HtmlEvent};
use crate::placeholders::{button_token, ButtonOriginal};

/// Default upper bound on chunk length, in characters.
pub const DEFAULT_CHUNK_CHARS: usize = 6000;

/// Replaces every (outermost) button element with a unique placeholder
/// token, recording the original markup in document order. The chunked
/// strategy runs this before serializing so the generator never sees
/// button content.
pub fn lift_buttons(doc: &mut HtmlDocument) -> Vec<ButtonOriginal> {
    let ranges = doc.element_ranges();
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut skip_until = 0usize;
    for (idx, ev) in doc.events.iter().enumerate() {
        if let HtmlEvent::StartTag { name, .. } = ev {
            if idx >= skip_until && name == "button" {
                if let Some(&end) = ranges.get(&idx) {
                    spans.push((idx, end));
                    skip_until = end + 1;
                }
            }
        }
    }

    let mut originals: Vec<ButtonOriginal> = Vec::with_capacity(spans.len());
    for (i, &(start, end)) in spans.iter().enumerate() {
        let mut markup = String::new();
        for ev in &doc.events[start..=end] {
            markup.push_str(ev.raw());
        }
        originals.push(ButtonOriginal {
            token: button_token(i),
            markup,
        });
    }
    for (i, &(start, end)) in spans.iter().enumerate().rev() {
        doc.events.splice(
            start..=end,
            std::iter::once(HtmlEvent::Text {
                raw: button_token(i),
            }),
        );
    }
    originals
}

/// Splits serialized markup into chunks of at most `bound` characters,
/// cutting only right after a complete tag (or at end of input). When no
/// tag boundary falls within the bound the chunk runs long to the next
/// one rather than cutting inside a tag or splitting a text run off a
/// boundary, so concatenating the chunks always reproduces the input
/// exactly.
pub fn split_at_tag_boundaries(html: &str, bound: usize) -> Vec<String> {
    let bound = bound.max(1);
    let doc = HtmlDocument::parse(html);

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut pending = String::new();

    for ev in &doc.events {
        pending.push_str(ev.raw());
        let cuttable = matches!(
            ev,
            HtmlEvent::StartTag { .. }
                | HtmlEvent::EndTag { .. }
                | HtmlEvent::Comment { .. }
                | HtmlEvent::Doctype { .. }
        );
        if !cuttable {
            continue;
        }
        if !current.is_empty() && current.chars().count() + pending.chars().count() > bound {
            chunks.push(std::mem::take(&mut current));
        }
        current.push_str(&pending);
        pending.clear();
        if current.chars().count() >= bound {
            chunks.push(std::mem::take(&mut current));
        }
    }
    current.push_str(&pending);
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
