use std::collections::HashMap;

use memchr::memchr;

/// One lexical event of the source document. `raw` always holds the exact
/// input bytes the event was parsed from (tag markup including brackets,
/// text including entity references), so serialization is concatenation and
/// an unmodified parse round-trips byte-identically.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HtmlEvent {
    Doctype { raw: String },
    Comment { raw: String },
    StartTag {
        name: String,
        raw: String,
        self_closing: bool,
    },
    EndTag { name: String, raw: String },
    Text { raw: String },
    /// Contents of a raw-text element (script/style/textarea), verbatim.
    RawText { raw: String },
}

impl HtmlEvent {
    pub fn raw(&self) -> &str {
        match self {
            HtmlEvent::Doctype { raw }
            | HtmlEvent::Comment { raw }
            | HtmlEvent::StartTag { raw, .. }
            | HtmlEvent::EndTag { raw, .. }
            | HtmlEvent::Text { raw }
            | HtmlEvent::RawText { raw } => raw,
        }
    }
}

#[derive(Clone)]
pub struct HtmlDocument {
    pub events: Vec<HtmlEvent>,
}

impl HtmlDocument {
    /// Tolerant parse: never fails. Anything that does not scan as a tag,
    /// comment or doctype (stray `<`, unterminated constructs) is kept as
    /// opaque text so the document still serializes to the input bytes.
    pub fn parse(html: &str) -> Self {
        let events = tokenize(html);
        Self { events }
    }

    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(self.events.iter().map(|e| e.raw().len()).sum());
        for ev in &self.events {
            out.push_str(ev.raw());
        }
        out
    }

    /// Maps each StartTag event index to its matching EndTag event index.
    /// End tags with no open start of the same name are ignored; start tags
    /// never closed (or implicitly closed by the input) get no entry.
    pub fn element_ranges(&self) -> HashMap<usize, usize> {
        let mut ranges: HashMap<usize, usize> = HashMap::new();
        let mut stack: Vec<(usize, &str)> = Vec::new();
        for (idx, ev) in self.events.iter().enumerate() {
            match ev {
                HtmlEvent::StartTag {
                    name, self_closing, ..
                } => {
                    if !self_closing {
                        stack.push((idx, name.as_str()));
                    }
                }
                HtmlEvent::EndTag { name, .. } => {
                    if let Some(pos) = stack.iter().rposition(|(_, n)| *n == name.as_str()) {
                        let (start_idx, _) = stack[pos];
                        ranges.insert(start_idx, idx);
                        stack.truncate(pos);
                    }
                }
                _ => {}
            }
        }
        ranges
    }

    /// Serialized content between a start tag and its end tag, exclusive.
    pub fn inner_raw(&self, start: usize, end: usize) -> String {
        let mut out = String::new();
        for ev in &self.events[start + 1..end] {
            out.push_str(ev.raw());
        }
        out
    }

    /// Replaces the events strictly between `start` and `end` with
    /// `replacement`. Indices of events before `start` are unaffected;
    /// callers splicing several ranges must work back-to-front.
    pub fn splice_inner(&mut self, start: usize, end: usize, replacement: Vec<HtmlEvent>) {
        self.events.splice(start + 1..end, replacement);
    }
}

pub fn is_void_element(name: &str) -> bool {
    matches!(
        name,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta"
            | "param" | "source" | "track" | "wbr"
    )
}

fn is_raw_text_element(name: &str) -> bool {
    matches!(name, "script" | "style" | "textarea")
}

fn tokenize(input: &str) -> Vec<HtmlEvent> {
    let bytes = input.as_bytes();
    let n = bytes.len();
    let mut events: Vec<HtmlEvent> = Vec::new();
    let mut i = 0usize;

    while i < n {
        let lt = match memchr(b'<', &bytes[i..]) {
            Some(off) => i + off,
            None => {
                events.push(HtmlEvent::Text {
                    raw: input[i..].to_string(),
                });
                break;
            }
        };
        if lt > i {
            events.push(HtmlEvent::Text {
                raw: input[i..lt].to_string(),
            });
        }

        if bytes[lt..].starts_with(b"<!--") {
            match find_subslice(bytes, b"-->", lt + 4) {
                Some(end) => {
                    events.push(HtmlEvent::Comment {
                        raw: input[lt..end + 3].to_string(),
                    });
                    i = end + 3;
                }
                None => {
                    events.push(HtmlEvent::Comment {
                        raw: input[lt..].to_string(),
                    });
                    break;
                }
            }
            continue;
        }

        if bytes[lt..].starts_with(b"<!") || bytes[lt..].starts_with(b"<?") {
            match memchr(b'>', &bytes[lt..]) {
                Some(off) => {
                    let end = lt + off + 1;
                    let raw = input[lt..end].to_string();
                    if bytes[lt + 1] == b'!' {
                        events.push(HtmlEvent::Doctype { raw });
                    } else {
                        events.push(HtmlEvent::Comment { raw });
                    }
                    i = end;
                }
                None => {
                    events.push(HtmlEvent::Text {
                        raw: input[lt..].to_string(),
                    });
                    break;
                }
            }
            continue;
        }

        let is_end = bytes.get(lt + 1) == Some(&b'/');
        let name_at = if is_end { lt + 2 } else { lt + 1 };
        if name_at >= n || !bytes[name_at].is_ascii_alphabetic() {
            // Stray `<` (e.g. "a < b"): literal text.
            events.push(HtmlEvent::Text {
                raw: input[lt..lt + 1].to_string(),
            });
            i = lt + 1;
            continue;
        }

        let gt = match find_tag_end(bytes, lt) {
            Some(g) => g,
            None => {
                // Unterminated tag: opaque text to end of input.
                events.push(HtmlEvent::Text {
                    raw: input[lt..].to_string(),
                });
                break;
            }
        };
        let raw = input[lt..gt + 1].to_string();
        let name = tag_name(&input[name_at..gt]);

        if is_end {
            events.push(HtmlEvent::EndTag { name, raw });
            i = gt + 1;
            continue;
        }

        let explicit_self_close = bytes[gt.saturating_sub(1)] == b'/';
        let self_closing = explicit_self_close || is_void_element(&name);
        let raw_text = !explicit_self_close && is_raw_text_element(&name);
        events.push(HtmlEvent::StartTag {
            name: name.clone(),
            raw,
            self_closing,
        });
        i = gt + 1;

        if raw_text {
            let close = find_close_tag(input, &name, i);
            let end = close.unwrap_or(n);
            if end > i {
                events.push(HtmlEvent::RawText {
                    raw: input[i..end].to_string(),
                });
            }
            i = end;
        }
    }

    events
}

/// Finds the `>` closing the tag that starts at `bytes[start] == b'<'`,
/// skipping over quoted attribute values.
fn find_tag_end(bytes: &[u8], start: usize) -> Option<usize> {
    let n = bytes.len();
    let mut i = start + 1;
    let mut quote: u8 = 0;
    while i < n {
        let b = bytes[i];
        if quote != 0 {
            if b == quote {
                quote = 0;
            }
        } else if b == b'"' || b == b'\'' {
            quote = b;
        } else if b == b'>' {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn tag_name(tag_body: &str) -> String {
    let trimmed = tag_body.trim_start();
    let end = trimmed
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':'))
        .unwrap_or(trimmed.len());
    trimmed[..end].to_ascii_lowercase()
}

/// Byte offset of `</name` (any case) at or after `from`, for raw-text
/// element content.
fn find_close_tag(input: &str, name: &str, from: usize) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut i = from;
    while let Some(off) = memchr(b'<', &bytes[i..]) {
        let at = i + off;
        if bytes.get(at + 1) == Some(&b'/') {
            let rest = &bytes[at + 2..];
            if rest.len() >= name.len() && rest[..name.len()].eq_ignore_ascii_case(name.as_bytes())
            {
                return Some(at);
            }
        }
        i = at + 1;
    }
    None
}

fn find_subslice(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}
