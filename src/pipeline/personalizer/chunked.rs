use anyhow::anyhow;

use crate::backend::{GenerationError, QUOTA_MESSAGE};
use crate::html::chunk::{lift_buttons, split_at_tag_boundaries};
use crate::html::dom::HtmlDocument;
use crate::pipeline::prompts::chunk_prompt;
use crate::placeholders::restore_buttons;
use crate::textutil::count_tokens;

use super::{RewriteStrategy, SegmentCx, SegmentOutcome, SegmentSpec};

/// Whole-document strategy: buttons are lifted to placeholder tokens, the
/// serialized document is rewritten chunk by chunk, and the chunks are
/// concatenated and the buttons restored. There is no per-chunk fallback:
/// any chunk failure aborts the segment and discards partial output.
pub(crate) struct ChunkedStrategy;

impl RewriteStrategy for ChunkedStrategy {
    fn name(&self) -> &'static str {
        "chunked"
    }

    fn segment_key(&self, spec: &SegmentSpec) -> String {
        format!("Segment {}", spec.index)
    }

    fn personalize(
        &self,
        cx: &SegmentCx<'_>,
        html: &str,
        spec: &SegmentSpec,
    ) -> anyhow::Result<SegmentOutcome> {
        let mut doc = HtmlDocument::parse(html);
        let buttons = lift_buttons(&mut doc);
        let masked = doc.serialize();
        let chunks = split_at_tag_boundaries(&masked, cx.chunk_chars);

        let total = chunks.len();
        let mut rewritten = String::with_capacity(masked.len());

        for (i, chunk) in chunks.iter().enumerate() {
            let prompt = chunk_prompt(cx.prompts, &spec.description, chunk, cx.platform);
            if count_tokens(&prompt) > cx.prompt_token_budget {
                return Err(anyhow!(
                    "prompt for chunk {}/{total} exceeds the {}-token budget; shorten the input",
                    i + 1,
                    cx.prompt_token_budget
                ));
            }
            let _ = cx.trace.write_chunk_text(spec.index, i + 1, "prompt", &prompt);

            let output = cx.backend.rewrite(&prompt).map_err(|err| match err {
                GenerationError::Quota(_) => {
                    anyhow!("{QUOTA_MESSAGE} (chunk {}/{total})", i + 1)
                }
                GenerationError::Backend(msg) => {
                    anyhow!("generating chunk {}/{total} failed: {msg}", i + 1)
                }
            })?;
            if output.trim().is_empty() {
                return Err(anyhow!("chunk {}/{total} returned no content", i + 1));
            }
            let _ = cx.trace.write_chunk_text(spec.index, i + 1, "output", &output);

            rewritten.push_str(&output);
            cx.progress.progress("rewrite chunks", i + 1, total.max(1));
        }

        let (restored, unresolved) = restore_buttons(&rewritten, &buttons);
        let warnings: Vec<String> = unresolved
            .iter()
            .map(|t| format!("placeholder_unrestored:{t}"))
            .collect();

        Ok(SegmentOutcome {
            key: self.segment_key(spec),
            html: restored,
            units_total: total,
            units_accepted: total,
            units_reverted: 0,
            warnings,
        })
    }
}
