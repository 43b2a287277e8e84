use crate::backend::QUOTA_MESSAGE;
use crate::html::apply::{reassemble_with_units, UnitReplacement};
use crate::html::dom::HtmlDocument;
use crate::html::extract::{extract_rewritable_units, Extraction};
use crate::pipeline::prompts::unit_prompt;
use crate::pipeline::retry::{rewrite_with_retry, AttemptVerdict};

use super::{RewriteStrategy, SegmentCx, SegmentOutcome, SegmentSpec};

/// Per-unit strategy: each paragraph/bold/italic/span is rewritten
/// independently with validation and bounded retry; a unit that never
/// validates is reverted and the rest of the segment continues.
pub(crate) struct UnitwiseStrategy;

impl RewriteStrategy for UnitwiseStrategy {
    fn name(&self) -> &'static str {
        "unitwise"
    }

    fn segment_key(&self, spec: &SegmentSpec) -> String {
        spec.description.clone()
    }

    fn personalize(
        &self,
        cx: &SegmentCx<'_>,
        html: &str,
        spec: &SegmentSpec,
    ) -> anyhow::Result<SegmentOutcome> {
        let doc = HtmlDocument::parse(html);
        let extraction: Extraction = extract_rewritable_units(&doc);

        let total = extraction.units.len();
        let mut replacements: Vec<UnitReplacement> = Vec::with_capacity(total);
        let mut warnings: Vec<String> = Vec::new();
        let mut accepted = 0usize;
        let mut reverted = 0usize;

        for (i, unit) in extraction.units.iter().enumerate() {
            let prompt = unit_prompt(cx.prompts, &spec.description, &unit.original_text);
            let _ = cx
                .trace
                .write_unit_text(spec.index, unit.unit_id, 0, "prompt", &prompt);

            let outcome = rewrite_with_retry(
                cx.backend,
                &prompt,
                &unit.original_inner,
                cx.max_attempts,
            );

            for a in &outcome.attempts {
                if let Some(out) = a.output.as_deref() {
                    let _ =
                        cx.trace
                            .write_unit_text(spec.index, unit.unit_id, a.attempt, "output", out);
                }
                match &a.verdict {
                    AttemptVerdict::Accepted => {}
                    AttemptVerdict::Rejected(reason) => {
                        cx.progress.info(format!(
                            "unit {} attempt {} rejected: {reason}",
                            unit.unit_id, a.attempt
                        ));
                    }
                    AttemptVerdict::Failed(msg) => {
                        cx.progress.warn(format!(
                            "unit {} attempt {} backend failure: {msg}",
                            unit.unit_id, a.attempt
                        ));
                    }
                    AttemptVerdict::QuotaExhausted(msg) => {
                        cx.progress.warn(format!(
                            "unit {} attempt {} quota failure: {msg}",
                            unit.unit_id, a.attempt
                        ));
                    }
                }
            }

            if outcome.hit_quota() {
                warnings.push(format!("{QUOTA_MESSAGE} (unit {})", unit.unit_id));
            }
            if outcome.accepted {
                accepted += 1;
            } else {
                reverted += 1;
                cx.progress.warn(format!(
                    "unit {} reverted to original after {} attempts",
                    unit.unit_id,
                    outcome.attempts.len()
                ));
            }

            replacements.push(UnitReplacement {
                start_index: unit.start_index,
                end_index: unit.end_index,
                final_inner: outcome.final_inner,
            });
            cx.progress.progress("rewrite units", i + 1, total.max(1));
        }

        let html = reassemble_with_units(&doc, &extraction.cleared, &replacements)?;
        Ok(SegmentOutcome {
            key: self.segment_key(spec),
            html,
            units_total: total,
            units_accepted: accepted,
            units_reverted: reverted,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GenerationError, RewriteBackend};
    use crate::pipeline::prompts::PromptCatalog;
    use crate::pipeline::trace::TraceWriter;
    use crate::progress::ConsoleProgress;

    struct FixedBackend {
        reply: Result<String, ()>,
        quota: bool,
    }

    impl FixedBackend {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                quota: false,
            }
        }

        fn quota() -> Self {
            Self {
                reply: Err(()),
                quota: true,
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                quota: false,
            }
        }
    }

    impl RewriteBackend for FixedBackend {
        fn rewrite(&self, _prompt: &str) -> Result<String, GenerationError> {
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(()) if self.quota => Err(GenerationError::Quota("http 429".into())),
                Err(()) => Err(GenerationError::Backend("boom".into())),
            }
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn run(backend: &dyn RewriteBackend, html: &str) -> SegmentOutcome {
        let prompts = PromptCatalog::builtin();
        let progress = ConsoleProgress::new(false);
        let trace = TraceWriter::disabled();
        let cx = SegmentCx {
            backend,
            prompts: &prompts,
            progress: &progress,
            trace: &trace,
            max_attempts: 3,
            chunk_chars: 6000,
            prompt_token_budget: 4096,
            platform: "",
        };
        UnitwiseStrategy
            .personalize(
                &cx,
                html,
                &SegmentSpec {
                    index: 1,
                    description: "frugal shoppers".to_string(),
                },
            )
            .unwrap()
    }

    const SCENARIO: &str = "<p>Hello there</p><button>Buy now</button>";

    #[test]
    fn short_but_in_bound_candidate_is_accepted() {
        // visible lengths 11 vs 3: delta 8 within the bound
        let out = run(&FixedBackend::ok("Hi!"), SCENARIO);
        assert_eq!(out.html, "<p>Hi!</p><button>Buy now</button>");
        assert_eq!(out.units_accepted, 1);
        assert_eq!(out.units_reverted, 0);
    }

    #[test]
    fn out_of_bound_candidate_reverts_and_keeps_the_button() {
        let long = "this candidate is far far far too long to pass the visible length bound";
        let out = run(&FixedBackend::ok(long), SCENARIO);
        assert_eq!(out.html, SCENARIO);
        assert_eq!(out.units_accepted, 0);
        assert_eq!(out.units_reverted, 1);
    }

    #[test]
    fn button_text_is_byte_identical_regardless_of_backend() {
        for backend in [
            FixedBackend::ok("Hi!"),
            FixedBackend::ok("x".repeat(500).as_str()),
            FixedBackend::failing(),
        ] {
            let out = run(&backend, SCENARIO);
            assert!(out.html.contains("<button>Buy now</button>"));
        }
    }

    #[test]
    fn quota_failures_revert_and_warn_once_per_unit() {
        let out = run(
            &FixedBackend::quota(),
            "<p>First paragraph here</p><p>Second paragraph here</p>",
        );
        assert_eq!(
            out.html,
            "<p>First paragraph here</p><p>Second paragraph here</p>"
        );
        assert_eq!(out.units_reverted, 2);
        let quota_warnings: Vec<&String> = out
            .warnings
            .iter()
            .filter(|w| w.contains("quota"))
            .collect();
        assert_eq!(quota_warnings.len(), 2);
        assert!(quota_warnings[0].contains("unit 1"));
        assert!(quota_warnings[1].contains("unit 2"));
    }

    #[test]
    fn unsubscribe_footer_is_never_sent_to_the_backend() {
        struct PanicBackend;
        impl RewriteBackend for PanicBackend {
            fn rewrite(&self, prompt: &str) -> Result<String, GenerationError> {
                assert!(!prompt.to_lowercase().contains("unsubscribe"));
                Ok("Hi!".to_string())
            }
            fn name(&self) -> &str {
                "panic"
            }
        }
        let out = run(
            &PanicBackend,
            "<p>Hello there</p><p>Unsubscribe here anytime</p>",
        );
        assert!(out.html.contains("<p>Unsubscribe here anytime</p>"));
        assert_eq!(out.units_total, 1);
    }
}
