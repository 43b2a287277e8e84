use std::collections::BTreeMap;

use crate::backend::RewriteBackend;
use crate::pipeline::config::{PipelineConfig, StrategyKind};
use crate::pipeline::prompts::PromptCatalog;
use crate::pipeline::trace::TraceWriter;
use crate::progress::ConsoleProgress;
use crate::storage::{newsletter_file_name, NewsletterStore};

mod chunked;
mod unitwise;

/// One customer segment of a generation run: the 1-based position and the
/// free-text audience description. Immutable for the duration of the run.
#[derive(Clone, Debug)]
pub struct SegmentSpec {
    pub index: usize,
    pub description: String,
}

/// The pure record of one segment's pipeline: final HTML plus everything
/// the host may want to render (counters, user-visible warnings). `warnings`
/// carries quota messages and unrestored-placeholder notes.
#[derive(Clone, Debug)]
pub struct SegmentOutcome {
    pub key: String,
    pub html: String,
    /// Units (unitwise) or chunks (chunked) processed.
    pub units_total: usize,
    pub units_accepted: usize,
    pub units_reverted: usize,
    pub warnings: Vec<String>,
}

/// Everything a strategy needs for one segment run.
pub(crate) struct SegmentCx<'a> {
    pub backend: &'a dyn RewriteBackend,
    pub prompts: &'a PromptCatalog,
    pub progress: &'a ConsoleProgress,
    pub trace: &'a TraceWriter,
    pub max_attempts: usize,
    pub chunk_chars: usize,
    pub prompt_token_budget: usize,
    pub platform: &'a str,
}

/// A rewrite strategy decomposes the document into rewritable pieces,
/// drives the backend over them, and recomposes the final document. The
/// host picks one at configuration time.
pub(crate) trait RewriteStrategy {
    fn name(&self) -> &'static str;

    /// Key under which this segment's result is stored.
    fn segment_key(&self, spec: &SegmentSpec) -> String;

    fn personalize(
        &self,
        cx: &SegmentCx<'_>,
        html: &str,
        spec: &SegmentSpec,
    ) -> anyhow::Result<SegmentOutcome>;
}

fn strategy_for(kind: StrategyKind) -> &'static dyn RewriteStrategy {
    match kind {
        StrategyKind::Unitwise => &unitwise::UnitwiseStrategy,
        StrategyKind::Chunked => &chunked::ChunkedStrategy,
    }
}

/// Accumulated state of one generation run, passed in and out explicitly;
/// nothing is process-global. Results are overwritten wholesale when a segment
/// is regenerated.
#[derive(Default)]
pub struct RunContext {
    pub results: BTreeMap<String, SegmentOutcome>,
    /// Segments whose pipeline aborted: (key, error message).
    pub failures: Vec<(String, String)>,
    /// Upload links accumulated by `store_results`: (key, url).
    pub stored_links: Vec<(String, String)>,
}

pub struct PersonalizerPipeline {
    cfg: PipelineConfig,
    backend: Box<dyn RewriteBackend>,
    progress: ConsoleProgress,
    trace: TraceWriter,
}

impl PersonalizerPipeline {
    pub fn new(
        cfg: PipelineConfig,
        backend: Box<dyn RewriteBackend>,
        progress: ConsoleProgress,
    ) -> Self {
        let trace = TraceWriter::new(cfg.trace_dir.clone(), cfg.trace_prompts)
            .unwrap_or_else(|_| TraceWriter::disabled());
        Self {
            cfg,
            backend,
            progress,
            trace,
        }
    }

    /// Runs every non-empty segment over a fresh parse of `html`. Segment
    /// failures are recorded in the context and never abort the run.
    pub fn personalize_newsletter(
        &self,
        html: &str,
        segments: &[String],
        platform: &str,
    ) -> RunContext {
        let mut ctx = RunContext::default();
        self.progress.info(format!(
            "Strategy: {} (backend: {})",
            strategy_for(self.cfg.strategy).name(),
            self.backend.name()
        ));
        let total = segments
            .iter()
            .filter(|s| !s.trim().is_empty())
            .count()
            .max(1);

        let mut done = 0usize;
        for (idx, description) in segments.iter().enumerate() {
            let description = description.trim();
            if description.is_empty() {
                continue;
            }
            self.progress
                .info(format!("Processing segment {}/{total}", done + 1));
            self.run_segment(&mut ctx, html, idx + 1, description, platform);
            done += 1;
            self.progress.progress("segments", done, total);
        }
        ctx
    }

    /// Restarts one segment's pipeline from scratch on the original HTML,
    /// discarding any previous result or failure for its key.
    pub fn regenerate_segment(
        &self,
        ctx: &mut RunContext,
        html: &str,
        index: usize,
        description: &str,
        platform: &str,
    ) {
        let spec = SegmentSpec {
            index,
            description: description.trim().to_string(),
        };
        let key = strategy_for(self.cfg.strategy).segment_key(&spec);
        ctx.results.remove(&key);
        ctx.failures.retain(|(k, _)| k != &key);
        self.progress
            .info(format!("Regenerating newsletter for {key}"));
        self.run_segment(ctx, html, index, description.trim(), platform);
    }

    fn run_segment(
        &self,
        ctx: &mut RunContext,
        html: &str,
        index: usize,
        description: &str,
        platform: &str,
    ) {
        let strategy = strategy_for(self.cfg.strategy);
        let spec = SegmentSpec {
            index,
            description: description.to_string(),
        };
        let cx = SegmentCx {
            backend: self.backend.as_ref(),
            prompts: &self.cfg.prompts,
            progress: &self.progress,
            trace: &self.trace,
            max_attempts: self.cfg.max_attempts,
            chunk_chars: self.cfg.chunk_chars,
            prompt_token_budget: self.cfg.prompt_token_budget,
            platform,
        };
        let key = strategy.segment_key(&spec);

        match strategy.personalize(&cx, html, &spec) {
            Ok(outcome) => {
                for w in &outcome.warnings {
                    self.progress.warn(w);
                }
                self.progress.info(format!(
                    "Segment {key} done ({} accepted, {} reverted of {})",
                    outcome.units_accepted, outcome.units_reverted, outcome.units_total
                ));
                ctx.results.insert(key, outcome);
            }
            Err(err) => {
                self.progress.error(format!("segment {key} failed: {err:#}"));
                ctx.failures.push((key, format!("{err:#}")));
            }
        }
    }

    /// Hands every finished segment to the storage collaborator, collecting
    /// download links. Upload failures are reported and skipped.
    pub fn store_results(&self, ctx: &mut RunContext, store: &dyn NewsletterStore) {
        let keys: Vec<String> = ctx.results.keys().cloned().collect();
        for key in keys {
            let html = &ctx.results[&key].html;
            match store.store(html, &newsletter_file_name(&key)) {
                Ok(url) => {
                    self.progress.info(format!("Newsletter for {key} saved: {url}"));
                    ctx.stored_links.push((key, url));
                }
                Err(err) => {
                    self.progress.error(format!("saving {key} failed: {err:#}"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GenerationError;
    use std::cell::Cell;
    use std::path::PathBuf;

    struct CountingBackend {
        calls: Cell<usize>,
    }

    impl RewriteBackend for CountingBackend {
        fn rewrite(&self, _prompt: &str) -> Result<String, GenerationError> {
            let n = self.calls.get() + 1;
            self.calls.set(n);
            Ok(format!("Rewrite number {n}"))
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn test_cfg(strategy: StrategyKind) -> PipelineConfig {
        PipelineConfig {
            config_path: PathBuf::new(),
            strategy,
            rewrite_backend: "mock".to_string(),
            backend_section: Default::default(),
            max_attempts: 3,
            chunk_chars: 6000,
            prompt_token_budget: 4096,
            trace_dir: PathBuf::new(),
            trace_prompts: false,
            prompts: PromptCatalog::builtin(),
            storage: None,
        }
    }

    fn pipeline(strategy: StrategyKind) -> PersonalizerPipeline {
        PersonalizerPipeline::new(
            test_cfg(strategy),
            Box::new(CountingBackend {
                calls: Cell::new(0),
            }),
            ConsoleProgress::new(false),
        )
    }

    #[test]
    fn empty_segment_descriptions_are_skipped() {
        let p = pipeline(StrategyKind::Unitwise);
        let ctx = p.personalize_newsletter(
            "<p>Some newsletter text</p>",
            &["".to_string(), "frugal shoppers".to_string()],
            "",
        );
        assert_eq!(ctx.results.len(), 1);
        assert!(ctx.results.contains_key("frugal shoppers"));
    }

    #[test]
    fn each_segment_gets_its_own_document() {
        let p = pipeline(StrategyKind::Unitwise);
        let ctx = p.personalize_newsletter(
            "<p>Some newsletter text</p>",
            &["segment one".to_string(), "segment two".to_string()],
            "",
        );
        assert_eq!(ctx.results.len(), 2);
        let a = &ctx.results["segment one"].html;
        let b = &ctx.results["segment two"].html;
        // the counting backend returns different text per call
        assert_ne!(a, b);
    }

    #[test]
    fn regeneration_overwrites_the_entry_wholesale() {
        let p = pipeline(StrategyKind::Unitwise);
        let html = "<p>Some newsletter text</p>";
        let mut ctx = p.personalize_newsletter(html, &["savers".to_string()], "");
        let first = ctx.results["savers"].html.clone();
        p.regenerate_segment(&mut ctx, html, 1, "savers", "");
        assert_eq!(ctx.results.len(), 1);
        assert_ne!(ctx.results["savers"].html, first);
    }

    #[test]
    fn store_results_collects_links() {
        let p = pipeline(StrategyKind::Unitwise);
        let dir = tempfile::tempdir().unwrap();
        let store = crate::storage::DirStore::new(dir.path());
        let mut ctx =
            p.personalize_newsletter("<p>Some newsletter text</p>", &["savers".to_string()], "");
        p.store_results(&mut ctx, &store);
        assert_eq!(ctx.stored_links.len(), 1);
        assert_eq!(ctx.stored_links[0].0, "savers");
        assert!(ctx.stored_links[0]
            .1
            .ends_with("personalized_newsletter_savers.html"));
    }
}
