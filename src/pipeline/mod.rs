mod config;
mod personalizer;
mod prompts;
mod retry;
mod trace;

pub use config::{init_default_config, PipelineConfig, StrategyKind};
pub use personalizer::{PersonalizerPipeline, RunContext, SegmentOutcome, SegmentSpec};
pub use prompts::{render_template, PromptCatalog};
pub use retry::{rewrite_with_retry, AttemptRecord, AttemptVerdict, UnitOutcome};
pub use trace::TraceWriter;
