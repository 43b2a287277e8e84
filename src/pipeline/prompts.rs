use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::{AppConfig, PromptsSection};

pub const DEFAULT_PROMPTS_DIR: &str = "prompts";

pub const DEFAULT_UNIT_REWRITE: &str = "unit_rewrite.txt";
pub const DEFAULT_CHUNK_REWRITE: &str = "chunk_rewrite.txt";

#[derive(Clone, Debug)]
pub struct PromptCatalog {
    pub unit_rewrite: String,
    pub chunk_rewrite: String,
}

impl PromptCatalog {
    pub fn builtin() -> Self {
        Self {
            unit_rewrite: DEFAULT_UNIT_REWRITE_TEXT.to_string(),
            chunk_rewrite: DEFAULT_CHUNK_REWRITE_TEXT.to_string(),
        }
    }

    /// Loads prompt templates relative to the config file. A template
    /// configured explicitly must exist; otherwise the default on-disk file
    /// is used when present and the embedded default when not.
    pub fn load(config_path: &Path, cfg: &AppConfig) -> anyhow::Result<Self> {
        let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
        let p: PromptsSection = cfg.prompts.clone();
        Ok(Self {
            unit_rewrite: read_prompt(
                config_dir,
                &p.unit_rewrite,
                DEFAULT_UNIT_REWRITE,
                DEFAULT_UNIT_REWRITE_TEXT,
            )?,
            chunk_rewrite: read_prompt(
                config_dir,
                &p.chunk_rewrite,
                DEFAULT_CHUNK_REWRITE,
                DEFAULT_CHUNK_REWRITE_TEXT,
            )?,
        })
    }
}

fn read_prompt(
    config_dir: &Path,
    configured: &Option<String>,
    default_filename: &str,
    builtin: &str,
) -> anyhow::Result<String> {
    let path = match configured {
        Some(rel) => {
            let mut p = PathBuf::from(rel);
            if p.is_relative() {
                p = config_dir.join(&p);
            }
            p
        }
        None => {
            let p = config_dir.join(DEFAULT_PROMPTS_DIR).join(default_filename);
            if !p.exists() {
                return Ok(builtin.to_string());
            }
            p
        }
    };
    std::fs::read_to_string(&path).with_context(|| format!("read prompt: {}", path.display()))
}

pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (k, v) in vars {
        let pat = format!("{{{{{k}}}}}");
        out = out.replace(&pat, v);
    }
    out
}

pub fn unit_prompt(catalog: &PromptCatalog, segment: &str, text: &str) -> String {
    render_template(&catalog.unit_rewrite, &[("segment", segment), ("text", text)])
}

pub fn chunk_prompt(catalog: &PromptCatalog, segment: &str, part: &str, platform: &str) -> String {
    let platform_note = if platform.trim().is_empty() {
        String::new()
    } else {
        format!("The newsletter is sent via {}.\n", platform.trim())
    };
    render_template(
        &catalog.chunk_rewrite,
        &[
            ("segment", segment),
            ("part", part),
            ("platform_note", &platform_note),
        ],
    )
}

pub fn default_prompt_files() -> Vec<(&'static str, &'static str)> {
    vec![
        (DEFAULT_UNIT_REWRITE, DEFAULT_UNIT_REWRITE_TEXT),
        (DEFAULT_CHUNK_REWRITE, DEFAULT_CHUNK_REWRITE_TEXT),
    ]
}

pub const DEFAULT_UNIT_REWRITE_TEXT: &str = r#"You are a senior specialist for newsletters.
You are tasked with personalizing the words and sentences of the newsletter for a specific segment of customers.
If its word, keep one word, if its sentence, keep the sentence.

Important guidelines to follow:
! Keep the length of the text approximately the same as the original.
! Preserve the original language.
! Do not use the name of the segment in the text.
! If the text is too short, you can leave it original - do not comment on this.

Remember:
- Process it by sentences, only change the content of specific sentences !!!
- Keep the length !!!
- If in the text is a URL, do not change it.
- If in the text are formatting and white spaces, do not change it.
- Do not change the text in buttons.

Adjust the following text to be personalized for the given segment:

Segment: {{segment}}

Change just this part of text: {{text}}

! Preserve the original language."#;

pub const DEFAULT_CHUNK_REWRITE_TEXT: &str = r#"Please personalize the following HTML newsletter content to fit the specified segment.
Ensure that the structure and content are similar in length and style to the original.
Do not add any new parts or text.
Do not change addresses, links, or buttons.
Do not include any comments or explanations in the output, only the personalized HTML content.
{{platform_note}}
Newsletter HTML Content:
{{part}}

Ensure the tone matches with the segment description {{segment}}."#;
