use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// User-visible message for the quota/billing failure class. Surfaced once
/// per affected unit or chunk, distinct from other backend errors.
pub const QUOTA_MESSAGE: &str =
    "Text generation quota exceeded. Check your plan and billing details.";

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("quota exceeded: {0}")]
    Quota(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl GenerationError {
    pub fn is_quota(&self) -> bool {
        matches!(self, GenerationError::Quota(_))
    }
}

/// One rewrite call: a fully rendered instruction in, the generated text
/// (trimmed) out. The pipeline is synchronous; each call blocks until the
/// backend answers or fails.
pub trait RewriteBackend {
    fn rewrite(&self, prompt: &str) -> Result<String, GenerationError>;

    fn name(&self) -> &str;
}

/// OpenAI-compatible chat-completions backend.
pub struct OpenAiBackend {
    name: String,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: Option<u32>,
    timeout: Duration,
}

impl OpenAiBackend {
    pub fn new(name: impl Into<String>, api_key: String) -> Self {
        Self {
            name: name.into(),
            api_key,
            model: "gpt-4".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.3,
            max_tokens: Some(1024),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Custom base URL (proxies or compatible endpoints).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

impl RewriteBackend for OpenAiBackend {
    fn rewrite(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = ureq::post(&format!("{}/chat/completions", self.base_url))
            .set("authorization", &format!("Bearer {}", self.api_key))
            .set("content-type", "application/json")
            .timeout(self.timeout)
            .send_json(&request);

        let response = match response {
            Ok(r) => r,
            Err(ureq::Error::Status(code, r)) => {
                let body = r.into_string().unwrap_or_default();
                return Err(classify_status_error(code, &body));
            }
            Err(e) => return Err(GenerationError::Backend(e.to_string())),
        };

        let parsed: ChatResponse = response
            .into_json()
            .map_err(|e| GenerationError::Backend(format!("bad response body: {e}")))?;
        extract_text(parsed)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn classify_status_error(code: u16, body: &str) -> GenerationError {
    if body.contains("insufficient_quota") {
        GenerationError::Quota(format!("http {code}"))
    } else {
        GenerationError::Backend(format!("http {code}: {body}"))
    }
}

fn extract_text(response: ChatResponse) -> Result<String, GenerationError> {
    let text = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| GenerationError::Backend("no_choices_in_response".to_string()))?;
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_bodies_are_classified_distinctly() {
        let err = classify_status_error(
            429,
            r#"{"error":{"code":"insufficient_quota","message":"..."}}"#,
        );
        assert!(err.is_quota());

        let err = classify_status_error(429, r#"{"error":{"code":"rate_limit_exceeded"}}"#);
        assert!(!err.is_quota());

        let err = classify_status_error(500, "internal");
        assert!(!err.is_quota());
    }

    #[test]
    fn generated_text_is_trimmed() {
        let resp = ChatResponse {
            choices: vec![ChatChoice {
                message: ChatChoiceMessage {
                    content: "  rewritten text \n".to_string(),
                },
            }],
        };
        assert_eq!(extract_text(resp).unwrap(), "rewritten text");
    }

    #[test]
    fn empty_choice_list_is_a_backend_error() {
        let resp = ChatResponse { choices: vec![] };
        assert!(matches!(
            extract_text(resp),
            Err(GenerationError::Backend(_))
        ));
    }
}
