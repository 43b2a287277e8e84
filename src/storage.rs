use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::Deserialize;

/// Persistence boundary for finished newsletters. The pipeline only needs
/// "persist this HTML under this name and tell me where it went"; the
/// storage protocol lives behind this seam.
pub trait NewsletterStore {
    fn store(&self, html: &str, file_name: &str) -> anyhow::Result<String>;
}

/// Remote file store: upload returns a numeric file id, a detail lookup on
/// that id yields the download URL.
pub struct HttpFileStore {
    base_url: String,
    token: String,
    timeout: Duration,
}

impl HttpFileStore {
    pub fn new(base_url: impl Into<String>, token: String) -> Self {
        Self {
            base_url: base_url.into(),
            token,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    id: u64,
}

#[derive(Deserialize)]
struct FileDetail {
    url: Option<String>,
}

impl NewsletterStore for HttpFileStore {
    fn store(&self, html: &str, file_name: &str) -> anyhow::Result<String> {
        let upload: UploadResponse = ureq::post(&format!("{}/files", self.base_url))
            .set("x-storageapi-token", &self.token)
            .set("content-type", "text/html")
            .query("name", file_name)
            .timeout(self.timeout)
            .send_string(html)
            .context("upload newsletter file")?
            .into_json()
            .context("parse upload response")?;

        let detail: FileDetail = ureq::get(&format!("{}/files/{}", self.base_url, upload.id))
            .set("x-storageapi-token", &self.token)
            .timeout(self.timeout)
            .call()
            .with_context(|| format!("fetch file detail: id={}", upload.id))?
            .into_json()
            .context("parse file detail")?;

        detail
            .url
            .ok_or_else(|| anyhow!("file detail for id={} has no url", upload.id))
    }
}

/// Local store for runs without a remote backend: writes into a directory
/// and reports the path.
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl NewsletterStore for DirStore {
    fn store(&self, html: &str, file_name: &str) -> anyhow::Result<String> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create output dir: {}", self.dir.display()))?;
        let path = self.dir.join(sanitize_filename(file_name));
        std::fs::write(&path, html)
            .with_context(|| format!("write newsletter: {}", path.display()))?;
        Ok(path.display().to_string())
    }
}

pub fn newsletter_file_name(segment_key: &str) -> String {
    format!("personalized_newsletter_{segment_key}.html")
}

fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => out.push('_'),
            _ => out.push(ch),
        }
    }
    out
}
