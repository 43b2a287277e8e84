use std::path::{Path, PathBuf};

use anyhow::Context;

pub struct TraceWriter {
    dir: PathBuf,
    enabled: bool,
}

impl TraceWriter {
    pub fn new(dir: PathBuf, enabled: bool) -> anyhow::Result<Self> {
        if enabled {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create trace dir: {}", dir.display()))?;
        }
        Ok(Self { dir, enabled })
    }

    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            enabled: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write_named_text(&self, name: &str, text: &str) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let path = self.dir.join(sanitize_filename(name));
        std::fs::write(&path, text).with_context(|| format!("write trace: {}", path.display()))?;
        Ok(())
    }

    pub fn write_unit_text(
        &self,
        segment_index: usize,
        unit_id: usize,
        attempt: usize,
        kind: &str,
        text: &str,
    ) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let name = format!("seg{segment_index:02}.unit{unit_id:04}.attempt{attempt}.{kind}.txt");
        self.write_named_text(&name, text)
    }

    pub fn write_chunk_text(
        &self,
        segment_index: usize,
        chunk_index: usize,
        kind: &str,
        text: &str,
    ) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let name = format!("seg{segment_index:02}.chunk{chunk_index:04}.{kind}.txt");
        self.write_named_text(&name, text)
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_writer_writes_nothing() {
        let w = TraceWriter::disabled();
        w.write_named_text("x.txt", "body").unwrap();
    }

    #[test]
    fn unit_traces_land_in_the_trace_dir() {
        let dir = tempfile::tempdir().unwrap();
        let w = TraceWriter::new(dir.path().to_path_buf(), true).unwrap();
        w.write_unit_text(1, 3, 2, "prompt", "body").unwrap();
        let expected = dir.path().join("seg01.unit0003.attempt2.prompt.txt");
        assert_eq!(std::fs::read_to_string(expected).unwrap(), "body");
    }
}
