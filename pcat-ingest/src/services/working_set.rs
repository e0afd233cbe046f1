//! Working set file
//!
//! Plain UTF-8 text, one identifier per line. The controller rewrites it after
//! filtering and, when asked, after persisting.

use pcat_common::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct WorkingSet {
    path: PathBuf,
}

impl WorkingSet {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Non-blank lines, trimmed; a missing file reads as empty
    pub async fn load(&self) -> Result<Vec<String>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Replace the file contents with `identifiers`
    pub async fn save(&self, identifiers: &[String]) -> Result<()> {
        let mut body = identifiers.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), count = identifiers.len(), "Working set saved");
        Ok(())
    }

    /// Remove `done` from the file, keeping the remaining order
    pub async fn remove(&self, done: &[String]) -> Result<usize> {
        let done: HashSet<&str> = done.iter().map(String::as_str).collect();
        let current = self.load().await?;
        let before = current.len();
        let remaining: Vec<String> = current
            .into_iter()
            .filter(|id| !done.contains(id.as_str()))
            .collect();
        let removed = before - remaining.len();
        self.save(&remaining).await?;
        Ok(removed)
    }
}
