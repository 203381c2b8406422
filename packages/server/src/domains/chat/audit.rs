//! Turn audit trail.
//!
//! Every answered turn appends one JSON record - question, retrieved graph
//! context, final answer - to an incrementally numbered file. The trail is
//! for later evaluation only; it never feeds back into control flow.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub question: String,
    pub contexts: Vec<String>,
    pub answer: String,
}

pub struct AuditTrail {
    dir: PathBuf,
    // next index, discovered lazily so restarts resume the numbering
    next: Mutex<Option<usize>>,
}

impl AuditTrail {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next: Mutex::new(None),
        }
    }

    /// Append one record, returning the path it was written to.
    pub async fn record(&self, record: &AuditRecord) -> Result<PathBuf> {
        let mut next = self.next.lock().await;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create audit dir {}", self.dir.display()))?;

        let index = match *next {
            Some(index) => index,
            None => next_index(&self.dir).await?,
        };

        let path = self.dir.join(format!("turn-{:05}.json", index));
        let body = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write audit record {}", path.display()))?;

        *next = Some(index + 1);
        Ok(path)
    }
}

/// One past the highest turn index already on disk.
async fn next_index(dir: &Path) -> Result<usize> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut highest = None;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(index) = name
            .strip_prefix("turn-")
            .and_then(|rest| rest.strip_suffix(".json"))
            .and_then(|digits| digits.parse::<usize>().ok())
        {
            highest = Some(highest.map_or(index, |h: usize| h.max(index)));
        }
    }

    Ok(highest.map_or(0, |h| h + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(question: &str) -> AuditRecord {
        AuditRecord {
            question: question.to_string(),
            contexts: vec!["{\"name\":\"Studencka\"}".to_string()],
            answer: "Pierogi.".to_string(),
        }
    }

    #[tokio::test]
    async fn records_are_numbered_sequentially() {
        let dir = TempDir::new().unwrap();
        let trail = AuditTrail::new(dir.path());

        let first = trail.record(&record("q1")).await.unwrap();
        let second = trail.record(&record("q2")).await.unwrap();

        assert!(first.ends_with("turn-00000.json"));
        assert!(second.ends_with("turn-00001.json"));
    }

    #[tokio::test]
    async fn numbering_resumes_across_instances() {
        let dir = TempDir::new().unwrap();

        AuditTrail::new(dir.path())
            .record(&record("q1"))
            .await
            .unwrap();

        let path = AuditTrail::new(dir.path())
            .record(&record("q2"))
            .await
            .unwrap();
        assert!(path.ends_with("turn-00001.json"));
    }

    #[tokio::test]
    async fn written_record_round_trips() {
        let dir = TempDir::new().unwrap();
        let trail = AuditTrail::new(dir.path());

        let original = record("Best sushi in Warszawa?");
        let path = trail.record(&original).await.unwrap();

        let body = tokio::fs::read_to_string(&path).await.unwrap();
        let read_back: AuditRecord = serde_json::from_str(&body).unwrap();
        assert_eq!(read_back, original);
    }
}
