use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::atomic_write;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::GoalQueue;

/// Newline-delimited goal queue. Blank lines and `#` comments are ignored.
#[derive(Debug, Default)]
pub struct LineGoalQueue {
    /// Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl LineGoalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn goal_of(line: &str) -> Option<&str> {
        let trimmed = line.trim();
        (!trimmed.is_empty() && !trimmed.starts_with('#')).then_some(trimmed)
    }

    async fn read(path: &Path) -> DomainResult<String> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(DomainError::io(path, e)),
        }
    }
}

#[async_trait]
impl GoalQueue for LineGoalQueue {
    async fn pending(&self, path: &Path) -> DomainResult<Vec<String>> {
        let content = Self::read(path).await?;
        Ok(content
            .lines()
            .filter_map(Self::goal_of)
            .map(str::to_string)
            .collect())
    }

    async fn remove(&self, path: &Path, dequeued: &[String]) -> DomainResult<usize> {
        let _guard = self.lock.lock().await;
        let content = Self::read(path).await?;

        let mut to_remove: Vec<&str> = dequeued.iter().map(String::as_str).collect();
        let mut kept = Vec::new();
        let mut pending = 0;
        for line in content.lines() {
            match Self::goal_of(line) {
                Some(goal) => {
                    if let Some(pos) = to_remove.iter().position(|g| *g == goal) {
                        to_remove.swap_remove(pos);
                        continue;
                    }
                    pending += 1;
                    kept.push(line);
                }
                None => kept.push(line),
            }
        }

        let mut rewritten = kept.join("\n");
        if !rewritten.is_empty() {
            rewritten.push('\n');
        }
        atomic_write(path, rewritten.as_bytes()).await?;
        Ok(pending)
    }

    async fn append(&self, path: &Path, goals: &[String]) -> DomainResult<()> {
        let _guard = self.lock.lock().await;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::io(parent, e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| DomainError::io(path, e))?;
        let mut content = String::new();
        for goal in goals.iter().map(|g| g.trim()).filter(|g| !g.is_empty()) {
            content.push_str(goal);
            content.push('\n');
        }
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| DomainError::io(path, e))?;
        file.flush().await.map_err(|e| DomainError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pending_skips_comments_and_blanks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("goals.lines");
        tokio::fs::write(&path, "# header\n  first goal  \n\nsecond goal\n").await.expect("write");

        let queue = LineGoalQueue::new();
        assert_eq!(queue.pending(&path).await.expect("pending"), vec!["first goal", "second goal"]);
        assert!(queue.pending(&dir.path().join("missing")).await.expect("pending").is_empty());
    }

    #[tokio::test]
    async fn test_remove_only_dequeued_occurrences() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("goals.lines");
        tokio::fs::write(&path, "a\nb\na\n").await.expect("write");

        let queue = LineGoalQueue::new();
        // another writer appends between dequeue and rewrite
        queue.append(&path, &["c".to_string()]).await.expect("append");
        let remaining = queue.remove(&path, &["a".to_string(), "b".to_string()]).await.expect("remove");

        assert_eq!(remaining, 2);
        assert_eq!(queue.pending(&path).await.expect("pending"), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_drained_queue_is_empty_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("goals.lines");
        tokio::fs::write(&path, "one\ntwo\n").await.expect("write");

        let queue = LineGoalQueue::new();
        let remaining = queue.remove(&path, &["one".to_string(), "two".to_string()]).await.expect("remove");
        assert_eq!(remaining, 0);
        assert_eq!(tokio::fs::read_to_string(&path).await.expect("read"), "");
    }
}
