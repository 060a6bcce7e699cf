//! Publication of JSON files to the site repository.

use crate::config::PublishConfig;
use crate::domain::EntityKind;
use crate::error::{AppError, Result};
use crate::infra::{CommitResult, FileCommit, SourceControl};
use crate::metrics::PublishMetrics;
use crate::storage::Storage;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Publisher {
    source_control: Arc<dyn SourceControl>,
    storage: Arc<dyn Storage>,
    events_path: String,
    actors_path: String,
}

impl Publisher {
    pub fn new(source_control: Arc<dyn SourceControl>, storage: Arc<dyn Storage>, config: &PublishConfig) -> Self {
        Self {
            source_control,
            storage,
            events_path: config.events_path.clone(),
            actors_path: config.actors_path.clone(),
        }
    }

    /// Creates or updates one file. The revision marker is read immediately before the write;
    /// a provider-side conflict comes back as a retryable `PublishConflict`.
    pub async fn commit_file(&self, commit: FileCommit) -> Result<CommitResult> {
        if commit.path.trim().is_empty() {
            return Err(AppError::Validation("filePath is required".into()));
        }
        if commit.message.trim().is_empty() {
            return Err(AppError::Validation("commitMessage is required".into()));
        }

        let prior_sha = self.source_control.file_sha(&commit.path).await?;
        match self.source_control.put_file(&commit, prior_sha.as_deref()).await {
            Ok(result) => {
                PublishMetrics::committed();
                info!(
                    "📤 {} {} ({})",
                    if result.created { "Created" } else { "Updated" },
                    commit.path,
                    result.sha
                );
                Ok(result)
            }
            Err(e @ AppError::PublishConflict(_)) => {
                PublishMetrics::conflict();
                warn!(path = %commit.path, "file changed since its revision was read");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Commits every stored actor or event as one pretty-printed JSON document.
    pub async fn publish_snapshot(&self, kind: EntityKind) -> Result<CommitResult> {
        let (path, content, count) = match kind {
            EntityKind::Events => {
                let mut events = self.storage.all_events().await?;
                events.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
                let count = events.len();
                (self.events_path.clone(), serde_json::to_string_pretty(&json!({ "events": events }))?, count)
            }
            EntityKind::Actors => {
                let mut actors = self.storage.all_actors().await?;
                actors.sort_by_key(|a| a.name.to_lowercase());
                let count = actors.len();
                (self.actors_path.clone(), serde_json::to_string_pretty(&json!({ "actors": actors }))?, count)
            }
        };

        let message = format!(
            "Update {} ({} entries) - {}",
            kind.as_str(),
            count,
            Utc::now().format("%Y-%m-%d %H:%M")
        );
        self.commit_file(FileCommit { path, content, message }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use crate::testing::RecordingSourceControl;

    fn publisher(source_control: Arc<RecordingSourceControl>) -> Publisher {
        Publisher::new(source_control, Arc::new(InMemoryStorage::new()), &PublishConfig::default())
    }

    fn commit(path: &str) -> FileCommit {
        FileCommit {
            path: path.into(),
            content: "[]".into(),
            message: "update".into(),
        }
    }

    #[tokio::test]
    async fn test_create_then_update_uses_fresh_revision() {
        let scm = Arc::new(RecordingSourceControl::new());
        let publisher = publisher(scm.clone());

        let first = publisher.commit_file(commit("data/events-data.json")).await.unwrap();
        assert!(first.created);
        let second = publisher.commit_file(commit("data/events-data.json")).await.unwrap();
        assert!(!second.created);
        assert_eq!(scm.prior_shas(), vec![None, Some(first.sha)]);
    }

    #[tokio::test]
    async fn test_conflict_is_surfaced() {
        let scm = Arc::new(RecordingSourceControl::new().conflicting());
        let err = publisher(scm).commit_file(commit("data/actors-data.json")).await.unwrap_err();
        assert!(matches!(err, AppError::PublishConflict(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_fields_rejected_before_any_call() {
        let scm = Arc::new(RecordingSourceControl::new());
        let err = publisher(scm.clone()).commit_file(commit("")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(scm.prior_shas().is_empty());
    }
}
