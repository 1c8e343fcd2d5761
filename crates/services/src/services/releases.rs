use std::sync::Arc;

use db::{
    DBService, DbErr,
    models::{
        changelog_entry::ChangelogEntry, commit::Commit, git_ref::GitRef, ids,
        repository::Repository,
    },
};
use scm::{CredentialProvider, HistoryApi, ObjectTransport};
use thiserror::Error;
use uuid::Uuid;

use crate::services::{
    changes::{ChangeQueryError, ChangeQueryService},
    config::Config,
    history::HistoryBackfiller,
    sync::{SyncError, SyncService},
};

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("repository {0} is not registered")]
    UnknownRepository(Uuid),
}

/// Aggregates storage, transports and the engine services into the surface
/// consumed by the publish, webhook and UI layers.
#[derive(Clone)]
pub struct ReleaseService {
    db: DBService,
    sync: SyncService,
    changes: ChangeQueryService,
}

impl ReleaseService {
    pub fn new(
        db: DBService,
        transport: Arc<dyn ObjectTransport>,
        history: Arc<dyn HistoryApi>,
        credentials: Arc<dyn CredentialProvider>,
        config: Config,
    ) -> Self {
        let sync = SyncService::new(
            db.clone(),
            transport,
            Arc::clone(&credentials),
            config.clone(),
        );
        let backfiller = HistoryBackfiller::new(db.clone(), history, credentials, config);
        let changes = ChangeQueryService::new(db.clone(), backfiller);
        Self { db, sync, changes }
    }

    pub fn db(&self) -> &DBService {
        &self.db
    }

    pub fn sync_service(&self) -> &SyncService {
        &self.sync
    }

    /// Register a repository (idempotent). The first sync request creates
    /// the row; webhooks then keep its remote version moving.
    pub async fn register_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Repository, DbErr> {
        Repository::find_or_create(&self.db.conn, owner, name).await
    }

    pub async fn sync_if_changed(&self, repository: Uuid) -> Result<(), SyncError> {
        self.sync.sync_if_changed(repository).await
    }

    /// Push-notification entry point; coalesces webhook bursts.
    pub async fn handle_push(&self, repository: Uuid) -> Result<(), SyncError> {
        self.sync.sync_on_push(repository).await
    }

    pub async fn unreleased_changes(
        &self,
        repository: Uuid,
        head: &str,
        excluded_heads: &[String],
    ) -> Result<Vec<ChangelogEntry>, ChangeQueryError> {
        self.changes
            .unreleased_changes(repository, head, excluded_heads)
            .await
    }

    pub async fn is_released(
        &self,
        repository: Uuid,
        released_heads: &[String],
        pull_request: Uuid,
    ) -> Result<bool, ChangeQueryError> {
        self.changes
            .is_released(repository, released_heads, pull_request)
            .await
    }

    /// Commit a branch currently points at, if the branch is mirrored and
    /// its target has been ingested.
    pub async fn branch_head(
        &self,
        repository: Uuid,
        branch: &str,
    ) -> Result<Option<Commit>, ReleaseError> {
        let repository_id = ids::repository_id_by_uuid(&self.db.conn, repository)
            .await?
            .ok_or(ReleaseError::UnknownRepository(repository))?;
        let Some(sha) = GitRef::branch_head_sha(&self.db.conn, repository_id, branch).await? else {
            return Ok(None);
        };
        Ok(Commit::find_by_sha(&self.db.conn, repository_id, &sha).await?)
    }

    pub async fn all_tags(&self, repository: Uuid) -> Result<Vec<GitRef>, ReleaseError> {
        let repository_id = ids::repository_id_by_uuid(&self.db.conn, repository)
            .await?
            .ok_or(ReleaseError::UnknownRepository(repository))?;
        Ok(GitRef::tags_for_repository(&self.db.conn, repository_id).await?)
    }

    /// Entries of a pull request's current change set, in display order.
    pub async fn change_set(
        &self,
        pull_request: Uuid,
    ) -> Result<Vec<ChangelogEntry>, ChangeQueryError> {
        ChangelogEntry::list_for_pull_request(&self.db.conn, pull_request)
            .await
            .map_err(|err| match err {
                db::models::changelog_entry::ChangelogEntryError::Database(err) => err.into(),
                db::models::changelog_entry::ChangelogEntryError::PullRequestNotFound => {
                    ChangeQueryError::UnknownPullRequest(pull_request)
                }
            })
    }
}
