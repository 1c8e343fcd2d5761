use std::sync::Arc;

use db::{
    DBService, DbErr, TransactionTrait,
    models::{
        commit::Commit, commit_parent::CommitParent, graph, history_cursor::HistoryCursor, ids,
        repository::Repository,
    },
};
use futures::FutureExt;
use scm::{CredentialProvider, HistoryApi, HistoryPage, RepoRemote, TransportError};
use thiserror::Error;
use utils::{KeyedDedupe, Singleflight};
use uuid::Uuid;

use crate::services::{
    config::Config,
    ingest::{self, IngestContext, IngestError},
};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("repository {0} is not registered")]
    UnknownRepository(Uuid),
    #[error("commit row {0} disappeared during backfill")]
    MissingCommit(i64),
    #[error("{0}")]
    Shared(Arc<HistoryError>),
}

impl From<Arc<HistoryError>> for HistoryError {
    fn from(err: Arc<HistoryError>) -> Self {
        HistoryError::Shared(err)
    }
}

/// Lazily materializes ancestor history so reachability queries can run
/// against a complete subgraph. Traversals are resumable: a partially
/// fetched subtree leaves a cursor behind and is picked up later.
#[derive(Clone)]
pub struct HistoryBackfiller {
    db: DBService,
    history: Arc<dyn HistoryApi>,
    credentials: Arc<dyn CredentialProvider>,
    config: Config,
    flights: Arc<dyn Singleflight<(Uuid, i64), (), HistoryError>>,
}

impl HistoryBackfiller {
    pub fn new(
        db: DBService,
        history: Arc<dyn HistoryApi>,
        credentials: Arc<dyn CredentialProvider>,
        config: Config,
    ) -> Self {
        Self {
            db,
            history,
            credentials,
            config,
            flights: Arc::new(KeyedDedupe::new()),
        }
    }

    /// Guarantee that every ancestor of each target commit is present with
    /// resolved parent edges. Concurrent callers for the same
    /// (repository, commit) share one traversal.
    pub async fn ensure_materialized(
        &self,
        repository: Uuid,
        targets: &[i64],
    ) -> Result<(), HistoryError> {
        for &target in targets {
            let backfiller = self.clone();
            self.flights
                .run(
                    (repository, target),
                    async move { backfiller.materialize(repository, target).await }.boxed(),
                )
                .await
                .map_err(HistoryError::from)?;
        }
        Ok(())
    }

    async fn materialize(&self, repository: Uuid, target: i64) -> Result<(), HistoryError> {
        let repo = Repository::find_by_uuid(&self.db.conn, repository)
            .await?
            .ok_or(HistoryError::UnknownRepository(repository))?;
        let repository_id = ids::repository_id_by_uuid(&self.db.conn, repository)
            .await?
            .ok_or(HistoryError::UnknownRepository(repository))?;
        let remote = RepoRemote {
            owner: repo.owner,
            name: repo.name,
        };
        let token = self.credentials.bearer_token(&remote).await?;

        loop {
            // Step one: pick any reachable commit whose history has not been
            // traversed and pull its first page of ancestors.
            if let Some(unloaded) =
                graph::find_unloaded_ancestor(&self.db.conn, repository_id, &[target]).await?
            {
                let root = Commit::find_by_id(&self.db.conn, unloaded)
                    .await?
                    .ok_or(HistoryError::MissingCommit(unloaded))?;
                let page = self
                    .history
                    .history(
                        &remote,
                        &token,
                        &root.sha,
                        self.config.history_page_size,
                        None,
                    )
                    .await?;
                self.ingest_page(repository_id, root.id, &page, None).await?;
                Commit::mark_history_loaded(&self.db.conn, root.id).await?;
                continue;
            }

            // Step two: drain any traversal a previous run left behind.
            if let Some(cursor) =
                HistoryCursor::any_for_repository(&self.db.conn, repository_id).await?
            {
                let root = Commit::find_by_id(&self.db.conn, cursor.subtree_root_id)
                    .await?
                    .ok_or(HistoryError::MissingCommit(cursor.subtree_root_id))?;
                let page = self
                    .history
                    .history(
                        &remote,
                        &token,
                        &root.sha,
                        self.config.history_page_size,
                        Some(&cursor.end_cursor),
                    )
                    .await?;
                self.ingest_page(repository_id, root.id, &page, Some(&cursor))
                    .await?;
                continue;
            }

            return Ok(());
        }
    }

    /// Persist one history page atomically with its cursor bookkeeping:
    /// ingest the page's commits, move (or create) the cursor when more
    /// pages remain, retire it when this was the last one.
    async fn ingest_page(
        &self,
        repository_id: i64,
        root_id: i64,
        page: &HistoryPage,
        existing: Option<&HistoryCursor>,
    ) -> Result<(), HistoryError> {
        let txn = self.db.conn.begin().await?;

        let cursor_id = match (&page.next_cursor, existing) {
            (Some(next), Some(cursor)) => {
                HistoryCursor::advance(&txn, cursor.id, next).await?;
                Some(cursor.id)
            }
            (Some(next), None) => {
                let cursor = HistoryCursor::upsert(&txn, repository_id, root_id, next).await?;
                Some(cursor.id)
            }
            // Final page: placeholders it leaves behind are not resolvable
            // by this traversal, so they stay unowned.
            (None, _) => None,
        };

        ingest::ingest_commits_in(
            &txn,
            repository_id,
            &page.nodes,
            IngestContext {
                history_loaded: true,
                cursor_id,
            },
        )
        .await?;

        if page.next_cursor.is_none() {
            if let Some(cursor) = existing {
                CommitParent::detach_cursor(&txn, cursor.id).await?;
                HistoryCursor::delete(&txn, cursor.id).await?;
                tracing::debug!(
                    repository_id,
                    subtree_root_id = cursor.subtree_root_id,
                    "history traversal complete, cursor retired"
                );
            }
        }

        txn.commit().await?;
        Ok(())
    }
}
