use db::{
    ConnectionTrait, DBService, DbErr, TransactionTrait,
    models::{commit::Commit, commit_parent::CommitParent},
};
use futures::{TryStreamExt, stream::BoxStream};
use scm::{CommitObject, DecodedObject, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("graph invariant violated: {0}")]
    InvariantViolation(String),
}

/// How ingested commits are recorded.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestContext {
    /// Commits arriving via a history traversal are covered by its cursor
    /// chain; commits arriving via ref sync still need their own traversal.
    pub history_loaded: bool,
    /// Traversal that unresolved parent placeholders should be attached to.
    pub cursor_id: Option<i64>,
}

/// Drain a bulk-fetch stream and persist its commits.
pub async fn ingest_object_stream(
    db: &DBService,
    repository_id: i64,
    stream: BoxStream<'static, Result<DecodedObject, TransportError>>,
    ctx: IngestContext,
) -> Result<usize, IngestError> {
    let commits: Vec<CommitObject> = stream
        .try_filter_map(|object| async move {
            Ok(match object {
                DecodedObject::Commit(commit) => Some(commit),
                DecodedObject::Other { .. } => None,
            })
        })
        .try_collect()
        .await?;
    ingest_commits(db, repository_id, &commits, ctx).await
}

/// Persist a batch of decoded commits in one transaction.
pub async fn ingest_commits(
    db: &DBService,
    repository_id: i64,
    commits: &[CommitObject],
    ctx: IngestContext,
) -> Result<usize, IngestError> {
    if commits.is_empty() {
        return Ok(0);
    }
    let txn = db.conn.begin().await?;
    let ingested = ingest_commits_in(&txn, repository_id, commits, ctx).await?;
    txn.commit().await?;
    Ok(ingested)
}

/// Transaction-scoped ingestion: insert-or-ignore each commit, record its
/// parent slots (resolved when the parent row exists, placeholders
/// otherwise), and rewire every placeholder that was waiting on it.
pub async fn ingest_commits_in<C: ConnectionTrait>(
    conn: &C,
    repository_id: i64,
    commits: &[CommitObject],
    ctx: IngestContext,
) -> Result<usize, IngestError> {
    for object in commits {
        let provenance = scm::message::cherry_picked_from(&object.message);
        let row = Commit::insert_or_ignore(
            conn,
            repository_id,
            &object.sha,
            &provenance,
            ctx.history_loaded,
        )
        .await?
        .ok_or_else(|| {
            IngestError::InvariantViolation(format!(
                "commit {} not present after insert",
                object.sha
            ))
        })?;

        for parent_sha in &object.parent_shas {
            let parent = Commit::find_by_sha(conn, repository_id, parent_sha).await?;
            CommitParent::upsert_slot(
                conn,
                repository_id,
                row.id,
                parent_sha,
                parent.map(|parent| parent.id),
                ctx.cursor_id,
            )
            .await?;
        }

        let rewired = CommitParent::resolve_waiting(conn, repository_id, &object.sha, row.id).await?;
        if rewired > 0 {
            tracing::debug!(sha = %object.sha, rewired, "resolved pending parent slots");
        }
    }
    Ok(commits.len())
}
