use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use db::{
    DBService, DbErr, TransactionTrait,
    models::{
        commit::Commit,
        git_ref::GitRef,
        ids,
        pull_request::{PullRequest, PullRequestError},
        repository::{Repository, RepositoryError},
    },
    types::RefKind,
};
use futures::FutureExt;
use scm::{
    CredentialProvider, FetchRequest, ObjectTransport, ParsedRef, PullRefKind, RemoteRef,
    RepoRemote, TransportError, TransportSession,
};
use thiserror::Error;
use utils::{Coalescer, KeyedDebounce, KeyedDedupe, Singleflight};
use uuid::Uuid;

use crate::services::{
    config::Config,
    ingest::{self, IngestContext, IngestError},
};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("repository {0} is not registered")]
    UnknownRepository(Uuid),
    #[error("commit {sha} still missing after fetch")]
    MissingCommit { sha: String },
    #[error("conflicting version updates, gave up after {attempts} attempts")]
    Contention { attempts: u32 },
    #[error("{0}")]
    Shared(Arc<SyncError>),
}

impl From<Arc<SyncError>> for SyncError {
    fn from(err: Arc<SyncError>) -> Self {
        SyncError::Shared(err)
    }
}

impl From<RepositoryError> for SyncError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Database(err) => SyncError::Database(err),
            RepositoryError::NotFound => {
                SyncError::Database(DbErr::RecordNotFound("Repository not found".to_string()))
            }
        }
    }
}

/// One remote ref to be mirrored locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefChange {
    pub kind: RefKind,
    pub name: String,
    pub sha: String,
    pub pr_number: Option<i64>,
    pub pull_kind: Option<PullRefKind>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefDiff {
    pub to_upsert: Vec<RefChange>,
    pub to_delete: Vec<(RefKind, String)>,
}

impl RefDiff {
    pub fn is_empty(&self) -> bool {
        self.to_upsert.is_empty() && self.to_delete.is_empty()
    }
}

/// Diff the remote advertisement against the stored mirror. Remote names
/// outside the mirrored namespaces are ignored; stored refs no longer
/// advertised are scheduled for deletion.
pub fn diff_refs(remote: &[RemoteRef], local: &[GitRef]) -> RefDiff {
    let local_by_name: HashMap<(RefKind, &str), &GitRef> = local
        .iter()
        .map(|stored| ((stored.kind, stored.name.as_str()), stored))
        .collect();

    let mut diff = RefDiff::default();
    let mut remote_names: HashSet<(RefKind, &str)> = HashSet::new();
    for advertised in remote {
        let Some(parsed) = scm::parse_ref_name(&advertised.name) else {
            continue;
        };
        let (kind, pr_number, pull_kind) = match parsed {
            ParsedRef::Branch(_) => (RefKind::Branch, None, None),
            ParsedRef::Tag(_) => (RefKind::Tag, None, None),
            ParsedRef::Pull { number, kind } => (RefKind::Pull, Some(number), Some(kind)),
        };
        remote_names.insert((kind, advertised.name.as_str()));

        let unchanged = local_by_name
            .get(&(kind, advertised.name.as_str()))
            .is_some_and(|stored| stored.commit_sha == advertised.sha);
        if !unchanged {
            diff.to_upsert.push(RefChange {
                kind,
                name: advertised.name.clone(),
                sha: advertised.sha.clone(),
                pr_number,
                pull_kind,
            });
        }
    }

    for stored in local {
        if !remote_names.contains(&(stored.kind, stored.name.as_str())) {
            diff.to_delete.push((stored.kind, stored.name.clone()));
        }
    }
    diff
}

/// Drives the mirror of one repository towards the remote, gated by the
/// version-counter compare-and-swap so racing writers cannot interleave.
#[derive(Clone)]
pub struct SyncService {
    db: DBService,
    transport: Arc<dyn ObjectTransport>,
    credentials: Arc<dyn CredentialProvider>,
    config: Config,
    sync_flights: Arc<dyn Singleflight<Uuid, (), SyncError>>,
    push_bursts: Arc<dyn Coalescer<Uuid, (), SyncError>>,
}

impl SyncService {
    pub fn new(
        db: DBService,
        transport: Arc<dyn ObjectTransport>,
        credentials: Arc<dyn CredentialProvider>,
        config: Config,
    ) -> Self {
        Self {
            db,
            transport,
            credentials,
            config,
            sync_flights: Arc::new(KeyedDedupe::new()),
            push_bursts: Arc::new(KeyedDebounce::new()),
        }
    }

    /// Bring the local mirror up to date with the remote. Concurrent callers
    /// for the same repository attach to one shared run.
    pub async fn sync_if_changed(&self, repository: Uuid) -> Result<(), SyncError> {
        let service = self.clone();
        self.sync_flights
            .run(
                repository,
                async move { service.sync(repository).await }.boxed(),
            )
            .await
            .map_err(SyncError::from)
    }

    /// Push-notification entry point: bumps the remote version and syncs,
    /// coalescing webhook bursts to at most one follow-up run. Every
    /// notification is observed by a run that started after it arrived.
    pub async fn sync_on_push(&self, repository: Uuid) -> Result<(), SyncError> {
        let service = self.clone();
        self.push_bursts
            .run(
                repository,
                async move {
                    Repository::mark_remote_changed(&service.db.conn, repository)
                        .await
                        .map_err(SyncError::from)?;
                    service.sync(repository).await
                }
                .boxed(),
            )
            .await
            .map_err(SyncError::from)
    }

    async fn sync(&self, repository: Uuid) -> Result<(), SyncError> {
        let mut repo = Repository::find_by_uuid(&self.db.conn, repository)
            .await?
            .ok_or(SyncError::UnknownRepository(repository))?;
        let repository_id = ids::repository_id_by_uuid(&self.db.conn, repository)
            .await?
            .ok_or(SyncError::UnknownRepository(repository))?;

        let mut attempts = 0u32;
        let mut backoff = Duration::from_millis(self.config.sync_backoff_ms);
        while repo.local_version != repo.remote_version {
            let observed_local = repo.local_version;
            let target = repo.remote_version;

            let remote = RepoRemote {
                owner: repo.owner.clone(),
                name: repo.name.clone(),
            };
            let token = self.credentials.bearer_token(&remote).await?;
            let session = self.transport.open(&remote, token).await?;

            let prefixes: Vec<&str> = self
                .config
                .ref_prefixes
                .iter()
                .map(String::as_str)
                .collect();
            let remote_refs = session.list_refs(&prefixes).await?;
            let local_refs = GitRef::list_for_repository(&self.db.conn, repository_id).await?;
            let diff = diff_refs(&remote_refs, &local_refs);

            // Commits land durably before the ref transaction, so it can
            // never reference a commit absent from storage.
            self.fetch_missing(&*session, repository_id, &local_refs, &diff)
                .await?;
            let upsert_commits = self.resolve_upsert_targets(repository_id, &diff).await?;

            let applied = db::retry_on_busy(|| {
                self.apply_ref_changes(
                    repository,
                    repository_id,
                    observed_local,
                    target,
                    &diff,
                    &upsert_commits,
                )
            })
            .await?;

            if !applied {
                attempts += 1;
                if attempts >= self.config.max_sync_attempts {
                    return Err(SyncError::Contention { attempts });
                }
                tracing::warn!(
                    repository = %repository,
                    attempts,
                    "lost the version race; re-reading and retrying"
                );
                tokio::time::sleep(backoff).await;
                let next_ms = (backoff.as_millis() as u64)
                    .saturating_mul(2)
                    .min(self.config.max_sync_backoff_ms);
                backoff = Duration::from_millis(next_ms);
            }

            repo = Repository::find_by_uuid(&self.db.conn, repository)
                .await?
                .ok_or(SyncError::UnknownRepository(repository))?;
        }
        Ok(())
    }

    /// Fetch commit objects for refs we are about to mirror but do not have.
    async fn fetch_missing(
        &self,
        session: &dyn TransportSession,
        repository_id: i64,
        local_refs: &[GitRef],
        diff: &RefDiff,
    ) -> Result<(), SyncError> {
        let mut want = Vec::new();
        let mut seen = HashSet::new();
        for change in &diff.to_upsert {
            if !seen.insert(change.sha.as_str()) {
                continue;
            }
            if Commit::find_by_sha(&self.db.conn, repository_id, &change.sha)
                .await?
                .is_none()
            {
                want.push(change.sha.clone());
            }
        }
        if want.is_empty() {
            return Ok(());
        }

        let have: Vec<String> = local_refs
            .iter()
            .map(|stored| stored.commit_sha.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        // Shallow fetches only when the negotiated session supports them.
        let depth = self
            .config
            .fetch_depth
            .filter(|_| session.capabilities().shallow);
        let stream = session
            .fetch_objects(FetchRequest { want, have, depth })
            .await?;
        ingest::ingest_object_stream(&self.db, repository_id, stream, IngestContext::default())
            .await?;
        Ok(())
    }

    /// Every upsert target must exist as a commit row by now; a sha the
    /// transport failed to deliver is missing data and fails this attempt.
    async fn resolve_upsert_targets(
        &self,
        repository_id: i64,
        diff: &RefDiff,
    ) -> Result<HashMap<String, i64>, SyncError> {
        let mut targets = HashMap::new();
        for change in &diff.to_upsert {
            if targets.contains_key(&change.sha) {
                continue;
            }
            let commit = Commit::find_by_sha(&self.db.conn, repository_id, &change.sha)
                .await?
                .ok_or_else(|| SyncError::MissingCommit {
                    sha: change.sha.clone(),
                })?;
            targets.insert(change.sha.clone(), commit.id);
        }
        Ok(targets)
    }

    /// Atomic apply: advance the version counter (compare-and-swap) and
    /// mirror the ref diff in one transaction. Returns false when the swap
    /// lost, leaving storage untouched.
    async fn apply_ref_changes(
        &self,
        repository: Uuid,
        repository_id: i64,
        observed_local: i64,
        target: i64,
        diff: &RefDiff,
        upsert_commits: &HashMap<String, i64>,
    ) -> Result<bool, DbErr> {
        let txn = self.db.conn.begin().await?;
        let advanced =
            Repository::try_advance_local_version(&txn, repository, observed_local, target).await?;
        if !advanced {
            txn.rollback().await?;
            return Ok(false);
        }

        for change in &diff.to_upsert {
            GitRef::upsert(
                &txn,
                repository_id,
                change.kind,
                &change.name,
                &change.sha,
                change.pr_number,
            )
            .await?;

            // A moved pull head keeps the pull request row and its commit
            // associations current. Merge refs are mirrored but carry
            // synthetic test-merge commits, so they are not associated.
            if change.pull_kind == Some(PullRefKind::Head) {
                if let (Some(number), Some(commit_id)) =
                    (change.pr_number, upsert_commits.get(&change.sha))
                {
                    PullRequest::find_or_create(&txn, repository_id, number).await?;
                    PullRequest::associate_commit(&txn, repository_id, number, *commit_id)
                        .await
                        .map_err(|err| match err {
                            PullRequestError::Database(err) => err,
                            PullRequestError::NotFound => DbErr::RecordNotFound(
                                "Pull request vanished during sync".to_string(),
                            ),
                        })?;
                    PullRequest::set_head_commit(&txn, repository_id, number, *commit_id).await?;
                }
            }
        }

        for (kind, name) in &diff.to_delete {
            GitRef::delete(&txn, repository_id, *kind, name).await?;
        }

        txn.commit().await?;
        Ok(true)
    }
}
