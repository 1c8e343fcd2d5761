use std::collections::{HashMap, HashSet};

use db::{
    DBService, DbErr,
    models::{
        changelog_entry::ChangelogEntry,
        commit::Commit,
        graph, ids,
        pull_request::{PullRequest, PullRequestError},
    },
};
use thiserror::Error;
use uuid::Uuid;

use crate::services::history::{HistoryBackfiller, HistoryError};

#[derive(Debug, Error)]
pub enum ChangeQueryError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("repository {0} is not registered")]
    UnknownRepository(Uuid),
    #[error("commit {sha} is not known locally")]
    UnknownHead { sha: String },
    #[error("pull request {0} is not known")]
    UnknownPullRequest(Uuid),
}

/// Answers "which pull-request changes are new since release X" over the
/// mirrored commit graph, honoring cherry-pick equivalence.
#[derive(Clone)]
pub struct ChangeQueryService {
    db: DBService,
    backfiller: HistoryBackfiller,
}

impl ChangeQueryService {
    pub fn new(db: DBService, backfiller: HistoryBackfiller) -> Self {
        Self { db, backfiller }
    }

    /// Change-log entries attached to pull requests whose commits are
    /// reachable from `head` but not from any excluded head, expanded by
    /// cherry-pick equivalence. Ordered by (sort_weight, id).
    pub async fn unreleased_changes(
        &self,
        repository: Uuid,
        head: &str,
        excluded_heads: &[String],
    ) -> Result<Vec<ChangelogEntry>, ChangeQueryError> {
        let repository_id = ids::repository_id_by_uuid(&self.db.conn, repository)
            .await?
            .ok_or(ChangeQueryError::UnknownRepository(repository))?;

        let head_commit = self.resolve_head(repository_id, head).await?;
        let mut excluded_ids = Vec::with_capacity(excluded_heads.len());
        let mut targets = vec![head_commit.id];
        for sha in excluded_heads {
            let commit = self.resolve_head(repository_id, sha).await?;
            excluded_ids.push(commit.id);
            targets.push(commit.id);
        }

        self.backfiller
            .ensure_materialized(repository, &targets)
            .await?;

        let releasable = self
            .releasable_set(repository_id, head_commit.id, &excluded_ids)
            .await?;
        if releasable.is_empty() {
            return Ok(Vec::new());
        }

        let mut commit_ids: Vec<i64> = releasable.into_iter().collect();
        commit_ids.sort_unstable();
        Ok(ChangelogEntry::list_for_commit_set(&self.db.conn, &commit_ids).await?)
    }

    /// Whether any commit associated with the pull request lies in the
    /// ancestor closure of the released heads, expanded by cherry-pick
    /// equivalence.
    pub async fn is_released(
        &self,
        repository: Uuid,
        released_heads: &[String],
        pull_request: Uuid,
    ) -> Result<bool, ChangeQueryError> {
        let repository_id = ids::repository_id_by_uuid(&self.db.conn, repository)
            .await?
            .ok_or(ChangeQueryError::UnknownRepository(repository))?;

        let pr_commits = PullRequest::commit_ids(&self.db.conn, pull_request)
            .await
            .map_err(|err| match err {
                PullRequestError::Database(err) => ChangeQueryError::Database(err),
                PullRequestError::NotFound => ChangeQueryError::UnknownPullRequest(pull_request),
            })?;

        let mut released_ids = Vec::with_capacity(released_heads.len());
        for sha in released_heads {
            released_ids.push(self.resolve_head(repository_id, sha).await?.id);
        }
        if released_ids.is_empty() {
            return Ok(false);
        }

        self.backfiller
            .ensure_materialized(repository, &released_ids)
            .await?;

        let released = self.released_set(repository_id, &released_ids).await?;
        Ok(pr_commits.iter().any(|id| released.contains(id)))
    }

    async fn resolve_head(
        &self,
        repository_id: i64,
        sha: &str,
    ) -> Result<Commit, ChangeQueryError> {
        Commit::find_by_sha(&self.db.conn, repository_id, sha)
            .await?
            .ok_or_else(|| ChangeQueryError::UnknownHead {
                sha: sha.to_string(),
            })
    }

    /// Cherry-pick provenance as symmetric (annotated, source) id pairs.
    async fn equivalence_links(&self, repository_id: i64) -> Result<Vec<(i64, i64)>, DbErr> {
        let annotated = Commit::list_with_provenance(&self.db.conn, repository_id).await?;
        if annotated.is_empty() {
            return Ok(Vec::new());
        }

        let mut target_shas: Vec<String> = annotated
            .iter()
            .flat_map(|commit| commit.cherry_picked_from.iter().cloned())
            .collect();
        target_shas.sort_unstable();
        target_shas.dedup();

        let targets = Commit::find_by_shas(&self.db.conn, repository_id, &target_shas).await?;
        let by_sha: HashMap<String, i64> = targets
            .into_iter()
            .map(|commit| (commit.sha, commit.id))
            .collect();

        let mut links = Vec::new();
        for commit in &annotated {
            for sha in &commit.cherry_picked_from {
                if let Some(&source) = by_sha.get(sha) {
                    links.push((commit.id, source));
                }
            }
        }
        Ok(links)
    }

    /// Ancestors(head) \ Ancestors(excluded), as a fixed point: any
    /// releasable commit equivalent to an excluded one is moved to the
    /// excluded seeds and the difference is recomputed until stable.
    async fn releasable_set(
        &self,
        repository_id: i64,
        head: i64,
        excluded: &[i64],
    ) -> Result<HashSet<i64>, DbErr> {
        let head_closure = graph::ancestor_closure(&self.db.conn, repository_id, &[head]).await?;
        let links = self.equivalence_links(repository_id).await?;

        let mut excluded_seeds: HashSet<i64> = excluded.iter().copied().collect();
        loop {
            let seeds: Vec<i64> = excluded_seeds.iter().copied().collect();
            let excluded_closure =
                graph::ancestor_closure(&self.db.conn, repository_id, &seeds).await?;
            let releasable: HashSet<i64> = head_closure
                .difference(&excluded_closure)
                .copied()
                .collect();

            let mut grew = false;
            for &(annotated, source) in &links {
                for (inside, outside) in [(annotated, source), (source, annotated)] {
                    if excluded_closure.contains(&inside)
                        && releasable.contains(&outside)
                        && excluded_seeds.insert(outside)
                    {
                        grew = true;
                    }
                }
            }
            if !grew {
                return Ok(releasable);
            }
        }
    }

    /// Ancestors(released heads), expanded to the fixed point of "a commit
    /// equivalent to a released commit is released".
    async fn released_set(
        &self,
        repository_id: i64,
        released: &[i64],
    ) -> Result<HashSet<i64>, DbErr> {
        let links = self.equivalence_links(repository_id).await?;

        let mut seeds: HashSet<i64> = released.iter().copied().collect();
        loop {
            let seed_list: Vec<i64> = seeds.iter().copied().collect();
            let closure = graph::ancestor_closure(&self.db.conn, repository_id, &seed_list).await?;

            let mut grew = false;
            for &(annotated, source) in &links {
                for (inside, outside) in [(annotated, source), (source, annotated)] {
                    if closure.contains(&inside)
                        && !closure.contains(&outside)
                        && seeds.insert(outside)
                    {
                        grew = true;
                    }
                }
            }
            if !grew {
                return Ok(closure);
            }
        }
    }
}
