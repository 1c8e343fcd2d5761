use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
    sea_query::{Expr, OnConflict},
};

use crate::entities::commit;

/// Stay under sqlite's historic 999-variable bind limit.
const SHA_CHUNK: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub id: i64,
    pub repository_id: i64,
    pub sha: String,
    /// Provenance shas from cherry-pick markers, oldest hop first.
    pub cherry_picked_from: Vec<String>,
    pub history_loaded: bool,
}

impl Commit {
    fn from_model(model: commit::Model) -> Self {
        let cherry_picked_from = model
            .cherry_picked_from
            .map(|json| {
                serde_json::from_value(json).unwrap_or_else(|err| {
                    tracing::warn!(sha = %model.sha, "Unreadable provenance column: {}", err);
                    Vec::new()
                })
            })
            .unwrap_or_default();
        Self {
            id: model.id,
            repository_id: model.repository_id,
            sha: model.sha,
            cherry_picked_from,
            history_loaded: model.history_loaded,
        }
    }

    /// Insert a commit row, keyed by (repository, sha). Re-ingesting an
    /// already-known commit is a no-op and returns the existing row. `None`
    /// means the row could neither be inserted nor found, which breaks the
    /// storage invariant and is on the caller to surface.
    pub async fn insert_or_ignore<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
        sha: &str,
        cherry_picked_from: &[String],
        history_loaded: bool,
    ) -> Result<Option<Self>, DbErr> {
        let provenance = if cherry_picked_from.is_empty() {
            None
        } else {
            Some(serde_json::json!(cherry_picked_from))
        };
        let active = commit::ActiveModel {
            repository_id: Set(repository_id),
            sha: Set(sha.to_string()),
            cherry_picked_from: Set(provenance),
            history_loaded: Set(history_loaded),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        };

        let insert = commit::Entity::insert(active)
            .on_conflict(
                OnConflict::columns([commit::Column::RepositoryId, commit::Column::Sha])
                    .do_nothing()
                    .to_owned(),
            )
            .exec(db)
            .await?;

        if insert.last_insert_id > 0 {
            if let Some(created) = commit::Entity::find_by_id(insert.last_insert_id)
                .one(db)
                .await?
            {
                return Ok(Some(Self::from_model(created)));
            }
        }

        Self::find_by_sha(db, repository_id, sha).await
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<Self>, DbErr> {
        let record = commit::Entity::find_by_id(id).one(db).await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_by_sha<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
        sha: &str,
    ) -> Result<Option<Self>, DbErr> {
        let record = commit::Entity::find()
            .filter(commit::Column::RepositoryId.eq(repository_id))
            .filter(commit::Column::Sha.eq(sha))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_by_shas<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
        shas: &[String],
    ) -> Result<Vec<Self>, DbErr> {
        let mut found = Vec::new();
        for chunk in shas.chunks(SHA_CHUNK) {
            let records = commit::Entity::find()
                .filter(commit::Column::RepositoryId.eq(repository_id))
                .filter(commit::Column::Sha.is_in(chunk.iter().cloned()))
                .all(db)
                .await?;
            found.extend(records.into_iter().map(Self::from_model));
        }
        Ok(found)
    }

    pub async fn mark_history_loaded<C: ConnectionTrait>(db: &C, id: i64) -> Result<(), DbErr> {
        commit::Entity::update_many()
            .col_expr(commit::Column::HistoryLoaded, Expr::value(true))
            .filter(commit::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    /// Every commit of the repository that carries cherry-pick provenance.
    /// The result feeds equivalence expansion, so it stays small in practice.
    pub async fn list_with_provenance<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
    ) -> Result<Vec<Self>, DbErr> {
        let records = commit::Entity::find()
            .filter(commit::Column::RepositoryId.eq(repository_id))
            .filter(commit::Column::CherryPickedFrom.is_not_null())
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::repository::Repository, test_helpers::memory_db};

    #[tokio::test]
    async fn insert_or_ignore_keeps_the_first_row() -> Result<(), DbErr> {
        let db = memory_db().await?;
        let repo = Repository::find_or_create(&db.conn, "acme", "widgets").await?;
        let repo_id = crate::models::ids::repository_id_by_uuid(&db.conn, repo.id)
            .await?
            .expect("repository row");

        let first = Commit::insert_or_ignore(&db.conn, repo_id, "aaa111", &[], false)
            .await?
            .expect("inserted");
        let second = Commit::insert_or_ignore(
            &db.conn,
            repo_id,
            "aaa111",
            &["bbb222".to_string()],
            true,
        )
        .await?
        .expect("existing");

        assert_eq!(first.id, second.id);
        // The original row wins; re-ingest does not rewrite it.
        assert!(second.cherry_picked_from.is_empty());
        assert!(!second.history_loaded);
        Ok(())
    }

    #[tokio::test]
    async fn provenance_round_trips() -> Result<(), DbErr> {
        let db = memory_db().await?;
        let repo = Repository::find_or_create(&db.conn, "acme", "widgets").await?;
        let repo_id = crate::models::ids::repository_id_by_uuid(&db.conn, repo.id)
            .await?
            .expect("repository row");

        let picked = vec!["ccc333".to_string(), "ddd444".to_string()];
        Commit::insert_or_ignore(&db.conn, repo_id, "eee555", &picked, true).await?;

        let loaded = Commit::find_by_sha(&db.conn, repo_id, "eee555")
            .await?
            .expect("commit row");
        assert_eq!(loaded.cherry_picked_from, picked);

        let with_provenance = Commit::list_with_provenance(&db.conn, repo_id).await?;
        assert_eq!(with_provenance.len(), 1);
        assert_eq!(with_provenance[0].sha, "eee555");
        Ok(())
    }
}
