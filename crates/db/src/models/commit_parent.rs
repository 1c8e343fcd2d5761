use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, Set,
    sea_query::{Expr, OnConflict},
};

use crate::entities::commit_parent;

/// One parent slot of a commit: resolved (`parent_id` set) once the parent
/// row exists, a sha-keyed placeholder before that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitParent {
    pub id: i64,
    pub repository_id: i64,
    pub child_id: i64,
    pub parent_sha: String,
    pub parent_id: Option<i64>,
    pub cursor_id: Option<i64>,
}

impl CommitParent {
    fn from_model(model: commit_parent::Model) -> Self {
        Self {
            id: model.id,
            repository_id: model.repository_id,
            child_id: model.child_id,
            parent_sha: model.parent_sha,
            parent_id: model.parent_id,
            cursor_id: model.cursor_id,
        }
    }

    /// Record a parent slot for a commit. Keyed by (child, parent sha);
    /// a slot that already exists is left untouched, so a slot that was
    /// resolved earlier is never demoted back to a placeholder.
    pub async fn upsert_slot<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
        child_id: i64,
        parent_sha: &str,
        parent_id: Option<i64>,
        cursor_id: Option<i64>,
    ) -> Result<(), DbErr> {
        let active = commit_parent::ActiveModel {
            repository_id: Set(repository_id),
            child_id: Set(child_id),
            parent_sha: Set(parent_sha.to_string()),
            parent_id: Set(parent_id),
            // A resolved slot needs no owning traversal.
            cursor_id: Set(if parent_id.is_some() { None } else { cursor_id }),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        };
        commit_parent::Entity::insert(active)
            .on_conflict(
                OnConflict::columns([
                    commit_parent::Column::ChildId,
                    commit_parent::Column::ParentSha,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec(db)
            .await?;
        Ok(())
    }

    /// Resolve every placeholder waiting on `parent_sha` to the commit row
    /// that now exists. Returns how many slots were rewired.
    pub async fn resolve_waiting<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
        parent_sha: &str,
        parent_id: i64,
    ) -> Result<u64, DbErr> {
        let result = commit_parent::Entity::update_many()
            .col_expr(commit_parent::Column::ParentId, Expr::value(parent_id))
            .col_expr(commit_parent::Column::CursorId, Expr::value(Option::<i64>::None))
            .filter(commit_parent::Column::RepositoryId.eq(repository_id))
            .filter(commit_parent::Column::ParentSha.eq(parent_sha))
            .filter(commit_parent::Column::ParentId.is_null())
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Detach surviving placeholders from a traversal that is being retired.
    pub async fn detach_cursor<C: ConnectionTrait>(db: &C, cursor_id: i64) -> Result<(), DbErr> {
        commit_parent::Entity::update_many()
            .col_expr(commit_parent::Column::CursorId, Expr::value(Option::<i64>::None))
            .filter(commit_parent::Column::CursorId.eq(cursor_id))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn list_for_child<C: ConnectionTrait>(
        db: &C,
        child_id: i64,
    ) -> Result<Vec<Self>, DbErr> {
        let records = commit_parent::Entity::find()
            .filter(commit_parent::Column::ChildId.eq(child_id))
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    /// Placeholders still waiting for their parent commit.
    pub async fn count_unresolved<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
    ) -> Result<u64, DbErr> {
        commit_parent::Entity::find()
            .filter(commit_parent::Column::RepositoryId.eq(repository_id))
            .filter(commit_parent::Column::ParentId.is_null())
            .count(db)
            .await
    }
}
