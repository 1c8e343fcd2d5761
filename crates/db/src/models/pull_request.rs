use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect, Set,
    sea_query::{Expr, OnConflict},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::entities::{pull_request, pull_request_commit};

#[derive(Debug, Error)]
pub enum PullRequestError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Pull request not found")]
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: Uuid,
    pub number: i64,
    pub head_commit_id: Option<i64>,
    pub is_closed: bool,
    pub is_merged: bool,
    pub change_set_commit_sha: Option<String>,
    pub comment_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PullRequest {
    fn from_model(model: pull_request::Model) -> Self {
        Self {
            id: model.uuid,
            number: model.number,
            head_commit_id: model.head_commit_id,
            is_closed: model.is_closed,
            is_merged: model.is_merged,
            change_set_commit_sha: model.change_set_commit_sha,
            comment_id: model.comment_id,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }

    async fn row_id<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
        number: i64,
    ) -> Result<Option<i64>, DbErr> {
        pull_request::Entity::find()
            .select_only()
            .column(pull_request::Column::Id)
            .filter(pull_request::Column::RepositoryId.eq(repository_id))
            .filter(pull_request::Column::Number.eq(number))
            .into_tuple()
            .one(db)
            .await
    }

    pub async fn find_by_uuid<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = pull_request::Entity::find()
            .filter(pull_request::Column::Uuid.eq(id))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_by_number<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
        number: i64,
    ) -> Result<Option<Self>, DbErr> {
        let record = pull_request::Entity::find()
            .filter(pull_request::Column::RepositoryId.eq(repository_id))
            .filter(pull_request::Column::Number.eq(number))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_or_create<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
        number: i64,
    ) -> Result<Self, DbErr> {
        if let Some(existing) = Self::find_by_number(db, repository_id, number).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let active = pull_request::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            repository_id: Set(repository_id),
            number: Set(number),
            is_closed: Set(false),
            is_merged: Set(false),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };

        let insert = pull_request::Entity::insert(active)
            .on_conflict(
                OnConflict::columns([
                    pull_request::Column::RepositoryId,
                    pull_request::Column::Number,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec(db)
            .await?;

        let created = if insert.last_insert_id > 0 {
            pull_request::Entity::find_by_id(insert.last_insert_id)
                .one(db)
                .await?
        } else {
            None
        };
        if let Some(created) = created {
            return Ok(Self::from_model(created));
        }

        Self::find_by_number(db, repository_id, number)
            .await?
            .ok_or(DbErr::RecordNotFound("Pull request not found".to_string()))
    }

    pub async fn set_head_commit<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
        number: i64,
        commit_id: i64,
    ) -> Result<(), DbErr> {
        pull_request::Entity::update_many()
            .col_expr(pull_request::Column::HeadCommitId, Expr::value(commit_id))
            .col_expr(pull_request::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(pull_request::Column::RepositoryId.eq(repository_id))
            .filter(pull_request::Column::Number.eq(number))
            .exec(db)
            .await?;
        Ok(())
    }

    /// Associate a commit with the pull request; repeated associations are
    /// no-ops.
    pub async fn associate_commit<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
        number: i64,
        commit_id: i64,
    ) -> Result<(), PullRequestError> {
        let pull_request_id = Self::row_id(db, repository_id, number)
            .await?
            .ok_or(PullRequestError::NotFound)?;
        let active = pull_request_commit::ActiveModel {
            pull_request_id: Set(pull_request_id),
            commit_id: Set(commit_id),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        };
        pull_request_commit::Entity::insert(active)
            .on_conflict(
                OnConflict::columns([
                    pull_request_commit::Column::PullRequestId,
                    pull_request_commit::Column::CommitId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec(db)
            .await?;
        Ok(())
    }

    /// Commits associated with the pull request.
    pub async fn commit_ids<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
    ) -> Result<Vec<i64>, PullRequestError> {
        let pull_request_id = super::ids::pull_request_id_by_uuid(db, id)
            .await?
            .ok_or(PullRequestError::NotFound)?;
        let ids = pull_request_commit::Entity::find()
            .select_only()
            .column(pull_request_commit::Column::CommitId)
            .filter(pull_request_commit::Column::PullRequestId.eq(pull_request_id))
            .into_tuple()
            .all(db)
            .await?;
        Ok(ids)
    }

    pub async fn mark_closed<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
        number: i64,
        merged: bool,
    ) -> Result<(), DbErr> {
        pull_request::Entity::update_many()
            .col_expr(pull_request::Column::IsClosed, Expr::value(true))
            .col_expr(pull_request::Column::IsMerged, Expr::value(merged))
            .col_expr(pull_request::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(pull_request::Column::RepositoryId.eq(repository_id))
            .filter(pull_request::Column::Number.eq(number))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn set_change_set_commit<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        sha: &str,
    ) -> Result<(), DbErr> {
        pull_request::Entity::update_many()
            .col_expr(pull_request::Column::ChangeSetCommitSha, Expr::value(sha))
            .col_expr(pull_request::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(pull_request::Column::Uuid.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    /// Claim the external status comment for this pull request. The column
    /// is set only when still NULL, so exactly one of any number of racing
    /// writers wins; losers must discard the side effect they created.
    pub async fn claim_comment<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        comment_id: i64,
    ) -> Result<bool, PullRequestError> {
        let result = pull_request::Entity::update_many()
            .col_expr(pull_request::Column::CommentId, Expr::value(comment_id))
            .col_expr(pull_request::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(pull_request::Column::Uuid.eq(id))
            .filter(pull_request::Column::CommentId.is_null())
            .exec(db)
            .await?;
        if result.rows_affected == 1 {
            return Ok(true);
        }
        if Self::find_by_uuid(db, id).await?.is_none() {
            return Err(PullRequestError::NotFound);
        }
        tracing::warn!(
            pull_request = %id,
            comment_id,
            "lost the comment claim; the duplicate must be discarded"
        );
        Ok(false)
    }
}
