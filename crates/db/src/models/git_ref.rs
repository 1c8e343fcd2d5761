use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    sea_query::OnConflict,
};
use serde::{Deserialize, Serialize};

use crate::{entities::git_ref, types::RefKind};

/// Local mirror of one advertised remote ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRef {
    pub kind: RefKind,
    pub name: String,
    pub commit_sha: String,
    pub pr_number: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl GitRef {
    fn from_model(model: git_ref::Model) -> Self {
        Self {
            kind: model.kind,
            name: model.name,
            commit_sha: model.commit_sha,
            pr_number: model.pr_number,
            updated_at: model.updated_at.into(),
        }
    }

    pub async fn list_for_repository<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
    ) -> Result<Vec<Self>, DbErr> {
        let records = git_ref::Entity::find()
            .filter(git_ref::Column::RepositoryId.eq(repository_id))
            .order_by_asc(git_ref::Column::Name)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    pub async fn upsert<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
        kind: RefKind,
        name: &str,
        commit_sha: &str,
        pr_number: Option<i64>,
    ) -> Result<(), DbErr> {
        let now = Utc::now();
        let active = git_ref::ActiveModel {
            repository_id: Set(repository_id),
            kind: Set(kind),
            name: Set(name.to_string()),
            commit_sha: Set(commit_sha.to_string()),
            pr_number: Set(pr_number),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };
        git_ref::Entity::insert(active)
            .on_conflict(
                OnConflict::columns([
                    git_ref::Column::RepositoryId,
                    git_ref::Column::Kind,
                    git_ref::Column::Name,
                ])
                .update_columns([
                    git_ref::Column::CommitSha,
                    git_ref::Column::PrNumber,
                    git_ref::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn delete<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
        kind: RefKind,
        name: &str,
    ) -> Result<u64, DbErr> {
        let result = git_ref::Entity::delete_many()
            .filter(git_ref::Column::RepositoryId.eq(repository_id))
            .filter(git_ref::Column::Kind.eq(kind))
            .filter(git_ref::Column::Name.eq(name))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Target sha of a branch. Accepts either the short branch name or the
    /// fully qualified ref name.
    pub async fn branch_head_sha<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
        branch: &str,
    ) -> Result<Option<String>, DbErr> {
        let name = if branch.starts_with("refs/") {
            branch.to_string()
        } else {
            format!("refs/heads/{branch}")
        };
        git_ref::Entity::find()
            .select_only()
            .column(git_ref::Column::CommitSha)
            .filter(git_ref::Column::RepositoryId.eq(repository_id))
            .filter(git_ref::Column::Kind.eq(RefKind::Branch))
            .filter(git_ref::Column::Name.eq(name))
            .into_tuple()
            .one(db)
            .await
    }

    pub async fn tags_for_repository<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
    ) -> Result<Vec<Self>, DbErr> {
        let records = git_ref::Entity::find()
            .filter(git_ref::Column::RepositoryId.eq(repository_id))
            .filter(git_ref::Column::Kind.eq(RefKind::Tag))
            .order_by_asc(git_ref::Column::Name)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }
}
