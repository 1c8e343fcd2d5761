use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
    sea_query::{Expr, ExprTrait, OnConflict},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::entities::repository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Repository not found")]
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: Uuid,
    pub owner: String,
    pub name: String,
    pub remote_version: i64,
    pub local_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Repository {
    fn from_model(model: repository::Model) -> Self {
        Self {
            id: model.uuid,
            owner: model.owner,
            name: model.name,
            remote_version: model.remote_version,
            local_version: model.local_version,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }

    pub async fn find_by_uuid<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = repository::Entity::find()
            .filter(repository::Column::Uuid.eq(id))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    /// Register a repository, or return the existing row for (owner, name).
    /// New rows start one remote version ahead so the first sync does work.
    pub async fn find_or_create<C: ConnectionTrait>(
        db: &C,
        owner: &str,
        name: &str,
    ) -> Result<Self, DbErr> {
        if let Some(existing) = repository::Entity::find()
            .filter(repository::Column::Owner.eq(owner))
            .filter(repository::Column::Name.eq(name))
            .one(db)
            .await?
        {
            return Ok(Self::from_model(existing));
        }

        let now = Utc::now();
        let active = repository::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            owner: Set(owner.to_string()),
            name: Set(name.to_string()),
            remote_version: Set(1),
            local_version: Set(0),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };

        let insert = repository::Entity::insert(active)
            .on_conflict(
                OnConflict::columns([repository::Column::Owner, repository::Column::Name])
                    .do_nothing()
                    .to_owned(),
            )
            .exec(db)
            .await?;

        let created = if insert.last_insert_id > 0 {
            repository::Entity::find_by_id(insert.last_insert_id)
                .one(db)
                .await?
        } else {
            None
        };
        if let Some(created) = created {
            return Ok(Self::from_model(created));
        }

        let record = repository::Entity::find()
            .filter(repository::Column::Owner.eq(owner))
            .filter(repository::Column::Name.eq(name))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("Repository not found".to_string()))?;
        Ok(Self::from_model(record))
    }

    /// Bump the remote version counter. Called by change notifications
    /// (webhooks, polling) to make the next sync observe new work.
    pub async fn mark_remote_changed<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
    ) -> Result<Self, RepositoryError> {
        let result = repository::Entity::update_many()
            .col_expr(
                repository::Column::RemoteVersion,
                Expr::col(repository::Column::RemoteVersion).add(1),
            )
            .col_expr(repository::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(repository::Column::Uuid.eq(id))
            .exec(db)
            .await?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Self::find_by_uuid(db, id)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Compare-and-swap on the local version counter: advance to `target`
    /// only if the row still carries the value we read. Returns whether this
    /// writer won.
    pub async fn try_advance_local_version<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        observed_local: i64,
        target: i64,
    ) -> Result<bool, DbErr> {
        let result = repository::Entity::update_many()
            .col_expr(repository::Column::LocalVersion, Expr::value(target))
            .col_expr(repository::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(repository::Column::Uuid.eq(id))
            .filter(repository::Column::LocalVersion.eq(observed_local))
            .exec(db)
            .await?;
        Ok(result.rows_affected == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::memory_db;

    #[tokio::test]
    async fn find_or_create_is_idempotent() -> Result<(), DbErr> {
        let db = memory_db().await?;

        let first = Repository::find_or_create(&db.conn, "acme", "widgets").await?;
        let second = Repository::find_or_create(&db.conn, "acme", "widgets").await?;
        assert_eq!(first.id, second.id);
        assert_eq!(first.remote_version, 1);
        assert_eq!(first.local_version, 0);

        let other = Repository::find_or_create(&db.conn, "acme", "gadgets").await?;
        assert_ne!(first.id, other.id);
        Ok(())
    }

    #[tokio::test]
    async fn mark_remote_changed_bumps_the_counter() -> Result<(), DbErr> {
        let db = memory_db().await?;
        let repo = Repository::find_or_create(&db.conn, "acme", "widgets").await?;

        let bumped = Repository::mark_remote_changed(&db.conn, repo.id)
            .await
            .expect("repository exists");
        assert_eq!(bumped.remote_version, repo.remote_version + 1);
        assert_eq!(bumped.local_version, repo.local_version);
        Ok(())
    }

    #[tokio::test]
    async fn local_version_cas_only_wins_when_unchanged() -> Result<(), DbErr> {
        let db = memory_db().await?;
        let repo = Repository::find_or_create(&db.conn, "acme", "widgets").await?;

        assert!(Repository::try_advance_local_version(&db.conn, repo.id, 0, 1).await?);
        // The stale observer loses.
        assert!(!Repository::try_advance_local_version(&db.conn, repo.id, 0, 1).await?);

        let current = Repository::find_by_uuid(&db.conn, repo.id)
            .await?
            .expect("repository exists");
        assert_eq!(current.local_version, 1);
        Ok(())
    }
}
