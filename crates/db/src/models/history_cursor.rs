use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, Set,
    sea_query::{Expr, OnConflict},
};

use crate::entities::history_cursor;

/// Resumption point of a partially fetched ancestor traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryCursor {
    pub id: i64,
    pub repository_id: i64,
    pub subtree_root_id: i64,
    pub end_cursor: String,
}

impl HistoryCursor {
    fn from_model(model: history_cursor::Model) -> Self {
        Self {
            id: model.id,
            repository_id: model.repository_id,
            subtree_root_id: model.subtree_root_id,
            end_cursor: model.end_cursor,
        }
    }

    /// Record where the traversal rooted at `subtree_root_id` stopped. One
    /// cursor per root; a repeated upsert moves the existing cursor forward.
    pub async fn upsert<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
        subtree_root_id: i64,
        end_cursor: &str,
    ) -> Result<Self, DbErr> {
        let now = Utc::now();
        let active = history_cursor::ActiveModel {
            repository_id: Set(repository_id),
            subtree_root_id: Set(subtree_root_id),
            end_cursor: Set(end_cursor.to_string()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };
        history_cursor::Entity::insert(active)
            .on_conflict(
                OnConflict::column(history_cursor::Column::SubtreeRootId)
                    .update_columns([
                        history_cursor::Column::EndCursor,
                        history_cursor::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(db)
            .await?;

        let record = history_cursor::Entity::find()
            .filter(history_cursor::Column::SubtreeRootId.eq(subtree_root_id))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("History cursor not found".to_string()))?;
        Ok(Self::from_model(record))
    }

    pub async fn advance<C: ConnectionTrait>(
        db: &C,
        id: i64,
        end_cursor: &str,
    ) -> Result<(), DbErr> {
        history_cursor::Entity::update_many()
            .col_expr(history_cursor::Column::EndCursor, Expr::value(end_cursor))
            .col_expr(history_cursor::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(history_cursor::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    /// Oldest leftover cursor of the repository, if any. Backfill drains
    /// these after the unloaded frontier is exhausted.
    pub async fn any_for_repository<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
    ) -> Result<Option<Self>, DbErr> {
        let record = history_cursor::Entity::find()
            .filter(history_cursor::Column::RepositoryId.eq(repository_id))
            .order_by_asc(history_cursor::Column::Id)
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn delete<C: ConnectionTrait>(db: &C, id: i64) -> Result<(), DbErr> {
        history_cursor::Entity::delete_many()
            .filter(history_cursor::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }
}
