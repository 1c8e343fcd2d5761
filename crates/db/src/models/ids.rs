use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect};
use uuid::Uuid;

use crate::entities::{pull_request, repository};

pub async fn repository_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    repository::Entity::find()
        .select_only()
        .column(repository::Column::Id)
        .filter(repository::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn repository_uuid_by_id<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<Option<Uuid>, DbErr> {
    repository::Entity::find()
        .select_only()
        .column(repository::Column::Uuid)
        .filter(repository::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

pub async fn pull_request_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    pull_request::Entity::find()
        .select_only()
        .column(pull_request::Column::Id)
        .filter(pull_request::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn pull_request_uuid_by_id<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<Option<Uuid>, DbErr> {
    pull_request::Entity::find()
        .select_only()
        .column(pull_request::Column::Uuid)
        .filter(pull_request::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}
