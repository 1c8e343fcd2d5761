use sea_orm::entity::prelude::*;

use crate::types::ChangeKind;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "changelog_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub pull_request_id: i64,
    pub package_name: String,
    pub kind: ChangeKind,
    pub title: String,
    pub body: String,
    pub sort_weight: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
