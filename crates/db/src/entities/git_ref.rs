use sea_orm::entity::prelude::*;

use crate::types::RefKind;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "git_refs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub repository_id: i64,
    pub kind: RefKind,
    /// Fully qualified ref name as advertised by the remote.
    pub name: String,
    pub commit_sha: String,
    /// Populated for pull refs only.
    pub pr_number: Option<i64>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
