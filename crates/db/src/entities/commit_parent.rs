use sea_orm::entity::prelude::*;

/// One parent slot of a commit. `parent_id` is set once the parent commit row
/// exists; until then the row is a placeholder keyed by `parent_sha`, and
/// `cursor_id` names the history traversal that produced it, if any.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "commit_parents")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub repository_id: i64,
    pub child_id: i64,
    pub parent_sha: String,
    pub parent_id: Option<i64>,
    pub cursor_id: Option<i64>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
