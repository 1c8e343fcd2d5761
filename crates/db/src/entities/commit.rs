use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "commits")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub repository_id: i64,
    pub sha: String,
    /// Shas named by cherry-pick markers in the commit message, as a JSON
    /// array; NULL when the commit carries no provenance.
    pub cherry_picked_from: Option<Json>,
    /// Whether ancestor traversal has reached this node.
    pub history_loaded: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
