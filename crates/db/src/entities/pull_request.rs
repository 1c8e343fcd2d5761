use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "pull_requests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub uuid: Uuid,
    pub repository_id: i64,
    pub number: i64,
    pub head_commit_id: Option<i64>,
    pub is_closed: bool,
    pub is_merged: bool,
    /// Sha the change set was last written against.
    pub change_set_commit_sha: Option<String>,
    /// External comment claimed by exactly one writer; see
    /// `PullRequest::claim_comment`.
    pub comment_id: Option<i64>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
