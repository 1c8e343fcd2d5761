use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(
    Copy,
    Clone,
    Debug,
    Hash,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    EnumString,
    Display,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RefKind {
    #[sea_orm(string_value = "branch")]
    Branch,
    #[sea_orm(string_value = "tag")]
    Tag,
    #[sea_orm(string_value = "pull")]
    Pull,
}

#[derive(
    Copy,
    Clone,
    Debug,
    Hash,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    EnumString,
    Display,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChangeKind {
    #[sea_orm(string_value = "breaking")]
    Breaking,
    #[sea_orm(string_value = "feat")]
    Feat,
    #[sea_orm(string_value = "refactor")]
    Refactor,
    #[sea_orm(string_value = "fix")]
    Fix,
    #[sea_orm(string_value = "perf")]
    Perf,
    #[sea_orm(string_value = "docs")]
    Docs,
    #[sea_orm(string_value = "chore")]
    Chore,
}
