use std::str::FromStr;

use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, Set, Statement,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    entities::changelog_entry,
    models::ids,
    types::ChangeKind,
};

#[derive(Debug, Error)]
pub enum ChangelogEntryError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Pull request not found")]
    PullRequestNotFound,
}

/// One line of a pull request's change set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub id: i64,
    pub pull_request: Uuid,
    pub package_name: String,
    pub kind: ChangeKind,
    pub title: String,
    pub body: String,
    pub sort_weight: i64,
}

#[derive(Debug, Clone)]
pub struct NewChangelogEntry {
    pub package_name: String,
    pub kind: ChangeKind,
    pub title: String,
    pub body: String,
    pub sort_weight: i64,
}

impl ChangelogEntry {
    /// Replace the pull request's change set wholesale; the change set is
    /// authored as a unit, so partial edits are never persisted.
    pub async fn replace_for_pull_request<C: ConnectionTrait>(
        db: &C,
        pull_request: Uuid,
        entries: &[NewChangelogEntry],
    ) -> Result<(), ChangelogEntryError> {
        let pull_request_id = ids::pull_request_id_by_uuid(db, pull_request)
            .await?
            .ok_or(ChangelogEntryError::PullRequestNotFound)?;

        changelog_entry::Entity::delete_many()
            .filter(changelog_entry::Column::PullRequestId.eq(pull_request_id))
            .exec(db)
            .await?;

        for entry in entries {
            let active = changelog_entry::ActiveModel {
                pull_request_id: Set(pull_request_id),
                package_name: Set(entry.package_name.clone()),
                kind: Set(entry.kind),
                title: Set(entry.title.clone()),
                body: Set(entry.body.clone()),
                sort_weight: Set(entry.sort_weight),
                created_at: Set(Utc::now().into()),
                ..Default::default()
            };
            changelog_entry::Entity::insert(active).exec(db).await?;
        }
        Ok(())
    }

    pub async fn list_for_pull_request<C: ConnectionTrait>(
        db: &C,
        pull_request: Uuid,
    ) -> Result<Vec<Self>, ChangelogEntryError> {
        let pull_request_id = ids::pull_request_id_by_uuid(db, pull_request)
            .await?
            .ok_or(ChangelogEntryError::PullRequestNotFound)?;
        let records = changelog_entry::Entity::find()
            .filter(changelog_entry::Column::PullRequestId.eq(pull_request_id))
            .order_by_asc(changelog_entry::Column::SortWeight)
            .order_by_asc(changelog_entry::Column::Id)
            .all(db)
            .await?;
        Ok(records
            .into_iter()
            .map(|model| Self {
                id: model.id,
                pull_request,
                package_name: model.package_name,
                kind: model.kind,
                title: model.title,
                body: model.body,
                sort_weight: model.sort_weight,
            })
            .collect())
    }

    /// Entries of every pull request associated with at least one commit of
    /// the given set, ordered by (sort_weight, id) and deduplicated by id.
    pub async fn list_for_commit_set<C: ConnectionTrait>(
        db: &C,
        commit_ids: &[i64],
    ) -> Result<Vec<Self>, DbErr> {
        if commit_ids.is_empty() {
            return Ok(Vec::new());
        }
        let id_list = commit_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT DISTINCT ce.id AS id, pr.uuid AS pr_uuid, \
                    ce.package_name AS package_name, ce.kind AS kind, \
                    ce.title AS title, ce.body AS body, ce.sort_weight AS sort_weight \
             FROM changelog_entries ce \
                 INNER JOIN pull_requests pr ON pr.id = ce.pull_request_id \
                 INNER JOIN pull_request_commits prc ON prc.pull_request_id = ce.pull_request_id \
             WHERE prc.commit_id IN ({id_list}) \
             ORDER BY ce.sort_weight ASC, ce.id ASC",
        );
        let rows = db
            .query_all_raw(Statement::from_string(db.get_database_backend(), sql))
            .await?;
        rows.iter()
            .map(|row| {
                let kind: String = row.try_get("", "kind")?;
                Ok(Self {
                    id: row.try_get("", "id")?,
                    pull_request: row.try_get("", "pr_uuid")?,
                    package_name: row.try_get("", "package_name")?,
                    kind: ChangeKind::from_str(&kind)
                        .map_err(|err| DbErr::Type(format!("unknown change kind {kind}: {err}")))?,
                    title: row.try_get("", "title")?,
                    body: row.try_get("", "body")?,
                    sort_weight: row.try_get("", "sort_weight")?,
                })
            })
            .collect()
    }
}
