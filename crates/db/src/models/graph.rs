use std::collections::HashSet;

use sea_orm::{ConnectionTrait, DbErr, Statement};

/// Render an id list for interpolation. Ids are server-generated integers,
/// so inlining them sidesteps the bind-parameter limit on large sets.
fn id_list(ids: &[i64]) -> String {
    let mut out = String::new();
    for (index, id) in ids.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        out.push_str(&id.to_string());
    }
    out
}

/// Commits reachable from any seed by following resolved parent edges,
/// seeds included. Placeholders (unresolved slots) are not traversed; the
/// backfiller is responsible for resolving them first.
pub async fn ancestor_closure<C: ConnectionTrait>(
    db: &C,
    repository_id: i64,
    seeds: &[i64],
) -> Result<HashSet<i64>, DbErr> {
    if seeds.is_empty() {
        return Ok(HashSet::new());
    }
    let sql = format!(
        "WITH RECURSIVE ancestors(id) AS ( \
             SELECT c.id FROM commits c \
                 WHERE c.repository_id = {repository_id} AND c.id IN ({seeds}) \
             UNION \
             SELECT cp.parent_id FROM commit_parents cp \
                 INNER JOIN ancestors a ON cp.child_id = a.id \
                 WHERE cp.parent_id IS NOT NULL \
         ) \
         SELECT id FROM ancestors",
        seeds = id_list(seeds),
    );
    let rows = db
        .query_all_raw(Statement::from_string(db.get_database_backend(), sql))
        .await?;
    rows.iter().map(|row| row.try_get::<i64>("", "id")).collect()
}

/// First commit in the ancestor closure of `seeds` whose history has not
/// been traversed yet. Drives backfill step one.
pub async fn find_unloaded_ancestor<C: ConnectionTrait>(
    db: &C,
    repository_id: i64,
    seeds: &[i64],
) -> Result<Option<i64>, DbErr> {
    if seeds.is_empty() {
        return Ok(None);
    }
    let sql = format!(
        "WITH RECURSIVE ancestors(id) AS ( \
             SELECT c.id FROM commits c \
                 WHERE c.repository_id = {repository_id} AND c.id IN ({seeds}) \
             UNION \
             SELECT cp.parent_id FROM commit_parents cp \
                 INNER JOIN ancestors a ON cp.child_id = a.id \
                 WHERE cp.parent_id IS NOT NULL \
         ) \
         SELECT c.id FROM commits c \
             INNER JOIN ancestors a ON a.id = c.id \
             WHERE NOT c.history_loaded \
             ORDER BY c.id \
             LIMIT 1",
        seeds = id_list(seeds),
    );
    let row = db
        .query_one_raw(Statement::from_string(db.get_database_backend(), sql))
        .await?;
    row.map(|row| row.try_get::<i64>("", "id")).transpose()
}
