use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Placeholder resolution scans by (repository, parent sha).
        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_commit_parents_repository_parent_sha")
                    .table(CommitParents::Table)
                    .col(CommitParents::RepositoryId)
                    .col(CommitParents::ParentSha)
                    .to_owned(),
            )
            .await?;

        // Backfill probes for the unloaded frontier of a repository.
        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_commits_repository_history_loaded")
                    .table(Commits::Table)
                    .col(Commits::RepositoryId)
                    .col(Commits::HistoryLoaded)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_history_cursors_repository")
                    .table(HistoryCursors::Table)
                    .col(HistoryCursors::RepositoryId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_commit_parents_repository_parent_sha")
                    .table(CommitParents::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_commits_repository_history_loaded")
                    .table(Commits::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_history_cursors_repository")
                    .table(HistoryCursors::Table)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}

#[derive(Iden)]
enum CommitParents {
    Table,
    RepositoryId,
    ParentSha,
}

#[derive(Iden)]
enum Commits {
    Table,
    RepositoryId,
    HistoryLoaded,
}

#[derive(Iden)]
enum HistoryCursors {
    Table,
    RepositoryId,
}
