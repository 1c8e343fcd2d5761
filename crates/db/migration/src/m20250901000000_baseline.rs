use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DatabaseBackend;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(Repositories::Table)
                    .col(pk_id_col(manager, Repositories::Id))
                    .col(uuid_col(Repositories::Uuid))
                    .col(ColumnDef::new(Repositories::Owner).string().not_null())
                    .col(ColumnDef::new(Repositories::Name).string().not_null())
                    .col(
                        ColumnDef::new(Repositories::RemoteVersion)
                            .big_integer()
                            .not_null()
                            .default(Expr::val(0)),
                    )
                    .col(
                        ColumnDef::new(Repositories::LocalVersion)
                            .big_integer()
                            .not_null()
                            .default(Expr::val(0)),
                    )
                    .col(timestamp_col(Repositories::CreatedAt))
                    .col(timestamp_col(Repositories::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_repositories_uuid")
                    .table(Repositories::Table)
                    .col(Repositories::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_repositories_owner_name")
                    .table(Repositories::Table)
                    .col(Repositories::Owner)
                    .col(Repositories::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(Commits::Table)
                    .col(pk_id_col(manager, Commits::Id))
                    .col(fk_id_col(manager, Commits::RepositoryId))
                    .col(ColumnDef::new(Commits::Sha).string_len(64).not_null())
                    .col(ColumnDef::new(Commits::CherryPickedFrom).json())
                    .col(
                        ColumnDef::new(Commits::HistoryLoaded)
                            .boolean()
                            .not_null()
                            .default(Expr::val(false)),
                    )
                    .col(timestamp_col(Commits::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_commits_repository_id")
                            .from(Commits::Table, Commits::RepositoryId)
                            .to(Repositories::Table, Repositories::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_commits_repository_sha")
                    .table(Commits::Table)
                    .col(Commits::RepositoryId)
                    .col(Commits::Sha)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(CommitParents::Table)
                    .col(pk_id_col(manager, CommitParents::Id))
                    .col(fk_id_col(manager, CommitParents::RepositoryId))
                    .col(fk_id_col(manager, CommitParents::ChildId))
                    .col(ColumnDef::new(CommitParents::ParentSha).string_len(64).not_null())
                    .col(fk_id_nullable_col(manager, CommitParents::ParentId))
                    .col(fk_id_nullable_col(manager, CommitParents::CursorId))
                    .col(timestamp_col(CommitParents::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_commit_parents_child_id")
                            .from(CommitParents::Table, CommitParents::ChildId)
                            .to(Commits::Table, Commits::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_commit_parents_child_parent_sha")
                    .table(CommitParents::Table)
                    .col(CommitParents::ChildId)
                    .col(CommitParents::ParentSha)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(HistoryCursors::Table)
                    .col(pk_id_col(manager, HistoryCursors::Id))
                    .col(fk_id_col(manager, HistoryCursors::RepositoryId))
                    .col(fk_id_col(manager, HistoryCursors::SubtreeRootId))
                    .col(ColumnDef::new(HistoryCursors::EndCursor).text().not_null())
                    .col(timestamp_col(HistoryCursors::CreatedAt))
                    .col(timestamp_col(HistoryCursors::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_history_cursors_subtree_root_id")
                            .from(HistoryCursors::Table, HistoryCursors::SubtreeRootId)
                            .to(Commits::Table, Commits::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_history_cursors_subtree_root")
                    .table(HistoryCursors::Table)
                    .col(HistoryCursors::SubtreeRootId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(GitRefs::Table)
                    .col(pk_id_col(manager, GitRefs::Id))
                    .col(fk_id_col(manager, GitRefs::RepositoryId))
                    .col(ColumnDef::new(GitRefs::Kind).string_len(32).not_null())
                    .col(ColumnDef::new(GitRefs::Name).string().not_null())
                    .col(ColumnDef::new(GitRefs::CommitSha).string_len(64).not_null())
                    .col(ColumnDef::new(GitRefs::PrNumber).big_integer())
                    .col(timestamp_col(GitRefs::CreatedAt))
                    .col(timestamp_col(GitRefs::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_git_refs_repository_id")
                            .from(GitRefs::Table, GitRefs::RepositoryId)
                            .to(Repositories::Table, Repositories::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_git_refs_repository_kind_name")
                    .table(GitRefs::Table)
                    .col(GitRefs::RepositoryId)
                    .col(GitRefs::Kind)
                    .col(GitRefs::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(PullRequests::Table)
                    .col(pk_id_col(manager, PullRequests::Id))
                    .col(uuid_col(PullRequests::Uuid))
                    .col(fk_id_col(manager, PullRequests::RepositoryId))
                    .col(ColumnDef::new(PullRequests::Number).big_integer().not_null())
                    .col(fk_id_nullable_col(manager, PullRequests::HeadCommitId))
                    .col(
                        ColumnDef::new(PullRequests::IsClosed)
                            .boolean()
                            .not_null()
                            .default(Expr::val(false)),
                    )
                    .col(
                        ColumnDef::new(PullRequests::IsMerged)
                            .boolean()
                            .not_null()
                            .default(Expr::val(false)),
                    )
                    .col(ColumnDef::new(PullRequests::ChangeSetCommitSha).string_len(64))
                    .col(ColumnDef::new(PullRequests::CommentId).big_integer())
                    .col(timestamp_col(PullRequests::CreatedAt))
                    .col(timestamp_col(PullRequests::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pull_requests_repository_id")
                            .from(PullRequests::Table, PullRequests::RepositoryId)
                            .to(Repositories::Table, Repositories::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_pull_requests_uuid")
                    .table(PullRequests::Table)
                    .col(PullRequests::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_pull_requests_repository_number")
                    .table(PullRequests::Table)
                    .col(PullRequests::RepositoryId)
                    .col(PullRequests::Number)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(PullRequestCommits::Table)
                    .col(pk_id_col(manager, PullRequestCommits::Id))
                    .col(fk_id_col(manager, PullRequestCommits::PullRequestId))
                    .col(fk_id_col(manager, PullRequestCommits::CommitId))
                    .col(timestamp_col(PullRequestCommits::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pull_request_commits_pull_request_id")
                            .from(PullRequestCommits::Table, PullRequestCommits::PullRequestId)
                            .to(PullRequests::Table, PullRequests::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pull_request_commits_commit_id")
                            .from(PullRequestCommits::Table, PullRequestCommits::CommitId)
                            .to(Commits::Table, Commits::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_pull_request_commits_pair")
                    .table(PullRequestCommits::Table)
                    .col(PullRequestCommits::PullRequestId)
                    .col(PullRequestCommits::CommitId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_pull_request_commits_commit")
                    .table(PullRequestCommits::Table)
                    .col(PullRequestCommits::CommitId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(ChangelogEntries::Table)
                    .col(pk_id_col(manager, ChangelogEntries::Id))
                    .col(fk_id_col(manager, ChangelogEntries::PullRequestId))
                    .col(ColumnDef::new(ChangelogEntries::PackageName).string().not_null())
                    .col(ColumnDef::new(ChangelogEntries::Kind).string_len(32).not_null())
                    .col(ColumnDef::new(ChangelogEntries::Title).text().not_null())
                    .col(ColumnDef::new(ChangelogEntries::Body).text().not_null())
                    .col(
                        ColumnDef::new(ChangelogEntries::SortWeight)
                            .big_integer()
                            .not_null()
                            .default(Expr::val(0)),
                    )
                    .col(timestamp_col(ChangelogEntries::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_changelog_entries_pull_request_id")
                            .from(ChangelogEntries::Table, ChangelogEntries::PullRequestId)
                            .to(PullRequests::Table, PullRequests::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_changelog_entries_pull_request")
                    .table(ChangelogEntries::Table)
                    .col(ChangelogEntries::PullRequestId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChangelogEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PullRequestCommits::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PullRequests::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(GitRefs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(HistoryCursors::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CommitParents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Commits::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Repositories::Table).to_owned())
            .await?;
        Ok(())
    }
}

fn pk_id_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = ColumnDef::new(col);
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite => {
            col.integer();
        }
        _ => {
            col.big_integer();
        }
    }
    col.not_null().auto_increment().primary_key().to_owned()
}

fn fk_id_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = ColumnDef::new(col);
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite => {
            col.integer();
        }
        _ => {
            col.big_integer();
        }
    }
    col.not_null().to_owned()
}

fn fk_id_nullable_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = ColumnDef::new(col);
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite => {
            col.integer();
        }
        _ => {
            col.big_integer();
        }
    }
    col.to_owned()
}

fn uuid_col<T: Iden>(col: T) -> ColumnDef {
    ColumnDef::new(col).uuid().not_null().to_owned()
}

fn timestamp_col<T: Iden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

#[derive(Iden)]
enum Repositories {
    Table,
    Id,
    Uuid,
    Owner,
    Name,
    RemoteVersion,
    LocalVersion,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Commits {
    Table,
    Id,
    RepositoryId,
    Sha,
    CherryPickedFrom,
    HistoryLoaded,
    CreatedAt,
}

#[derive(Iden)]
enum CommitParents {
    Table,
    Id,
    RepositoryId,
    ChildId,
    ParentSha,
    ParentId,
    CursorId,
    CreatedAt,
}

#[derive(Iden)]
enum HistoryCursors {
    Table,
    Id,
    RepositoryId,
    SubtreeRootId,
    EndCursor,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum GitRefs {
    Table,
    Id,
    RepositoryId,
    Kind,
    Name,
    CommitSha,
    PrNumber,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum PullRequests {
    Table,
    Id,
    Uuid,
    RepositoryId,
    Number,
    HeadCommitId,
    IsClosed,
    IsMerged,
    ChangeSetCommitSha,
    CommentId,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum PullRequestCommits {
    Table,
    Id,
    PullRequestId,
    CommitId,
    CreatedAt,
}

#[derive(Iden)]
enum ChangelogEntries {
    Table,
    Id,
    PullRequestId,
    PackageName,
    Kind,
    Title,
    Body,
    SortWeight,
    CreatedAt,
}
