#![allow(dead_code)]

use std::sync::Arc;

use db::models::repository::Repository;
use services::services::{config::Config, releases::ReleaseService};
use test_support::FakeRemote;

pub struct Harness {
    pub remote: FakeRemote,
    pub service: ReleaseService,
    pub repo: Repository,
}

pub async fn harness() -> Harness {
    harness_with_config(Config::default()).await
}

pub async fn harness_with_config(config: Config) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let db = test_support::memory_db().await;
    let remote = FakeRemote::new();
    let service = ReleaseService::new(
        db,
        Arc::new(remote.clone()),
        Arc::new(remote.clone()),
        Arc::new(remote.clone()),
        config,
    );
    let repo = service
        .register_repository("acme", "widgets")
        .await
        .expect("repository registered");
    Harness {
        remote,
        service,
        repo,
    }
}

/// Internal row id of the harness repository, for direct model assertions.
pub async fn repo_row_id(harness: &Harness) -> i64 {
    db::models::ids::repository_id_by_uuid(&harness.service.db().conn, harness.repo.id)
        .await
        .expect("id lookup")
        .expect("repository row")
}
