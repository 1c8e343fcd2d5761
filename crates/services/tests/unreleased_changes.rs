mod common;

use common::{harness, harness_with_config, repo_row_id};
use db::models::{
    changelog_entry::{ChangelogEntry, NewChangelogEntry},
    commit_parent::CommitParent,
    history_cursor::HistoryCursor,
    pull_request::PullRequest,
};
use db::types::ChangeKind;
use services::services::config::Config;

async fn attach_change_set(
    h: &common::Harness,
    pr_number: i64,
    kind: ChangeKind,
    title: &str,
) -> PullRequest {
    let repo_id = repo_row_id(h).await;
    let pr = PullRequest::find_by_number(&h.service.db().conn, repo_id, pr_number)
        .await
        .expect("query")
        .expect("pull request mirrored by sync");
    ChangelogEntry::replace_for_pull_request(
        &h.service.db().conn,
        pr.id,
        &[NewChangelogEntry {
            package_name: "widgets-core".to_string(),
            kind,
            title: title.to_string(),
            body: String::new(),
            sort_weight: 0,
        }],
    )
    .await
    .expect("change set stored");
    pr
}

/// Graph a ← b ← c with c as head, pull request #5 on b carrying one feat
/// entry, and a released as a tag.
async fn seeded_harness() -> (common::Harness, PullRequest) {
    let h = harness().await;
    h.remote.commit("aaa", &[], "init");
    h.remote.commit("bbb", &["aaa"], "feat: the change");
    h.remote.commit("ccc", &["bbb"], "chore: head");
    h.remote.branch("main", "ccc");
    h.remote.tag("v1.0.0", "aaa");
    h.remote.pull_head(5, "bbb");
    h.service.sync_if_changed(h.repo.id).await.expect("synced");

    let pr = attach_change_set(&h, 5, ChangeKind::Feat, "the change").await;
    (h, pr)
}

#[tokio::test]
async fn end_to_end_release_flow() {
    let (h, pr) = seeded_harness().await;

    let entries = h
        .service
        .unreleased_changes(h.repo.id, "ccc", &["aaa".to_string()])
        .await
        .expect("query");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title, "the change");
    assert_eq!(entries[0].kind, ChangeKind::Feat);
    assert_eq!(entries[0].pull_request, pr.id);

    let change_set = h.service.change_set(pr.id).await.expect("change set");
    assert_eq!(change_set.len(), 1);
    assert_eq!(change_set[0].title, "the change");

    let released = h
        .service
        .is_released(h.repo.id, &["aaa".to_string()], pr.id)
        .await
        .expect("query");
    assert!(!released);

    // Releasing the head covers the pull request.
    let released = h
        .service
        .is_released(h.repo.id, &["ccc".to_string()], pr.id)
        .await
        .expect("query");
    assert!(released);
}

#[tokio::test]
async fn a_head_excluded_by_itself_yields_nothing() {
    let (h, _pr) = seeded_harness().await;

    let entries = h
        .service
        .unreleased_changes(h.repo.id, "ccc", &["ccc".to_string()])
        .await
        .expect("query");
    assert!(entries.is_empty());
}

#[tokio::test]
async fn extending_the_head_never_removes_entries() {
    let (h, _pr) = seeded_harness().await;

    let at_b = h
        .service
        .unreleased_changes(h.repo.id, "bbb", &["aaa".to_string()])
        .await
        .expect("query");
    let at_c = h
        .service
        .unreleased_changes(h.repo.id, "ccc", &["aaa".to_string()])
        .await
        .expect("query");

    let ids_at_b: Vec<i64> = at_b.iter().map(|entry| entry.id).collect();
    let ids_at_c: Vec<i64> = at_c.iter().map(|entry| entry.id).collect();
    assert!(ids_at_b.iter().all(|id| ids_at_c.contains(id)));
}

#[tokio::test]
async fn cherry_picked_changes_count_as_released() {
    let h = harness().await;
    // main: 11111111 ← 22222222 ← 33333333; release: 11111111 ← 44444444,
    // where 44444444 is a pick of 22222222.
    h.remote.commit("11111111", &[], "init");
    h.remote.commit("22222222", &["11111111"], "feat: the change");
    h.remote.commit("33333333", &["22222222"], "chore: head");
    h.remote.commit(
        "44444444",
        &["11111111"],
        "feat: the change\n\n(cherry picked from commit 22222222)",
    );
    h.remote.branch("main", "33333333");
    h.remote.branch("release", "44444444");
    h.remote.tag("v1.0.0", "11111111");
    h.remote.pull_head(5, "22222222");
    h.service.sync_if_changed(h.repo.id).await.expect("synced");

    let pr = attach_change_set(&h, 5, ChangeKind::Feat, "the change").await;

    // Without the release branch excluded, the change is pending.
    let entries = h
        .service
        .unreleased_changes(h.repo.id, "33333333", &["11111111".to_string()])
        .await
        .expect("query");
    assert_eq!(entries.len(), 1);

    // The pick on the release branch excludes the original commit too.
    let entries = h
        .service
        .unreleased_changes(h.repo.id, "33333333", &["44444444".to_string()])
        .await
        .expect("query");
    assert!(entries.is_empty());

    let released = h
        .service
        .is_released(h.repo.id, &["44444444".to_string()], pr.id)
        .await
        .expect("query");
    assert!(released);
}

#[tokio::test]
async fn a_pick_of_a_released_commit_is_excluded() {
    let h = harness().await;
    // The fix lands on the release branch first, then is picked onto main.
    h.remote.commit("aaaa1111", &[], "init");
    h.remote.commit("bbbb2222", &["aaaa1111"], "fix: urgent");
    h.remote.commit(
        "cccc3333",
        &["aaaa1111"],
        "fix: urgent\n\n(cherry picked from commit bbbb2222)",
    );
    h.remote.branch("main", "cccc3333");
    h.remote.branch("release", "bbbb2222");
    h.remote.pull_head(9, "cccc3333");
    h.service.sync_if_changed(h.repo.id).await.expect("synced");

    let pr = attach_change_set(&h, 9, ChangeKind::Fix, "urgent").await;

    // The pull request's only association is the pick, whose source is an
    // ancestor of the excluded head.
    let entries = h
        .service
        .unreleased_changes(h.repo.id, "cccc3333", &["bbbb2222".to_string()])
        .await
        .expect("query");
    assert!(entries.is_empty());

    let released = h
        .service
        .is_released(h.repo.id, &["bbbb2222".to_string()], pr.id)
        .await
        .expect("query");
    assert!(released);
}

#[tokio::test]
async fn deep_history_is_materialized_in_pages() {
    let config = Config {
        history_page_size: 10,
        ..Config::default()
    };
    let h = harness_with_config(config).await;

    let mut previous: Option<String> = None;
    for index in 0..25 {
        let sha = format!("c{index:02}");
        match &previous {
            Some(parent) => h.remote.commit(&sha, &[parent.as_str()], "chore: step"),
            None => h.remote.commit(&sha, &[], "init"),
        }
        previous = Some(sha);
    }
    h.remote.branch("main", "c24");
    h.remote.tag("v1.0.0", "c00");
    h.service.sync_if_changed(h.repo.id).await.expect("synced");

    let entries = h
        .service
        .unreleased_changes(h.repo.id, "c24", &["c00".to_string()])
        .await
        .expect("query");
    assert!(entries.is_empty());

    // 25 ancestors at page size 10: three pages for the head's traversal,
    // one for the released tag target, cursor retired at the end.
    assert_eq!(h.remote.history_calls(), 4);
    let repo_id = repo_row_id(&h).await;
    assert!(
        HistoryCursor::any_for_repository(&h.service.db().conn, repo_id)
            .await
            .expect("query")
            .is_none()
    );
    assert_eq!(
        CommitParent::count_unresolved(&h.service.db().conn, repo_id)
            .await
            .expect("count"),
        0
    );
}

#[tokio::test]
async fn an_interrupted_traversal_resumes_from_its_cursor() {
    let config = Config {
        history_page_size: 10,
        ..Config::default()
    };
    let h = harness_with_config(config).await;

    let mut previous: Option<String> = None;
    for index in 0..25 {
        let sha = format!("c{index:02}");
        match &previous {
            Some(parent) => h.remote.commit(&sha, &[parent.as_str()], "chore: step"),
            None => h.remote.commit(&sha, &[], "init"),
        }
        previous = Some(sha);
    }
    h.remote.branch("main", "c24");
    h.remote.tag("v1.0.0", "c00");
    h.service.sync_if_changed(h.repo.id).await.expect("synced");

    // The remote dies after serving the first page; the traversal leaves a
    // cursor behind.
    h.remote.fail_history_after(1);
    let failed = h
        .service
        .unreleased_changes(h.repo.id, "c24", &["c00".to_string()])
        .await;
    assert!(failed.is_err());
    let repo_id = repo_row_id(&h).await;
    assert!(
        HistoryCursor::any_for_repository(&h.service.db().conn, repo_id)
            .await
            .expect("query")
            .is_some()
    );

    // Recovery picks up where the cursor stopped instead of starting over:
    // one successful page, one failed call, two resumed pages, then the
    // released tag target's own page.
    h.remote.clear_history_failure();
    h.service
        .unreleased_changes(h.repo.id, "c24", &["c00".to_string()])
        .await
        .expect("query succeeds after recovery");
    assert_eq!(h.remote.history_calls(), 5);
    assert!(
        HistoryCursor::any_for_repository(&h.service.db().conn, repo_id)
            .await
            .expect("query")
            .is_none()
    );
}
