mod common;

use common::{harness, repo_row_id};
use db::models::{
    commit_parent::CommitParent, git_ref::GitRef, pull_request::PullRequest,
    repository::Repository,
};
use db::types::RefKind;
use services::services::sync::SyncError;

#[tokio::test]
async fn first_sync_mirrors_refs_and_converges() {
    let h = harness().await;
    h.remote.commit("aaa", &[], "init");
    h.remote.commit("bbb", &["aaa"], "feat: second");
    h.remote.branch("main", "bbb");
    h.remote.tag("v1.0.0", "aaa");

    h.service.sync_if_changed(h.repo.id).await.expect("synced");

    let repo = Repository::find_by_uuid(&h.service.db().conn, h.repo.id)
        .await
        .expect("query")
        .expect("repository row");
    assert_eq!(repo.local_version, repo.remote_version);

    let head = h
        .service
        .branch_head(h.repo.id, "main")
        .await
        .expect("branch head")
        .expect("main is mirrored");
    assert_eq!(head.sha, "bbb");

    let tags = h.service.all_tags(h.repo.id).await.expect("tags");
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].name, "refs/tags/v1.0.0");
    assert_eq!(tags[0].commit_sha, "aaa");

    // Both commits landed and the parent edge resolved.
    let repo_id = repo_row_id(&h).await;
    assert_eq!(
        CommitParent::count_unresolved(&h.service.db().conn, repo_id)
            .await
            .expect("count"),
        0
    );

    // Converged: a second call never touches the transport.
    let listed = h.remote.list_refs_calls();
    h.service.sync_if_changed(h.repo.id).await.expect("no-op");
    assert_eq!(h.remote.list_refs_calls(), listed);
}

#[tokio::test]
async fn ref_deletion_is_mirrored() {
    let h = harness().await;
    h.remote.commit("aaa", &[], "init");
    h.remote.branch("main", "aaa");
    h.remote.branch("feature", "aaa");
    h.service.sync_if_changed(h.repo.id).await.expect("synced");

    h.remote.remove_ref("refs/heads/feature");
    Repository::mark_remote_changed(&h.service.db().conn, h.repo.id)
        .await
        .expect("bumped");
    h.service.sync_if_changed(h.repo.id).await.expect("synced");

    let repo_id = repo_row_id(&h).await;
    let refs = GitRef::list_for_repository(&h.service.db().conn, repo_id)
        .await
        .expect("refs");
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].name, "refs/heads/main");
}

#[tokio::test]
async fn sync_loops_until_the_remote_version_is_reached() {
    let h = harness().await;
    h.remote.commit("aaa", &[], "init");
    h.remote.branch("main", "aaa");

    // Two notifications before anyone synced.
    Repository::mark_remote_changed(&h.service.db().conn, h.repo.id)
        .await
        .expect("bumped");
    Repository::mark_remote_changed(&h.service.db().conn, h.repo.id)
        .await
        .expect("bumped");

    h.service.sync_if_changed(h.repo.id).await.expect("synced");

    let repo = Repository::find_by_uuid(&h.service.db().conn, h.repo.id)
        .await
        .expect("query")
        .expect("repository row");
    assert_eq!(repo.local_version, repo.remote_version);
    assert_eq!(repo.remote_version, 3);
}

#[tokio::test]
async fn pull_head_refs_keep_pull_requests_associated() {
    let h = harness().await;
    h.remote.commit("aaa", &[], "init");
    h.remote.commit("bbb", &["aaa"], "feat: branch work");
    h.remote.branch("main", "aaa");
    h.remote.pull_head(5, "bbb");

    h.service.sync_if_changed(h.repo.id).await.expect("synced");

    let repo_id = repo_row_id(&h).await;
    let pr = PullRequest::find_by_number(&h.service.db().conn, repo_id, 5)
        .await
        .expect("query")
        .expect("pull request created by sync");
    let commits = PullRequest::commit_ids(&h.service.db().conn, pr.id)
        .await
        .expect("associations");
    assert_eq!(commits.len(), 1);
    assert!(pr.head_commit_id.is_some());

    let refs = GitRef::list_for_repository(&h.service.db().conn, repo_id)
        .await
        .expect("refs");
    assert!(refs
        .iter()
        .any(|r| r.kind == RefKind::Pull && r.pr_number == Some(5)));
}

#[tokio::test]
async fn a_sha_the_transport_cannot_deliver_fails_the_attempt() {
    let h = harness().await;
    h.remote.commit("aaa", &[], "init");
    h.remote.branch("main", "aaa");
    h.remote.drop_object("aaa");

    let err = h
        .service
        .sync_if_changed(h.repo.id)
        .await
        .expect_err("sync must fail");
    match err {
        SyncError::Shared(inner) => {
            assert!(matches!(*inner, SyncError::MissingCommit { ref sha } if sha == "aaa"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // The next trigger succeeds once the remote serves the object again.
    h.remote.restore_object("aaa");
    h.service
        .sync_if_changed(h.repo.id)
        .await
        .expect("retried sync succeeds");

    let repo = Repository::find_by_uuid(&h.service.db().conn, h.repo.id)
        .await
        .expect("query")
        .expect("repository row");
    assert_eq!(repo.local_version, repo.remote_version);
}

#[tokio::test]
async fn push_notifications_bump_and_converge() {
    let h = harness().await;
    h.remote.commit("aaa", &[], "init");
    h.remote.branch("main", "aaa");

    h.service.handle_push(h.repo.id).await.expect("push handled");

    let repo = Repository::find_by_uuid(&h.service.db().conn, h.repo.id)
        .await
        .expect("query")
        .expect("repository row");
    assert_eq!(repo.local_version, repo.remote_version);
    assert_eq!(repo.remote_version, 2);

    let head = h
        .service
        .branch_head(h.repo.id, "main")
        .await
        .expect("branch head")
        .expect("main is mirrored");
    assert_eq!(head.sha, "aaa");
}
