#![cfg(feature = "inmem-store")]

use schoolboard::models::*;
use schoolboard::repo::inmem::InMemRepo;
use schoolboard::repo::*;

fn new_post(title: &str, category: Category) -> NewPost {
    NewPost { title: title.into(), content: format!("{title} body"), category }
}

fn new_comment(post_id: Id, parent_id: Option<Id>) -> NewComment {
    NewComment { post_id, parent_id, content: "c".into(), is_anonymous: true }
}

async fn profile(repo: &InMemRepo, id: &str) -> Profile {
    repo.create_profile(NewProfile {
        id: id.into(),
        email: format!("{id}@sawoo.hs.kr"),
        nickname: id.into(),
        role: ProfileRole::User,
        password_hash: Some("hash".into()),
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn post_crud_and_listing() {
    let repo = InMemRepo::ephemeral();
    let a = repo.create_post("u1", new_post("alpha", Category::Free)).await.unwrap();
    let b = repo.create_post("u2", new_post("Beta", Category::Question)).await.unwrap();
    let n = repo.create_post("u1", new_post("notice", Category::Notice)).await.unwrap();
    assert!(n.is_notice);
    assert!(!a.is_notice);

    let all = repo.list_posts(&PostQuery::default()).await.unwrap();
    assert_eq!(all.iter().map(|p| p.id).collect::<Vec<_>>(), vec![n.id, b.id, a.id]);

    let q = PostQuery { q: Some("BETA".into()), ..Default::default() };
    assert_eq!(repo.list_posts(&q).await.unwrap().len(), 1);
    let q = PostQuery { category: Some("free".into()), ..Default::default() };
    assert_eq!(repo.list_posts(&q).await.unwrap()[0].id, a.id);

    let upd = repo.update_post(a.id, UpdatePost { title: Some("alpha2".into()), ..Default::default() }).await.unwrap();
    assert_eq!(upd.title, "alpha2");
    assert_eq!(upd.content, "alpha body");
    assert!(upd.updated_at >= upd.created_at);

    let mine = repo.list_posts_by_author("u1").await.unwrap();
    assert_eq!(mine.len(), 2);

    repo.delete_post(a.id).await.unwrap();
    assert!(matches!(repo.get_post(a.id).await, Err(RepoError::NotFound)));
    assert!(matches!(repo.delete_post(a.id).await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn comments_nest_one_level_and_keep_counts() {
    let repo = InMemRepo::ephemeral();
    let post = repo.create_post("author", new_post("p", Category::Free)).await.unwrap();
    let other = repo.create_post("author", new_post("q", Category::Free)).await.unwrap();

    let root = repo.create_comment("u1", new_comment(post.id, None)).await.unwrap();
    let reply = repo.create_comment("u2", new_comment(post.id, Some(root.id))).await.unwrap();
    let deep = repo.create_comment("u3", new_comment(post.id, Some(reply.id))).await.unwrap();
    assert_eq!(deep.parent_id, Some(root.id));
    assert!(matches!(
        repo.create_comment("u3", new_comment(other.id, Some(root.id))).await,
        Err(RepoError::NotFound)
    ));
    let lone = repo.create_comment("u1", new_comment(post.id, None)).await.unwrap();
    assert_eq!(lone.anonymous_number, root.anonymous_number, "same user, same post");
    assert_eq!(repo.get_post(post.id).await.unwrap().comments_count, 4);

    assert_eq!(repo.delete_comment(root.id).await.unwrap(), 3);
    assert_eq!(repo.get_post(post.id).await.unwrap().comments_count, 1);
    assert_eq!(repo.list_comments(post.id).await.unwrap().len(), 1);

    repo.delete_post(post.id).await.unwrap();
    assert!(matches!(repo.get_comment(lone.id).await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn reactions_toggle_and_blind_at_threshold() {
    let repo = InMemRepo::ephemeral();
    let post = repo.create_post("author", new_post("p", Category::Free)).await.unwrap();

    let o = repo.react(TargetType::Post, post.id, "u1", ReactionKind::Like, 3).await.unwrap();
    assert_eq!((o.reaction, o.likes_count, o.dislikes_count), (Some(ReactionKind::Like), 1, 0));
    let o = repo.react(TargetType::Post, post.id, "u1", ReactionKind::Dislike, 3).await.unwrap();
    assert_eq!((o.reaction, o.likes_count, o.dislikes_count), (Some(ReactionKind::Dislike), 0, 1));
    let o = repo.react(TargetType::Post, post.id, "u1", ReactionKind::Dislike, 3).await.unwrap();
    assert_eq!((o.reaction, o.dislikes_count), (None, 0));
    assert_eq!(repo.reaction_of(TargetType::Post, post.id, "u1").await.unwrap(), None);

    for u in ["a", "b"] {
        let o = repo.react(TargetType::Post, post.id, u, ReactionKind::Dislike, 3).await.unwrap();
        assert!(!o.is_blinded);
    }
    let o = repo.react(TargetType::Post, post.id, "c", ReactionKind::Dislike, 3).await.unwrap();
    assert!(o.is_blinded);
    assert!(repo.list_posts(&PostQuery::default()).await.unwrap().is_empty());
    assert!(repo.list_visible_posts().await.unwrap().is_empty());
    let q = PostQuery { include_blinded: true, ..Default::default() };
    assert_eq!(repo.list_posts(&q).await.unwrap().len(), 1);

    let o = repo.react(TargetType::Post, post.id, "c", ReactionKind::Dislike, 3).await.unwrap();
    assert!(o.is_blinded, "blinding is sticky");

    let comment = repo.create_comment("u1", new_comment(post.id, None)).await.unwrap();
    let o = repo.react(TargetType::Comment, comment.id, "u2", ReactionKind::Like, 3).await.unwrap();
    assert_eq!(o.likes_count, 1);
    assert_eq!(repo.get_comment(comment.id).await.unwrap().likes_count, 1);
    assert!(matches!(
        repo.react(TargetType::Comment, 9999, "u2", ReactionKind::Like, 3).await,
        Err(RepoError::NotFound)
    ));
}

#[tokio::test]
async fn scraps_toggle_and_list_newest_first() {
    let repo = InMemRepo::ephemeral();
    let p1 = repo.create_post("author", new_post("one", Category::Free)).await.unwrap();
    let p2 = repo.create_post("author", new_post("two", Category::Free)).await.unwrap();

    assert_eq!(repo.toggle_scrap(p1.id, "u").await.unwrap(), ScrapOutcome { scrapped: true, scraps_count: 1 });
    repo.toggle_scrap(p2.id, "u").await.unwrap();
    assert!(repo.is_scrapped(p1.id, "u").await.unwrap());
    let listed = repo.list_scrapped_posts("u").await.unwrap();
    assert_eq!(listed.iter().map(|p| p.id).collect::<Vec<_>>(), vec![p2.id, p1.id]);

    assert_eq!(repo.toggle_scrap(p1.id, "u").await.unwrap(), ScrapOutcome { scrapped: false, scraps_count: 0 });
    assert!(matches!(repo.toggle_scrap(9999, "u").await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn reports_reject_duplicates_while_pending() {
    let repo = InMemRepo::ephemeral();
    let post = repo.create_post("author", new_post("p", Category::Free)).await.unwrap();
    let report = NewReport { target_type: TargetType::Post, target_id: post.id, reason: "spam".into() };

    let r = repo.create_report("u", report.clone()).await.unwrap();
    assert_eq!(r.status, ReportStatus::Pending);
    assert!(matches!(repo.create_report("u", report.clone()).await, Err(RepoError::Conflict)));
    repo.create_report("v", report.clone()).await.unwrap();

    repo.set_report_status(r.id, ReportStatus::Reviewed).await.unwrap();
    repo.create_report("u", report.clone()).await.unwrap();
    assert_eq!(repo.list_reports(Some(ReportStatus::Pending)).await.unwrap().len(), 2);
    assert_eq!(repo.list_reports(None).await.unwrap().len(), 3);

    repo.delete_report(r.id).await.unwrap();
    assert!(matches!(repo.get_report(r.id).await, Err(RepoError::NotFound)));
    let missing = NewReport { target_type: TargetType::Comment, target_id: 12345, reason: "x".into() };
    assert!(matches!(repo.create_report("u", missing).await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn profiles_emails_are_unique_and_case_folded() {
    let repo = InMemRepo::ephemeral();
    let a = profile(&repo, "a").await;
    profile(&repo, "b").await;
    assert_eq!(repo.get_profile_by_email("A@SAWOO.HS.KR").await.unwrap().id, a.id);

    let dup = NewProfile { id: "c".into(), email: "A@sawoo.hs.kr".into(), nickname: "c".into(), role: ProfileRole::User, password_hash: None };
    assert!(matches!(repo.create_profile(dup).await, Err(RepoError::Conflict)));
    let clash = UpdateProfile { email: Some("b@sawoo.hs.kr".into()), ..Default::default() };
    assert!(matches!(repo.update_profile("a", clash).await, Err(RepoError::Conflict)));

    let creds = repo.credentials_by_email("a@sawoo.hs.kr").await.unwrap();
    assert_eq!(creds.password_hash, "hash");

    repo.set_blocked("b", true).await.unwrap();
    assert_eq!(repo.list_blocked().await.unwrap().iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), vec!["b"]);
    assert_eq!(repo.set_role("a", ProfileRole::Admin).await.unwrap().role, ProfileRole::Admin);
    assert!(matches!(repo.set_blocked("zz", true).await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let post_id = {
        let repo = InMemRepo::with_snapshot(&path);
        profile(&repo, "keeper").await;
        let post = repo.create_post("keeper", new_post("persisted", Category::Info)).await.unwrap();
        repo.react(TargetType::Post, post.id, "x", ReactionKind::Like, 10).await.unwrap();
        post.id
    };
    let repo = InMemRepo::with_snapshot(&path);
    let post = repo.get_post(post_id).await.unwrap();
    assert_eq!(post.title, "persisted");
    assert_eq!(post.likes_count, 1);
    assert_eq!(post.author_id, "keeper");
    assert_eq!(repo.reaction_of(TargetType::Post, post_id, "x").await.unwrap(), Some(ReactionKind::Like));
    assert!(repo.credentials_by_email("keeper@sawoo.hs.kr").await.is_ok());
    // ids keep increasing after reload
    let next = repo.create_post("keeper", new_post("later", Category::Free)).await.unwrap();
    assert!(next.id > post_id);
}

#[test]
fn concurrent_writers_leave_a_readable_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let repo = InMemRepo::with_snapshot(&path);
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    rt.block_on(async {
        for i in 0..100 {
            repo.create_post("seed", new_post(&format!("seed {i}"), Category::Free)).await.unwrap();
        }
    });

    let workers: Vec<_> = (0..8)
        .map(|w| {
            let repo = repo.clone();
            std::thread::spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
                rt.block_on(async {
                    for i in 0..15 {
                        let p = repo.create_post("w", new_post(&format!("w{w} {i}"), Category::Free)).await.unwrap();
                        if i % 2 == 0 {
                            repo.delete_post(p.id).await.unwrap();
                        }
                    }
                })
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    let bytes = std::fs::read(&path).unwrap();
    assert!(serde_json::from_slice::<serde_json::Value>(&bytes).is_ok(), "snapshot must be complete JSON");
    let reloaded = InMemRepo::with_snapshot(&path);
    let q = PostQuery { per_page: Some(50), page: Some(1), ..Default::default() };
    let live = rt.block_on(reloaded.list_posts_by_author("w")).unwrap();
    assert_eq!(live.len(), 8 * 7);
    assert!(!rt.block_on(reloaded.list_posts(&q)).unwrap().is_empty());
}

#[tokio::test]
async fn unreadable_snapshot_is_moved_aside() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, b"{\"posts\": {").unwrap();

    let repo = InMemRepo::with_snapshot(&path);
    assert!(repo.list_posts(&PostQuery::default()).await.unwrap().is_empty());
    let kept: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("state.json.corrupt-"))
        .collect();
    assert_eq!(kept.len(), 1);
    let aside = std::fs::read(dir.path().join(&kept[0])).unwrap();
    assert_eq!(aside, b"{\"posts\": {");

    repo.create_post("u", new_post("fresh", Category::Free)).await.unwrap();
    assert_eq!(std::fs::read(dir.path().join(&kept[0])).unwrap(), b"{\"posts\": {");
}

#[tokio::test]
async fn unknown_category_filter_is_invalid() {
    let repo = InMemRepo::ephemeral();
    let q = PostQuery { category: Some("잡담".into()), ..Default::default() };
    assert!(matches!(repo.list_posts(&q).await, Err(RepoError::Invalid(_))));
}
