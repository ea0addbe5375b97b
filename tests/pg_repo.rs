#![cfg(feature = "postgres-store")]

use schoolboard::models::*;
use schoolboard::repo::pg::PgRepo;
use schoolboard::repo::*;
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;

async fn repo() -> Option<PgRepo> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(u) => u,
        Err(_) => {
            eprintln!("skipping: DATABASE_URL not set");
            return None;
        }
    };
    let pool = PgPoolOptions::new().max_connections(2).connect(&url).await.ok()?;
    let repo = PgRepo::new(pool);
    repo.migrate().await.ok()?;
    Some(repo)
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

#[tokio::test]
#[serial]
async fn pg_post_comment_reaction_cycle() {
    let Some(repo) = repo().await else { return };
    let author = unique("author");
    repo.create_profile(NewProfile {
        id: author.clone(),
        email: format!("{author}@sawoo.hs.kr"),
        nickname: "pg".into(),
        role: ProfileRole::User,
        password_hash: None,
    })
    .await
    .unwrap();

    let post = repo
        .create_post(&author, NewPost { title: "pg post".into(), content: "body".into(), category: Category::Info })
        .await
        .unwrap();
    let root = repo
        .create_comment(&author, NewComment { post_id: post.id, parent_id: None, content: "root".into(), is_anonymous: true })
        .await
        .unwrap();
    let deep = repo
        .create_comment(&author, NewComment { post_id: post.id, parent_id: Some(root.id), content: "reply".into(), is_anonymous: false })
        .await
        .unwrap();
    assert_eq!(deep.parent_id, Some(root.id));
    assert_eq!(repo.get_post(post.id).await.unwrap().comments_count, 2);

    let voter = unique("voter");
    let o = repo.react(TargetType::Post, post.id, &voter, ReactionKind::Dislike, 1).await.unwrap();
    assert_eq!(o.dislikes_count, 1);
    assert!(o.is_blinded);
    let o = repo.react(TargetType::Post, post.id, &voter, ReactionKind::Like, 1).await.unwrap();
    assert_eq!((o.likes_count, o.dislikes_count, o.is_blinded), (1, 0, true));

    let s = repo.toggle_scrap(post.id, &voter).await.unwrap();
    assert!(s.scrapped);
    assert_eq!(repo.list_scrapped_posts(&voter).await.unwrap()[0].id, post.id);

    let report = NewReport { target_type: TargetType::Comment, target_id: root.id, reason: "x".into() };
    repo.create_report(&voter, report.clone()).await.unwrap();
    assert!(matches!(repo.create_report(&voter, report).await, Err(RepoError::Conflict)));

    let q = PostQuery { category: Some("잡담".into()), ..Default::default() };
    assert!(matches!(repo.list_posts(&q).await, Err(RepoError::Invalid(_))));

    assert_eq!(repo.delete_comment(root.id).await.unwrap(), 2);
    assert_eq!(repo.get_post(post.id).await.unwrap().comments_count, 0);
    repo.delete_post(post.id).await.unwrap();
    assert!(matches!(repo.get_post(post.id).await, Err(RepoError::NotFound)));
}
