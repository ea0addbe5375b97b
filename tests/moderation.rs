#![cfg(feature = "inmem-store")]

#[macro_use]
mod common;

use actix_web::test::TestRequest;
use serde_json::json;
use serial_test::serial;

use common::{bearer, ctx, send, user};
use schoolboard::auth::Role;

#[actix_web::test]
#[serial]
async fn report_review_dismiss_and_delete_target() {
    let c = ctx();
    let admin = user(&c.repo, "admin", "관리자", Role::Admin).await;
    let author = user(&c.repo, "author", "작성자", Role::User).await;
    let reporter = user(&c.repo, "reporter", "신고자", Role::User).await;
    let app = app!(c.state);

    let (_, post) = send(&app, TestRequest::post().uri("/api/v1/posts").insert_header(bearer(&author)).set_json(json!({"title": "spam", "content": "buy now"})).to_request()).await;
    let post_id = post["id"].as_i64().unwrap();
    let (_, comment) = send(&app, TestRequest::post().uri("/api/v1/comments").insert_header(bearer(&author)).set_json(json!({"post_id": post_id, "content": "rude"})).to_request()).await;
    let comment_id = comment["id"].as_i64().unwrap();

    let report = |target_type: &str, target_id: i64| {
        TestRequest::post()
            .uri("/api/v1/reports")
            .insert_header(bearer(&reporter))
            .set_json(json!({"target_type": target_type, "target_id": target_id, "reason": "  광고  "}))
            .to_request()
    };
    let (status, on_post) = send(&app, report("post", post_id)).await;
    assert_eq!(status, 201);
    assert_eq!(on_post["status"], "pending");
    assert_eq!(on_post["reason"], "광고");
    let (status, _) = send(&app, report("post", post_id)).await;
    assert_eq!(status, 409);
    let (status, on_comment) = send(&app, report("comment", comment_id)).await;
    assert_eq!(status, 201);
    let (status, _) = send(&app, report("comment", 424242)).await;
    assert_eq!(status, 404);

    let (status, _) = send(&app, TestRequest::get().uri("/api/v1/admin/reports").insert_header(bearer(&reporter)).to_request()).await;
    assert_eq!(status, 403);
    let (status, pending) = send(&app, TestRequest::get().uri("/api/v1/admin/reports").insert_header(bearer(&admin)).to_request()).await;
    assert_eq!(status, 200);
    assert_eq!(pending.as_array().unwrap().len(), 2);
    assert_eq!(pending[0]["id"], on_comment["id"], "newest first");

    let cid = on_comment["id"].as_i64().unwrap();
    let (status, _) = send(&app, TestRequest::post().uri(&format!("/api/v1/admin/reports/{cid}/dismiss")).insert_header(bearer(&admin)).to_request()).await;
    assert_eq!(status, 204);
    let (_, all) = send(&app, TestRequest::get().uri("/api/v1/admin/reports?status=all").insert_header(bearer(&admin)).to_request()).await;
    assert_eq!(all.as_array().unwrap().len(), 1, "dismissed reports are removed");

    let pid = on_post["id"].as_i64().unwrap();
    let (status, reviewed) = send(&app, TestRequest::post().uri(&format!("/api/v1/admin/reports/{pid}/delete-target")).insert_header(bearer(&admin)).to_request()).await;
    assert_eq!(status, 200);
    assert_eq!(reviewed["status"], "reviewed");
    let (status, _) = send(&app, TestRequest::get().uri(&format!("/api/v1/posts/{post_id}")).to_request()).await;
    assert_eq!(status, 404);

    // target already gone: still marks the report
    let (status, _) = send(&app, TestRequest::post().uri(&format!("/api/v1/admin/reports/{pid}/delete-target")).insert_header(bearer(&admin)).to_request()).await;
    assert_eq!(status, 200);

    let (_, pending) = send(&app, TestRequest::get().uri("/api/v1/admin/reports").insert_header(bearer(&admin)).to_request()).await;
    assert!(pending.as_array().unwrap().is_empty());
    let (status, _) = send(&app, TestRequest::get().uri("/api/v1/admin/reports?status=closed").insert_header(bearer(&admin)).to_request()).await;
    assert_eq!(status, 400);
}

#[actix_web::test]
#[serial]
async fn blocked_users_cannot_write() {
    let c = ctx();
    let admin = user(&c.repo, "admin", "관리자", Role::Admin).await;
    let troll = user(&c.repo, "troll", "트롤", Role::User).await;
    let app = app!(c.state);

    let (_, post) = send(&app, TestRequest::post().uri("/api/v1/posts").insert_header(bearer(&admin)).set_json(json!({"title": "규칙", "content": "be nice"})).to_request()).await;
    let post_id = post["id"].as_i64().unwrap();

    let (status, p) = send(&app, TestRequest::post().uri("/api/v1/admin/users/block-by-email").insert_header(bearer(&admin)).set_json(json!({"email": "TROLL@sawoo.hs.kr"})).to_request()).await;
    assert_eq!(status, 200);
    assert_eq!(p["is_blocked"], true);

    let (status, body) = send(&app, TestRequest::post().uri("/api/v1/posts").insert_header(bearer(&troll)).set_json(json!({"title": "t", "content": "c"})).to_request()).await;
    assert_eq!(status, 403);
    assert_eq!(body["error"], "account is blocked");
    let (status, _) = send(&app, TestRequest::post().uri("/api/v1/comments").insert_header(bearer(&troll)).set_json(json!({"post_id": post_id, "content": "c"})).to_request()).await;
    assert_eq!(status, 403);
    let (status, _) = send(&app, TestRequest::post().uri(&format!("/api/v1/posts/{post_id}/reactions")).insert_header(bearer(&troll)).set_json(json!({"kind": "dislike"})).to_request()).await;
    assert_eq!(status, 403);
    let (status, _) = send(&app, TestRequest::post().uri(&format!("/api/v1/posts/{post_id}/scrap")).insert_header(bearer(&troll)).to_request()).await;
    assert_eq!(status, 403);
    let (status, _) = send(&app, TestRequest::post().uri("/api/v1/reports").insert_header(bearer(&troll)).set_json(json!({"target_type": "post", "target_id": post_id, "reason": "x"})).to_request()).await;
    assert_eq!(status, 403);

    // reading still works
    let (status, _) = send(&app, TestRequest::get().uri(&format!("/api/v1/posts/{post_id}")).insert_header(bearer(&troll)).to_request()).await;
    assert_eq!(status, 200);

    let (_, blocked) = send(&app, TestRequest::get().uri("/api/v1/admin/users/blocked").insert_header(bearer(&admin)).to_request()).await;
    assert_eq!(blocked[0]["id"], "troll");

    let (status, _) = send(&app, TestRequest::post().uri("/api/v1/admin/users/admin/block").insert_header(bearer(&admin)).to_request()).await;
    assert_eq!(status, 400, "admins cannot block themselves");

    let (status, p) = send(&app, TestRequest::post().uri("/api/v1/admin/users/troll/unblock").insert_header(bearer(&admin)).to_request()).await;
    assert_eq!(status, 200);
    assert_eq!(p["is_blocked"], false);
    let (status, _) = send(&app, TestRequest::post().uri("/api/v1/posts").insert_header(bearer(&troll)).set_json(json!({"title": "sorry", "content": "c"})).to_request()).await;
    assert_eq!(status, 201);

    let (status, _) = send(&app, TestRequest::post().uri("/api/v1/admin/users/troll/block").insert_header(bearer(&troll)).to_request()).await;
    assert_eq!(status, 403);
    let (status, _) = send(&app, TestRequest::post().uri("/api/v1/admin/users/nobody/block").insert_header(bearer(&admin)).to_request()).await;
    assert_eq!(status, 404);
    let (status, _) = send(&app, TestRequest::post().uri("/api/v1/admin/users/unblock-by-email").insert_header(bearer(&admin)).set_json(json!({"email": "ghost@sawoo.hs.kr"})).to_request()).await;
    assert_eq!(status, 404);
}

#[actix_web::test]
#[serial]
async fn roles_flags_and_admin_deletes() {
    let c = ctx();
    let admin = user(&c.repo, "admin", "관리자", Role::Admin).await;
    let teacher = user(&c.repo, "teacher", "선생님", Role::User).await;
    let student = user(&c.repo, "student", "학생", Role::User).await;
    let app = app!(c.state);

    let notice = json!({"title": "공지사항", "content": "시험 일정", "category": "공지"});
    let (status, _) = send(&app, TestRequest::post().uri("/api/v1/posts").insert_header(bearer(&teacher)).set_json(notice.clone()).to_request()).await;
    assert_eq!(status, 403);

    let (status, _) = send(&app, TestRequest::post().uri("/api/v1/admin/roles").insert_header(bearer(&admin)).set_json(json!({"email": "teacher@sawoo.hs.kr", "role": "superuser"})).to_request()).await;
    assert_eq!(status, 400);
    let (status, p) = send(&app, TestRequest::post().uri("/api/v1/admin/roles").insert_header(bearer(&admin)).set_json(json!({"email": "teacher@sawoo.hs.kr", "role": "Teacher"})).to_request()).await;
    assert_eq!(status, 200);
    assert_eq!(p["role"], "teacher");

    let (status, n) = send(&app, TestRequest::post().uri("/api/v1/posts").insert_header(bearer(&teacher)).set_json(notice).to_request()).await;
    assert_eq!(status, 201);
    assert_eq!(n["is_notice"], true);
    let notice_id = n["id"].as_i64().unwrap();

    let (_, s) = send(&app, TestRequest::post().uri("/api/v1/posts").insert_header(bearer(&student)).set_json(json!({"title": "newer", "content": "c"})).to_request()).await;
    let student_post = s["id"].as_i64().unwrap();

    let (status, _) = send(&app, TestRequest::patch().uri(&format!("/api/v1/admin/posts/{notice_id}")).insert_header(bearer(&teacher)).set_json(json!({"is_pinned": true})).to_request()).await;
    assert_eq!(status, 403);
    let (status, pinned) = send(&app, TestRequest::patch().uri(&format!("/api/v1/admin/posts/{notice_id}")).insert_header(bearer(&admin)).set_json(json!({"is_pinned": true})).to_request()).await;
    assert_eq!(status, 200);
    assert_eq!(pinned["is_pinned"], true);

    let (_, list) = send(&app, TestRequest::get().uri("/api/v1/posts").to_request()).await;
    assert_eq!(list[0]["id"], notice_id, "pinned posts lead the list");
    assert_eq!(list[1]["id"], student_post);

    // admin blind and un-blind
    send(&app, TestRequest::patch().uri(&format!("/api/v1/admin/posts/{student_post}")).insert_header(bearer(&admin)).set_json(json!({"is_blinded": true})).to_request()).await;
    let (_, list) = send(&app, TestRequest::get().uri("/api/v1/posts").to_request()).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    let (status, _) = send(&app, TestRequest::get().uri(&format!("/api/v1/posts/{student_post}")).insert_header(bearer(&admin)).to_request()).await;
    assert_eq!(status, 200, "admins see blinded posts");
    send(&app, TestRequest::patch().uri(&format!("/api/v1/admin/posts/{student_post}")).insert_header(bearer(&admin)).set_json(json!({"is_blinded": false})).to_request()).await;
    let (_, list) = send(&app, TestRequest::get().uri("/api/v1/posts").to_request()).await;
    assert_eq!(list.as_array().unwrap().len(), 2);

    let (_, c1) = send(&app, TestRequest::post().uri("/api/v1/comments").insert_header(bearer(&student)).set_json(json!({"post_id": notice_id, "content": "질문 있어요"})).to_request()).await;
    let cid = c1["id"].as_i64().unwrap();
    let (status, _) = send(&app, TestRequest::delete().uri(&format!("/api/v1/comments/{cid}")).insert_header(bearer(&teacher)).to_request()).await;
    assert_eq!(status, 403);
    let (status, _) = send(&app, TestRequest::delete().uri(&format!("/api/v1/comments/{cid}")).insert_header(bearer(&admin)).to_request()).await;
    assert_eq!(status, 200);
    let (status, _) = send(&app, TestRequest::delete().uri(&format!("/api/v1/posts/{student_post}")).insert_header(bearer(&admin)).to_request()).await;
    assert_eq!(status, 204);
}
