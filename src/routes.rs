use std::collections::HashMap;
use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{create_jwt, hash_password, verify_password, Auth, Role, PASSWORD_MIN_LEN};
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::models::*;
use crate::rate_limit::{Action, RateLimiterFacade};
use crate::ranking::{trending, DEFAULT_TRENDING_LIMIT};
use crate::repo::{Repo, RepoError};
use crate::school::validate_school_email;
use crate::storage::{sniff_mime, ImageStore, ImageStoreError};
use crate::views::{comment_tree, CommentView, MyCommentView, PostView, TreeContext};

pub const AVATAR_SIZE_LIMIT: usize = 5 * 1024 * 1024;
pub const NICKNAME_MIN: usize = 2;
pub const NICKNAME_MAX: usize = 20;
const TRENDING_MAX: usize = 20;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::resource("/posts")
                    .route(web::get().to(list_posts))
                    .route(web::post().to(create_post)),
            )
            // before /posts/{id}
            .service(web::resource("/posts/trending").route(web::get().to(trending_posts)))
            .service(
                web::resource("/posts/{id}")
                    .route(web::get().to(get_post))
                    .route(web::patch().to(update_post))
                    .route(web::delete().to(delete_post)),
            )
            .service(web::resource("/posts/{id}/comments").route(web::get().to(list_comments)))
            .service(web::resource("/posts/{id}/reactions").route(web::post().to(react_to_post)))
            .service(web::resource("/posts/{id}/scrap").route(web::post().to(toggle_scrap)))
            .service(web::resource("/comments").route(web::post().to(create_comment)))
            .service(
                web::resource("/comments/{id}")
                    .route(web::patch().to(update_comment))
                    .route(web::delete().to(delete_comment)),
            )
            .service(web::resource("/comments/{id}/reactions").route(web::post().to(react_to_comment)))
            .service(web::resource("/reports").route(web::post().to(create_report)))
            .service(web::resource("/auth/signup").route(web::post().to(signup)))
            .service(web::resource("/auth/login").route(web::post().to(login)))
            .service(web::resource("/auth/refresh").route(web::post().to(refresh_token)))
            .service(web::resource("/auth/me").route(web::get().to(auth_me)))
            .service(web::resource("/me/posts").route(web::get().to(my_posts)))
            .service(web::resource("/me/comments").route(web::get().to(my_comments)))
            .service(web::resource("/me/scraps").route(web::get().to(my_scraps)))
            .service(web::resource("/me/activity").route(web::get().to(my_activity)))
            .service(web::resource("/me/nickname").route(web::patch().to(change_nickname)))
            .service(web::resource("/me/password").route(web::post().to(change_password)))
            .service(web::resource("/me/email").route(web::post().to(change_email)))
            .service(web::resource("/me/avatar").route(web::post().to(upload_avatar)))
            // Admin moderation endpoints
            .service(web::resource("/admin/reports").route(web::get().to(admin_list_reports)))
            .service(web::resource("/admin/reports/{id}/dismiss").route(web::post().to(admin_dismiss_report)))
            .service(
                web::resource("/admin/reports/{id}/delete-target")
                    .route(web::post().to(admin_delete_report_target)),
            )
            .service(web::resource("/admin/users/blocked").route(web::get().to(admin_list_blocked)))
            .service(web::resource("/admin/users/block-by-email").route(web::post().to(admin_block_by_email)))
            .service(web::resource("/admin/users/unblock-by-email").route(web::post().to(admin_unblock_by_email)))
            .service(web::resource("/admin/users/{id}/block").route(web::post().to(admin_block_user)))
            .service(web::resource("/admin/users/{id}/unblock").route(web::post().to(admin_unblock_user)))
            .service(web::resource("/admin/roles").route(web::post().to(admin_set_role)))
            .service(web::resource("/admin/posts/{id}").route(web::patch().to(admin_set_post_flags))),
    );
    // outside the API scope so <img src="/images/{hash}"> works
    cfg.route("/images/{hash}", web::get().to(get_image));
    cfg.route("/healthz", web::get().to(healthz));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub image_store: Arc<dyn ImageStore>,
    pub rate_limiter: Option<RateLimiterFacade>,
    pub config: AppConfig,
}

// ---------------------------------------------------------------- helpers

fn bad(msg: impl Into<String>) -> ApiError {
    ApiError::BadRequest(msg.into())
}

fn throttle(data: &AppState, action: Action, user_id: &str) -> Result<(), ApiError> {
    match &data.rate_limiter {
        Some(rl) if !rl.allow(action, user_id) => Err(ApiError::RateLimited),
        _ => Ok(()),
    }
}

fn clean_nickname(raw: &str) -> Result<String, ApiError> {
    let n = raw.trim();
    let len = n.chars().count();
    if !(NICKNAME_MIN..=NICKNAME_MAX).contains(&len) {
        return Err(bad(format!("nickname must be {NICKNAME_MIN} to {NICKNAME_MAX} characters")));
    }
    Ok(n.to_string())
}

fn check_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(bad(format!("password must be at least {PASSWORD_MIN_LEN} characters")));
    }
    Ok(())
}

fn check_school_email(data: &AppState, email: &str) -> Result<String, ApiError> {
    let email = email.trim().to_lowercase();
    if !validate_school_email(&email, &data.config.school_domains) {
        return Err(bad("a school email address is required"));
    }
    Ok(email)
}

fn issue_token(profile: &Profile) -> Result<String, ApiError> {
    create_jwt(&profile.id, &profile.email, vec![profile.role]).map_err(|e| {
        tracing::error!("token issue failed: {e}");
        ApiError::Internal
    })
}

/// Profile behind the token. Tokens minted elsewhere with the shared secret
/// get a profile on first use, provided they carry a school email.
async fn current_profile(data: &AppState, auth: &Auth) -> Result<Profile, ApiError> {
    match data.repo.get_profile(auth.user_id()).await {
        Ok(p) => Ok(p),
        Err(RepoError::NotFound) => {
            let email = auth.0.email.as_deref().ok_or(ApiError::Unauthorized)?;
            let email = check_school_email(data, email).map_err(|_| ApiError::Forbidden)?;
            let nickname: String = email.split('@').next().unwrap_or_default().chars().take(NICKNAME_MAX).collect();
            let profile = data
                .repo
                .create_profile(NewProfile {
                    id: auth.user_id().to_string(),
                    email,
                    nickname,
                    role: Role::User,
                    password_hash: None,
                })
                .await?;
            tracing::info!(user = %profile.id, "profile created from external token");
            Ok(profile)
        }
        Err(e) => Err(e.into()),
    }
}

/// Profile allowed to write: blocked accounts are refused.
async fn writer(data: &AppState, auth: &Auth) -> Result<Profile, ApiError> {
    let p = current_profile(data, auth).await?;
    if p.is_blocked {
        return Err(ApiError::Blocked);
    }
    Ok(p)
}

async fn admin(data: &AppState, auth: &Auth) -> Result<Profile, ApiError> {
    let p = current_profile(data, auth).await?;
    if p.role != Role::Admin {
        return Err(ApiError::Forbidden);
    }
    Ok(p)
}

/// Best-effort viewer lookup for public endpoints.
async fn viewer(data: &AppState, auth: &Option<Auth>) -> Option<Profile> {
    let auth = auth.as_ref()?;
    data.repo.get_profile(auth.user_id()).await.ok()
}

fn can_see(post: &Post, viewer: Option<&Profile>) -> bool {
    !post.is_blinded || viewer.map(|v| v.role == Role::Admin || v.id == post.author_id).unwrap_or(false)
}

/// Only staff may file posts under the notice category.
fn check_category(category: Category, author: &Profile) -> Result<(), ApiError> {
    if category == Category::Notice && author.role == Role::User {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

/// Resolves the post a target hangs off and hides it like `GET /posts/{id}` does.
async fn visible_target(data: &AppState, me: &Profile, target: TargetType, id: Id) -> Result<Post, ApiError> {
    let post_id = match target {
        TargetType::Post => id,
        TargetType::Comment => data.repo.get_comment(id).await?.post_id,
    };
    let post = data.repo.get_post(post_id).await?;
    if !can_see(&post, Some(me)) {
        return Err(ApiError::NotFound);
    }
    Ok(post)
}

async fn post_view_for(data: &AppState, post: Post, viewer: Option<&str>) -> Result<PostView, ApiError> {
    let view = PostView::new(post, viewer);
    let Some(uid) = viewer else { return Ok(view) };
    let reaction = data.repo.reaction_of(TargetType::Post, view.id, uid).await?;
    let scrapped = data.repo.is_scrapped(view.id, uid).await?;
    Ok(view.with_viewer_state(reaction, scrapped))
}

// ---------------------------------------------------------------- posts

#[utoipa::path(
    get,
    path = "/api/v1/posts",
    params(PostQuery),
    responses(
        (status = 200, description = "Page of visible posts", body = [PostView]),
        (status = 400, description = "Unknown category")
    )
)]
pub async fn list_posts(auth: Option<Auth>, data: web::Data<AppState>, query: web::Query<PostQuery>) -> Result<HttpResponse, ApiError> {
    let mut query = query.into_inner();
    query.category_filter().map_err(bad)?;
    query.include_blinded = false;
    let viewer = auth.as_ref().map(|a| a.user_id());
    let posts = data.repo.list_posts(&query).await?;
    let views: Vec<PostView> = posts.into_iter().map(|p| PostView::new(p, viewer)).collect();
    Ok(HttpResponse::Ok().json(views))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TrendingQuery {
    /// How many posts to return (default 3).
    pub limit: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/trending",
    params(TrendingQuery),
    responses((status = 200, description = "Most popular visible posts", body = [PostView]))
)]
pub async fn trending_posts(auth: Option<Auth>, data: web::Data<AppState>, query: web::Query<TrendingQuery>) -> Result<HttpResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_TRENDING_LIMIT).clamp(1, TRENDING_MAX);
    let viewer = auth.as_ref().map(|a| a.user_id());
    let posts = data.repo.list_visible_posts().await?;
    let views: Vec<PostView> = trending(posts, chrono::Utc::now(), limit)
        .into_iter()
        .map(|p| PostView::new(p, viewer))
        .collect();
    Ok(HttpResponse::Ok().json(views))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post", body = PostView),
        (status = 404, description = "Post not found or blinded")
    )
)]
pub async fn get_post(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    let viewer = viewer(&data, &auth).await;
    if !can_see(&post, viewer.as_ref()) {
        return Err(ApiError::NotFound);
    }
    let uid = auth.as_ref().map(|a| a.user_id());
    Ok(HttpResponse::Ok().json(post_view_for(&data, post, uid).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts",
    request_body = NewPost,
    responses(
        (status = 201, description = "Post created", body = PostView),
        (status = 400, description = "Invalid title or content"),
        (status = 403, description = "Blocked, or notice category without staff role"),
        (status = 429, description = "Too many posts")
    )
)]
pub async fn create_post(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewPost>) -> Result<HttpResponse, ApiError> {
    let me = writer(&data, &auth).await?;
    let new = payload.into_inner();
    check_category(new.category, &me)?;
    let new = NewPost {
        title: clean_text(&new.title, "title", TITLE_MAX).map_err(bad)?,
        content: clean_text(&new.content, "content", POST_CONTENT_MAX).map_err(bad)?,
        category: new.category,
    };
    throttle(&data, Action::Post, &me.id)?;
    let post = data.repo.create_post(&me.id, new).await?;
    tracing::info!(post = post.id, category = %post.category, "post created");
    Ok(HttpResponse::Created().json(PostView::new(post, Some(&me.id))))
}

#[utoipa::path(
    patch,
    path = "/api/v1/posts/{id}",
    request_body = UpdatePost,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post updated", body = PostView),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn update_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdatePost>,
) -> Result<HttpResponse, ApiError> {
    let me = writer(&data, &auth).await?;
    let post = data.repo.get_post(path.into_inner()).await?;
    if post.author_id != me.id {
        return Err(ApiError::Forbidden);
    }
    let upd = payload.into_inner();
    if let Some(c) = upd.category {
        check_category(c, &me)?;
    }
    let upd = UpdatePost {
        title: upd.title.map(|t| clean_text(&t, "title", TITLE_MAX)).transpose().map_err(bad)?,
        content: upd.content.map(|c| clean_text(&c, "content", POST_CONTENT_MAX)).transpose().map_err(bad)?,
        category: upd.category,
    };
    let post = data.repo.update_post(post.id, upd).await?;
    Ok(HttpResponse::Ok().json(post_view_for(&data, post, Some(&me.id)).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 204, description = "Post deleted with its comments"),
        (status = 403, description = "Neither author nor admin"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn delete_post(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let me = writer(&data, &auth).await?;
    let post = data.repo.get_post(path.into_inner()).await?;
    if post.author_id != me.id && me.role != Role::Admin {
        return Err(ApiError::Forbidden);
    }
    data.repo.delete_post(post.id).await?;
    tracing::info!(post = post.id, by = %me.id, "post deleted");
    Ok(HttpResponse::NoContent().finish())
}

// ---------------------------------------------------------------- comments

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}/comments",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Ranked comments with nested replies", body = [CommentView]),
        (status = 404, description = "Post not found or blinded")
    )
)]
pub async fn list_comments(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    let viewer = viewer(&data, &auth).await;
    if !can_see(&post, viewer.as_ref()) {
        return Err(ApiError::NotFound);
    }
    let comments = data.repo.list_comments(post.id).await?;

    let mut nicknames: HashMap<UserId, String> = HashMap::new();
    for c in comments.iter().filter(|c| !c.is_anonymous) {
        if nicknames.contains_key(&c.author_id) {
            continue;
        }
        if let Ok(p) = data.repo.get_profile(&c.author_id).await {
            nicknames.insert(c.author_id.clone(), p.nickname);
        }
    }
    let uid = auth.as_ref().map(|a| a.user_id());
    let mut reactions: HashMap<Id, ReactionKind> = HashMap::new();
    if let Some(uid) = uid {
        for c in &comments {
            if let Some(k) = data.repo.reaction_of(TargetType::Comment, c.id, uid).await? {
                reactions.insert(c.id, k);
            }
        }
    }
    let ctx = TreeContext { nicknames: &nicknames, reactions: &reactions, viewer: uid, now: chrono::Utc::now() };
    Ok(HttpResponse::Ok().json(comment_tree(comments, &ctx)))
}

#[utoipa::path(
    post,
    path = "/api/v1/comments",
    request_body = NewComment,
    responses(
        (status = 201, description = "Comment created", body = CommentView),
        (status = 400, description = "Invalid content"),
        (status = 404, description = "Post or parent comment not found"),
        (status = 429, description = "Too many comments")
    )
)]
pub async fn create_comment(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewComment>) -> Result<HttpResponse, ApiError> {
    let me = writer(&data, &auth).await?;
    let mut new = payload.into_inner();
    new.content = clean_text(&new.content, "content", COMMENT_CONTENT_MAX).map_err(bad)?;
    let post = data.repo.get_post(new.post_id).await?;
    if !can_see(&post, Some(&me)) {
        return Err(ApiError::NotFound);
    }
    throttle(&data, Action::Comment, &me.id)?;
    let comment = data.repo.create_comment(&me.id, new).await?;
    Ok(HttpResponse::Created().json(CommentView::new(comment, Some(&me.nickname), Some(&me.id))))
}

#[utoipa::path(
    patch,
    path = "/api/v1/comments/{id}",
    request_body = UpdateComment,
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Comment updated", body = CommentView),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn update_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateComment>,
) -> Result<HttpResponse, ApiError> {
    let me = writer(&data, &auth).await?;
    let comment = data.repo.get_comment(path.into_inner()).await?;
    if comment.author_id != me.id {
        return Err(ApiError::Forbidden);
    }
    let content = clean_text(&payload.content, "content", COMMENT_CONTENT_MAX).map_err(bad)?;
    let updated = data.repo.update_comment(comment.id, content).await?;
    Ok(HttpResponse::Ok().json(CommentView::new(updated, Some(&me.nickname), Some(&me.id))))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeletedResponse {
    pub deleted: usize,
}

#[utoipa::path(
    delete,
    path = "/api/v1/comments/{id}",
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Comment and its replies removed", body = DeletedResponse),
        (status = 403, description = "Neither author nor admin"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn delete_comment(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let me = writer(&data, &auth).await?;
    let comment = data.repo.get_comment(path.into_inner()).await?;
    if comment.author_id != me.id && me.role != Role::Admin {
        return Err(ApiError::Forbidden);
    }
    let deleted = data.repo.delete_comment(comment.id).await?;
    Ok(HttpResponse::Ok().json(DeletedResponse { deleted }))
}

// ---------------------------------------------------------------- reactions & scraps

async fn react(data: &AppState, auth: &Auth, target: TargetType, id: Id, kind: ReactionKind) -> Result<ReactionOutcome, ApiError> {
    let me = writer(data, auth).await?;
    visible_target(data, &me, target, id).await?;
    let threshold = data.config.blind_threshold;
    let outcome = data.repo.react(target, id, &me.id, kind, threshold).await?;
    if target == TargetType::Post && kind == ReactionKind::Dislike && outcome.is_blinded && outcome.dislikes_count == threshold {
        tracing::warn!(post = id, dislikes = outcome.dislikes_count, "post blinded by dislikes");
    }
    Ok(outcome)
}

#[utoipa::path(
    post,
    path = "/api/v1/posts/{id}/reactions",
    request_body = ReactionRequest,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Reaction toggled", body = ReactionOutcome),
        (status = 403, description = "Blocked"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn react_to_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ReactionRequest>,
) -> Result<HttpResponse, ApiError> {
    let outcome = react(&data, &auth, TargetType::Post, path.into_inner(), payload.kind).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[utoipa::path(
    post,
    path = "/api/v1/comments/{id}/reactions",
    request_body = ReactionRequest,
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Reaction toggled", body = ReactionOutcome),
        (status = 403, description = "Blocked"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn react_to_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ReactionRequest>,
) -> Result<HttpResponse, ApiError> {
    let outcome = react(&data, &auth, TargetType::Comment, path.into_inner(), payload.kind).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts/{id}/scrap",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Scrap toggled", body = ScrapOutcome),
        (status = 404, description = "Post not found")
    )
)]
pub async fn toggle_scrap(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let me = writer(&data, &auth).await?;
    let post = visible_target(&data, &me, TargetType::Post, path.into_inner()).await?;
    let outcome = data.repo.toggle_scrap(post.id, &me.id).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

// ---------------------------------------------------------------- reports

#[utoipa::path(
    post,
    path = "/api/v1/reports",
    request_body = NewReport,
    responses(
        (status = 201, description = "Report filed", body = Report),
        (status = 404, description = "Target not found"),
        (status = 409, description = "Already reported and pending"),
        (status = 429, description = "Too many reports")
    )
)]
pub async fn create_report(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewReport>) -> Result<HttpResponse, ApiError> {
    let me = writer(&data, &auth).await?;
    let mut new = payload.into_inner();
    new.reason = clean_text(&new.reason, "reason", REPORT_REASON_MAX).map_err(bad)?;
    visible_target(&data, &me, new.target_type, new.target_id).await?;
    throttle(&data, Action::Report, &me.id)?;
    let report = data.repo.create_report(&me.id, new).await?;
    tracing::info!(report = report.id, target = report.target_id, kind = report.target_type.as_str(), "report filed");
    Ok(HttpResponse::Created().json(report))
}

// ---------------------------------------------------------------- accounts

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub nickname: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub profile: Profile,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn signup(data: web::Data<AppState>, payload: web::Json<SignupRequest>) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    let email = check_school_email(&data, &req.email)?;
    if req.password != req.confirm_password {
        return Err(bad("passwords do not match"));
    }
    check_password(&req.password)?;
    let nickname = clean_nickname(&req.nickname)?;
    let password_hash = hash_password(&req.password).map_err(|e| {
        tracing::error!("{e}");
        ApiError::Internal
    })?;
    let profile = data
        .repo
        .create_profile(NewProfile {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            nickname,
            role: Role::User,
            password_hash: Some(password_hash),
        })
        .await?;
    tracing::info!(user = %profile.id, "account created");
    let token = issue_token(&profile)?;
    Ok(HttpResponse::Created().json(AuthResponse { token, profile }))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Wrong email or password")
    )
)]
pub async fn login(data: web::Data<AppState>, payload: web::Json<LoginRequest>) -> Result<HttpResponse, ApiError> {
    let creds = match data.repo.credentials_by_email(&payload.email).await {
        Ok(c) => c,
        Err(RepoError::NotFound) => return Err(ApiError::Unauthorized),
        Err(e) => return Err(e.into()),
    };
    let ok = verify_password(&payload.password, &creds.password_hash).map_err(|e| {
        tracing::error!(user = %creds.user_id, "unreadable password hash: {e}");
        ApiError::Internal
    })?;
    if !ok {
        return Err(ApiError::Unauthorized);
    }
    let profile = data.repo.get_profile(&creds.user_id).await?;
    let token = issue_token(&profile)?;
    Ok(HttpResponse::Ok().json(AuthResponse { token, profile }))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    responses(
        (status = 200, description = "Token refreshed", body = AuthResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn refresh_token(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let profile = current_profile(&data, &auth).await?;
    let token = issue_token(&profile)?;
    Ok(HttpResponse::Ok().json(AuthResponse { token, profile }))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current profile", body = Profile),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn auth_me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(current_profile(&data, &auth).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/me/posts",
    responses((status = 200, description = "Own posts, blinded included", body = [PostView]))
)]
pub async fn my_posts(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let me = current_profile(&data, &auth).await?;
    let posts = data.repo.list_posts_by_author(&me.id).await?;
    let views: Vec<PostView> = posts.into_iter().map(|p| PostView::new(p, Some(&me.id))).collect();
    Ok(HttpResponse::Ok().json(views))
}

#[utoipa::path(
    get,
    path = "/api/v1/me/comments",
    responses((status = 200, description = "Own comments, newest first", body = [MyCommentView]))
)]
pub async fn my_comments(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let me = current_profile(&data, &auth).await?;
    let comments = data.repo.list_comments_by_author(&me.id).await?;
    let mut titles: HashMap<Id, Option<String>> = HashMap::new();
    let mut views = Vec::with_capacity(comments.len());
    for c in comments {
        if !titles.contains_key(&c.post_id) {
            let title = data.repo.get_post(c.post_id).await.ok().map(|p| p.title);
            titles.insert(c.post_id, title);
        }
        let title = titles.get(&c.post_id).cloned().flatten();
        views.push(MyCommentView::new(c, title));
    }
    Ok(HttpResponse::Ok().json(views))
}

#[utoipa::path(
    get,
    path = "/api/v1/me/scraps",
    responses((status = 200, description = "Scrapped posts, most recent scrap first", body = [PostView]))
)]
pub async fn my_scraps(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let me = current_profile(&data, &auth).await?;
    let posts = data.repo.list_scrapped_posts(&me.id).await?;
    let views: Vec<PostView> = posts
        .into_iter()
        .filter(|p| can_see(p, Some(&me)))
        .map(|p| PostView::new(p, Some(&me.id)).with_viewer_state(None, true))
        .collect();
    Ok(HttpResponse::Ok().json(views))
}

#[utoipa::path(
    get,
    path = "/api/v1/me/activity",
    responses((status = 200, description = "Activity counters", body = ActivitySummary))
)]
pub async fn my_activity(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let me = current_profile(&data, &auth).await?;
    let posts = data.repo.list_posts_by_author(&me.id).await?;
    let comments = data.repo.list_comments_by_author(&me.id).await?;
    let scraps = data.repo.list_scrapped_posts(&me.id).await?;
    let summary = ActivitySummary {
        posts: posts.len(),
        comments: comments.len(),
        scraps: scraps.len(),
        likes_received: posts.iter().map(|p| p.likes_count).sum(),
    };
    Ok(HttpResponse::Ok().json(summary))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NicknameRequest {
    pub nickname: String,
}

#[utoipa::path(
    patch,
    path = "/api/v1/me/nickname",
    request_body = NicknameRequest,
    responses(
        (status = 200, description = "Nickname changed", body = Profile),
        (status = 400, description = "Nickname must be 2 to 20 characters")
    )
)]
pub async fn change_nickname(auth: Auth, data: web::Data<AppState>, payload: web::Json<NicknameRequest>) -> Result<HttpResponse, ApiError> {
    let me = current_profile(&data, &auth).await?;
    let nickname = clean_nickname(&payload.nickname)?;
    let profile = data
        .repo
        .update_profile(&me.id, UpdateProfile { nickname: Some(nickname), ..Default::default() })
        .await?;
    Ok(HttpResponse::Ok().json(profile))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PasswordChangeRequest {
    pub current_password: String,
    pub new_password: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/me/password",
    request_body = PasswordChangeRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Current password wrong or new password too short")
    )
)]
pub async fn change_password(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<PasswordChangeRequest>,
) -> Result<HttpResponse, ApiError> {
    let me = current_profile(&data, &auth).await?;
    check_password(&payload.new_password)?;
    let creds = match data.repo.credentials_by_email(&me.email).await {
        Ok(c) => c,
        Err(RepoError::NotFound) => return Err(bad("account has no local password")),
        Err(e) => return Err(e.into()),
    };
    let matches = verify_password(&payload.current_password, &creds.password_hash).map_err(|_| ApiError::Internal)?;
    if !matches {
        return Err(bad("current password is incorrect"));
    }
    let password_hash = hash_password(&payload.new_password).map_err(|_| ApiError::Internal)?;
    data.repo
        .update_profile(&me.id, UpdateProfile { password_hash: Some(password_hash), ..Default::default() })
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EmailRequest {
    pub email: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/me/email",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Email changed; token reissued", body = AuthResponse),
        (status = 400, description = "Not a school address"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn change_email(auth: Auth, data: web::Data<AppState>, payload: web::Json<EmailRequest>) -> Result<HttpResponse, ApiError> {
    let me = current_profile(&data, &auth).await?;
    let email = check_school_email(&data, &payload.email)?;
    let profile = data
        .repo
        .update_profile(&me.id, UpdateProfile { email: Some(email), ..Default::default() })
        .await?;
    let token = issue_token(&profile)?;
    Ok(HttpResponse::Ok().json(AuthResponse { token, profile }))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AvatarResponse {
    pub hash: String,
    pub mime: String,
    pub size: usize,
    pub duplicate: bool,
}

#[utoipa::path(
    post,
    path = "/api/v1/me/avatar",
    request_body(content = String, description = "multipart/form-data with a `file` field", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Avatar stored", body = AvatarResponse),
        (status = 413, description = "Larger than 5 MiB"),
        (status = 415, description = "Not an image")
    )
)]
pub async fn upload_avatar(auth: Auth, data: web::Data<AppState>, mut payload: Multipart) -> Result<HttpResponse, ApiError> {
    let me = writer(&data, &auth).await?;
    throttle(&data, Action::Avatar, &me.id)?;
    while let Some(field) = payload.try_next().await.map_err(|e| {
        log::warn!("multipart error: {e}");
        bad("malformed multipart body")
    })? {
        if field.content_disposition().get_name() != Some("file") {
            continue;
        }
        let mut field_stream = field;
        let mut bytes: Vec<u8> = Vec::new();
        let mut hasher = Sha256::new();
        while let Some(chunk) = field_stream.try_next().await.map_err(|e| {
            log::warn!("stream read error: {e}");
            bad("malformed multipart body")
        })? {
            if bytes.len() + chunk.len() > AVATAR_SIZE_LIMIT {
                return Err(ApiError::PayloadTooLarge);
            }
            hasher.update(&chunk);
            bytes.extend_from_slice(&chunk);
        }
        let hash = format!("{:x}", hasher.finalize());
        let mime = sniff_mime(&bytes);
        if !mime.starts_with("image/") {
            return Err(ApiError::UnsupportedMediaType);
        }
        let duplicate = match data.image_store.save(&hash, &mime, &bytes).await {
            Ok(()) => false,
            Err(ImageStoreError::Duplicate) => true,
            Err(e) => {
                log::error!("image_store save error: {e}");
                return Err(ApiError::Internal);
            }
        };
        data.repo
            .update_profile(&me.id, UpdateProfile { avatar_hash: Some(hash.clone()), ..Default::default() })
            .await?;
        return Ok(HttpResponse::Ok().json(AvatarResponse { hash, mime, size: bytes.len(), duplicate }));
    }
    Err(bad("missing `file` field"))
}

// ---------------------------------------------------------------- admin

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReportListQuery {
    /// `pending` (default), `reviewed`, `resolved` or `all`.
    pub status: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/reports",
    params(ReportListQuery),
    responses(
        (status = 200, description = "Reports, newest first", body = [Report]),
        (status = 403, description = "Admins only")
    )
)]
pub async fn admin_list_reports(auth: Auth, data: web::Data<AppState>, query: web::Query<ReportListQuery>) -> Result<HttpResponse, ApiError> {
    admin(&data, &auth).await?;
    let status = match query.status.as_deref() {
        None | Some("") => Some(ReportStatus::Pending),
        Some("all") => None,
        Some(s) => Some(s.parse::<ReportStatus>().map_err(bad)?),
    };
    Ok(HttpResponse::Ok().json(data.repo.list_reports(status).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/reports/{id}/dismiss",
    params(("id" = Id, Path, description = "Report id")),
    responses(
        (status = 204, description = "Report dismissed and removed"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Report not found")
    )
)]
pub async fn admin_dismiss_report(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let me = admin(&data, &auth).await?;
    let id = path.into_inner();
    data.repo.set_report_status(id, ReportStatus::Reviewed).await?;
    data.repo.delete_report(id).await?;
    tracing::info!(report = id, by = %me.id, "report dismissed");
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/reports/{id}/delete-target",
    params(("id" = Id, Path, description = "Report id")),
    responses(
        (status = 200, description = "Target removed, report marked reviewed", body = Report),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Report not found")
    )
)]
pub async fn admin_delete_report_target(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let me = admin(&data, &auth).await?;
    let report = data.repo.get_report(path.into_inner()).await?;
    let removed = match report.target_type {
        TargetType::Post => data.repo.delete_post(report.target_id).await,
        TargetType::Comment => data.repo.delete_comment(report.target_id).await.map(|_| ()),
    };
    match removed {
        Ok(()) | Err(RepoError::NotFound) => {}
        Err(e) => return Err(e.into()),
    }
    let report = data.repo.set_report_status(report.id, ReportStatus::Reviewed).await?;
    tracing::info!(report = report.id, target = report.target_id, by = %me.id, "reported target deleted");
    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/users/blocked",
    responses(
        (status = 200, description = "Blocked profiles", body = [Profile]),
        (status = 403, description = "Admins only")
    )
)]
pub async fn admin_list_blocked(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    admin(&data, &auth).await?;
    Ok(HttpResponse::Ok().json(data.repo.list_blocked().await?))
}

async fn set_blocked(data: &AppState, me: &Profile, target: &Profile, blocked: bool) -> Result<Profile, ApiError> {
    if blocked && target.id == me.id {
        return Err(bad("admins cannot block themselves"));
    }
    let p = data.repo.set_blocked(&target.id, blocked).await?;
    tracing::info!(user = %p.id, blocked, by = %me.id, "block state changed");
    Ok(p)
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users/{id}/block",
    params(("id" = String, Path, description = "User id")),
    responses((status = 200, description = "User blocked", body = Profile), (status = 404, description = "No such user"))
)]
pub async fn admin_block_user(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let me = admin(&data, &auth).await?;
    let target = data.repo.get_profile(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(set_blocked(&data, &me, &target, true).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users/{id}/unblock",
    params(("id" = String, Path, description = "User id")),
    responses((status = 200, description = "User unblocked", body = Profile), (status = 404, description = "No such user"))
)]
pub async fn admin_unblock_user(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let me = admin(&data, &auth).await?;
    let target = data.repo.get_profile(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(set_blocked(&data, &me, &target, false).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users/block-by-email",
    request_body = EmailRequest,
    responses((status = 200, description = "User blocked", body = Profile), (status = 404, description = "No such user"))
)]
pub async fn admin_block_by_email(auth: Auth, data: web::Data<AppState>, payload: web::Json<EmailRequest>) -> Result<HttpResponse, ApiError> {
    let me = admin(&data, &auth).await?;
    let target = data.repo.get_profile_by_email(&payload.email).await?;
    Ok(HttpResponse::Ok().json(set_blocked(&data, &me, &target, true).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users/unblock-by-email",
    request_body = EmailRequest,
    responses((status = 200, description = "User unblocked", body = Profile), (status = 404, description = "No such user"))
)]
pub async fn admin_unblock_by_email(auth: Auth, data: web::Data<AppState>, payload: web::Json<EmailRequest>) -> Result<HttpResponse, ApiError> {
    let me = admin(&data, &auth).await?;
    let target = data.repo.get_profile_by_email(&payload.email).await?;
    Ok(HttpResponse::Ok().json(set_blocked(&data, &me, &target, false).await?))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetRoleRequest {
    pub user_id: Option<String>,
    pub email: Option<String>,
    /// `user`, `teacher` or `admin`
    pub role: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/roles",
    request_body = SetRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = Profile),
        (status = 400, description = "Invalid role or no user given"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "No such user")
    )
)]
pub async fn admin_set_role(auth: Auth, data: web::Data<AppState>, payload: web::Json<SetRoleRequest>) -> Result<HttpResponse, ApiError> {
    let me = admin(&data, &auth).await?;
    let role: Role = payload.role.parse().map_err(bad)?;
    let target = match (&payload.user_id, &payload.email) {
        (Some(id), _) => data.repo.get_profile(id).await?,
        (None, Some(email)) => data.repo.get_profile_by_email(email).await?,
        (None, None) => return Err(bad("user_id or email is required")),
    };
    let p = data.repo.set_role(&target.id, role).await?;
    tracing::info!(user = %p.id, role = p.role.as_str(), by = %me.id, "role changed");
    Ok(HttpResponse::Ok().json(p))
}

#[utoipa::path(
    patch,
    path = "/api/v1/admin/posts/{id}",
    request_body = PostFlags,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Flags updated", body = PostView),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn admin_set_post_flags(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<PostFlags>,
) -> Result<HttpResponse, ApiError> {
    let me = admin(&data, &auth).await?;
    let post = data.repo.set_post_flags(path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(PostView::new(post, Some(&me.id))))
}

// ---------------------------------------------------------------- public files

pub async fn get_image(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let hash = path.into_inner();
    match data.image_store.load(&hash).await {
        Ok((bytes, mime)) => Ok(HttpResponse::Ok()
            .insert_header(("Content-Type", mime))
            .insert_header(("Cache-Control", "public, max-age=31536000, immutable"))
            .body(bytes)),
        Err(ImageStoreError::NotFound) => Err(ApiError::NotFound),
        Err(e) => {
            log::error!("image_store load error: {e}");
            Err(ApiError::Internal)
        }
    }
}

pub async fn healthz() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}
