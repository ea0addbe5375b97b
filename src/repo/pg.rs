use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Transaction};

use super::*;
use crate::anonymity::anonymous_number;

const POST_COLS: &str = "id, title, content, category, author_id, created_at, updated_at, likes_count, \
    dislikes_count, comments_count, scraps_count, is_blinded, is_pinned, is_notice";
const COMMENT_COLS: &str = "id, post_id, parent_id, content, is_anonymous, anonymous_number, author_id, \
    likes_count, dislikes_count, created_at, updated_at";
const REPORT_COLS: &str = "id, reporter_id, target_type, target_id, reason, status, created_at, updated_at";
const PROFILE_COLS: &str = "id, email, nickname, role, is_blocked, avatar_hash, created_at, updated_at";

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => RepoError::Conflict,
            // foreign key violation: the referenced row is gone
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23503") => RepoError::NotFound,
            other => RepoError::Internal(other.to_string()),
        }
    }
}

fn parse<T: std::str::FromStr<Err = String>>(raw: &str) -> RepoResult<T> {
    raw.parse().map_err(RepoError::Internal)
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    title: String,
    content: String,
    category: String,
    author_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    likes_count: i64,
    dislikes_count: i64,
    comments_count: i64,
    scraps_count: i64,
    is_blinded: bool,
    is_pinned: bool,
    is_notice: bool,
}

impl TryFrom<PostRow> for Post {
    type Error = RepoError;
    fn try_from(r: PostRow) -> RepoResult<Self> {
        Ok(Post {
            id: r.id,
            title: r.title,
            content: r.content,
            category: parse(&r.category)?,
            created_at: r.created_at,
            updated_at: r.updated_at,
            likes_count: r.likes_count,
            dislikes_count: r.dislikes_count,
            comments_count: r.comments_count,
            scraps_count: r.scraps_count,
            is_blinded: r.is_blinded,
            is_pinned: r.is_pinned,
            is_notice: r.is_notice,
            author_id: r.author_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    post_id: i64,
    parent_id: Option<i64>,
    content: String,
    is_anonymous: bool,
    anonymous_number: i32,
    author_id: String,
    likes_count: i64,
    dislikes_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(r: CommentRow) -> Self {
        Comment {
            id: r.id,
            post_id: r.post_id,
            parent_id: r.parent_id,
            content: r.content,
            is_anonymous: r.is_anonymous,
            anonymous_number: r.anonymous_number.max(0) as u32,
            likes_count: r.likes_count,
            dislikes_count: r.dislikes_count,
            created_at: r.created_at,
            updated_at: r.updated_at,
            author_id: r.author_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReportRow {
    id: i64,
    reporter_id: String,
    target_type: String,
    target_id: i64,
    reason: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReportRow> for Report {
    type Error = RepoError;
    fn try_from(r: ReportRow) -> RepoResult<Self> {
        Ok(Report {
            id: r.id,
            reporter_id: r.reporter_id,
            target_type: parse(&r.target_type)?,
            target_id: r.target_id,
            reason: r.reason,
            status: parse(&r.status)?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: String,
    email: String,
    nickname: String,
    role: String,
    is_blocked: bool,
    avatar_hash: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = RepoError;
    fn try_from(r: ProfileRow) -> RepoResult<Self> {
        Ok(Profile {
            id: r.id,
            email: r.email,
            nickname: r.nickname,
            role: parse(&r.role)?,
            is_blocked: r.is_blocked,
            avatar_hash: r.avatar_hash,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

fn posts(rows: Vec<PostRow>) -> RepoResult<Vec<Post>> {
    rows.into_iter().map(Post::try_from).collect()
}

fn like_pattern(term: &str) -> String {
    let escaped = term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

#[derive(Clone)]
pub struct PgRepo { pool: Pool<Postgres> }

impl PgRepo {
    pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

    /// Apply the bundled SQL migrations.
    pub async fn migrate(&self) -> RepoResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RepoError::Internal(e.to_string()))
    }

    async fn target_exists(&self, target: TargetType, id: Id) -> RepoResult<bool> {
        let sql = match target {
            TargetType::Post => "SELECT EXISTS (SELECT 1 FROM posts WHERE id = $1)",
            TargetType::Comment => "SELECT EXISTS (SELECT 1 FROM comments WHERE id = $1)",
        };
        Ok(sqlx::query_scalar::<_, bool>(sql).bind(id).fetch_one(&self.pool).await?)
    }
}

#[async_trait]
impl PostRepo for PgRepo {
    async fn list_posts(&self, query: &PostQuery) -> RepoResult<Vec<Post>> {
        let category = query.category_filter().map_err(RepoError::Invalid)?;
        let pattern = query.search_term().map(|t| like_pattern(&t));
        let (offset, limit) = query.window();
        let sql = format!(
            "SELECT {POST_COLS} FROM posts
             WHERE ($1::text IS NULL OR category = $1)
               AND ($2::text IS NULL OR title ILIKE $2 OR content ILIKE $2)
               AND ($3 OR NOT is_blinded)
             ORDER BY is_pinned DESC, created_at DESC, id DESC
             LIMIT $4 OFFSET $5"
        );
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(category.map(|c| c.as_str()))
            .bind(pattern)
            .bind(query.include_blinded)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;
        posts(rows)
    }

    async fn list_visible_posts(&self) -> RepoResult<Vec<Post>> {
        let sql = format!("SELECT {POST_COLS} FROM posts WHERE NOT is_blinded");
        posts(sqlx::query_as::<_, PostRow>(&sql).fetch_all(&self.pool).await?)
    }

    async fn list_posts_by_author(&self, author_id: &str) -> RepoResult<Vec<Post>> {
        let sql = format!("SELECT {POST_COLS} FROM posts WHERE author_id = $1 ORDER BY created_at DESC, id DESC");
        posts(sqlx::query_as::<_, PostRow>(&sql).bind(author_id).fetch_all(&self.pool).await?)
    }

    async fn get_post(&self, id: Id) -> RepoResult<Post> {
        let sql = format!("SELECT {POST_COLS} FROM posts WHERE id = $1");
        sqlx::query_as::<_, PostRow>(&sql).bind(id).fetch_one(&self.pool).await?.try_into()
    }

    async fn create_post(&self, author_id: &str, new: NewPost) -> RepoResult<Post> {
        let sql = format!(
            "INSERT INTO posts (title, content, category, author_id, is_notice) VALUES ($1, $2, $3, $4, $5) RETURNING {POST_COLS}"
        );
        sqlx::query_as::<_, PostRow>(&sql)
            .bind(&new.title)
            .bind(&new.content)
            .bind(new.category.as_str())
            .bind(author_id)
            .bind(new.category == Category::Notice)
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }

    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
        let sql = format!(
            "UPDATE posts SET title = COALESCE($2, title), content = COALESCE($3, content),
                 category = COALESCE($4, category), updated_at = now()
             WHERE id = $1 RETURNING {POST_COLS}"
        );
        sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .bind(upd.title)
            .bind(upd.content)
            .bind(upd.category.map(|c| c.as_str()))
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }

    async fn set_post_flags(&self, id: Id, flags: PostFlags) -> RepoResult<Post> {
        let sql = format!(
            "UPDATE posts SET is_pinned = COALESCE($2, is_pinned), is_notice = COALESCE($3, is_notice),
                 is_blinded = COALESCE($4, is_blinded), updated_at = now()
             WHERE id = $1 RETURNING {POST_COLS}"
        );
        sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .bind(flags.is_pinned)
            .bind(flags.is_notice)
            .bind(flags.is_blinded)
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }

    async fn delete_post(&self, id: Id) -> RepoResult<()> {
        // comments, reactions and scraps go with ON DELETE CASCADE
        let res = sqlx::query("DELETE FROM posts WHERE id = $1").bind(id).execute(&self.pool).await?;
        if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }
}

#[async_trait]
impl CommentRepo for PgRepo {
    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
        let sql = format!("SELECT {COMMENT_COLS} FROM comments WHERE post_id = $1 ORDER BY created_at ASC, id ASC");
        let rows = sqlx::query_as::<_, CommentRow>(&sql).bind(post_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn list_comments_by_author(&self, author_id: &str) -> RepoResult<Vec<Comment>> {
        let sql = format!("SELECT {COMMENT_COLS} FROM comments WHERE author_id = $1 ORDER BY created_at DESC, id DESC");
        let rows = sqlx::query_as::<_, CommentRow>(&sql).bind(author_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
        let sql = format!("SELECT {COMMENT_COLS} FROM comments WHERE id = $1");
        Ok(sqlx::query_as::<_, CommentRow>(&sql).bind(id).fetch_one(&self.pool).await?.into())
    }

    async fn create_comment(&self, author_id: &str, new: NewComment) -> RepoResult<Comment> {
        let mut tx = self.pool.begin().await?;
        // lock the post so the counter and the insert stay together
        sqlx::query_scalar::<_, i64>("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
            .bind(new.post_id)
            .fetch_one(&mut *tx)
            .await?;
        let parent_id = match new.parent_id {
            Some(pid) => {
                let (post_id, grand): (i64, Option<i64>) =
                    sqlx::query_as("SELECT post_id, parent_id FROM comments WHERE id = $1")
                        .bind(pid)
                        .fetch_one(&mut *tx)
                        .await?;
                if post_id != new.post_id { return Err(RepoError::NotFound); }
                Some(grand.unwrap_or(pid))
            }
            None => None,
        };
        let sql = format!(
            "INSERT INTO comments (post_id, parent_id, content, is_anonymous, anonymous_number, author_id)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {COMMENT_COLS}"
        );
        let row = sqlx::query_as::<_, CommentRow>(&sql)
            .bind(new.post_id)
            .bind(parent_id)
            .bind(&new.content)
            .bind(new.is_anonymous)
            .bind(anonymous_number(author_id, new.post_id) as i32)
            .bind(author_id)
            .fetch_one(&mut *tx)
            .await?;
        sqlx::query("UPDATE posts SET comments_count = comments_count + 1 WHERE id = $1")
            .bind(new.post_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(row.into())
    }

    async fn update_comment(&self, id: Id, content: String) -> RepoResult<Comment> {
        let sql = format!("UPDATE comments SET content = $2, updated_at = now() WHERE id = $1 RETURNING {COMMENT_COLS}");
        Ok(sqlx::query_as::<_, CommentRow>(&sql).bind(id).bind(content).fetch_one(&self.pool).await?.into())
    }

    async fn delete_comment(&self, id: Id) -> RepoResult<usize> {
        let mut tx = self.pool.begin().await?;
        let post_id: i64 = sqlx::query_scalar("SELECT post_id FROM comments WHERE id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM comments WHERE id = $1 OR parent_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected() as i64;
        sqlx::query("UPDATE posts SET comments_count = GREATEST(comments_count - $2, 0) WHERE id = $1")
            .bind(post_id)
            .bind(removed)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(removed as usize)
    }
}

struct ReactionTables {
    target: &'static str,
    reactions: &'static str,
    key: &'static str,
}

fn tables(target: TargetType) -> ReactionTables {
    match target {
        TargetType::Post => ReactionTables { target: "posts", reactions: "post_reactions", key: "post_id" },
        TargetType::Comment => ReactionTables { target: "comments", reactions: "comment_reactions", key: "comment_id" },
    }
}

async fn current_reaction(
    tx: &mut Transaction<'_, Postgres>,
    t: &ReactionTables,
    target_id: Id,
    user_id: &str,
) -> RepoResult<Option<ReactionKind>> {
    let sql = format!("SELECT kind FROM {} WHERE {} = $1 AND user_id = $2", t.reactions, t.key);
    let raw: Option<String> = sqlx::query_scalar(&sql)
        .bind(target_id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;
    raw.as_deref().map(parse::<ReactionKind>).transpose()
}

#[async_trait]
impl ReactionRepo for PgRepo {
    async fn react(
        &self,
        target: TargetType,
        target_id: Id,
        user_id: &str,
        kind: ReactionKind,
        blind_threshold: i64,
    ) -> RepoResult<ReactionOutcome> {
        let t = tables(target);
        let mut tx = self.pool.begin().await?;
        sqlx::query_scalar::<_, i64>(&format!("SELECT id FROM {} WHERE id = $1 FOR UPDATE", t.target))
            .bind(target_id)
            .fetch_one(&mut *tx)
            .await?;
        let current = current_reaction(&mut tx, &t, target_id, user_id).await?;
        let next = toggled(current, kind);
        match (current, next) {
            (None, Some(k)) => {
                sqlx::query(&format!("INSERT INTO {} ({}, user_id, kind) VALUES ($1, $2, $3)", t.reactions, t.key))
                    .bind(target_id).bind(user_id).bind(k.as_str())
                    .execute(&mut *tx).await?;
            }
            (Some(_), Some(k)) => {
                sqlx::query(&format!("UPDATE {} SET kind = $3 WHERE {} = $1 AND user_id = $2", t.reactions, t.key))
                    .bind(target_id).bind(user_id).bind(k.as_str())
                    .execute(&mut *tx).await?;
            }
            (Some(_), None) => {
                sqlx::query(&format!("DELETE FROM {} WHERE {} = $1 AND user_id = $2", t.reactions, t.key))
                    .bind(target_id).bind(user_id)
                    .execute(&mut *tx).await?;
            }
            (None, None) => {}
        }
        let (dl, dd) = reaction_delta(current, next);
        let (likes, dislikes): (i64, i64) = sqlx::query_as(&format!(
            "UPDATE {} SET likes_count = GREATEST(likes_count + $2, 0), dislikes_count = GREATEST(dislikes_count + $3, 0)
             WHERE id = $1 RETURNING likes_count, dislikes_count",
            t.target
        ))
        .bind(target_id).bind(dl).bind(dd)
        .fetch_one(&mut *tx)
        .await?;
        let is_blinded = match target {
            TargetType::Post => {
                let blind_now = kind == ReactionKind::Dislike && dislikes >= blind_threshold;
                sqlx::query_scalar::<_, bool>(
                    "UPDATE posts SET is_blinded = is_blinded OR $2 WHERE id = $1 RETURNING is_blinded",
                )
                .bind(target_id).bind(blind_now)
                .fetch_one(&mut *tx)
                .await?
            }
            TargetType::Comment => false,
        };
        tx.commit().await?;
        Ok(ReactionOutcome { reaction: next, likes_count: likes, dislikes_count: dislikes, is_blinded })
    }

    async fn reaction_of(&self, target: TargetType, target_id: Id, user_id: &str) -> RepoResult<Option<ReactionKind>> {
        let t = tables(target);
        let sql = format!("SELECT kind FROM {} WHERE {} = $1 AND user_id = $2", t.reactions, t.key);
        let raw: Option<String> = sqlx::query_scalar(&sql)
            .bind(target_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        raw.as_deref().map(parse::<ReactionKind>).transpose()
    }
}

#[async_trait]
impl ScrapRepo for PgRepo {
    async fn toggle_scrap(&self, post_id: Id, user_id: &str) -> RepoResult<ScrapOutcome> {
        let mut tx = self.pool.begin().await?;
        sqlx::query_scalar::<_, i64>("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
            .bind(post_id)
            .fetch_one(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM scraps WHERE post_id = $1 AND user_id = $2")
            .bind(post_id).bind(user_id)
            .execute(&mut *tx).await?
            .rows_affected() > 0;
        if !removed {
            sqlx::query("INSERT INTO scraps (post_id, user_id) VALUES ($1, $2)")
                .bind(post_id).bind(user_id)
                .execute(&mut *tx).await?;
        }
        let delta: i64 = if removed { -1 } else { 1 };
        let scraps_count: i64 = sqlx::query_scalar(
            "UPDATE posts SET scraps_count = GREATEST(scraps_count + $2, 0) WHERE id = $1 RETURNING scraps_count",
        )
        .bind(post_id).bind(delta)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(ScrapOutcome { scrapped: !removed, scraps_count })
    }

    async fn is_scrapped(&self, post_id: Id, user_id: &str) -> RepoResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM scraps WHERE post_id = $1 AND user_id = $2)")
            .bind(post_id).bind(user_id)
            .fetch_one(&self.pool).await?)
    }

    async fn list_scrapped_posts(&self, user_id: &str) -> RepoResult<Vec<Post>> {
        let cols = POST_COLS.split(", ").map(|c| format!("p.{c}")).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT {cols} FROM scraps s JOIN posts p ON p.id = s.post_id
             WHERE s.user_id = $1 ORDER BY s.created_at DESC, p.id DESC"
        );
        posts(sqlx::query_as::<_, PostRow>(&sql).bind(user_id).fetch_all(&self.pool).await?)
    }
}

#[async_trait]
impl ReportRepo for PgRepo {
    async fn create_report(&self, reporter_id: &str, new: NewReport) -> RepoResult<Report> {
        if !self.target_exists(new.target_type, new.target_id).await? { return Err(RepoError::NotFound); }
        let duplicate: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM reports WHERE reporter_id = $1 AND target_type = $2 AND target_id = $3 AND status = 'pending')",
        )
        .bind(reporter_id).bind(new.target_type.as_str()).bind(new.target_id)
        .fetch_one(&self.pool)
        .await?;
        if duplicate { return Err(RepoError::Conflict); }
        let sql = format!(
            "INSERT INTO reports (reporter_id, target_type, target_id, reason) VALUES ($1, $2, $3, $4) RETURNING {REPORT_COLS}"
        );
        sqlx::query_as::<_, ReportRow>(&sql)
            .bind(reporter_id)
            .bind(new.target_type.as_str())
            .bind(new.target_id)
            .bind(&new.reason)
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }

    async fn list_reports(&self, status: Option<ReportStatus>) -> RepoResult<Vec<Report>> {
        let sql = format!(
            "SELECT {REPORT_COLS} FROM reports WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Report::try_from).collect()
    }

    async fn get_report(&self, id: Id) -> RepoResult<Report> {
        let sql = format!("SELECT {REPORT_COLS} FROM reports WHERE id = $1");
        sqlx::query_as::<_, ReportRow>(&sql).bind(id).fetch_one(&self.pool).await?.try_into()
    }

    async fn set_report_status(&self, id: Id, status: ReportStatus) -> RepoResult<Report> {
        let sql = format!("UPDATE reports SET status = $2, updated_at = now() WHERE id = $1 RETURNING {REPORT_COLS}");
        sqlx::query_as::<_, ReportRow>(&sql)
            .bind(id)
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }

    async fn delete_report(&self, id: Id) -> RepoResult<()> {
        let res = sqlx::query("DELETE FROM reports WHERE id = $1").bind(id).execute(&self.pool).await?;
        if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }
}

#[async_trait]
impl ProfileRepo for PgRepo {
    async fn get_profile(&self, id: &str) -> RepoResult<Profile> {
        let sql = format!("SELECT {PROFILE_COLS} FROM profiles WHERE id = $1");
        sqlx::query_as::<_, ProfileRow>(&sql).bind(id).fetch_one(&self.pool).await?.try_into()
    }

    async fn get_profile_by_email(&self, email: &str) -> RepoResult<Profile> {
        let sql = format!("SELECT {PROFILE_COLS} FROM profiles WHERE email = $1");
        sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(email.trim().to_lowercase())
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }

    async fn create_profile(&self, new: NewProfile) -> RepoResult<Profile> {
        let sql = format!(
            "INSERT INTO profiles (id, email, nickname, role, password_hash) VALUES ($1, $2, $3, $4, $5) RETURNING {PROFILE_COLS}"
        );
        sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(&new.id)
            .bind(new.email.trim().to_lowercase())
            .bind(&new.nickname)
            .bind(new.role.as_str())
            .bind(new.password_hash)
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }

    async fn update_profile(&self, id: &str, upd: UpdateProfile) -> RepoResult<Profile> {
        let sql = format!(
            "UPDATE profiles SET nickname = COALESCE($2, nickname), email = COALESCE($3, email),
                 avatar_hash = COALESCE($4, avatar_hash), password_hash = COALESCE($5, password_hash),
                 updated_at = now()
             WHERE id = $1 RETURNING {PROFILE_COLS}"
        );
        sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(id)
            .bind(upd.nickname)
            .bind(upd.email.map(|e| e.trim().to_lowercase()))
            .bind(upd.avatar_hash)
            .bind(upd.password_hash)
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }

    async fn set_role(&self, id: &str, role: ProfileRole) -> RepoResult<Profile> {
        let sql = format!("UPDATE profiles SET role = $2, updated_at = now() WHERE id = $1 RETURNING {PROFILE_COLS}");
        sqlx::query_as::<_, ProfileRow>(&sql).bind(id).bind(role.as_str()).fetch_one(&self.pool).await?.try_into()
    }

    async fn set_blocked(&self, id: &str, blocked: bool) -> RepoResult<Profile> {
        let sql = format!("UPDATE profiles SET is_blocked = $2, updated_at = now() WHERE id = $1 RETURNING {PROFILE_COLS}");
        sqlx::query_as::<_, ProfileRow>(&sql).bind(id).bind(blocked).fetch_one(&self.pool).await?.try_into()
    }

    async fn list_blocked(&self) -> RepoResult<Vec<Profile>> {
        let sql = format!("SELECT {PROFILE_COLS} FROM profiles WHERE is_blocked ORDER BY email");
        let rows = sqlx::query_as::<_, ProfileRow>(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Profile::try_from).collect()
    }

    async fn credentials_by_email(&self, email: &str) -> RepoResult<Credentials> {
        let (user_id, hash): (String, Option<String>) =
            sqlx::query_as("SELECT id, password_hash FROM profiles WHERE email = $1")
                .bind(email.trim().to_lowercase())
                .fetch_one(&self.pool)
                .await?;
        let password_hash = hash.ok_or(RepoError::NotFound)?;
        Ok(Credentials { user_id, password_hash })
    }
}
