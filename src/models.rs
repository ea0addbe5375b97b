use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub type Id = i64;
/// Profile ids are opaque strings (local accounts use UUIDs, external tokens their `sub`).
pub type UserId = String;

pub const TITLE_MAX: usize = 100;
pub const POST_CONTENT_MAX: usize = 5000;
pub const COMMENT_CONTENT_MAX: usize = 1000;
pub const REPORT_REASON_MAX: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Category {
    #[serde(rename = "자유", alias = "free")]
    Free,
    #[serde(rename = "질문", alias = "question")]
    Question,
    #[serde(rename = "정보", alias = "info")]
    Info,
    #[serde(rename = "고민", alias = "worry")]
    Worry,
    #[serde(rename = "공지", alias = "notice")]
    Notice,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Free => "자유",
            Category::Question => "질문",
            Category::Info => "정보",
            Category::Worry => "고민",
            Category::Notice => "공지",
        }
    }
}

impl Default for Category {
    fn default() -> Self { Category::Free }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Category {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "자유" | "free" => Ok(Category::Free),
            "질문" | "question" => Ok(Category::Question),
            "정보" | "info" => Ok(Category::Info),
            "고민" | "worry" => Ok(Category::Worry),
            "공지" | "notice" => Ok(Category::Notice),
            other => Err(format!("unknown category '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Post {
    pub id: Id,
    pub title: String,
    pub content: String,
    pub category: Category,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub likes_count: i64,
    pub dislikes_count: i64,
    pub comments_count: i64,
    pub scraps_count: i64,
    pub is_blinded: bool,
    pub is_pinned: bool,
    pub is_notice: bool,
    pub author_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: Category,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<Category>,
}

/// Moderator-controlled flags on a post.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PostFlags {
    pub is_pinned: Option<bool>,
    pub is_notice: Option<bool>,
    pub is_blinded: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct PostQuery {
    /// Category filter; `전체` or absent means every category.
    pub category: Option<String>,
    /// Case-insensitive substring match on title or content.
    pub q: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    #[serde(skip)]
    pub include_blinded: bool,
}

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 50;

impl PostQuery {
    pub fn category_filter(&self) -> Result<Option<Category>, String> {
        match self.category.as_deref().map(str::trim) {
            None | Some("") | Some("전체") | Some("all") => Ok(None),
            Some(c) => c.parse().map(Some),
        }
    }

    pub fn search_term(&self) -> Option<String> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()).map(str::to_lowercase)
    }

    /// `(offset, limit)` for the requested page.
    pub fn window(&self) -> (usize, usize) {
        let per_page = self.per_page.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE) as usize;
        let page = self.page.unwrap_or(0) as usize;
        (page * per_page, per_page)
    }

    pub fn matches(&self, post: &Post, category: Option<Category>, term: Option<&str>) -> bool {
        if post.is_blinded && !self.include_blinded { return false; }
        if let Some(c) = category {
            if post.category != c { return false; }
        }
        match term {
            Some(t) => post.title.to_lowercase().contains(t) || post.content.to_lowercase().contains(t),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Comment {
    pub id: Id,
    pub post_id: Id,
    pub parent_id: Option<Id>,
    pub content: String,
    pub is_anonymous: bool,
    pub anonymous_number: u32,
    pub likes_count: i64,
    pub dislikes_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author_id: UserId,
}

fn default_true() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewComment {
    pub post_id: Id,
    pub parent_id: Option<Id>,
    pub content: String,
    #[serde(default = "default_true")]
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateComment {
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Dislike,
}

impl ReactionKind {
    pub fn as_str(&self) -> &'static str {
        match self { ReactionKind::Like => "like", ReactionKind::Dislike => "dislike" }
    }
}

impl FromStr for ReactionKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(ReactionKind::Like),
            "dislike" => Ok(ReactionKind::Dislike),
            other => Err(format!("unknown reaction '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Post,
    Comment,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self { TargetType::Post => "post", TargetType::Comment => "comment" }
    }
}

impl FromStr for TargetType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(TargetType::Post),
            "comment" => Ok(TargetType::Comment),
            other => Err(format!("unknown target type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReactionRequest {
    pub kind: ReactionKind,
}

/// State of a target after a reaction toggle, from the caller's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReactionOutcome {
    pub reaction: Option<ReactionKind>,
    pub likes_count: i64,
    pub dislikes_count: i64,
    pub is_blinded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScrapOutcome {
    pub scrapped: bool,
    pub scraps_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    #[default]
    Pending,
    Reviewed,
    Resolved,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Reviewed => "reviewed",
            ReportStatus::Resolved => "resolved",
        }
    }
}

impl FromStr for ReportStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "reviewed" => Ok(ReportStatus::Reviewed),
            "resolved" => Ok(ReportStatus::Resolved),
            other => Err(format!("unknown report status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Report {
    pub id: Id,
    pub reporter_id: UserId,
    pub target_type: TargetType,
    pub target_id: Id,
    pub reason: String,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewReport {
    pub target_type: TargetType,
    pub target_id: Id,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProfileRole {
    #[default]
    User,
    Teacher,
    Admin,
}

impl ProfileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileRole::User => "user",
            ProfileRole::Teacher => "teacher",
            ProfileRole::Admin => "admin",
        }
    }
}

impl FromStr for ProfileRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(ProfileRole::User),
            "teacher" => Ok(ProfileRole::Teacher),
            "admin" => Ok(ProfileRole::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Profile {
    pub id: UserId,
    pub email: String,
    pub nickname: String,
    pub role: ProfileRole,
    pub is_blocked: bool,
    pub avatar_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProfile {
    pub id: UserId,
    pub email: String,
    pub nickname: String,
    pub role: ProfileRole,
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProfile {
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub avatar_hash: Option<String>,
    pub password_hash: Option<String>,
}

/// Stored login material for a local account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub user_id: UserId,
    pub password_hash: String,
}

/// Counts shown on the "my activity" page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ActivitySummary {
    pub posts: usize,
    pub comments: usize,
    pub scraps: usize,
    pub likes_received: i64,
}

/// Trim `raw` and check it is non-empty and at most `max` characters.
pub fn clean_text(raw: &str, field: &str, max: usize) -> Result<String, String> {
    let t = raw.trim();
    if t.is_empty() { return Err(format!("{field} must not be empty")); }
    if t.chars().count() > max { return Err(format!("{field} must be at most {max} characters")); }
    Ok(t.to_string())
}
