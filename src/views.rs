//! Response shapes. Author ids never leave the service; callers only learn
//! whether *they* wrote something.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::anonymity::display_name;
use crate::models::*;
use crate::ranking::{badge_for, net_score, rank_comments, Badge};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PostView {
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
    pub is_author: bool,
    pub my_reaction: Option<ReactionKind>,
    pub scrapped: bool,
}

impl PostView {
    pub fn new(post: Post, viewer: Option<&str>) -> Self {
        let is_author = viewer == Some(post.author_id.as_str());
        Self {
            id: post.id,
            title: post.title,
            content: post.content,
            category: post.category,
            created_at: post.created_at,
            updated_at: post.updated_at,
            likes_count: post.likes_count,
            dislikes_count: post.dislikes_count,
            comments_count: post.comments_count,
            scraps_count: post.scraps_count,
            is_blinded: post.is_blinded,
            is_pinned: post.is_pinned,
            is_notice: post.is_notice,
            is_author,
            my_reaction: None,
            scrapped: false,
        }
    }

    pub fn with_viewer_state(mut self, reaction: Option<ReactionKind>, scrapped: bool) -> Self {
        self.my_reaction = reaction;
        self.scrapped = scrapped;
        self
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommentView {
    pub id: Id,
    pub post_id: Id,
    pub parent_id: Option<Id>,
    pub content: String,
    pub is_anonymous: bool,
    pub display_name: String,
    pub likes_count: i64,
    pub dislikes_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub badge: Option<Badge>,
    pub is_author: bool,
    pub my_reaction: Option<ReactionKind>,
    pub replies: Vec<CommentView>,
}

impl CommentView {
    pub fn new(c: Comment, nickname: Option<&str>, viewer: Option<&str>) -> Self {
        let display_name = display_name(&c, nickname);
        let is_author = viewer == Some(c.author_id.as_str());
        Self {
            id: c.id,
            post_id: c.post_id,
            parent_id: c.parent_id,
            content: c.content,
            is_anonymous: c.is_anonymous,
            display_name,
            likes_count: c.likes_count,
            dislikes_count: c.dislikes_count,
            created_at: c.created_at,
            updated_at: c.updated_at,
            badge: None,
            is_author,
            my_reaction: None,
            replies: Vec::new(),
        }
    }
}

/// Viewer-independent inputs for building a comment tree.
pub struct TreeContext<'a> {
    pub nicknames: &'a HashMap<UserId, String>,
    pub reactions: &'a HashMap<Id, ReactionKind>,
    pub viewer: Option<&'a str>,
    pub now: DateTime<Utc>,
}

/// Ranked top-level comments, each with its replies in chronological order.
/// Badges go to top-level comments by their ranked position.
pub fn comment_tree(comments: Vec<Comment>, ctx: &TreeContext<'_>) -> Vec<CommentView> {
    let (roots, replies): (Vec<Comment>, Vec<Comment>) = comments.into_iter().partition(|c| c.parent_id.is_none());
    let mut by_parent: HashMap<Id, Vec<Comment>> = HashMap::new();
    for r in replies {
        if let Some(p) = r.parent_id {
            by_parent.entry(p).or_default().push(r);
        }
    }
    let view = |c: Comment| {
        let nick = ctx.nicknames.get(&c.author_id).map(String::as_str);
        let mut v = CommentView::new(c, nick, ctx.viewer);
        v.my_reaction = ctx.reactions.get(&v.id).copied();
        v
    };
    rank_comments(roots, ctx.now)
        .into_iter()
        .enumerate()
        .map(|(index, root)| {
            let badge = badge_for(net_score(&root), index);
            let mut kids = by_parent.remove(&root.id).unwrap_or_default();
            kids.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            let mut v = view(root);
            v.badge = badge;
            v.replies = kids.into_iter().map(&view).collect();
            v
        })
        .collect()
}

/// A comment listed on the author's own page, with the post it belongs to.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MyCommentView {
    pub id: Id,
    pub post_id: Id,
    pub post_title: Option<String>,
    pub content: String,
    pub is_anonymous: bool,
    pub likes_count: i64,
    pub dislikes_count: i64,
    pub created_at: DateTime<Utc>,
}

impl MyCommentView {
    pub fn new(c: Comment, post_title: Option<String>) -> Self {
        Self {
            id: c.id,
            post_id: c.post_id,
            post_title,
            content: c.content,
            is_anonymous: c.is_anonymous,
            likes_count: c.likes_count,
            dislikes_count: c.dislikes_count,
            created_at: c.created_at,
        }
    }
}
