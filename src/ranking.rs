//! Popularity heuristics for trending posts and comment ordering.
//!
//! Everything here is pure: callers pass `now` so ordering is reproducible.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Comment, Post};

pub const DEFAULT_TRENDING_LIMIT: usize = 3;

/// Weighted scores closer than this fall through to the like count.
const COMMENT_SCORE_MARGIN: f64 = 2.0;

pub fn time_weight_for_post(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age = now - created_at;
    if age < Duration::hours(24) {
        1.5
    } else if age < Duration::hours(168) {
        1.2
    } else {
        1.0
    }
}

/// `(likes + 2*comments + 3*scraps) * time weight`
pub fn popularity_score(post: &Post, now: DateTime<Utc>) -> f64 {
    let raw = post.likes_count.max(0) + post.comments_count.max(0) * 2 + post.scraps_count.max(0) * 3;
    raw as f64 * time_weight_for_post(post.created_at, now)
}

/// Top `limit` non-blinded posts by popularity; ties go to the newer post.
pub fn trending(posts: Vec<Post>, now: DateTime<Utc>, limit: usize) -> Vec<Post> {
    let mut scored: Vec<(f64, Post)> = posts
        .into_iter()
        .filter(|p| !p.is_blinded)
        .map(|p| (popularity_score(&p, now), p))
        .collect();
    scored.sort_by(|(sa, a), (sb, b)| {
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| b.id.cmp(&a.id))
    });
    scored.into_iter().take(limit).map(|(_, p)| p).collect()
}

pub fn net_score(comment: &Comment) -> i64 {
    comment.likes_count - comment.dislikes_count
}

pub fn comment_weighted_score(comment: &Comment, now: DateTime<Utc>) -> f64 {
    let w = if now - comment.created_at < Duration::hours(24) { 1.2 } else { 1.0 };
    net_score(comment) as f64 * w
}

/// `Less` means `a` is shown before `b`.
pub fn compare_comments(a: &Comment, b: &Comment, now: DateTime<Utc>) -> Ordering {
    let wa = comment_weighted_score(a, now);
    let wb = comment_weighted_score(b, now);
    if (wa - wb).abs() > COMMENT_SCORE_MARGIN {
        return wb.partial_cmp(&wa).unwrap_or(Ordering::Equal);
    }
    if a.likes_count != b.likes_count {
        return b.likes_count.cmp(&a.likes_count);
    }
    b.created_at.cmp(&a.created_at)
}

/// Orders comments with [`compare_comments`].
///
/// The margin rule makes the comparator non-transitive, which `slice::sort_by`
/// is allowed to reject, so this uses a stable insertion pass instead.
pub fn rank_comments(mut comments: Vec<Comment>, now: DateTime<Utc>) -> Vec<Comment> {
    for i in 1..comments.len() {
        let mut j = i;
        while j > 0 && compare_comments(&comments[j], &comments[j - 1], now) == Ordering::Less {
            comments.swap(j, j - 1);
            j -= 1;
        }
    }
    comments
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Badge {
    Best,
    Hot,
}

/// Highlight for the comment at `index` of a ranked list.
pub fn badge_for(score: i64, index: usize) -> Option<Badge> {
    if score >= 5 && index < 3 {
        Some(Badge::Best)
    } else if (3..5).contains(&score) && index < 5 {
        Some(Badge::Hot)
    } else {
        None
    }
}
