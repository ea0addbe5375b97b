use async_trait::async_trait;

use crate::models::*;

#[cfg(feature = "inmem-store")]
pub mod inmem;
#[cfg(feature = "postgres-store")]
pub mod pg;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("invalid: {0}")] Invalid(String),
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Filtered page, pinned posts first then newest.
    async fn list_posts(&self, query: &PostQuery) -> RepoResult<Vec<Post>>;
    /// Every non-blinded post (trending input).
    async fn list_visible_posts(&self) -> RepoResult<Vec<Post>>;
    async fn list_posts_by_author(&self, author_id: &str) -> RepoResult<Vec<Post>>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    async fn create_post(&self, author_id: &str, new: NewPost) -> RepoResult<Post>;
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post>;
    async fn set_post_flags(&self, id: Id, flags: PostFlags) -> RepoResult<Post>;
    /// Removes the post with its comments, reactions and scraps.
    async fn delete_post(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// All comments of a post, oldest first.
    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>>;
    async fn list_comments_by_author(&self, author_id: &str) -> RepoResult<Vec<Comment>>;
    async fn get_comment(&self, id: Id) -> RepoResult<Comment>;
    /// A reply to a reply is attached to that reply's parent.
    async fn create_comment(&self, author_id: &str, new: NewComment) -> RepoResult<Comment>;
    async fn update_comment(&self, id: Id, content: String) -> RepoResult<Comment>;
    /// Returns how many rows went away (the comment plus its replies).
    async fn delete_comment(&self, id: Id) -> RepoResult<usize>;
}

#[async_trait]
pub trait ReactionRepo: Send + Sync {
    /// Toggle: none -> `kind`, same kind -> none, opposite -> `kind`.
    /// A post whose dislikes reach `blind_threshold` is blinded.
    async fn react(
        &self,
        target: TargetType,
        target_id: Id,
        user_id: &str,
        kind: ReactionKind,
        blind_threshold: i64,
    ) -> RepoResult<ReactionOutcome>;
    async fn reaction_of(&self, target: TargetType, target_id: Id, user_id: &str) -> RepoResult<Option<ReactionKind>>;
}

#[async_trait]
pub trait ScrapRepo: Send + Sync {
    async fn toggle_scrap(&self, post_id: Id, user_id: &str) -> RepoResult<ScrapOutcome>;
    async fn is_scrapped(&self, post_id: Id, user_id: &str) -> RepoResult<bool>;
    /// Most recently scrapped first.
    async fn list_scrapped_posts(&self, user_id: &str) -> RepoResult<Vec<Post>>;
}

#[async_trait]
pub trait ReportRepo: Send + Sync {
    async fn create_report(&self, reporter_id: &str, new: NewReport) -> RepoResult<Report>;
    async fn list_reports(&self, status: Option<ReportStatus>) -> RepoResult<Vec<Report>>;
    async fn get_report(&self, id: Id) -> RepoResult<Report>;
    async fn set_report_status(&self, id: Id, status: ReportStatus) -> RepoResult<Report>;
    async fn delete_report(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait ProfileRepo: Send + Sync {
    async fn get_profile(&self, id: &str) -> RepoResult<Profile>;
    async fn get_profile_by_email(&self, email: &str) -> RepoResult<Profile>;
    async fn create_profile(&self, new: NewProfile) -> RepoResult<Profile>;
    async fn update_profile(&self, id: &str, upd: UpdateProfile) -> RepoResult<Profile>;
    async fn set_role(&self, id: &str, role: ProfileRole) -> RepoResult<Profile>;
    async fn set_blocked(&self, id: &str, blocked: bool) -> RepoResult<Profile>;
    async fn list_blocked(&self) -> RepoResult<Vec<Profile>>;
    async fn credentials_by_email(&self, email: &str) -> RepoResult<Credentials>;
}

pub trait Repo: PostRepo + CommentRepo + ReactionRepo + ScrapRepo + ReportRepo + ProfileRepo {}

impl<T> Repo for T where T: PostRepo + CommentRepo + ReactionRepo + ScrapRepo + ReportRepo + ProfileRepo {}

/// Counter change when a user's reaction moves from `old` to `new`: `(likes, dislikes)`.
pub(crate) fn reaction_delta(old: Option<ReactionKind>, new: Option<ReactionKind>) -> (i64, i64) {
    let mut d = (0, 0);
    match old {
        Some(ReactionKind::Like) => d.0 -= 1,
        Some(ReactionKind::Dislike) => d.1 -= 1,
        None => {}
    }
    match new {
        Some(ReactionKind::Like) => d.0 += 1,
        Some(ReactionKind::Dislike) => d.1 += 1,
        None => {}
    }
    d
}

pub(crate) fn toggled(current: Option<ReactionKind>, kind: ReactionKind) -> Option<ReactionKind> {
    match current {
        Some(k) if k == kind => None,
        _ => Some(kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_transitions() {
        use ReactionKind::*;
        assert_eq!(toggled(None, Like), Some(Like));
        assert_eq!(toggled(Some(Like), Like), None);
        assert_eq!(toggled(Some(Like), Dislike), Some(Dislike));
        assert_eq!(reaction_delta(Some(Like), Some(Dislike)), (-1, 1));
        assert_eq!(reaction_delta(None, Some(Like)), (1, 0));
        assert_eq!(reaction_delta(Some(Dislike), None), (0, -1));
    }
}
