use crate::models::{
    ActivitySummary, Category, NewComment, NewPost, NewReport, PostFlags, Profile, ProfileRole, ReactionKind,
    ReactionOutcome, ReactionRequest, Report, ReportStatus, ScrapOutcome, TargetType, UpdateComment, UpdatePost,
};
use crate::ranking::Badge;
use crate::routes::{
    AuthResponse, AvatarResponse, DeletedResponse, EmailRequest, LoginRequest, NicknameRequest, PasswordChangeRequest,
    SetRoleRequest, SignupRequest,
};
use crate::views::{CommentView, MyCommentView, PostView};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_posts,
        crate::routes::trending_posts,
        crate::routes::get_post,
        crate::routes::create_post,
        crate::routes::update_post,
        crate::routes::delete_post,
        crate::routes::list_comments,
        crate::routes::create_comment,
        crate::routes::update_comment,
        crate::routes::delete_comment,
        crate::routes::react_to_post,
        crate::routes::react_to_comment,
        crate::routes::toggle_scrap,
        crate::routes::create_report,
        crate::routes::signup,
        crate::routes::login,
        crate::routes::refresh_token,
        crate::routes::auth_me,
        crate::routes::my_posts,
        crate::routes::my_comments,
        crate::routes::my_scraps,
        crate::routes::my_activity,
        crate::routes::change_nickname,
        crate::routes::change_password,
        crate::routes::change_email,
        crate::routes::upload_avatar,
        crate::routes::admin_list_reports,
        crate::routes::admin_dismiss_report,
        crate::routes::admin_delete_report_target,
        crate::routes::admin_list_blocked,
        crate::routes::admin_block_user,
        crate::routes::admin_unblock_user,
        crate::routes::admin_block_by_email,
        crate::routes::admin_unblock_by_email,
        crate::routes::admin_set_role,
        crate::routes::admin_set_post_flags,
    ),
    components(schemas(
        Category, NewPost, UpdatePost, PostFlags, PostView,
        NewComment, UpdateComment, CommentView, MyCommentView, Badge, DeletedResponse,
        ReactionKind, ReactionRequest, ReactionOutcome, ScrapOutcome,
        TargetType, ReportStatus, Report, NewReport,
        ProfileRole, Profile, ActivitySummary,
        SignupRequest, LoginRequest, AuthResponse, NicknameRequest, PasswordChangeRequest, EmailRequest,
        AvatarResponse, SetRoleRequest,
    )),
    modifiers(&BearerAddon),
    tags(
        (name = "posts", description = "Posts, trending and scraps"),
        (name = "comments", description = "Comments and reactions"),
        (name = "accounts", description = "Sign-up, login and profile"),
        (name = "admin", description = "Moderation"),
    )
)]
pub struct ApiDoc;

struct BearerAddon;

impl Modify for BearerAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_board_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/posts/{id}/comments"));
        assert!(doc.paths.paths.contains_key("/api/v1/admin/reports/{id}/delete-target"));
        let schemes = doc.components.as_ref().map(|c| c.security_schemes.contains_key("bearer"));
        assert_eq!(schemes, Some(true));
    }
}
