use crate::models::*;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::register,
        crate::routes::login,
        crate::routes::auth_me,
        crate::routes::list_posts,
        crate::routes::create_post,
        crate::routes::get_post,
        crate::routes::update_post,
        crate::routes::delete_post,
        crate::routes::resolve_post,
        crate::routes::create_comment,
        crate::routes::list_comments,
        crate::routes::create_course,
        crate::routes::list_courses,
        crate::routes::get_course,
        crate::routes::add_bookmark,
        crate::routes::remove_bookmark,
        crate::routes::list_bookmarks,
        crate::routes::create_snippet,
        crate::routes::list_snippets,
        crate::routes::add_like,
        crate::routes::open_chat,
        crate::routes::list_chats,
        crate::routes::list_messages,
        crate::routes::send_message,
        crate::routes::unread_count,
        crate::routes::rate_for_help,
        crate::routes::profile_page,
        crate::routes::update_profile,
        crate::routes::add_review,
        crate::routes::list_reviews,
        crate::routes::issue_warning,
        crate::routes::list_warnings,
        crate::routes::respond_to_warning,
        crate::routes::block_user,
        crate::routes::ban_user,
        crate::routes::file_report,
        crate::routes::list_reports,
        crate::routes::process_report,
        crate::routes::admin_list_users,
        crate::routes::admin_list_actions,
    ),
    components(schemas(
        User, NewUser, UpdateProfile, Credentials, TokenResponse,
        Post, NewPost, UpdatePost, Comment, NewComment, Course, NewCourse,
        Bookmark, CodeSnippet, NewCodeSnippet, Review, NewReview,
        Like, Chat, Message, NewMessage,
        UserWarning, NewWarning, WarningReply, WarningResponse,
        Report, NewReport, ReportDecision, ReportAction, ReportStatus,
        AdminProfile, AdminAction, AdminActionKind,
        ProfileView, ProfilePage, Role, TargetType, ReportTarget, ContentKind,
        crate::routes::UnreadCount,
    )),
    tags(
        (name = "auth", description = "Registration and login"),
        (name = "content", description = "Posts, comments, courses"),
        (name = "chat", description = "Direct messaging"),
        (name = "moderation", description = "Warnings, blocks, bans, reports"),
        (name = "reputation", description = "Peer-help points and ratings"),
    )
)]
pub struct ApiDoc;
