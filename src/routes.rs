use std::sync::Arc;

use actix_web::{web, HttpResponse};

use crate::auth::{create_jwt, hash_password, verify_password, Auth};
use crate::error::ApiError;
use crate::models::*;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::Repo;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/auth/register").route(web::post().to(register)))
            .service(web::resource("/auth/login").route(web::post().to(login)))
            .service(web::resource("/auth/me").route(web::get().to(auth_me)))
            .service(
                web::resource("/posts")
                    .route(web::get().to(list_posts))
                    .route(web::post().to(create_post)),
            )
            .service(
                web::resource("/posts/{id}")
                    .route(web::get().to(get_post))
                    .route(web::put().to(update_post))
                    .route(web::delete().to(delete_post)),
            )
            .service(web::resource("/posts/{id}/resolve").route(web::post().to(resolve_post)))
            .service(web::resource("/posts/{id}/comments").route(web::get().to(list_comments)))
            .service(web::resource("/posts/{id}/snippets").route(web::get().to(list_snippets)))
            .service(web::resource("/comments").route(web::post().to(create_comment)))
            .service(
                web::resource("/courses")
                    .route(web::get().to(list_courses))
                    .route(web::post().to(create_course)),
            )
            .service(web::resource("/courses/{id}").route(web::get().to(get_course)))
            .service(web::resource("/bookmarks").route(web::get().to(list_bookmarks)))
            .service(
                web::resource("/bookmarks/{post_id}")
                    .route(web::post().to(add_bookmark))
                    .route(web::delete().to(remove_bookmark)),
            )
            .service(web::resource("/snippets").route(web::post().to(create_snippet)))
            .service(web::resource("/like/{target_type}/{id}").route(web::post().to(add_like)))
            .service(web::resource("/chats").route(web::get().to(list_chats)))
            .service(web::resource("/chats/{user_id}").route(web::post().to(open_chat)))
            .service(web::resource("/chats/{id}/messages").route(web::get().to(list_messages)))
            .service(web::resource("/messages").route(web::post().to(send_message)))
            .service(web::resource("/messages/unread-count").route(web::get().to(unread_count)))
            .service(web::resource("/users/{id}/rate").route(web::post().to(rate_for_help)))
            .service(
                web::resource("/users/{id}/reviews")
                    .route(web::get().to(list_reviews))
                    .route(web::post().to(add_review)),
            )
            .service(web::resource("/users/{id}/warnings").route(web::get().to(list_warnings)))
            .service(web::resource("/warnings/{id}/respond").route(web::post().to(respond_to_warning)))
            .service(
                web::resource("/reports")
                    .route(web::get().to(list_reports))
                    .route(web::post().to(file_report)),
            )
            .service(web::resource("/reports/{id}/process").route(web::post().to(process_report)))
            .service(
                web::resource("/profile/{id}").route(web::get().to(profile_page)),
            )
            .service(web::resource("/profile").route(web::put().to(update_profile)))
            .service(web::resource("/admin/users").route(web::get().to(admin_list_users)))
            .service(web::resource("/admin/users/{id}/warn").route(web::post().to(issue_warning)))
            .service(web::resource("/admin/users/{id}/block").route(web::post().to(block_user)))
            .service(web::resource("/admin/users/{id}/ban").route(web::post().to(ban_user)))
            .service(web::resource("/admin/actions").route(web::get().to(admin_list_actions))),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub limits: RateLimiterFacade,
}

// ---------------------------------------------------------------- auth

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = NewUser,
    responses(
        (status = 201, description = "Account created", body = User),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register(
    data: web::Data<AppState>,
    payload: web::Json<NewUser>,
) -> Result<HttpResponse, ApiError> {
    let new = payload.into_inner();
    if data.repo.find_user_by_email(&new.email).await?.is_some() {
        return Err(ApiError::Conflict);
    }
    // Accounts listed in ADMIN_EMAILS come up with the admin role.
    let role = if std::env::var("ADMIN_EMAILS")
        .map(|v| v.split(',').any(|e| e.trim().eq_ignore_ascii_case(&new.email)))
        .unwrap_or(false)
    {
        Role::Admin
    } else {
        Role::User
    };
    let hash = hash_password(&new.password);
    let user = data.repo.create_user(new, hash, role).await?;
    Ok(HttpResponse::Created().json(user))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = Credentials,
    responses(
        (status = 200, description = "JWT issued", body = TokenResponse),
        (status = 401, description = "Bad credentials or deactivated account")
    )
)]
pub async fn login(
    data: web::Data<AppState>,
    payload: web::Json<Credentials>,
) -> Result<HttpResponse, ApiError> {
    let creds = payload.into_inner();
    let user = data
        .repo
        .find_user_by_email(&creds.email)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    if !user.is_active || !verify_password(&creds.password, &user.password_hash) {
        return Err(ApiError::Unauthorized);
    }
    let token = create_jwt(user.id, user.role).map_err(|_| ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(TokenResponse { token, user }))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses((status = 200, description = "Current account", body = User))
)]
pub async fn auth_me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(user))
}

// ---------------------------------------------------------------- posts

#[utoipa::path(
    get,
    path = "/api/v1/posts",
    params(
        ("search" = Option<String>, Query, description = "Substring filter on title/content"),
        ("resolved" = Option<bool>, Query, description = "Filter by resolved flag"),
        ("limit" = Option<usize>, Query, description = "Page size"),
        ("offset" = Option<usize>, Query, description = "Page offset")
    ),
    responses((status = 200, description = "List posts", body = [Post]))
)]
pub async fn list_posts(
    data: web::Data<AppState>,
    query: web::Query<PostQuery>,
) -> Result<HttpResponse, ApiError> {
    let posts = data.repo.list_posts(query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(posts))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts",
    request_body = NewPost,
    responses(
        (status = 201, description = "Post created", body = Post),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn create_post(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewPost>,
) -> Result<HttpResponse, ApiError> {
    if !data.limits.allow_post(auth.user_id()) {
        return Err(ApiError::TooManyRequests);
    }
    let post = data.repo.create_post(auth.user_id(), payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(post))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post", body = Post),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    put,
    path = "/api/v1/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    request_body = UpdatePost,
    responses(
        (status = 200, description = "Updated post", body = Post),
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
    let id = path.into_inner();
    let post = data.repo.get_post(id).await?;
    if post.user_id != auth.user_id() {
        return Err(ApiError::Forbidden("not the author".into()));
    }
    let post = data.repo.update_post(id, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    delete,
    path = "/api/v1/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn delete_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let post = data.repo.get_post(id).await?;
    if post.user_id != auth.user_id() && !auth.is_admin() {
        return Err(ApiError::Forbidden("not the author".into()));
    }
    data.repo.delete_post(id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/api/v1/posts/{id}/resolve",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post marked resolved", body = Post),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn resolve_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let post = data.repo.get_post(id).await?;
    if post.user_id != auth.user_id() {
        return Err(ApiError::Forbidden("not the author".into()));
    }
    let post = data.repo.mark_post_resolved(id).await?;
    Ok(HttpResponse::Ok().json(post))
}

// ---------------------------------------------------------------- comments

#[utoipa::path(
    post,
    path = "/api/v1/comments",
    request_body = NewComment,
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 404, description = "Post not found")
    )
)]
pub async fn create_comment(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewComment>,
) -> Result<HttpResponse, ApiError> {
    let comment = data.repo.create_comment(auth.user_id(), payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(comment))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}/comments",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Comments, oldest first", body = [Comment]),
        (status = 404, description = "Post not found")
    )
)]
pub async fn list_comments(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let comments = data.repo.list_comments(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(comments))
}

// ---------------------------------------------------------------- courses

#[utoipa::path(
    post,
    path = "/api/v1/courses",
    request_body = NewCourse,
    responses((status = 201, description = "Course created", body = Course))
)]
pub async fn create_course(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewCourse>,
) -> Result<HttpResponse, ApiError> {
    let course = data.repo.create_course(auth.user_id(), payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(course))
}

#[derive(serde::Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/courses",
    params(("search" = Option<String>, Query, description = "Substring filter")),
    responses((status = 200, description = "List courses", body = [Course]))
)]
pub async fn list_courses(
    data: web::Data<AppState>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, ApiError> {
    let courses = data.repo.list_courses(query.into_inner().search).await?;
    Ok(HttpResponse::Ok().json(courses))
}

#[utoipa::path(
    get,
    path = "/api/v1/courses/{id}",
    params(("id" = Id, Path, description = "Course id")),
    responses(
        (status = 200, description = "Course", body = Course),
        (status = 404, description = "Course not found")
    )
)]
pub async fn get_course(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let course = data.repo.get_course(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(course))
}

// ---------------------------------------------------------------- bookmarks

#[utoipa::path(
    post,
    path = "/api/v1/bookmarks/{post_id}",
    params(("post_id" = Id, Path, description = "Post id")),
    responses(
        (status = 201, description = "Bookmark added"),
        (status = 200, description = "Already bookmarked"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn add_bookmark(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let created = data.repo.add_bookmark(auth.user_id(), path.into_inner()).await?;
    if created {
        Ok(HttpResponse::Created().finish())
    } else {
        Ok(HttpResponse::Ok().finish())
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/bookmarks/{post_id}",
    params(("post_id" = Id, Path, description = "Post id")),
    responses(
        (status = 204, description = "Bookmark removed"),
        (status = 404, description = "No such bookmark")
    )
)]
pub async fn remove_bookmark(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    data.repo.remove_bookmark(auth.user_id(), path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/api/v1/bookmarks",
    responses((status = 200, description = "Caller's bookmarks", body = [Bookmark]))
)]
pub async fn list_bookmarks(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let bookmarks = data.repo.list_bookmarks(auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(bookmarks))
}

// ---------------------------------------------------------------- snippets

#[utoipa::path(
    post,
    path = "/api/v1/snippets",
    request_body = NewCodeSnippet,
    responses(
        (status = 201, description = "Snippet created", body = CodeSnippet),
        (status = 404, description = "Parent not found")
    )
)]
pub async fn create_snippet(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewCodeSnippet>,
) -> Result<HttpResponse, ApiError> {
    let snippet = data.repo.create_snippet(auth.user_id(), payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(snippet))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}/snippets",
    params(("id" = Id, Path, description = "Post id")),
    responses((status = 200, description = "Snippets attached to the post", body = [CodeSnippet]))
)]
pub async fn list_snippets(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let snippets = data.repo.list_post_snippets(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(snippets))
}

// ---------------------------------------------------------------- likes

#[utoipa::path(
    post,
    path = "/api/v1/like/{target_type}/{id}",
    params(
        ("target_type" = String, Path, description = "post | comment | course | chat"),
        ("id" = Id, Path, description = "Target id")
    ),
    responses(
        (status = 201, description = "Like recorded", body = Like),
        (status = 200, description = "Already liked", body = Like),
        (status = 400, description = "Unknown target kind"),
        (status = 404, description = "Target not found")
    )
)]
pub async fn add_like(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<(String, Id)>,
) -> Result<HttpResponse, ApiError> {
    let (kind, id) = path.into_inner();
    let target = TargetType::parse(&kind)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown like target '{kind}'")))?;
    let (like, created) = data.repo.add_like(auth.user_id(), target, id).await?;
    if created {
        Ok(HttpResponse::Created().json(like))
    } else {
        Ok(HttpResponse::Ok().json(like))
    }
}

// ---------------------------------------------------------------- chat

#[utoipa::path(
    post,
    path = "/api/v1/chats/{user_id}",
    params(("user_id" = Id, Path, description = "The other participant")),
    responses(
        (status = 201, description = "Chat created", body = Chat),
        (status = 200, description = "Chat already existed", body = Chat),
        (status = 400, description = "Cannot chat with yourself"),
        (status = 403, description = "A participant is blocked"),
        (status = 404, description = "User not found")
    )
)]
pub async fn open_chat(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let (chat, created) = data.repo.get_or_create_chat(auth.user_id(), path.into_inner()).await?;
    if created {
        Ok(HttpResponse::Created().json(chat))
    } else {
        Ok(HttpResponse::Ok().json(chat))
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/chats",
    responses((status = 200, description = "Caller's chats", body = [Chat]))
)]
pub async fn list_chats(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let chats = data.repo.list_chats(auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(chats))
}

#[utoipa::path(
    get,
    path = "/api/v1/chats/{id}/messages",
    params(("id" = Id, Path, description = "Chat id")),
    responses(
        (status = 200, description = "Messages, oldest first", body = [Message]),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Chat not found")
    )
)]
pub async fn list_messages(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let chat_id = path.into_inner();
    let chat = data.repo.get_chat(chat_id).await?;
    if !chat.involves(auth.user_id()) {
        return Err(ApiError::Forbidden("not a participant of this chat".into()));
    }
    let messages = data.repo.list_messages(chat_id).await?;
    Ok(HttpResponse::Ok().json(messages))
}

#[utoipa::path(
    post,
    path = "/api/v1/messages",
    request_body = NewMessage,
    responses(
        (status = 201, description = "Message sent", body = Message),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Chat not found"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn send_message(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewMessage>,
) -> Result<HttpResponse, ApiError> {
    if !data.limits.allow_message(auth.user_id()) {
        return Err(ApiError::TooManyRequests);
    }
    let message = data.repo.send_message(auth.user_id(), payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(message))
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct UnreadCount {
    pub unread: i64,
}

#[utoipa::path(
    get,
    path = "/api/v1/messages/unread-count",
    responses((status = 200, description = "Unread messages across all chats", body = UnreadCount))
)]
pub async fn unread_count(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let unread = data.repo.unread_count(auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(UnreadCount { unread }))
}

// ---------------------------------------------------------------- reputation

#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/rate",
    params(("id" = Id, Path, description = "User being thanked")),
    responses(
        (status = 200, description = "Updated profile", body = ProfileView),
        (status = 400, description = "Self-rating or no shared chat"),
        (status = 404, description = "User not found"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn rate_for_help(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let target = path.into_inner();
    if !data.limits.rating_within_limit(auth.user_id(), target) {
        return Err(ApiError::TooManyRequests);
    }
    let profile = data.repo.rate_for_help(auth.user_id(), target).await?;
    // counted only once the rating lands, so a rejected attempt (self-rating,
    // no shared chat, unknown user) does not burn the slot
    data.limits.record_rating(auth.user_id(), target);
    Ok(HttpResponse::Ok().json(profile))
}

#[utoipa::path(
    get,
    path = "/api/v1/profile/{id}",
    params(("id" = Id, Path, description = "User id")),
    responses(
        (status = 200, description = "Public profile", body = ProfilePage),
        (status = 404, description = "User not found")
    )
)]
pub async fn profile_page(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    let user = data.repo.get_user(user_id).await?;
    let posts = data.repo.list_posts(PostQuery::default()).await?;
    let courses = data.repo.list_courses(None).await?;
    let reviews = data.repo.list_reviews_for(user_id).await?;
    let profile = data.repo.get_or_create_profile(user_id).await?;
    let page = ProfilePage {
        posts_count: posts.iter().filter(|p| p.user_id == user_id).count(),
        courses_count: courses.iter().filter(|c| c.user_id == user_id).count(),
        user,
        reviews,
        profile,
    };
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    put,
    path = "/api/v1/profile",
    request_body = UpdateProfile,
    responses((status = 200, description = "Updated account", body = User))
)]
pub async fn update_profile(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<UpdateProfile>,
) -> Result<HttpResponse, ApiError> {
    let user = data.repo.update_profile(auth.user_id(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

// ---------------------------------------------------------------- reviews

#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/reviews",
    params(("id" = Id, Path, description = "Reviewed user")),
    request_body = NewReview,
    responses(
        (status = 201, description = "Review added", body = Review),
        (status = 404, description = "User not found")
    )
)]
pub async fn add_review(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewReview>,
) -> Result<HttpResponse, ApiError> {
    let review = data
        .repo
        .add_review(auth.user_id(), path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(review))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}/reviews",
    params(("id" = Id, Path, description = "Reviewed user")),
    responses((status = 200, description = "Reviews, newest first", body = [Review]))
)]
pub async fn list_reviews(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let reviews = data.repo.list_reviews_for(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(reviews))
}

// ---------------------------------------------------------------- moderation

#[utoipa::path(
    post,
    path = "/api/v1/admin/users/{id}/warn",
    params(("id" = Id, Path, description = "Warned user")),
    request_body = NewWarning,
    responses(
        (status = 201, description = "Warning issued", body = UserWarning),
        (status = 403, description = "Admins only"),
        (status = 404, description = "User not found")
    )
)]
pub async fn issue_warning(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewWarning>,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;
    let warning = data
        .repo
        .issue_warning(auth.user_id(), path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(warning))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}/warnings",
    params(("id" = Id, Path, description = "User id")),
    responses(
        (status = 200, description = "Warnings for the user", body = [UserWarning]),
        (status = 403, description = "Not yours")
    )
)]
pub async fn list_warnings(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    if user_id != auth.user_id() {
        auth.require_admin()?;
    }
    let warnings = data.repo.list_warnings_for(user_id).await?;
    Ok(HttpResponse::Ok().json(warnings))
}

#[utoipa::path(
    post,
    path = "/api/v1/warnings/{id}/respond",
    params(("id" = Id, Path, description = "Warning id")),
    request_body = WarningReply,
    responses(
        (status = 200, description = "Warning acknowledged or disputed", body = UserWarning),
        (status = 403, description = "Not the warned user"),
        (status = 404, description = "Warning not found"),
        (status = 409, description = "Already responded")
    )
)]
pub async fn respond_to_warning(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<WarningReply>,
) -> Result<HttpResponse, ApiError> {
    let warning = data
        .repo
        .respond_to_warning(auth.user_id(), path.into_inner(), payload.response)
        .await?;
    Ok(HttpResponse::Ok().json(warning))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users/{id}/block",
    params(("id" = Id, Path, description = "User to block")),
    responses(
        (status = 200, description = "User blocked", body = User),
        (status = 400, description = "Fewer than three accepted warnings"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "User not found")
    )
)]
pub async fn block_user(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;
    let user = data.repo.block_user(auth.user_id(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users/{id}/ban",
    params(("id" = Id, Path, description = "User to ban")),
    responses(
        (status = 200, description = "Account deactivated", body = User),
        (status = 403, description = "Admins only"),
        (status = 404, description = "User not found")
    )
)]
pub async fn ban_user(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;
    let user = data.repo.ban_user(auth.user_id(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

// ---------------------------------------------------------------- reports

#[utoipa::path(
    post,
    path = "/api/v1/reports",
    request_body = NewReport,
    responses(
        (status = 201, description = "Report filed", body = Report),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn file_report(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewReport>,
) -> Result<HttpResponse, ApiError> {
    if !data.limits.allow_report(auth.user_id()) {
        return Err(ApiError::TooManyRequests);
    }
    let report = data.repo.file_report(auth.user_id(), payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(report))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports",
    responses(
        (status = 200, description = "Pending queue for admins, own reports otherwise", body = [Report])
    )
)]
pub async fn list_reports(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let reports = if auth.is_admin() {
        data.repo.list_pending_reports().await?
    } else {
        data.repo.list_reports_by(auth.user_id()).await?
    };
    Ok(HttpResponse::Ok().json(reports))
}

#[utoipa::path(
    post,
    path = "/api/v1/reports/{id}/process",
    params(("id" = Id, Path, description = "Report id")),
    request_body = ReportDecision,
    responses(
        (status = 200, description = "Report processed", body = Report),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Report not found"),
        (status = 409, description = "Already in a terminal status")
    )
)]
pub async fn process_report(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ReportDecision>,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;
    let report = data
        .repo
        .process_report(auth.user_id(), path.into_inner(), payload.action)
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

// ---------------------------------------------------------------- admin misc

#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    responses(
        (status = 200, description = "All accounts", body = [User]),
        (status = 403, description = "Admins only")
    )
)]
pub async fn admin_list_users(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;
    let users = data.repo.list_users().await?;
    Ok(HttpResponse::Ok().json(users))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/actions",
    responses(
        (status = 200, description = "Audit log, oldest first", body = [AdminAction]),
        (status = 403, description = "Admins only")
    )
)]
pub async fn admin_list_actions(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;
    let actions = data.repo.list_admin_actions().await?;
    Ok(HttpResponse::Ok().json(actions))
}
