#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use quorum::auth::create_jwt;
use quorum::models::*;
use quorum::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use quorum::repo::inmem::InMemRepo;
use quorum::repo::UserRepo;
use quorum::{config, AppState, SecurityHeaders};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

// Helper to ensure JWT secret present & unique temp data dir per test
fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("QUORUM_DATA_DIR", tmp.path().to_str().unwrap());
}

fn limits(enabled: bool) -> RateLimiterFacade {
    let cfg = RateLimitConfig {
        post_limit: 100,
        post_window: Duration::from_secs(60),
        message_limit: 100,
        message_window: Duration::from_secs(60),
        report_limit: 100,
        report_window: Duration::from_secs(60),
        rating_limit: 1,
        rating_window: Duration::from_secs(60),
    };
    RateLimiterFacade::new(InMemoryRateLimiter::new(enabled), cfg)
}

async fn seed_user(repo: &InMemRepo, name: &str, role: Role) -> (Id, String) {
    let user = repo
        .create_user(
            NewUser {
                username: name.into(),
                email: format!("{name}@example.com"),
                password: "pw".into(),
            },
            "x$y".into(),
            role,
        )
        .await
        .unwrap();
    let token = create_jwt(user.id, role).unwrap();
    (user.id, token)
}

fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}

#[actix_web::test]
#[serial]
async fn register_login_me_flow() {
    setup_env();
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(repo),
                limits: limits(false),
            }))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(&serde_json::json!({
            "username": "alice", "email": "alice@example.com", "password": "s3cret"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let user: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert!(user.get("password_hash").is_none());

    // duplicate email is a conflict
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(&serde_json::json!({
            "username": "alice2", "email": "alice@example.com", "password": "s3cret"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);

    // bad password
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .set_json(&serde_json::json!({"email": "alice@example.com", "password": "wrong"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .set_json(&serde_json::json!({"email": "alice@example.com", "password": "s3cret"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let token = body["token"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri("/api/v1/auth/me")
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let me: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(me["username"], "alice");
    assert_eq!(me["role"], "user");
}

#[actix_web::test]
#[serial]
async fn post_comment_like_flow() {
    setup_env();
    let repo = InMemRepo::new();
    let (author_id, author) = seed_user(&repo, "author", Role::User).await;
    let (_, fan) = seed_user(&repo, "fan", Role::User).await;
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(repo),
                limits: limits(false),
            }))
            .configure(config),
    )
    .await;

    // unauthenticated create is rejected
    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .set_json(&serde_json::json!({"title": "q", "content": "body"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header(bearer(&author))
        .set_json(&serde_json::json!({"title": "Borrow checker?", "content": "help"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let post: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let post_id = post["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v1/comments")
        .insert_header(bearer(&fan))
        .set_json(&serde_json::json!({"post_id": post_id, "content": "use clone"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    // first like creates, second is a no-op success
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/like/post/{post_id}"))
        .insert_header(bearer(&fan))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/like/post/{post_id}"))
        .insert_header(bearer(&fan))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    // unknown like kind is a 400 at the boundary
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/like/thread/{post_id}"))
        .insert_header(bearer(&fan))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/posts/{post_id}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let post: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(post["likes_count"], 1);

    // only the author edits their post, and untouched fields survive
    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/posts/{post_id}"))
        .insert_header(bearer(&fan))
        .set_json(&serde_json::json!({"title": "hijacked"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/posts/{post_id}"))
        .insert_header(bearer(&author))
        .set_json(&serde_json::json!({"title": "Borrow checker woes"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let edited: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(edited["title"], "Borrow checker woes");
    assert_eq!(edited["content"], "help");
    assert_eq!(edited["likes_count"], 1);

    // only the author resolves their post
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/posts/{post_id}/resolve"))
        .insert_header(bearer(&fan))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/posts/{post_id}/resolve"))
        .insert_header(bearer(&author))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    // profile page aggregates author activity
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/profile/{author_id}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let page: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(page["posts_count"], 1);
    assert_eq!(page["user"]["post_likes_cnt"], 1);
    assert_eq!(page["profile"]["rating"], 0);
}

#[actix_web::test]
#[serial]
async fn chat_message_and_rating_flow() {
    setup_env();
    let repo = InMemRepo::new();
    let (helper_id, helper) = seed_user(&repo, "helper", Role::User).await;
    let (_, rater) = seed_user(&repo, "rater", Role::User).await;
    let (_, outsider) = seed_user(&repo, "outsider", Role::User).await;
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(repo),
                limits: limits(true),
            }))
            .configure(config),
    )
    .await;

    // rating without a shared chat is rejected
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/users/{helper_id}/rate"))
        .insert_header(bearer(&rater))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/chats/{helper_id}"))
        .insert_header(bearer(&rater))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let chat: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let chat_id = chat["id"].as_i64().unwrap();

    // reopening the pair returns the existing chat
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/chats/{helper_id}"))
        .insert_header(bearer(&rater))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::post()
        .uri("/api/v1/messages")
        .insert_header(bearer(&rater))
        .set_json(&serde_json::json!({"chat_id": chat_id, "content": "thanks!"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    // the helper has one unread message
    let req = test::TestRequest::get()
        .uri("/api/v1/messages/unread-count")
        .insert_header(bearer(&helper))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["unread"], 1);

    // non-participants cannot read the transcript
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/chats/{chat_id}/messages"))
        .insert_header(bearer(&outsider))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    // the rejected attempt above did not consume the rating slot:
    // the first real rating goes through, the second hits the limiter
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/users/{helper_id}/rate"))
        .insert_header(bearer(&rater))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let profile: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(profile["total_points"], 2);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/users/{helper_id}/rate"))
        .insert_header(bearer(&rater))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 429);
}

#[actix_web::test]
#[serial]
async fn moderation_flow_over_http() {
    setup_env();
    let repo = InMemRepo::new();
    let (_, admin) = seed_user(&repo, "admin", Role::Admin).await;
    let (target_id, target) = seed_user(&repo, "target", Role::User).await;
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(repo),
                limits: limits(false),
            }))
            .configure(config),
    )
    .await;

    // plain users cannot warn
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/admin/users/{target_id}/warn"))
        .insert_header(bearer(&target))
        .set_json(&serde_json::json!({"reason": "nope"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    let mut warning_ids = Vec::new();
    for i in 0..3 {
        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/admin/users/{target_id}/warn"))
            .insert_header(bearer(&admin))
            .set_json(&serde_json::json!({"reason": format!("offense {i}")}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
        let w: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        warning_ids.push(w["id"].as_i64().unwrap());
    }

    // blocking before any acceptance is a 400
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/admin/users/{target_id}/block"))
        .insert_header(bearer(&admin))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    for id in &warning_ids {
        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/warnings/{id}/respond"))
            .insert_header(bearer(&target))
            .set_json(&serde_json::json!({"response": "accept"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/admin/users/{target_id}/block"))
        .insert_header(bearer(&admin))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let blocked: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(blocked["is_blocked"], true);

    // audit trail: three warnings plus one block
    let req = test::TestRequest::get()
        .uri("/api/v1/admin/actions")
        .insert_header(bearer(&admin))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let actions: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let actions = actions.as_array().unwrap();
    assert_eq!(
        actions.iter().filter(|a| a["action_type"] == "warning_created").count(),
        3
    );
    assert_eq!(
        actions.iter().filter(|a| a["action_type"] == "user_blocked").count(),
        1
    );
}

#[actix_web::test]
#[serial]
async fn report_triage_over_http() {
    setup_env();
    let repo = InMemRepo::new();
    let (_, admin) = seed_user(&repo, "admin", Role::Admin).await;
    let (_, reporter) = seed_user(&repo, "reporter", Role::User).await;
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(repo),
                limits: limits(false),
            }))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/reports")
        .insert_header(bearer(&reporter))
        .set_json(&serde_json::json!({
            "target_type": "post", "target_id": 999, "description": "spam"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let report: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let report_id = report["id"].as_i64().unwrap();

    // admins see the pending queue, reporters see their own
    let req = test::TestRequest::get()
        .uri("/api/v1/reports")
        .insert_header(bearer(&admin))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let queue: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(queue.as_array().unwrap().len(), 1);

    // non-admins cannot process
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/reports/{report_id}/process"))
        .insert_header(bearer(&reporter))
        .set_json(&serde_json::json!({"action": "accept"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/reports/{report_id}/process"))
        .insert_header(bearer(&admin))
        .set_json(&serde_json::json!({"action": "accept"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let processed: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(processed["status"], "resolved");

    // terminal reports cannot be reprocessed
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/reports/{report_id}/process"))
        .insert_header(bearer(&admin))
        .set_json(&serde_json::json!({"action": "reject"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);

    // the reporter still sees their resolved report
    let req = test::TestRequest::get()
        .uri("/api/v1/reports")
        .insert_header(bearer(&reporter))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let mine: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(mine[0]["status"], "resolved");
}

#[actix_web::test]
#[serial]
async fn security_headers_present() {
    setup_env();
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(repo),
                limits: limits(false),
            }))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/posts").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert_eq!(resp.headers().get("x-frame-options").unwrap(), "DENY");
    assert!(resp.headers().get("content-security-policy").is_some());
}
