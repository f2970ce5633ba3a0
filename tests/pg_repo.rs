#![cfg(feature = "postgres-store")]

//! Smoke tests against a live Postgres. They run only when DATABASE_URL is
//! set (CI spins one up); otherwise each test exits early.

use quorum::models::*;
use quorum::pg::PgRepo;
use quorum::repo::{ChatRepo, EngagementRepo, ModerationRepo, ReputationRepo, UserRepo};
use sqlx::postgres::PgPoolOptions;

async fn connect() -> Option<PgRepo> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new().max_connections(2).connect(&url).await.ok()?;
    sqlx::migrate!().run(&pool).await.ok()?;
    Some(PgRepo::new(pool))
}

fn unique(name: &str) -> String {
    format!("{name}-{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

async fn seed(r: &PgRepo, name: &str, role: Role) -> User {
    let name = unique(name);
    r.create_user(
        NewUser {
            username: name.clone(),
            email: format!("{name}@example.com"),
            password: "pw".into(),
        },
        "x$y".into(),
        role,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn like_and_chat_uniqueness() {
    let Some(r) = connect().await else { return };
    let a = seed(&r, "a", Role::User).await;
    let b = seed(&r, "b", Role::User).await;

    let (chat, created) = r.get_or_create_chat(a.id, b.id).await.unwrap();
    assert!(created);
    let (same, created) = r.get_or_create_chat(b.id, a.id).await.unwrap();
    assert!(!created);
    assert_eq!(chat.id, same.id);

    let (_, created) = r.add_like(a.id, TargetType::Chat, chat.id).await.unwrap();
    assert!(created);
    let (_, created) = r.add_like(a.id, TargetType::Chat, chat.id).await.unwrap();
    assert!(!created);
    assert_eq!(r.get_chat(chat.id).await.unwrap().chat_likes_cnt, 1);
}

#[tokio::test]
async fn warning_accrual_and_block() {
    let Some(r) = connect().await else { return };
    let admin = seed(&r, "admin", Role::Admin).await;
    let target = seed(&r, "target", Role::User).await;

    for i in 0..3 {
        let w = r
            .issue_warning(
                admin.id,
                target.id,
                NewWarning { reason: format!("w{i}"), target_type: None, target_id: None },
            )
            .await
            .unwrap();
        r.respond_to_warning(target.id, w.id, WarningResponse::Accept).await.unwrap();
    }
    let blocked = r.block_user(admin.id, target.id).await.unwrap();
    assert!(blocked.is_blocked);
}

#[tokio::test]
async fn rating_clamps_at_sixty_points() {
    let Some(r) = connect().await else { return };
    let helper = seed(&r, "helper", Role::User).await;
    let rater = seed(&r, "rater", Role::User).await;
    r.get_or_create_chat(rater.id, helper.id).await.unwrap();

    let mut profile = r.get_or_create_profile(helper.id).await.unwrap();
    for _ in 0..31 {
        profile = r.rate_for_help(rater.id, helper.id).await.unwrap();
    }
    assert_eq!(profile.total_points, 60);
    assert_eq!(profile.rating, 15);
}
