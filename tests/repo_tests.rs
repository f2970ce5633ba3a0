#![cfg(feature = "inmem-store")]

use quorum::models::*;
use quorum::repo::inmem::InMemRepo;
use quorum::repo::RepoError;
// Bring trait method namespaces into scope so calls on InMemRepo resolve.
use quorum::repo::{
    ChatRepo, ContentRepo, EngagementRepo, ModerationRepo, ReputationRepo, UserRepo,
};

/// Helper that returns a fresh, empty repository for every test run.
fn repo() -> InMemRepo {
    // isolate state: do **not** persist to the default file path
    std::env::set_var("QUORUM_DATA_DIR", tempfile::tempdir().unwrap().path());
    InMemRepo::new()
}

async fn user(r: &InMemRepo, name: &str, role: Role) -> User {
    r.create_user(
        NewUser {
            username: name.into(),
            email: format!("{name}@example.com"),
            password: "pw".into(),
        },
        "x$y".into(),
        role,
    )
    .await
    .unwrap()
}

async fn post(r: &InMemRepo, author: Id, title: &str) -> Post {
    r.create_post(
        author,
        NewPost {
            title: title.into(),
            content: "body".into(),
            image_url: String::new(),
            code: String::new(),
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn double_like_counts_once() {
    let r = repo();
    let author = user(&r, "author", Role::User).await;
    let fan = user(&r, "fan", Role::User).await;
    let p = post(&r, author.id, "q").await;

    let (_, created) = r.add_like(fan.id, TargetType::Post, p.id).await.unwrap();
    assert!(created);
    let (_, created) = r.add_like(fan.id, TargetType::Post, p.id).await.unwrap();
    assert!(!created);

    assert_eq!(r.get_post(p.id).await.unwrap().likes_count, 1);
    assert_eq!(r.get_user(author.id).await.unwrap().post_likes_cnt, 1);
}

#[tokio::test]
async fn like_missing_target_is_not_found() {
    let r = repo();
    let fan = user(&r, "fan", Role::User).await;
    let err = r.add_like(fan.id, TargetType::Post, 999).await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
async fn chat_pair_is_idempotent_in_both_orderings() {
    let r = repo();
    let a = user(&r, "a", Role::User).await;
    let b = user(&r, "b", Role::User).await;

    let (chat, created) = r.get_or_create_chat(a.id, b.id).await.unwrap();
    assert!(created);
    let (same, created) = r.get_or_create_chat(b.id, a.id).await.unwrap();
    assert!(!created);
    assert_eq!(chat.id, same.id);

    let err = r.get_or_create_chat(a.id, a.id).await.unwrap_err();
    assert!(matches!(err, RepoError::SelfChat));
}

#[tokio::test]
async fn blocked_user_cannot_open_chats() {
    let r = repo();
    let admin = user(&r, "admin", Role::Admin).await;
    let a = user(&r, "a", Role::User).await;
    let b = user(&r, "b", Role::User).await;

    for _ in 0..3 {
        let w = r
            .issue_warning(
                admin.id,
                b.id,
                NewWarning { reason: "spam".into(), target_type: None, target_id: None },
            )
            .await
            .unwrap();
        r.respond_to_warning(b.id, w.id, WarningResponse::Accept).await.unwrap();
    }
    r.block_user(admin.id, b.id).await.unwrap();

    let err = r.get_or_create_chat(a.id, b.id).await.unwrap_err();
    assert!(matches!(err, RepoError::BlockedParticipant));
}

#[tokio::test]
async fn messages_compute_receiver_and_unread_count() {
    let r = repo();
    let a = user(&r, "a", Role::User).await;
    let b = user(&r, "b", Role::User).await;
    let (chat, _) = r.get_or_create_chat(a.id, b.id).await.unwrap();

    let m = r
        .send_message(
            a.id,
            NewMessage {
                chat_id: chat.id,
                content: "hi".into(),
                image_url: String::new(),
                is_code: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(m.receiver, b.id);

    assert_eq!(r.unread_count(b.id).await.unwrap(), 1);
    assert_eq!(r.unread_count(a.id).await.unwrap(), 0);

    let outsider = user(&r, "c", Role::User).await;
    let err = r
        .send_message(
            outsider.id,
            NewMessage {
                chat_id: chat.id,
                content: "intrude".into(),
                image_url: String::new(),
                is_code: false,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotParticipant));
}

#[tokio::test]
async fn rating_requires_shared_chat_and_clamps() {
    let r = repo();
    let helper = user(&r, "helper", Role::User).await;
    let rater = user(&r, "rater", Role::User).await;

    let err = r.rate_for_help(rater.id, rater.id).await.unwrap_err();
    assert!(matches!(err, RepoError::SelfRating));

    let err = r.rate_for_help(rater.id, helper.id).await.unwrap_err();
    assert!(matches!(err, RepoError::NoSharedChat));

    r.get_or_create_chat(rater.id, helper.id).await.unwrap();
    let profile = r.rate_for_help(rater.id, helper.id).await.unwrap();
    assert_eq!(profile.total_points, 2);
    assert_eq!(profile.rating, 1); // round(2 * 0.25) = 1 (away from zero)
    assert_eq!(r.get_user(helper.id).await.unwrap().chat_help_likes_cnt, 1);

    // saturate the cap: 29 more ratings land at 60 points, rating 15
    for _ in 0..29 {
        r.rate_for_help(rater.id, helper.id).await.unwrap();
    }
    let profile = r.rate_for_help(rater.id, helper.id).await.unwrap();
    assert_eq!(profile.total_points, 60);
    assert_eq!(profile.rating, 15);
}

#[tokio::test]
async fn fresh_profile_starts_at_zero() {
    let r = repo();
    let u = user(&r, "u", Role::User).await;
    let p = r.get_or_create_profile(u.id).await.unwrap();
    assert_eq!(p.total_points, 0);
    assert_eq!(p.rating, 0);
    // idempotent
    let again = r.get_or_create_profile(u.id).await.unwrap();
    assert_eq!(p.id, again.id);
}

#[tokio::test]
async fn block_needs_three_accepted_warnings() {
    let r = repo();
    let admin = user(&r, "admin", Role::Admin).await;
    let target = user(&r, "target", Role::User).await;

    let mut warning_ids = Vec::new();
    for i in 0..3 {
        let w = r
            .issue_warning(
                admin.id,
                target.id,
                NewWarning { reason: format!("offense {i}"), target_type: None, target_id: None },
            )
            .await
            .unwrap();
        assert_eq!(w.is_accepted, None);
        warning_ids.push(w.id);
    }

    // pending warnings do not count
    let err = r.block_user(admin.id, target.id).await.unwrap_err();
    assert!(matches!(err, RepoError::InsufficientWarnings));

    r.respond_to_warning(target.id, warning_ids[0], WarningResponse::Accept).await.unwrap();
    r.respond_to_warning(target.id, warning_ids[1], WarningResponse::Accept).await.unwrap();
    // a disputed warning does not count either
    r.respond_to_warning(target.id, warning_ids[2], WarningResponse::Dispute).await.unwrap();

    let err = r.block_user(admin.id, target.id).await.unwrap_err();
    assert!(matches!(err, RepoError::InsufficientWarnings));

    let w = r
        .issue_warning(
            admin.id,
            target.id,
            NewWarning { reason: "again".into(), target_type: None, target_id: None },
        )
        .await
        .unwrap();
    r.respond_to_warning(target.id, w.id, WarningResponse::Accept).await.unwrap();

    let blocked = r.block_user(admin.id, target.id).await.unwrap();
    assert!(blocked.is_blocked);
    assert!(blocked.is_active);
}

#[tokio::test]
async fn accepting_a_warning_deletes_the_named_content() {
    let r = repo();
    let admin = user(&r, "admin", Role::Admin).await;
    let target = user(&r, "target", Role::User).await;
    let p = post(&r, target.id, "offending").await;

    let w = r
        .issue_warning(
            admin.id,
            target.id,
            NewWarning {
                reason: "rule 1".into(),
                target_type: Some(ContentKind::Post),
                target_id: Some(p.id),
            },
        )
        .await
        .unwrap();

    // only the warned user may respond
    let err = r
        .respond_to_warning(admin.id, w.id, WarningResponse::Accept)
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotParticipant));

    let w = r.respond_to_warning(target.id, w.id, WarningResponse::Accept).await.unwrap();
    assert_eq!(w.is_accepted, Some(true));
    assert!(matches!(r.get_post(p.id).await.unwrap_err(), RepoError::NotFound));

    // responding twice is a conflict
    let err = r
        .respond_to_warning(target.id, w.id, WarningResponse::Accept)
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict));
}

#[tokio::test]
async fn disputing_a_warning_files_a_report() {
    let r = repo();
    let admin = user(&r, "admin", Role::Admin).await;
    let target = user(&r, "target", Role::User).await;

    let w = r
        .issue_warning(
            admin.id,
            target.id,
            NewWarning { reason: "too harsh".into(), target_type: None, target_id: None },
        )
        .await
        .unwrap();
    let w = r.respond_to_warning(target.id, w.id, WarningResponse::Dispute).await.unwrap();
    assert_eq!(w.is_accepted, Some(false));

    let reports = r.list_reports_by(target.id).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].target_type, ReportTarget::Warning);
    assert_eq!(reports[0].target_id, w.id);
    assert_eq!(reports[0].status, ReportStatus::Pending);
}

#[tokio::test]
async fn report_processing_is_terminal() {
    let r = repo();
    let admin = user(&r, "admin", Role::Admin).await;
    let reporter = user(&r, "reporter", Role::User).await;

    // no target-existence validation on filing
    let report = r
        .file_report(
            reporter.id,
            NewReport {
                target_type: ReportTarget::Post,
                target_id: 424242,
                description: "spam".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(report.status, ReportStatus::Pending);
    assert!(report.resolved_at.is_none());

    let processed = r.process_report(admin.id, report.id, ReportAction::Accept).await.unwrap();
    assert_eq!(processed.status, ReportStatus::Resolved);
    assert_eq!(processed.processed_by, Some(admin.id));
    let first_resolved_at = processed.resolved_at.unwrap();

    let err = r
        .process_report(admin.id, report.id, ReportAction::Reject)
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict));

    // resolved_at did not move
    let pending = r.list_pending_reports().await.unwrap();
    assert!(pending.is_empty());
    let mine = r.list_reports_by(reporter.id).await.unwrap();
    assert_eq!(mine[0].resolved_at.unwrap(), first_resolved_at);
}

#[tokio::test]
async fn processing_grows_the_admin_tally() {
    let r = repo();
    let admin = user(&r, "admin", Role::Admin).await;
    let reporter = user(&r, "reporter", Role::User).await;

    for i in 0..2 {
        let report = r
            .file_report(
                reporter.id,
                NewReport {
                    target_type: ReportTarget::Comment,
                    target_id: i,
                    description: "abuse".into(),
                },
            )
            .await
            .unwrap();
        r.process_report(admin.id, report.id, ReportAction::Reject).await.unwrap();
    }

    // profile was created lazily by the first processed report
    let actions = r.list_admin_actions().await.unwrap();
    let processed: Vec<_> = actions
        .iter()
        .filter(|a| a.action_type == AdminActionKind::ReportProcessed)
        .collect();
    assert_eq!(processed.len(), 2);
}

#[tokio::test]
async fn moderation_trail_for_a_full_block() {
    let r = repo();
    let admin = user(&r, "admin", Role::Admin).await;
    let target = user(&r, "target", Role::User).await;

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
    r.block_user(admin.id, target.id).await.unwrap();

    let actions = r.list_admin_actions().await.unwrap();
    let warnings = actions
        .iter()
        .filter(|a| a.action_type == AdminActionKind::WarningCreated)
        .count();
    let blocks = actions
        .iter()
        .filter(|a| a.action_type == AdminActionKind::UserBlocked)
        .count();
    assert_eq!(warnings, 3);
    assert_eq!(blocks, 1);
    assert!(r.get_user(target.id).await.unwrap().is_blocked);
}

#[tokio::test]
async fn ban_deactivates_without_warnings() {
    let r = repo();
    let admin = user(&r, "admin", Role::Admin).await;
    let target = user(&r, "target", Role::User).await;

    let banned = r.ban_user(admin.id, target.id).await.unwrap();
    assert!(!banned.is_active);
    assert!(!banned.is_blocked);

    let actions = r.list_admin_actions().await.unwrap();
    assert!(actions.iter().any(|a| a.action_type == AdminActionKind::UserBanned));
}

#[tokio::test]
async fn bookmarks_are_idempotent_and_removable() {
    let r = repo();
    let u = user(&r, "u", Role::User).await;
    let p = post(&r, u.id, "keep").await;

    assert!(r.add_bookmark(u.id, p.id).await.unwrap());
    assert!(!r.add_bookmark(u.id, p.id).await.unwrap());
    assert_eq!(r.list_bookmarks(u.id).await.unwrap().len(), 1);

    r.remove_bookmark(u.id, p.id).await.unwrap();
    assert!(r.list_bookmarks(u.id).await.unwrap().is_empty());
    let err = r.remove_bookmark(u.id, p.id).await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
async fn post_search_and_pagination() {
    let r = repo();
    let u = user(&r, "u", Role::User).await;
    post(&r, u.id, "Rust lifetimes").await;
    post(&r, u.id, "Python asyncio").await;
    post(&r, u.id, "rust traits").await;

    let hits = r
        .list_posts(PostQuery { search: Some("rust".into()), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);

    let page = r
        .list_posts(PostQuery { limit: Some(2), offset: Some(2), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
}

#[tokio::test]
async fn counters_track_questions_and_answers() {
    let r = repo();
    let asker = user(&r, "asker", Role::User).await;
    let answerer = user(&r, "answerer", Role::User).await;
    let p = post(&r, asker.id, "how?").await;

    r.create_comment(
        answerer.id,
        NewComment {
            post_id: p.id,
            content: "like this".into(),
            code: String::new(),
            image_url: String::new(),
        },
    )
    .await
    .unwrap();

    assert_eq!(r.get_user(asker.id).await.unwrap().total_questions, 1);
    assert_eq!(r.get_user(answerer.id).await.unwrap().total_answers, 1);
}
