use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use crate::models::*;

/// Domain outcome taxonomy. Everything here is a tagged result the caller can
/// branch on; free-text messages are for humans only.
#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("cannot chat with yourself")]
    SelfChat,
    #[error("cannot rate yourself")]
    SelfRating,
    #[error("no shared chat with this user")]
    NoSharedChat,
    #[error("a chat participant is blocked")]
    BlockedParticipant,
    #[error("not a participant of this chat")]
    NotParticipant,
    #[error("not enough accepted warnings to block")]
    InsufficientWarnings,
    #[error("internal: {0}")]
    Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser, password_hash: String, role: Role) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User>;
    async fn list_users(&self) -> RepoResult<Vec<User>>;
}

#[async_trait]
pub trait ContentRepo: Send + Sync {
    async fn create_post(&self, user: Id, new: NewPost) -> RepoResult<Post>;
    async fn list_posts(&self, q: PostQuery) -> RepoResult<Vec<Post>>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post>;
    async fn delete_post(&self, id: Id) -> RepoResult<()>;
    async fn mark_post_resolved(&self, id: Id) -> RepoResult<Post>;
    async fn create_comment(&self, user: Id, new: NewComment) -> RepoResult<Comment>;
    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>>;
    async fn create_course(&self, user: Id, new: NewCourse) -> RepoResult<Course>;
    async fn list_courses(&self, search: Option<String>) -> RepoResult<Vec<Course>>;
    async fn get_course(&self, id: Id) -> RepoResult<Course>;
    async fn add_bookmark(&self, user: Id, post_id: Id) -> RepoResult<bool>;
    async fn remove_bookmark(&self, user: Id, post_id: Id) -> RepoResult<()>;
    async fn list_bookmarks(&self, user: Id) -> RepoResult<Vec<Bookmark>>;
    async fn create_snippet(&self, user: Id, new: NewCodeSnippet) -> RepoResult<CodeSnippet>;
    async fn list_post_snippets(&self, post_id: Id) -> RepoResult<Vec<CodeSnippet>>;
    async fn add_review(&self, user: Id, target_user: Id, new: NewReview) -> RepoResult<Review>;
    async fn list_reviews_for(&self, target_user: Id) -> RepoResult<Vec<Review>>;
}

/// The polymorphic like ledger. No removal operation exists by design.
#[async_trait]
pub trait EngagementRepo: Send + Sync {
    /// Get-or-create on (user, target). The bool is true only when a row was
    /// actually created, which is the only case that bumps counters.
    async fn add_like(&self, user: Id, target: TargetType, target_id: Id) -> RepoResult<(Like, bool)>;
}

#[async_trait]
pub trait ChatRepo: Send + Sync {
    /// Idempotent for the unordered pair; the bool reports actual creation.
    async fn get_or_create_chat(&self, a: Id, b: Id) -> RepoResult<(Chat, bool)>;
    async fn get_chat(&self, id: Id) -> RepoResult<Chat>;
    async fn list_chats(&self, user: Id) -> RepoResult<Vec<Chat>>;
    async fn send_message(&self, sender: Id, new: NewMessage) -> RepoResult<Message>;
    async fn list_messages(&self, chat_id: Id) -> RepoResult<Vec<Message>>;
    async fn unread_count(&self, user: Id) -> RepoResult<i64>;
}

/// Warning accrual, block/ban transitions and report triage. Callers are
/// expected to have passed the admin role check already; every mutation here
/// pairs with exactly one audit row in the same transaction.
#[async_trait]
pub trait ModerationRepo: Send + Sync {
    async fn issue_warning(&self, admin_user: Id, target_user: Id, new: NewWarning) -> RepoResult<UserWarning>;
    async fn respond_to_warning(&self, user: Id, warning_id: Id, response: WarningResponse) -> RepoResult<UserWarning>;
    async fn list_warnings_for(&self, user: Id) -> RepoResult<Vec<UserWarning>>;
    async fn block_user(&self, admin_user: Id, target_user: Id) -> RepoResult<User>;
    async fn ban_user(&self, admin_user: Id, target_user: Id) -> RepoResult<User>;
    async fn file_report(&self, user: Id, new: NewReport) -> RepoResult<Report>;
    async fn list_pending_reports(&self) -> RepoResult<Vec<Report>>;
    async fn list_reports_by(&self, user: Id) -> RepoResult<Vec<Report>>;
    async fn process_report(&self, admin_user: Id, report_id: Id, action: ReportAction) -> RepoResult<Report>;
    async fn list_admin_actions(&self) -> RepoResult<Vec<AdminAction>>;
}

#[async_trait]
pub trait ReputationRepo: Send + Sync {
    async fn get_or_create_profile(&self, user: Id) -> RepoResult<ProfileView>;
    /// "Rate for help": +1 help counter, +2 points (capped at 60), rating
    /// recomputed. Repeat ratings from the same rater are allowed.
    async fn rate_for_help(&self, rater: Id, target_user: Id) -> RepoResult<ProfileView>;
}

pub trait Repo:
    UserRepo + ContentRepo + EngagementRepo + ChatRepo + ModerationRepo + ReputationRepo
{
}

impl<T> Repo for T where
    T: UserRepo + ContentRepo + EngagementRepo + ChatRepo + ModerationRepo + ReputationRepo
{
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::path::{Path, PathBuf};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, User>,
        posts: HashMap<Id, Post>,
        comments: HashMap<Id, Comment>,
        courses: HashMap<Id, Course>,
        bookmarks: HashMap<Id, Bookmark>,
        chats: HashMap<Id, Chat>,
        messages: HashMap<Id, Message>,
        snippets: HashMap<Id, CodeSnippet>,
        reviews: HashMap<Id, Review>,
        likes: HashMap<Id, Like>,
        warnings: HashMap<Id, UserWarning>,
        reports: HashMap<Id, Report>,
        admin_profiles: HashMap<Id, AdminProfile>,
        admin_actions: HashMap<Id, AdminAction>,
        profiles: HashMap<Id, ProfileView>,
        next_id: Id,
    }

    impl State {
        fn next_id(&mut self) -> Id {
            self.next_id += 1;
            self.next_id
        }

        /// Look up the target's author for per-category like counters.
        fn like_author(&self, target: TargetType, target_id: Id) -> Option<Id> {
            match target {
                TargetType::Post => self.posts.get(&target_id).map(|p| p.user_id),
                TargetType::Comment => self.comments.get(&target_id).map(|c| c.user_id),
                TargetType::Course => self.courses.get(&target_id).map(|c| c.user_id),
                // chat likes are counted on the chat row, not a user
                TargetType::Chat => None,
            }
        }

        fn find_chat_pair(&self, a: Id, b: Id) -> Option<Chat> {
            self.chats
                .values()
                .find(|c| (c.user1 == a && c.user2 == b) || (c.user1 == b && c.user2 == a))
                .cloned()
        }

        /// Materialize the one-to-one admin extension on first use.
        fn ensure_admin_profile(&mut self, admin_user: Id) -> RepoResult<AdminProfile> {
            if !self.users.contains_key(&admin_user) {
                return Err(RepoError::NotFound);
            }
            if let Some(p) = self.admin_profiles.values().find(|p| p.user_id == admin_user) {
                return Ok(p.clone());
            }
            let id = self.next_id();
            let profile = AdminProfile {
                id,
                user_id: admin_user,
                problems_resolved_count: 0,
                created_at: Utc::now(),
            };
            self.admin_profiles.insert(id, profile.clone());
            Ok(profile)
        }

        fn append_action(&mut self, admin_id: Id, kind: AdminActionKind, target_id: Id, details: String) {
            let id = self.next_id();
            self.admin_actions.insert(
                id,
                AdminAction {
                    id,
                    admin_id,
                    action_type: kind,
                    target_id,
                    details,
                    created_at: Utc::now(),
                },
            );
        }

        fn delete_content(&mut self, kind: ContentKind, id: Id) {
            // best effort: the item may already be gone
            match kind {
                ContentKind::Post => {
                    self.posts.remove(&id);
                    self.comments.retain(|_, c| c.post_id != id);
                }
                ContentKind::Comment => {
                    self.comments.remove(&id);
                }
                ContentKind::Course => {
                    self.courses.remove(&id);
                }
            }
        }
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn data_dir() -> PathBuf {
            std::env::var("QUORUM_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data"))
        }

        fn snapshot_path() -> PathBuf {
            if std::env::var("QUORUM_DATA_DIR").is_ok() {
                let mut p = Self::data_dir();
                p.push("state.json");
                p
            } else {
                PathBuf::from(SNAPSHOT_PATH)
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            let snapshot = {
                let s = match self.state.read() {
                    Ok(s) => s,
                    Err(_) => return,
                };
                serde_json::to_vec_pretty(&*s)
            };
            if let Ok(bytes) = snapshot {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, bytes) {
                    log::error!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn read(&self) -> RepoResult<std::sync::RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|e| RepoError::Internal(e.to_string()))
        }

        fn write(&self) -> RepoResult<std::sync::RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|e| RepoError::Internal(e.to_string()))
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser, password_hash: String, role: Role) -> RepoResult<User> {
            let user = {
                let mut s = self.write()?;
                if s.users.values().any(|u| u.email == new.email || u.username == new.username) {
                    return Err(RepoError::Conflict);
                }
                let id = s.next_id();
                let user = User {
                    id,
                    username: new.username,
                    email: new.email,
                    password_hash,
                    profile_img_url: String::new(),
                    role,
                    is_blocked: false,
                    is_active: true,
                    total_questions: 0,
                    total_answers: 0,
                    post_likes_cnt: 0,
                    comment_likes_cnt: 0,
                    course_likes_cnt: 0,
                    chat_help_likes_cnt: 0,
                    created_at: Utc::now(),
                };
                s.users.insert(id, user.clone());
                user
            };
            self.persist();
            Ok(user)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.read()?;
            s.users.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
            let s = self.read()?;
            Ok(s.users.values().find(|u| u.email == email).cloned())
        }

        async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User> {
            let user = {
                let mut s = self.write()?;
                if let Some(ref name) = upd.username {
                    if s.users.values().any(|u| u.username == *name && u.id != id) {
                        return Err(RepoError::Conflict);
                    }
                }
                let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
                if let Some(name) = upd.username {
                    user.username = name;
                }
                if let Some(url) = upd.profile_img_url {
                    user.profile_img_url = url;
                }
                user.clone()
            };
            self.persist();
            Ok(user)
        }

        async fn list_users(&self) -> RepoResult<Vec<User>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.users.values().cloned().collect();
            v.sort_by_key(|u| u.id);
            Ok(v)
        }
    }

    #[async_trait]
    impl ContentRepo for InMemRepo {
        async fn create_post(&self, user: Id, new: NewPost) -> RepoResult<Post> {
            let post = {
                let mut s = self.write()?;
                if !s.users.contains_key(&user) {
                    return Err(RepoError::NotFound);
                }
                let id = s.next_id();
                let post = Post {
                    id,
                    user_id: user,
                    title: new.title,
                    content: new.content,
                    image_url: new.image_url,
                    code: new.code,
                    likes_count: 0,
                    created_at: Utc::now(),
                    is_resolved: false,
                };
                s.posts.insert(id, post.clone());
                if let Some(u) = s.users.get_mut(&user) {
                    u.total_questions += 1;
                }
                post
            };
            self.persist();
            Ok(post)
        }

        async fn list_posts(&self, q: PostQuery) -> RepoResult<Vec<Post>> {
            let s = self.read()?;
            let needle = q.search.as_deref().map(str::to_lowercase);
            let mut v: Vec<_> = s
                .posts
                .values()
                .filter(|p| match &needle {
                    Some(n) => {
                        p.title.to_lowercase().contains(n) || p.content.to_lowercase().contains(n)
                    }
                    None => true,
                })
                .filter(|p| match q.resolved {
                    Some(r) => p.is_resolved == r,
                    None => true,
                })
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            let offset = q.offset.unwrap_or(0);
            let limit = q.limit.unwrap_or(usize::MAX);
            Ok(v.into_iter().skip(offset).take(limit).collect())
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let s = self.read()?;
            s.posts.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            {
                let mut s = self.write()?;
                if s.posts.remove(&id).is_none() {
                    return Err(RepoError::NotFound);
                }
                s.comments.retain(|_, c| c.post_id != id);
                s.bookmarks.retain(|_, b| b.post_id != id);
            }
            self.persist();
            Ok(())
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            let post = {
                let mut s = self.write()?;
                let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
                if let Some(title) = upd.title {
                    post.title = title;
                }
                if let Some(content) = upd.content {
                    post.content = content;
                }
                if let Some(url) = upd.image_url {
                    post.image_url = url;
                }
                if let Some(code) = upd.code {
                    post.code = code;
                }
                post.clone()
            };
            self.persist();
            Ok(post)
        }

        async fn mark_post_resolved(&self, id: Id) -> RepoResult<Post> {
            let post = {
                let mut s = self.write()?;
                let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
                post.is_resolved = true;
                post.clone()
            };
            self.persist();
            Ok(post)
        }

        async fn create_comment(&self, user: Id, new: NewComment) -> RepoResult<Comment> {
            let comment = {
                let mut s = self.write()?;
                if !s.posts.contains_key(&new.post_id) {
                    return Err(RepoError::NotFound);
                }
                let id = s.next_id();
                let comment = Comment {
                    id,
                    post_id: new.post_id,
                    user_id: user,
                    content: new.content,
                    code: new.code,
                    image_url: new.image_url,
                    likes_count: 0,
                    created_at: Utc::now(),
                };
                s.comments.insert(id, comment.clone());
                if let Some(u) = s.users.get_mut(&user) {
                    u.total_answers += 1;
                }
                comment
            };
            self.persist();
            Ok(comment)
        }

        async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
            let s = self.read()?;
            if !s.posts.contains_key(&post_id) {
                return Err(RepoError::NotFound);
            }
            let mut v: Vec<_> = s
                .comments
                .values()
                .filter(|c| c.post_id == post_id)
                .cloned()
                .collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(v)
        }

        async fn create_course(&self, user: Id, new: NewCourse) -> RepoResult<Course> {
            let course = {
                let mut s = self.write()?;
                if !s.users.contains_key(&user) {
                    return Err(RepoError::NotFound);
                }
                let id = s.next_id();
                let course = Course {
                    id,
                    user_id: user,
                    title: new.title,
                    image_url: new.image_url,
                    content: new.content,
                    code: new.code,
                    likes_count: 0,
                    created_at: Utc::now(),
                };
                s.courses.insert(id, course.clone());
                course
            };
            self.persist();
            Ok(course)
        }

        async fn list_courses(&self, search: Option<String>) -> RepoResult<Vec<Course>> {
            let s = self.read()?;
            let needle = search.as_deref().map(str::to_lowercase);
            let mut v: Vec<_> = s
                .courses
                .values()
                .filter(|c| match &needle {
                    Some(n) => {
                        c.title.to_lowercase().contains(n) || c.content.to_lowercase().contains(n)
                    }
                    None => true,
                })
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }

        async fn get_course(&self, id: Id) -> RepoResult<Course> {
            let s = self.read()?;
            s.courses.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn add_bookmark(&self, user: Id, post_id: Id) -> RepoResult<bool> {
            let created = {
                let mut s = self.write()?;
                if !s.posts.contains_key(&post_id) {
                    return Err(RepoError::NotFound);
                }
                if s.bookmarks.values().any(|b| b.user_id == user && b.post_id == post_id) {
                    false
                } else {
                    let id = s.next_id();
                    s.bookmarks.insert(id, Bookmark { id, user_id: user, post_id });
                    true
                }
            };
            if created {
                self.persist();
            }
            Ok(created)
        }

        async fn remove_bookmark(&self, user: Id, post_id: Id) -> RepoResult<()> {
            {
                let mut s = self.write()?;
                let found = s
                    .bookmarks
                    .iter()
                    .find(|(_, b)| b.user_id == user && b.post_id == post_id)
                    .map(|(id, _)| *id);
                match found {
                    Some(id) => s.bookmarks.remove(&id),
                    None => return Err(RepoError::NotFound),
                };
            }
            self.persist();
            Ok(())
        }

        async fn list_bookmarks(&self, user: Id) -> RepoResult<Vec<Bookmark>> {
            let s = self.read()?;
            let mut v: Vec<_> = s
                .bookmarks
                .values()
                .filter(|b| b.user_id == user)
                .cloned()
                .collect();
            v.sort_by_key(|b| b.id);
            Ok(v)
        }

        async fn create_snippet(&self, user: Id, new: NewCodeSnippet) -> RepoResult<CodeSnippet> {
            let snippet = {
                let mut s = self.write()?;
                if let Some(post_id) = new.post_id {
                    if !s.posts.contains_key(&post_id) {
                        return Err(RepoError::NotFound);
                    }
                }
                if let Some(comment_id) = new.comment_id {
                    if !s.comments.contains_key(&comment_id) {
                        return Err(RepoError::NotFound);
                    }
                }
                let id = s.next_id();
                let snippet = CodeSnippet {
                    id,
                    post_id: new.post_id,
                    comment_id: new.comment_id,
                    message_id: new.message_id,
                    user_id: user,
                    code_content: new.code_content,
                    language: new.language,
                    start_line: new.start_line,
                    end_line: new.end_line,
                    created_at: Utc::now(),
                };
                s.snippets.insert(id, snippet.clone());
                snippet
            };
            self.persist();
            Ok(snippet)
        }

        async fn list_post_snippets(&self, post_id: Id) -> RepoResult<Vec<CodeSnippet>> {
            let s = self.read()?;
            let mut v: Vec<_> = s
                .snippets
                .values()
                .filter(|c| c.post_id == Some(post_id))
                .cloned()
                .collect();
            v.sort_by_key(|c| c.id);
            Ok(v)
        }

        async fn add_review(&self, user: Id, target_user: Id, new: NewReview) -> RepoResult<Review> {
            let review = {
                let mut s = self.write()?;
                if !s.users.contains_key(&target_user) {
                    return Err(RepoError::NotFound);
                }
                let id = s.next_id();
                let review = Review {
                    id,
                    user_id: user,
                    target_user_id: target_user,
                    content: new.content,
                    created_at: Utc::now(),
                };
                s.reviews.insert(id, review.clone());
                review
            };
            self.persist();
            Ok(review)
        }

        async fn list_reviews_for(&self, target_user: Id) -> RepoResult<Vec<Review>> {
            let s = self.read()?;
            let mut v: Vec<_> = s
                .reviews
                .values()
                .filter(|r| r.target_user_id == target_user)
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }
    }

    #[async_trait]
    impl EngagementRepo for InMemRepo {
        async fn add_like(&self, user: Id, target: TargetType, target_id: Id) -> RepoResult<(Like, bool)> {
            let out = {
                let mut s = self.write()?;
                // target must exist for its kind
                let exists = match target {
                    TargetType::Post => s.posts.contains_key(&target_id),
                    TargetType::Comment => s.comments.contains_key(&target_id),
                    TargetType::Course => s.courses.contains_key(&target_id),
                    TargetType::Chat => s.chats.contains_key(&target_id),
                };
                if !exists {
                    return Err(RepoError::NotFound);
                }
                if let Some(existing) = s
                    .likes
                    .values()
                    .find(|l| l.user_id == user && l.target_type == target && l.target_id == target_id)
                {
                    // repeated like is a successful no-op, never a double count
                    (existing.clone(), false)
                } else {
                    let author = s.like_author(target, target_id);
                    let id = s.next_id();
                    let like = Like {
                        id,
                        user_id: user,
                        target_type: target,
                        target_id,
                        created_at: Utc::now(),
                    };
                    s.likes.insert(id, like.clone());
                    match target {
                        TargetType::Post => {
                            if let Some(p) = s.posts.get_mut(&target_id) {
                                p.likes_count += 1;
                            }
                        }
                        TargetType::Comment => {
                            if let Some(c) = s.comments.get_mut(&target_id) {
                                c.likes_count += 1;
                            }
                        }
                        TargetType::Course => {
                            if let Some(c) = s.courses.get_mut(&target_id) {
                                c.likes_count += 1;
                            }
                        }
                        TargetType::Chat => {
                            if let Some(c) = s.chats.get_mut(&target_id) {
                                c.chat_likes_cnt += 1;
                            }
                        }
                    }
                    if let Some(author_id) = author {
                        if let Some(u) = s.users.get_mut(&author_id) {
                            match target {
                                TargetType::Post => u.post_likes_cnt += 1,
                                TargetType::Comment => u.comment_likes_cnt += 1,
                                TargetType::Course => u.course_likes_cnt += 1,
                                TargetType::Chat => {}
                            }
                        }
                    }
                    (like, true)
                }
            };
            if out.1 {
                self.persist();
            }
            Ok(out)
        }
    }

    #[async_trait]
    impl ChatRepo for InMemRepo {
        async fn get_or_create_chat(&self, a: Id, b: Id) -> RepoResult<(Chat, bool)> {
            if a == b {
                return Err(RepoError::SelfChat);
            }
            let out = {
                let mut s = self.write()?;
                let ua = s.users.get(&a).ok_or(RepoError::NotFound)?;
                let ub = s.users.get(&b).ok_or(RepoError::NotFound)?;
                if ua.is_blocked || ub.is_blocked {
                    return Err(RepoError::BlockedParticipant);
                }
                if let Some(existing) = s.find_chat_pair(a, b) {
                    (existing, false)
                } else {
                    let id = s.next_id();
                    let chat = Chat {
                        id,
                        user1: a,
                        user2: b,
                        chat_likes_cnt: 0,
                        created_at: Utc::now(),
                    };
                    s.chats.insert(id, chat.clone());
                    (chat, true)
                }
            };
            if out.1 {
                self.persist();
            }
            Ok(out)
        }

        async fn get_chat(&self, id: Id) -> RepoResult<Chat> {
            let s = self.read()?;
            s.chats.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn list_chats(&self, user: Id) -> RepoResult<Vec<Chat>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.chats.values().filter(|c| c.involves(user)).cloned().collect();
            v.sort_by_key(|c| c.id);
            Ok(v)
        }

        async fn send_message(&self, sender: Id, new: NewMessage) -> RepoResult<Message> {
            let message = {
                let mut s = self.write()?;
                let chat = s.chats.get(&new.chat_id).ok_or(RepoError::NotFound)?;
                let receiver = chat.other(sender).ok_or(RepoError::NotParticipant)?;
                let chat_id = chat.id;
                let id = s.next_id();
                let message = Message {
                    id,
                    chat_id,
                    sender,
                    receiver,
                    content: new.content,
                    image_url: new.image_url,
                    is_read: false,
                    is_code: new.is_code,
                    created_at: Utc::now(),
                };
                s.messages.insert(id, message.clone());
                message
            };
            self.persist();
            Ok(message)
        }

        async fn list_messages(&self, chat_id: Id) -> RepoResult<Vec<Message>> {
            let s = self.read()?;
            if !s.chats.contains_key(&chat_id) {
                return Err(RepoError::NotFound);
            }
            let mut v: Vec<_> = s
                .messages
                .values()
                .filter(|m| m.chat_id == chat_id)
                .cloned()
                .collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(v)
        }

        async fn unread_count(&self, user: Id) -> RepoResult<i64> {
            let s = self.read()?;
            Ok(s.messages
                .values()
                .filter(|m| m.receiver == user && !m.is_read)
                .count() as i64)
        }
    }

    #[async_trait]
    impl ModerationRepo for InMemRepo {
        async fn issue_warning(&self, admin_user: Id, target_user: Id, new: NewWarning) -> RepoResult<UserWarning> {
            let warning = {
                let mut s = self.write()?;
                if !s.users.contains_key(&target_user) {
                    return Err(RepoError::NotFound);
                }
                let profile = s.ensure_admin_profile(admin_user)?;
                let id = s.next_id();
                // warnings start pending; only the warned user finalizes them
                let warning = UserWarning {
                    id,
                    user_id: target_user,
                    admin_id: profile.id,
                    reason: new.reason.clone(),
                    target_type: new.target_type,
                    target_id: new.target_id,
                    created_at: Utc::now(),
                    is_accepted: None,
                };
                s.warnings.insert(id, warning.clone());
                s.append_action(profile.id, AdminActionKind::WarningCreated, target_user, new.reason);
                warning
            };
            self.persist();
            Ok(warning)
        }

        async fn respond_to_warning(&self, user: Id, warning_id: Id, response: WarningResponse) -> RepoResult<UserWarning> {
            let warning = {
                let mut s = self.write()?;
                let warning = s.warnings.get(&warning_id).cloned().ok_or(RepoError::NotFound)?;
                if warning.user_id != user {
                    return Err(RepoError::NotParticipant);
                }
                if warning.is_accepted.is_some() {
                    return Err(RepoError::Conflict);
                }
                match response {
                    WarningResponse::Accept => {
                        if let (Some(kind), Some(target_id)) = (warning.target_type, warning.target_id) {
                            s.delete_content(kind, target_id);
                        }
                        let w = s.warnings.get_mut(&warning_id).ok_or(RepoError::NotFound)?;
                        w.is_accepted = Some(true);
                        w.clone()
                    }
                    WarningResponse::Dispute => {
                        // dispute routes the warning into admin triage
                        let report_id = s.next_id();
                        s.reports.insert(
                            report_id,
                            Report {
                                id: report_id,
                                reporting_user: user,
                                target_type: ReportTarget::Warning,
                                target_id: warning_id,
                                description: format!("disputed warning: {}", warning.reason),
                                created_at: Utc::now(),
                                status: ReportStatus::Pending,
                                processed_by: None,
                                resolved_at: None,
                            },
                        );
                        let w = s.warnings.get_mut(&warning_id).ok_or(RepoError::NotFound)?;
                        w.is_accepted = Some(false);
                        w.clone()
                    }
                }
            };
            self.persist();
            Ok(warning)
        }

        async fn list_warnings_for(&self, user: Id) -> RepoResult<Vec<UserWarning>> {
            let s = self.read()?;
            let mut v: Vec<_> = s
                .warnings
                .values()
                .filter(|w| w.user_id == user)
                .cloned()
                .collect();
            v.sort_by_key(|w| w.id);
            Ok(v)
        }

        async fn block_user(&self, admin_user: Id, target_user: Id) -> RepoResult<User> {
            let user = {
                // count-then-act runs under one write guard so two concurrent
                // admins cannot observe a stale count
                let mut s = self.write()?;
                if !s.users.contains_key(&target_user) {
                    return Err(RepoError::NotFound);
                }
                let accepted = s
                    .warnings
                    .values()
                    .filter(|w| w.user_id == target_user && w.is_accepted == Some(true))
                    .count();
                if accepted < 3 {
                    return Err(RepoError::InsufficientWarnings);
                }
                let profile = s.ensure_admin_profile(admin_user)?;
                let user = s.users.get_mut(&target_user).ok_or(RepoError::NotFound)?;
                user.is_blocked = true;
                let user = user.clone();
                s.append_action(
                    profile.id,
                    AdminActionKind::UserBlocked,
                    target_user,
                    format!("blocked after {accepted} accepted warnings"),
                );
                user
            };
            self.persist();
            Ok(user)
        }

        async fn ban_user(&self, admin_user: Id, target_user: Id) -> RepoResult<User> {
            let user = {
                let mut s = self.write()?;
                if !s.users.contains_key(&target_user) {
                    return Err(RepoError::NotFound);
                }
                let profile = s.ensure_admin_profile(admin_user)?;
                let user = s.users.get_mut(&target_user).ok_or(RepoError::NotFound)?;
                user.is_active = false;
                let user = user.clone();
                s.append_action(profile.id, AdminActionKind::UserBanned, target_user, String::new());
                user
            };
            self.persist();
            Ok(user)
        }

        async fn file_report(&self, user: Id, new: NewReport) -> RepoResult<Report> {
            // no target-existence check: reports may reference deleted content
            let report = {
                let mut s = self.write()?;
                let id = s.next_id();
                let report = Report {
                    id,
                    reporting_user: user,
                    target_type: new.target_type,
                    target_id: new.target_id,
                    description: new.description,
                    created_at: Utc::now(),
                    status: ReportStatus::Pending,
                    processed_by: None,
                    resolved_at: None,
                };
                s.reports.insert(id, report.clone());
                report
            };
            self.persist();
            Ok(report)
        }

        async fn list_pending_reports(&self) -> RepoResult<Vec<Report>> {
            let s = self.read()?;
            let mut v: Vec<_> = s
                .reports
                .values()
                .filter(|r| r.status == ReportStatus::Pending)
                .cloned()
                .collect();
            v.sort_by_key(|r| r.id);
            Ok(v)
        }

        async fn list_reports_by(&self, user: Id) -> RepoResult<Vec<Report>> {
            let s = self.read()?;
            let mut v: Vec<_> = s
                .reports
                .values()
                .filter(|r| r.reporting_user == user)
                .cloned()
                .collect();
            v.sort_by_key(|r| r.id);
            Ok(v)
        }

        async fn process_report(&self, admin_user: Id, report_id: Id, action: ReportAction) -> RepoResult<Report> {
            let report = {
                let mut s = self.write()?;
                let current = s.reports.get(&report_id).ok_or(RepoError::NotFound)?;
                if current.status.is_terminal() {
                    // terminal states never transition again; resolved_at stays put
                    return Err(RepoError::Conflict);
                }
                let profile = s.ensure_admin_profile(admin_user)?;
                let report = s.reports.get_mut(&report_id).ok_or(RepoError::NotFound)?;
                report.status = match action {
                    ReportAction::Accept => ReportStatus::Resolved,
                    ReportAction::Reject => ReportStatus::Rejected,
                };
                report.processed_by = Some(admin_user);
                report.resolved_at = Some(Utc::now());
                let report = report.clone();
                if let Some(p) = s.admin_profiles.get_mut(&profile.id) {
                    p.problems_resolved_count += 1;
                }
                s.append_action(
                    profile.id,
                    AdminActionKind::ReportProcessed,
                    report_id,
                    report.status.as_str().to_string(),
                );
                report
            };
            self.persist();
            Ok(report)
        }

        async fn list_admin_actions(&self) -> RepoResult<Vec<AdminAction>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.admin_actions.values().cloned().collect();
            v.sort_by_key(|a| a.id);
            Ok(v)
        }
    }

    #[async_trait]
    impl ReputationRepo for InMemRepo {
        async fn get_or_create_profile(&self, user: Id) -> RepoResult<ProfileView> {
            let (profile, created) = {
                let mut s = self.write()?;
                if !s.users.contains_key(&user) {
                    return Err(RepoError::NotFound);
                }
                if let Some(p) = s.profiles.values().find(|p| p.user_id == user) {
                    (p.clone(), false)
                } else {
                    let id = s.next_id();
                    let p = ProfileView { id, user_id: user, total_points: 0, rating: 0 };
                    s.profiles.insert(id, p.clone());
                    (p, true)
                }
            };
            if created {
                self.persist();
            }
            Ok(profile)
        }

        async fn rate_for_help(&self, rater: Id, target_user: Id) -> RepoResult<ProfileView> {
            if rater == target_user {
                return Err(RepoError::SelfRating);
            }
            let profile = {
                let mut s = self.write()?;
                if !s.users.contains_key(&rater) || !s.users.contains_key(&target_user) {
                    return Err(RepoError::NotFound);
                }
                if s.find_chat_pair(rater, target_user).is_none() {
                    return Err(RepoError::NoSharedChat);
                }
                if let Some(u) = s.users.get_mut(&target_user) {
                    u.chat_help_likes_cnt += 1;
                }
                let existing = s.profiles.values().find(|p| p.user_id == target_user).map(|p| p.id);
                let pid = match existing {
                    Some(pid) => pid,
                    None => {
                        let id = s.next_id();
                        s.profiles
                            .insert(id, ProfileView { id, user_id: target_user, total_points: 0, rating: 0 });
                        id
                    }
                };
                let p = s.profiles.get_mut(&pid).ok_or(RepoError::NotFound)?;
                // clamp before recomputing, so a saturated profile is a no-op
                p.total_points += POINTS_PER_HELP;
                p.recompute();
                p.clone()
            };
            self.persist();
            Ok(profile)
        }
    }
}
