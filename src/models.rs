use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

/// Account role. A single role per user; moderation endpoints require `Admin`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// Kinds a Like may address. Kept as a closed enum so an invalid target kind
/// is rejected at the route boundary instead of landing in the ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Post,
    Comment,
    Course,
    Chat,
}

impl TargetType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "post" => Some(Self::Post),
            "comment" => Some(Self::Comment),
            "course" => Some(Self::Course),
            "chat" => Some(Self::Chat),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
            Self::Course => "course",
            Self::Chat => "chat",
        }
    }
}

/// Kinds a Report may address. Strictly wider than [`TargetType`]: disputing a
/// warning files a report against the warning itself, and reports may point at
/// content that no longer exists.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReportTarget {
    Post,
    Comment,
    Course,
    Chat,
    Warning,
}

impl ReportTarget {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "post" => Some(Self::Post),
            "comment" => Some(Self::Comment),
            "course" => Some(Self::Course),
            "chat" => Some(Self::Chat),
            "warning" => Some(Self::Warning),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
            Self::Course => "course",
            Self::Chat => "chat",
            Self::Warning => "warning",
        }
    }
}

/// Deletable content kinds a warning may name. Accepting such a warning
/// removes the named item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Post,
    Comment,
    Course,
}

impl ContentKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "post" => Some(Self::Post),
            "comment" => Some(Self::Comment),
            "course" => Some(Self::Course),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
            Self::Course => "course",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Processing,
    Resolved,
    Rejected,
}

impl ReportStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "resolved" => Some(Self::Resolved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Resolved => "resolved",
            Self::Rejected => "rejected",
        }
    }

    /// Resolved and rejected are terminal; no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Rejected)
    }
}

/// Admin decision on a pending report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReportAction {
    Accept,
    Reject,
}

/// Warned user's response to a pending warning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum WarningResponse {
    Accept,
    Dispute,
}

/// Audit log entry kinds. One row is appended per successful moderation
/// mutation; a failed authorization check writes nothing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AdminActionKind {
    WarningCreated,
    UserBlocked,
    UserBanned,
    ReportProcessed,
}

impl AdminActionKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "warning_created" => Some(Self::WarningCreated),
            "user_blocked" => Some(Self::UserBlocked),
            "user_banned" => Some(Self::UserBanned),
            "report_processed" => Some(Self::ReportProcessed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WarningCreated => "warning_created",
            Self::UserBlocked => "user_blocked",
            Self::UserBanned => "user_banned",
            Self::ReportProcessed => "report_processed",
        }
    }
}

// ---------------------------------------------------------------- entities

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub profile_img_url: String,
    pub role: Role,
    /// Block restricts social features (chat creation); independent of ban.
    pub is_blocked: bool,
    /// Ban flag: `false` deactivates the account. Accounts are never deleted.
    pub is_active: bool,
    pub total_questions: i32,
    pub total_answers: i32,
    pub post_likes_cnt: i32,
    pub comment_likes_cnt: i32,
    pub course_likes_cnt: i32,
    pub chat_help_likes_cnt: i32,
    pub created_at: DateTime<Utc>,
}

/// One-to-one extension of an admin-role user. Materialized lazily before the
/// first moderation action that needs it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct AdminProfile {
    pub id: Id,
    pub user_id: Id,
    pub problems_resolved_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit entry; written only by moderation operations, never
/// mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdminAction {
    pub id: Id,
    pub admin_id: Id,
    pub action_type: AdminActionKind,
    pub target_id: Id,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserWarning {
    pub id: Id,
    pub user_id: Id,
    pub admin_id: Id,
    pub reason: String,
    /// Content item the warning names; deleted when the user accepts.
    pub target_type: Option<ContentKind>,
    pub target_id: Option<Id>,
    pub created_at: DateTime<Utc>,
    /// None = pending, Some(true) = accepted, Some(false) = disputed.
    /// Only accepted warnings count toward the block threshold.
    pub is_accepted: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Report {
    pub id: Id,
    pub reporting_user: Id,
    pub target_type: ReportTarget,
    pub target_id: Id,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub status: ReportStatus,
    pub processed_by: Option<Id>,
    /// Set exactly once, at the transition into a terminal status.
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Like {
    pub id: Id,
    pub user_id: Id,
    pub target_type: TargetType,
    pub target_id: Id,
    pub created_at: DateTime<Utc>,
}

/// The sole derived aggregate in the model: raw peer-help points (capped at
/// 60) and the bounded display rating computed from them.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ProfileView {
    pub id: Id,
    pub user_id: Id,
    pub total_points: i32,
    pub rating: i32,
}

pub const MAX_POINTS: i32 = 60;
pub const POINTS_PER_HELP: i32 = 2;

/// Clamp raw points to [0, 60], then rating = round(points * 0.25) in [0, 15].
pub fn rating_from_points(points: i32) -> i32 {
    let clamped = points.clamp(0, MAX_POINTS);
    ((clamped as f64) * 0.25).round() as i32
}

impl ProfileView {
    /// Recompute both fields from raw points; called inside every point
    /// mutation so `rating` never drifts from its source.
    pub fn recompute(&mut self) {
        self.total_points = self.total_points.clamp(0, MAX_POINTS);
        self.rating = rating_from_points(self.total_points);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Post {
    pub id: Id,
    pub user_id: Id,
    pub title: String,
    pub content: String,
    pub image_url: String,
    pub code: String,
    pub likes_count: i32,
    pub created_at: DateTime<Utc>,
    pub is_resolved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Comment {
    pub id: Id,
    pub post_id: Id,
    pub user_id: Id,
    pub content: String,
    pub code: String,
    pub image_url: String,
    pub likes_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Course {
    pub id: Id,
    pub user_id: Id,
    pub title: String,
    pub image_url: String,
    pub content: String,
    pub code: String,
    pub likes_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Bookmark {
    pub id: Id,
    pub user_id: Id,
    pub post_id: Id,
}

/// Unordered pair of two distinct users; at most one chat per pair.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Chat {
    pub id: Id,
    pub user1: Id,
    pub user2: Id,
    pub chat_likes_cnt: i32,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn involves(&self, user: Id) -> bool {
        self.user1 == user || self.user2 == user
    }

    /// The participant on the other end, if `user` is one of the two.
    pub fn other(&self, user: Id) -> Option<Id> {
        if self.user1 == user {
            Some(self.user2)
        } else if self.user2 == user {
            Some(self.user1)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Message {
    pub id: Id,
    pub chat_id: Id,
    pub sender: Id,
    pub receiver: Id,
    pub content: String,
    pub image_url: String,
    pub is_read: bool,
    pub is_code: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct CodeSnippet {
    pub id: Id,
    pub post_id: Option<Id>,
    pub comment_id: Option<Id>,
    pub message_id: Option<Id>,
    pub user_id: Id,
    pub code_content: String,
    pub language: String,
    pub start_line: i32,
    pub end_line: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Review {
    pub id: Id,
    pub user_id: Id,
    pub target_user_id: Id,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------- payloads

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateProfile {
    pub username: Option<String>,
    pub profile_img_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewComment {
    pub post_id: Id,
    pub content: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewCourse {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewMessage {
    pub chat_id: Id,
    pub content: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub is_code: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewReport {
    pub target_type: ReportTarget,
    pub target_id: Id,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewWarning {
    pub reason: String,
    /// Optional content item the warning names (deleted on acceptance).
    pub target_type: Option<ContentKind>,
    pub target_id: Option<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewReview {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewCodeSnippet {
    pub post_id: Option<Id>,
    pub comment_id: Option<Id>,
    pub message_id: Option<Id>,
    pub code_content: String,
    pub language: String,
    pub start_line: i32,
    pub end_line: i32,
}

/// Filters for the post listing; substring search only, newest first.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PostQuery {
    pub search: Option<String>,
    pub resolved: Option<bool>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WarningReply {
    pub response: WarningResponse,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReportDecision {
    pub action: ReportAction,
}

/// Aggregate returned by the public profile page.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProfilePage {
    pub user: User,
    pub posts_count: usize,
    pub courses_count: usize,
    pub reviews: Vec<Review>,
    pub profile: ProfileView,
}
