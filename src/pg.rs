//! Postgres repository backend (feature = "postgres-store").
//!
//! Counter updates are expressed as `SET x = x + 1` so they stay atomic under
//! concurrent requests; like/chat uniqueness rides on unique indexes with
//! `ON CONFLICT DO NOTHING`, and count-then-act sequences run inside one
//! transaction with the relevant rows locked.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::*;
use crate::repo::*;

#[derive(Clone)]
pub struct PgRepo {
    pool: PgPool,
}

impl PgRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(e: sqlx::Error) -> RepoError {
    match &e {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(d) if d.code().as_deref() == Some("23505") => RepoError::Conflict,
        // foreign key violation: the referenced row is gone
        sqlx::Error::Database(d) if d.code().as_deref() == Some("23503") => RepoError::NotFound,
        _ => RepoError::Internal(e.to_string()),
    }
}

const USER_COLS: &str = "id, username, email, password_hash, profile_img_url, role, is_blocked, \
     is_active, total_questions, total_answers, post_likes_cnt, comment_likes_cnt, \
     course_likes_cnt, chat_help_likes_cnt, created_at";

// Enum-bearing rows come back as text and are parsed into the tagged enums;
// a value outside the closed set is data corruption, surfaced as Internal.

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Id,
    username: String,
    email: String,
    password_hash: String,
    profile_img_url: String,
    role: String,
    is_blocked: bool,
    is_active: bool,
    total_questions: i32,
    total_answers: i32,
    post_likes_cnt: i32,
    comment_likes_cnt: i32,
    course_likes_cnt: i32,
    chat_help_likes_cnt: i32,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> RepoResult<User> {
        let role = match self.role.as_str() {
            "admin" => Role::Admin,
            "user" => Role::User,
            other => return Err(RepoError::Internal(format!("unknown role '{other}'"))),
        };
        Ok(User {
            id: self.id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            profile_img_url: self.profile_img_url,
            role,
            is_blocked: self.is_blocked,
            is_active: self.is_active,
            total_questions: self.total_questions,
            total_answers: self.total_answers,
            post_likes_cnt: self.post_likes_cnt,
            comment_likes_cnt: self.comment_likes_cnt,
            course_likes_cnt: self.course_likes_cnt,
            chat_help_likes_cnt: self.chat_help_likes_cnt,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LikeRow {
    id: Id,
    user_id: Id,
    target_type: String,
    target_id: Id,
    created_at: DateTime<Utc>,
}

impl LikeRow {
    fn into_like(self) -> RepoResult<Like> {
        let target_type = TargetType::parse(&self.target_type)
            .ok_or_else(|| RepoError::Internal(format!("unknown like target '{}'", self.target_type)))?;
        Ok(Like {
            id: self.id,
            user_id: self.user_id,
            target_type,
            target_id: self.target_id,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReportRow {
    id: Id,
    reporting_user: Id,
    target_type: String,
    target_id: Id,
    description: String,
    created_at: DateTime<Utc>,
    status: String,
    processed_by: Option<Id>,
    resolved_at: Option<DateTime<Utc>>,
}

impl ReportRow {
    fn into_report(self) -> RepoResult<Report> {
        let target_type = ReportTarget::parse(&self.target_type)
            .ok_or_else(|| RepoError::Internal(format!("unknown report target '{}'", self.target_type)))?;
        let status = ReportStatus::parse(&self.status)
            .ok_or_else(|| RepoError::Internal(format!("unknown report status '{}'", self.status)))?;
        Ok(Report {
            id: self.id,
            reporting_user: self.reporting_user,
            target_type,
            target_id: self.target_id,
            description: self.description,
            created_at: self.created_at,
            status,
            processed_by: self.processed_by,
            resolved_at: self.resolved_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WarningRow {
    id: Id,
    user_id: Id,
    admin_id: Id,
    reason: String,
    target_type: Option<String>,
    target_id: Option<Id>,
    created_at: DateTime<Utc>,
    is_accepted: Option<bool>,
}

impl WarningRow {
    fn into_warning(self) -> RepoResult<UserWarning> {
        let target_type = match self.target_type.as_deref() {
            Some(s) => Some(
                ContentKind::parse(s)
                    .ok_or_else(|| RepoError::Internal(format!("unknown warning target '{s}'")))?,
            ),
            None => None,
        };
        Ok(UserWarning {
            id: self.id,
            user_id: self.user_id,
            admin_id: self.admin_id,
            reason: self.reason,
            target_type,
            target_id: self.target_id,
            created_at: self.created_at,
            is_accepted: self.is_accepted,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ActionRow {
    id: Id,
    admin_id: Id,
    action_type: String,
    target_id: Id,
    details: String,
    created_at: DateTime<Utc>,
}

impl ActionRow {
    fn into_action(self) -> RepoResult<AdminAction> {
        let action_type = AdminActionKind::parse(&self.action_type)
            .ok_or_else(|| RepoError::Internal(format!("unknown action type '{}'", self.action_type)))?;
        Ok(AdminAction {
            id: self.id,
            admin_id: self.admin_id,
            action_type,
            target_id: self.target_id,
            details: self.details,
            created_at: self.created_at,
        })
    }
}

async fn user_exists(tx: &mut Transaction<'_, Postgres>, id: Id) -> RepoResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;
    Ok(found.is_some())
}

/// Materialize the admin's one-to-one profile row inside the caller's
/// transaction; the unique index on user_id makes this race-safe.
async fn ensure_admin_profile(tx: &mut Transaction<'_, Postgres>, admin_user: Id) -> RepoResult<AdminProfile> {
    if !user_exists(tx, admin_user).await? {
        return Err(RepoError::NotFound);
    }
    sqlx::query("INSERT INTO admin_profiles (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(admin_user)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
    sqlx::query_as::<_, AdminProfile>(
        "SELECT id, user_id, problems_resolved_count, created_at FROM admin_profiles WHERE user_id = $1",
    )
    .bind(admin_user)
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err)
}

async fn append_action(
    tx: &mut Transaction<'_, Postgres>,
    admin_id: Id,
    kind: AdminActionKind,
    target_id: Id,
    details: &str,
) -> RepoResult<()> {
    sqlx::query("INSERT INTO admin_actions (admin_id, action_type, target_id, details) VALUES ($1, $2, $3, $4)")
        .bind(admin_id)
        .bind(kind.as_str())
        .bind(target_id)
        .bind(details)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
    Ok(())
}

async fn find_chat_pair(tx: &mut Transaction<'_, Postgres>, a: Id, b: Id) -> RepoResult<Option<Chat>> {
    sqlx::query_as::<_, Chat>(
        "SELECT id, user1, user2, chat_likes_cnt, created_at FROM chats \
         WHERE (user1 = $1 AND user2 = $2) OR (user1 = $2 AND user2 = $1)",
    )
    .bind(a)
    .bind(b)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)
}

#[async_trait]
impl UserRepo for PgRepo {
    async fn create_user(&self, new: NewUser, password_hash: String, role: Role) -> RepoResult<User> {
        let role_str = match role {
            Role::Admin => "admin",
            Role::User => "user",
        };
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (username, email, password_hash, role) VALUES ($1, $2, $3, $4) RETURNING {USER_COLS}"
        ))
        .bind(&new.username)
        .bind(&new.email)
        .bind(&password_hash)
        .bind(role_str)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        row.into_user()
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(RepoError::NotFound)?;
        row.into_user()
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(UserRow::into_user).transpose()
    }

    async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET username = COALESCE($2, username), \
             profile_img_url = COALESCE($3, profile_img_url) WHERE id = $1 RETURNING {USER_COLS}"
        ))
        .bind(id)
        .bind(upd.username)
        .bind(upd.profile_img_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(RepoError::NotFound)?;
        row.into_user()
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLS} FROM users ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(UserRow::into_user).collect()
    }
}

#[async_trait]
impl ContentRepo for PgRepo {
    async fn create_post(&self, user: Id, new: NewPost) -> RepoResult<Post> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        if !user_exists(&mut tx, user).await? {
            return Err(RepoError::NotFound);
        }
        let post = sqlx::query_as::<_, Post>(
            "INSERT INTO posts (user_id, title, content, image_url, code) VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, user_id, title, content, image_url, code, likes_count, created_at, is_resolved",
        )
        .bind(user)
        .bind(&new.title)
        .bind(&new.content)
        .bind(&new.image_url)
        .bind(&new.code)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        sqlx::query("UPDATE users SET total_questions = total_questions + 1 WHERE id = $1")
            .bind(user)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(post)
    }

    async fn list_posts(&self, q: PostQuery) -> RepoResult<Vec<Post>> {
        let limit = q.limit.map(|l| l as i64).unwrap_or(i64::MAX);
        let offset = q.offset.map(|o| o as i64).unwrap_or(0);
        sqlx::query_as::<_, Post>(
            "SELECT id, user_id, title, content, image_url, code, likes_count, created_at, is_resolved \
             FROM posts \
             WHERE ($1::text IS NULL OR title ILIKE '%' || $1 || '%' OR content ILIKE '%' || $1 || '%') \
               AND ($2::bool IS NULL OR is_resolved = $2) \
             ORDER BY created_at DESC LIMIT $3 OFFSET $4",
        )
        .bind(q.search)
        .bind(q.resolved)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn get_post(&self, id: Id) -> RepoResult<Post> {
        sqlx::query_as::<_, Post>(
            "SELECT id, user_id, title, content, image_url, code, likes_count, created_at, is_resolved \
             FROM posts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(RepoError::NotFound)
    }

    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
        sqlx::query_as::<_, Post>(
            "UPDATE posts SET title = COALESCE($2, title), content = COALESCE($3, content), \
             image_url = COALESCE($4, image_url), code = COALESCE($5, code) \
             WHERE id = $1 \
             RETURNING id, user_id, title, content, image_url, code, likes_count, created_at, is_resolved",
        )
        .bind(id)
        .bind(upd.title)
        .bind(upd.content)
        .bind(upd.image_url)
        .bind(upd.code)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(RepoError::NotFound)
    }

    async fn delete_post(&self, id: Id) -> RepoResult<()> {
        let res = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn mark_post_resolved(&self, id: Id) -> RepoResult<Post> {
        sqlx::query_as::<_, Post>(
            "UPDATE posts SET is_resolved = TRUE WHERE id = $1 \
             RETURNING id, user_id, title, content, image_url, code, likes_count, created_at, is_resolved",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(RepoError::NotFound)
    }

    async fn create_comment(&self, user: Id, new: NewComment) -> RepoResult<Comment> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let comment = sqlx::query_as::<_, Comment>(
            "INSERT INTO comments (post_id, user_id, content, code, image_url) \
             SELECT $1, $2, $3, $4, $5 WHERE EXISTS (SELECT 1 FROM posts WHERE id = $1) \
             RETURNING id, post_id, user_id, content, code, image_url, likes_count, created_at",
        )
        .bind(new.post_id)
        .bind(user)
        .bind(&new.content)
        .bind(&new.code)
        .bind(&new.image_url)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or(RepoError::NotFound)?;
        sqlx::query("UPDATE users SET total_answers = total_answers + 1 WHERE id = $1")
            .bind(user)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(comment)
    }

    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM posts WHERE id = $1")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        if exists.is_none() {
            return Err(RepoError::NotFound);
        }
        let comments = sqlx::query_as::<_, Comment>(
            "SELECT id, post_id, user_id, content, code, image_url, likes_count, created_at \
             FROM comments WHERE post_id = $1 ORDER BY created_at",
        )
        .bind(post_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(comments)
    }

    async fn create_course(&self, user: Id, new: NewCourse) -> RepoResult<Course> {
        sqlx::query_as::<_, Course>(
            "INSERT INTO courses (user_id, title, image_url, content, code) VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, user_id, title, image_url, content, code, likes_count, created_at",
        )
        .bind(user)
        .bind(&new.title)
        .bind(&new.image_url)
        .bind(&new.content)
        .bind(&new.code)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn list_courses(&self, search: Option<String>) -> RepoResult<Vec<Course>> {
        sqlx::query_as::<_, Course>(
            "SELECT id, user_id, title, image_url, content, code, likes_count, created_at FROM courses \
             WHERE ($1::text IS NULL OR title ILIKE '%' || $1 || '%' OR content ILIKE '%' || $1 || '%') \
             ORDER BY created_at DESC",
        )
        .bind(search)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn get_course(&self, id: Id) -> RepoResult<Course> {
        sqlx::query_as::<_, Course>(
            "SELECT id, user_id, title, image_url, content, code, likes_count, created_at \
             FROM courses WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(RepoError::NotFound)
    }

    async fn add_bookmark(&self, user: Id, post_id: Id) -> RepoResult<bool> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM posts WHERE id = $1")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        if exists.is_none() {
            return Err(RepoError::NotFound);
        }
        let inserted: Option<i64> = sqlx::query_scalar(
            "INSERT INTO bookmarks (user_id, post_id) VALUES ($1, $2) \
             ON CONFLICT (user_id, post_id) DO NOTHING RETURNING id",
        )
        .bind(user)
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(inserted.is_some())
    }

    async fn remove_bookmark(&self, user: Id, post_id: Id) -> RepoResult<()> {
        let res = sqlx::query("DELETE FROM bookmarks WHERE user_id = $1 AND post_id = $2")
            .bind(user)
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn list_bookmarks(&self, user: Id) -> RepoResult<Vec<Bookmark>> {
        sqlx::query_as::<_, Bookmark>("SELECT id, user_id, post_id FROM bookmarks WHERE user_id = $1 ORDER BY id")
            .bind(user)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn create_snippet(&self, user: Id, new: NewCodeSnippet) -> RepoResult<CodeSnippet> {
        sqlx::query_as::<_, CodeSnippet>(
            "INSERT INTO code_snippets (post_id, comment_id, message_id, user_id, code_content, language, start_line, end_line) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id, post_id, comment_id, message_id, user_id, code_content, language, start_line, end_line, created_at",
        )
        .bind(new.post_id)
        .bind(new.comment_id)
        .bind(new.message_id)
        .bind(user)
        .bind(&new.code_content)
        .bind(&new.language)
        .bind(new.start_line)
        .bind(new.end_line)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn list_post_snippets(&self, post_id: Id) -> RepoResult<Vec<CodeSnippet>> {
        sqlx::query_as::<_, CodeSnippet>(
            "SELECT id, post_id, comment_id, message_id, user_id, code_content, language, start_line, end_line, created_at \
             FROM code_snippets WHERE post_id = $1 ORDER BY id",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn add_review(&self, user: Id, target_user: Id, new: NewReview) -> RepoResult<Review> {
        sqlx::query_as::<_, Review>(
            "INSERT INTO reviews (user_id, target_user_id, content) \
             SELECT $1, $2, $3 WHERE EXISTS (SELECT 1 FROM users WHERE id = $2) \
             RETURNING id, user_id, target_user_id, content, created_at",
        )
        .bind(user)
        .bind(target_user)
        .bind(&new.content)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(RepoError::NotFound)
    }

    async fn list_reviews_for(&self, target_user: Id) -> RepoResult<Vec<Review>> {
        sqlx::query_as::<_, Review>(
            "SELECT id, user_id, target_user_id, content, created_at \
             FROM reviews WHERE target_user_id = $1 ORDER BY created_at DESC",
        )
        .bind(target_user)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }
}

#[async_trait]
impl EngagementRepo for PgRepo {
    async fn add_like(&self, user: Id, target: TargetType, target_id: Id) -> RepoResult<(Like, bool)> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let (table, counter_col, author_col) = match target {
            TargetType::Post => ("posts", "likes_count", Some("post_likes_cnt")),
            TargetType::Comment => ("comments", "likes_count", Some("comment_likes_cnt")),
            TargetType::Course => ("courses", "likes_count", Some("course_likes_cnt")),
            TargetType::Chat => ("chats", "chat_likes_cnt", None),
        };
        let exists: Option<i64> = sqlx::query_scalar(&format!("SELECT id FROM {table} WHERE id = $1"))
            .bind(target_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        if exists.is_none() {
            return Err(RepoError::NotFound);
        }
        let inserted = sqlx::query_as::<_, LikeRow>(
            "INSERT INTO likes (user_id, target_type, target_id) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, target_type, target_id) DO NOTHING \
             RETURNING id, user_id, target_type, target_id, created_at",
        )
        .bind(user)
        .bind(target.as_str())
        .bind(target_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        let (like, created) = match inserted {
            Some(row) => {
                sqlx::query(&format!("UPDATE {table} SET {counter_col} = {counter_col} + 1 WHERE id = $1"))
                    .bind(target_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                if let Some(author_col) = author_col {
                    sqlx::query(&format!(
                        "UPDATE users SET {author_col} = {author_col} + 1 \
                         WHERE id = (SELECT user_id FROM {table} WHERE id = $1)"
                    ))
                    .bind(target_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                }
                (row.into_like()?, true)
            }
            None => {
                let row = sqlx::query_as::<_, LikeRow>(
                    "SELECT id, user_id, target_type, target_id, created_at FROM likes \
                     WHERE user_id = $1 AND target_type = $2 AND target_id = $3",
                )
                .bind(user)
                .bind(target.as_str())
                .bind(target_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?;
                (row.into_like()?, false)
            }
        };
        tx.commit().await.map_err(db_err)?;
        Ok((like, created))
    }
}

#[async_trait]
impl ChatRepo for PgRepo {
    async fn get_or_create_chat(&self, a: Id, b: Id) -> RepoResult<(Chat, bool)> {
        if a == b {
            return Err(RepoError::SelfChat);
        }
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let blocked: Vec<bool> = sqlx::query_scalar("SELECT is_blocked FROM users WHERE id = $1 OR id = $2")
            .bind(a)
            .bind(b)
            .fetch_all(&mut *tx)
            .await
            .map_err(db_err)?;
        if blocked.len() != 2 {
            return Err(RepoError::NotFound);
        }
        if blocked.iter().any(|&x| x) {
            return Err(RepoError::BlockedParticipant);
        }
        if let Some(existing) = find_chat_pair(&mut tx, a, b).await? {
            tx.commit().await.map_err(db_err)?;
            return Ok((existing, false));
        }
        // the unique index on (least(user1,user2), greatest(user1,user2))
        // absorbs the create race; a loser just re-selects
        let inserted = sqlx::query_as::<_, Chat>(
            "INSERT INTO chats (user1, user2) VALUES ($1, $2) ON CONFLICT DO NOTHING \
             RETURNING id, user1, user2, chat_likes_cnt, created_at",
        )
        .bind(a)
        .bind(b)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        let out = match inserted {
            Some(chat) => (chat, true),
            None => (
                find_chat_pair(&mut tx, a, b).await?.ok_or(RepoError::NotFound)?,
                false,
            ),
        };
        tx.commit().await.map_err(db_err)?;
        Ok(out)
    }

    async fn get_chat(&self, id: Id) -> RepoResult<Chat> {
        sqlx::query_as::<_, Chat>("SELECT id, user1, user2, chat_likes_cnt, created_at FROM chats WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(RepoError::NotFound)
    }

    async fn list_chats(&self, user: Id) -> RepoResult<Vec<Chat>> {
        sqlx::query_as::<_, Chat>(
            "SELECT id, user1, user2, chat_likes_cnt, created_at FROM chats \
             WHERE user1 = $1 OR user2 = $1 ORDER BY id",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn send_message(&self, sender: Id, new: NewMessage) -> RepoResult<Message> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let chat = sqlx::query_as::<_, Chat>(
            "SELECT id, user1, user2, chat_likes_cnt, created_at FROM chats WHERE id = $1",
        )
        .bind(new.chat_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or(RepoError::NotFound)?;
        let receiver = chat.other(sender).ok_or(RepoError::NotParticipant)?;
        let message = sqlx::query_as::<_, Message>(
            "INSERT INTO messages (chat_id, sender, receiver, content, image_url, is_code) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, chat_id, sender, receiver, content, image_url, is_read, is_code, created_at",
        )
        .bind(chat.id)
        .bind(sender)
        .bind(receiver)
        .bind(&new.content)
        .bind(&new.image_url)
        .bind(new.is_code)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(message)
    }

    async fn list_messages(&self, chat_id: Id) -> RepoResult<Vec<Message>> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM chats WHERE id = $1")
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        if exists.is_none() {
            return Err(RepoError::NotFound);
        }
        sqlx::query_as::<_, Message>(
            "SELECT id, chat_id, sender, receiver, content, image_url, is_read, is_code, created_at \
             FROM messages WHERE chat_id = $1 ORDER BY created_at",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn unread_count(&self, user: Id) -> RepoResult<i64> {
        sqlx::query_scalar("SELECT count(*) FROM messages WHERE receiver = $1 AND is_read = FALSE")
            .bind(user)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }
}

#[async_trait]
impl ModerationRepo for PgRepo {
    async fn issue_warning(&self, admin_user: Id, target_user: Id, new: NewWarning) -> RepoResult<UserWarning> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        if !user_exists(&mut tx, target_user).await? {
            return Err(RepoError::NotFound);
        }
        let profile = ensure_admin_profile(&mut tx, admin_user).await?;
        let row = sqlx::query_as::<_, WarningRow>(
            "INSERT INTO user_warnings (user_id, admin_id, reason, target_type, target_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, user_id, admin_id, reason, target_type, target_id, created_at, is_accepted",
        )
        .bind(target_user)
        .bind(profile.id)
        .bind(&new.reason)
        .bind(new.target_type.map(|t| t.as_str()))
        .bind(new.target_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        append_action(&mut tx, profile.id, AdminActionKind::WarningCreated, target_user, &new.reason).await?;
        tx.commit().await.map_err(db_err)?;
        row.into_warning()
    }

    async fn respond_to_warning(&self, user: Id, warning_id: Id, response: WarningResponse) -> RepoResult<UserWarning> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let warning = sqlx::query_as::<_, WarningRow>(
            "SELECT id, user_id, admin_id, reason, target_type, target_id, created_at, is_accepted \
             FROM user_warnings WHERE id = $1 FOR UPDATE",
        )
        .bind(warning_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or(RepoError::NotFound)?
        .into_warning()?;
        if warning.user_id != user {
            return Err(RepoError::NotParticipant);
        }
        if warning.is_accepted.is_some() {
            return Err(RepoError::Conflict);
        }
        let accepted = match response {
            WarningResponse::Accept => {
                if let (Some(kind), Some(target_id)) = (warning.target_type, warning.target_id) {
                    let table = match kind {
                        ContentKind::Post => "posts",
                        ContentKind::Comment => "comments",
                        ContentKind::Course => "courses",
                    };
                    // best effort: the item may already be gone
                    sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
                        .bind(target_id)
                        .execute(&mut *tx)
                        .await
                        .map_err(db_err)?;
                }
                true
            }
            WarningResponse::Dispute => {
                sqlx::query(
                    "INSERT INTO reports (reporting_user, target_type, target_id, description) \
                     VALUES ($1, 'warning', $2, $3)",
                )
                .bind(user)
                .bind(warning_id)
                .bind(format!("disputed warning: {}", warning.reason))
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
                false
            }
        };
        let row = sqlx::query_as::<_, WarningRow>(
            "UPDATE user_warnings SET is_accepted = $2 WHERE id = $1 \
             RETURNING id, user_id, admin_id, reason, target_type, target_id, created_at, is_accepted",
        )
        .bind(warning_id)
        .bind(accepted)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        row.into_warning()
    }

    async fn list_warnings_for(&self, user: Id) -> RepoResult<Vec<UserWarning>> {
        let rows = sqlx::query_as::<_, WarningRow>(
            "SELECT id, user_id, admin_id, reason, target_type, target_id, created_at, is_accepted \
             FROM user_warnings WHERE user_id = $1 ORDER BY id",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(WarningRow::into_warning).collect()
    }

    async fn block_user(&self, admin_user: Id, target_user: Id) -> RepoResult<User> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        // lock the target row so the count cannot go stale mid-transaction
        let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(target_user)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        if locked.is_none() {
            return Err(RepoError::NotFound);
        }
        let accepted: i64 =
            sqlx::query_scalar("SELECT count(*) FROM user_warnings WHERE user_id = $1 AND is_accepted = TRUE")
                .bind(target_user)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?;
        if accepted < 3 {
            return Err(RepoError::InsufficientWarnings);
        }
        let profile = ensure_admin_profile(&mut tx, admin_user).await?;
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET is_blocked = TRUE WHERE id = $1 RETURNING {USER_COLS}"
        ))
        .bind(target_user)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        append_action(
            &mut tx,
            profile.id,
            AdminActionKind::UserBlocked,
            target_user,
            &format!("blocked after {accepted} accepted warnings"),
        )
        .await?;
        tx.commit().await.map_err(db_err)?;
        row.into_user()
    }

    async fn ban_user(&self, admin_user: Id, target_user: Id) -> RepoResult<User> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let profile = ensure_admin_profile(&mut tx, admin_user).await?;
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET is_active = FALSE WHERE id = $1 RETURNING {USER_COLS}"
        ))
        .bind(target_user)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or(RepoError::NotFound)?;
        append_action(&mut tx, profile.id, AdminActionKind::UserBanned, target_user, "").await?;
        tx.commit().await.map_err(db_err)?;
        row.into_user()
    }

    async fn file_report(&self, user: Id, new: NewReport) -> RepoResult<Report> {
        let row = sqlx::query_as::<_, ReportRow>(
            "INSERT INTO reports (reporting_user, target_type, target_id, description) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, reporting_user, target_type, target_id, description, created_at, status, processed_by, resolved_at",
        )
        .bind(user)
        .bind(new.target_type.as_str())
        .bind(new.target_id)
        .bind(&new.description)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        row.into_report()
    }

    async fn list_pending_reports(&self) -> RepoResult<Vec<Report>> {
        let rows = sqlx::query_as::<_, ReportRow>(
            "SELECT id, reporting_user, target_type, target_id, description, created_at, status, processed_by, resolved_at \
             FROM reports WHERE status = 'pending' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(ReportRow::into_report).collect()
    }

    async fn list_reports_by(&self, user: Id) -> RepoResult<Vec<Report>> {
        let rows = sqlx::query_as::<_, ReportRow>(
            "SELECT id, reporting_user, target_type, target_id, description, created_at, status, processed_by, resolved_at \
             FROM reports WHERE reporting_user = $1 ORDER BY id",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(ReportRow::into_report).collect()
    }

    async fn process_report(&self, admin_user: Id, report_id: Id, action: ReportAction) -> RepoResult<Report> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let current = sqlx::query_as::<_, ReportRow>(
            "SELECT id, reporting_user, target_type, target_id, description, created_at, status, processed_by, resolved_at \
             FROM reports WHERE id = $1 FOR UPDATE",
        )
        .bind(report_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or(RepoError::NotFound)?
        .into_report()?;
        if current.status.is_terminal() {
            return Err(RepoError::Conflict);
        }
        let profile = ensure_admin_profile(&mut tx, admin_user).await?;
        let status = match action {
            ReportAction::Accept => ReportStatus::Resolved,
            ReportAction::Reject => ReportStatus::Rejected,
        };
        let row = sqlx::query_as::<_, ReportRow>(
            "UPDATE reports SET status = $2, processed_by = $3, resolved_at = now() WHERE id = $1 \
             RETURNING id, reporting_user, target_type, target_id, description, created_at, status, processed_by, resolved_at",
        )
        .bind(report_id)
        .bind(status.as_str())
        .bind(admin_user)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        sqlx::query("UPDATE admin_profiles SET problems_resolved_count = problems_resolved_count + 1 WHERE id = $1")
            .bind(profile.id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        append_action(&mut tx, profile.id, AdminActionKind::ReportProcessed, report_id, status.as_str()).await?;
        tx.commit().await.map_err(db_err)?;
        row.into_report()
    }

    async fn list_admin_actions(&self) -> RepoResult<Vec<AdminAction>> {
        let rows = sqlx::query_as::<_, ActionRow>(
            "SELECT id, admin_id, action_type, target_id, details, created_at FROM admin_actions ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(ActionRow::into_action).collect()
    }
}

#[async_trait]
impl ReputationRepo for PgRepo {
    async fn get_or_create_profile(&self, user: Id) -> RepoResult<ProfileView> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        if !user_exists(&mut tx, user).await? {
            return Err(RepoError::NotFound);
        }
        sqlx::query("INSERT INTO profile_views (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        let profile = sqlx::query_as::<_, ProfileView>(
            "SELECT id, user_id, total_points, rating FROM profile_views WHERE user_id = $1",
        )
        .bind(user)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(profile)
    }

    async fn rate_for_help(&self, rater: Id, target_user: Id) -> RepoResult<ProfileView> {
        if rater == target_user {
            return Err(RepoError::SelfRating);
        }
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        if !user_exists(&mut tx, rater).await? || !user_exists(&mut tx, target_user).await? {
            return Err(RepoError::NotFound);
        }
        if find_chat_pair(&mut tx, rater, target_user).await?.is_none() {
            return Err(RepoError::NoSharedChat);
        }
        sqlx::query("UPDATE users SET chat_help_likes_cnt = chat_help_likes_cnt + 1 WHERE id = $1")
            .bind(target_user)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("INSERT INTO profile_views (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(target_user)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        // lock the row, then clamp and recompute in one place
        let mut profile = sqlx::query_as::<_, ProfileView>(
            "SELECT id, user_id, total_points, rating FROM profile_views WHERE user_id = $1 FOR UPDATE",
        )
        .bind(target_user)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        profile.total_points += POINTS_PER_HELP;
        profile.recompute();
        sqlx::query("UPDATE profile_views SET total_points = $2, rating = $3 WHERE id = $1")
            .bind(profile.id)
            .bind(profile.total_points)
            .bind(profile.rating)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(profile)
    }
}
