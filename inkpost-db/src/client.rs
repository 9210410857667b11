use crate::record::{
    FullCommentRecord, FullPostRecord, SessionRecord, UserCredentialsRecord, UserRecord,
};
use inkpost_common::model::{
    Id, ModelValidationError,
    auth::{CreateSession, Session, SessionTokenHash},
    comment::{Comment, CommentMarker, CreateComment},
    post::{CreatePost, Post, PostContent, PostMarker},
    user::{CreateUser, Email, User, UserCredentials, UserMarker},
};
use sqlx::{
    SqlitePool,
    migrate::MigrateError,
    query, query_as, query_scalar,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;
use thiserror::Error;
use time::UtcDateTime;
use tracing::{debug, info};

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("A user with that email already exists")]
    DuplicateEmail,
    #[error("A post with that title already exists")]
    DuplicateTitle,
    #[error("Running migrations failed: {0}")]
    Migrate(#[from] MigrateError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

const POST_COLUMNS: &str = "
    SELECT
        posts.post_id,
        posts.title,
        posts.subtitle,
        posts.date,
        posts.body,
        posts.img_url,
        users.user_id AS author_id,
        users.name AS author_name
    FROM
        posts JOIN users ON users.user_id = posts.author_id
";

#[derive(Debug)]
pub struct DbClient {
    pool: SqlitePool,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens the SQLite file at `url`, creating it if missing.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        Ok(Self::new(pool))
    }

    /// A private in-memory store. It lives exactly as long as its only connection.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT user_id, name, email, role
            FROM users
            WHERE user_id = ?
            ",
        )
        .bind(user_id.get().cast_signed())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    pub async fn fetch_user_by_email(&self, email: &Email) -> Result<Option<User>> {
        Ok(self
            .fetch_credentials_by_email(email)
            .await?
            .map(|credentials| credentials.user))
    }

    pub async fn fetch_credentials_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<UserCredentials>> {
        let record = query_as::<_, UserCredentialsRecord>(
            "
            SELECT user_id, name, email, role, password_hash
            FROM users
            WHERE email = ?
            ",
        )
        .bind(email.get())
        .fetch_optional(&self.pool)
        .await?;

        let credentials = record.map(UserCredentials::try_from).transpose()?;
        Ok(credentials)
    }

    /// Inserts a user. The very first user becomes the admin, everyone after is a member.
    pub async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let record = query_as::<_, UserRecord>(
            "
            INSERT INTO users (name, email, password_hash, role)
            VALUES (
                ?, ?, ?,
                CASE WHEN EXISTS (SELECT 1 FROM users) THEN 'member' ELSE 'admin' END
            )
            RETURNING user_id, name, email, role
            ",
        )
        .bind(user.name.get())
        .bind(user.email.get())
        .bind(user.password_hash.as_phc_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| unique_violation_as(err, DbError::DuplicateEmail))?;

        let user = User::try_from(record)?;
        if user.is_admin() {
            info!(user_id = %user.id, "First user registered, granted admin role");
        }

        Ok(user)
    }

    pub async fn fetch_posts(&self) -> Result<Vec<Post>> {
        let sql = format!("{POST_COLUMNS} ORDER BY posts.post_id");
        let records = query_as::<_, FullPostRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let sql = format!("{POST_COLUMNS} WHERE posts.post_id = ?");
        let record = query_as::<_, FullPostRecord>(&sql)
            .bind(post_id.get().cast_signed())
            .fetch_optional(&self.pool)
            .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    pub async fn create_post(&self, post: &CreatePost) -> Result<Id<PostMarker>> {
        let returned_id = query_scalar::<_, i64>(
            "
            INSERT INTO posts (author_id, title, subtitle, date, body, img_url)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING post_id
            ",
        )
        .bind(post.author.get().cast_signed())
        .bind(post.content.title.get())
        .bind(post.content.subtitle.get())
        .bind(post.date.as_str())
        .bind(post.content.body.get())
        .bind(post.content.img_url.get())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| unique_violation_as(err, DbError::DuplicateTitle))?;

        Ok(returned_id.cast_unsigned().into())
    }

    /// Overwrites the editable fields of a post. Returns `false` if there is no such post.
    pub async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> Result<bool> {
        let result = query(
            "
            UPDATE posts
            SET title = ?, subtitle = ?, body = ?, img_url = ?
            WHERE post_id = ?
            ",
        )
        .bind(content.title.get())
        .bind(content.subtitle.get())
        .bind(content.body.get())
        .bind(content.img_url.get())
        .bind(post_id.get().cast_signed())
        .execute(&self.pool)
        .await
        .map_err(|err| unique_violation_as(err, DbError::DuplicateTitle))?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes a post together with all of its comments. Returns `false` if there is no such post.
    pub async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let post_id_param = post_id.get().cast_signed();
        let mut transaction = self.pool.begin().await?;

        let deleted_comments = query("DELETE FROM comments WHERE post_id = ?")
            .bind(post_id_param)
            .execute(&mut *transaction)
            .await?
            .rows_affected();
        let deleted_posts = query("DELETE FROM posts WHERE post_id = ?")
            .bind(post_id_param)
            .execute(&mut *transaction)
            .await?
            .rows_affected();

        transaction.commit().await?;

        debug!(%post_id, deleted_posts, deleted_comments, "Deleted post");
        Ok(deleted_posts > 0)
    }

    pub async fn fetch_post_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>> {
        let records = query_as::<_, FullCommentRecord>(
            "
            SELECT
                comments.comment_id,
                comments.post_id,
                comments.text,
                users.user_id AS author_id,
                users.name AS author_name
            FROM
                comments JOIN users ON users.user_id = comments.author_id
            WHERE
                comments.post_id = ?
            ORDER BY
                comments.comment_id
            ",
        )
        .bind(post_id.get().cast_signed())
        .fetch_all(&self.pool)
        .await?;

        let comments = records
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<_, _>>()?;
        Ok(comments)
    }

    pub async fn create_comment(&self, comment: &CreateComment) -> Result<Id<CommentMarker>> {
        let returned_id = query_scalar::<_, i64>(
            "
            INSERT INTO comments (post_id, author_id, text)
            VALUES (?, ?, ?)
            RETURNING comment_id
            ",
        )
        .bind(comment.post.get().cast_signed())
        .bind(comment.author.get().cast_signed())
        .bind(comment.text.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(returned_id.cast_unsigned().into())
    }

    pub async fn create_session(&self, session: &CreateSession) -> Result<()> {
        query(
            "
            INSERT INTO sessions (token_hash, user_id, created_at, expires_after_seconds)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(&session.token_hash.0[..])
        .bind(session.user.get().cast_signed())
        .bind(session.created_at.unix_timestamp())
        .bind(session.expires_after.map(|duration| duration.whole_seconds()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fetch_session(&self, token_hash: &SessionTokenHash) -> Result<Option<Session>> {
        let record = query_as::<_, SessionRecord>(
            "
            SELECT user_id, token_hash, created_at, expires_after_seconds
            FROM sessions
            WHERE token_hash = ?
            ",
        )
        .bind(&token_hash.0[..])
        .fetch_optional(&self.pool)
        .await?;

        let session = record.map(Session::try_from).transpose()?;
        Ok(session)
    }

    /// Removes every session whose lifetime ran out before `now`. Returns how many were removed.
    pub async fn delete_expired_sessions(&self, now: UtcDateTime) -> Result<u64> {
        let deleted = query(
            "
            DELETE FROM sessions
            WHERE expires_after_seconds IS NOT NULL
                AND created_at + expires_after_seconds < ?
            ",
        )
        .bind(now.unix_timestamp())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if deleted > 0 {
            debug!(deleted, "Purged expired sessions");
        }
        Ok(deleted)
    }

    pub async fn delete_session(&self, token_hash: &SessionTokenHash) -> Result<()> {
        query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(&token_hash.0[..])
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn unique_violation_as(err: sqlx::Error, duplicate: DbError) -> DbError {
    let is_unique_violation = err
        .as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation());

    if is_unique_violation {
        duplicate
    } else {
        err.into()
    }
}
