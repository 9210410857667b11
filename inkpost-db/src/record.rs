use inkpost_common::model::{
    ModelValidationError,
    auth::{HashedPassword, Session},
    comment::{Comment, CommentText},
    post::{ImageUrl, Post, PostBody, PostContent, PostSubtitle, PostTitle},
    user::{Author, Email, User, UserCredentials, UserName},
};
use sqlx::FromRow;
use time::{Duration, UtcDateTime};

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct UserCredentialsRecord {
    #[sqlx(flatten)]
    pub user: UserRecord,
    pub password_hash: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct FullPostRecord {
    pub post_id: i64,
    pub title: String,
    pub subtitle: String,
    pub date: String,
    pub body: String,
    pub img_url: String,
    pub author_id: i64,
    pub author_name: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct FullCommentRecord {
    pub comment_id: i64,
    pub post_id: i64,
    pub text: String,
    pub author_id: i64,
    pub author_name: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct SessionRecord {
    pub user_id: i64,
    pub token_hash: Vec<u8>,
    pub created_at: i64,
    pub expires_after_seconds: Option<i64>,
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.user_id.cast_unsigned().into(),
            name: UserName::new(value.name)?,
            email: Email::new(value.email)?,
            role: value.role.parse()?,
        })
    }
}

impl TryFrom<UserCredentialsRecord> for UserCredentials {
    type Error = ModelValidationError;

    fn try_from(value: UserCredentialsRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: value.user.try_into()?,
            password_hash: HashedPassword::from_phc(value.password_hash)?,
        })
    }
}

impl TryFrom<FullPostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: FullPostRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.post_id.cast_unsigned().into(),
            author: Author {
                id: value.author_id.cast_unsigned().into(),
                name: UserName::new(value.author_name)?,
            },
            date: value.date,
            content: PostContent {
                title: PostTitle::new(value.title)?,
                subtitle: PostSubtitle::new(value.subtitle)?,
                body: PostBody::new(value.body)?,
                img_url: ImageUrl::new(value.img_url)?,
            },
        })
    }
}

impl TryFrom<FullCommentRecord> for Comment {
    type Error = ModelValidationError;

    fn try_from(value: FullCommentRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.comment_id.cast_unsigned().into(),
            post: value.post_id.cast_unsigned().into(),
            author: Author {
                id: value.author_id.cast_unsigned().into(),
                name: UserName::new(value.author_name)?,
            },
            text: CommentText::new(value.text)?,
        })
    }
}

impl TryFrom<SessionRecord> for Session {
    type Error = ModelValidationError;

    fn try_from(value: SessionRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: value.user_id.cast_unsigned().into(),
            token_hash: value.token_hash.try_into()?,
            created_at: UtcDateTime::from_unix_timestamp(value.created_at)?,
            expires_after: value
                .expires_after_seconds
                .map(|seconds| Duration::seconds(seconds).try_into())
                .transpose()?,
        })
    }
}
