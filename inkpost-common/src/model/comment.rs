use crate::model::{
    Id,
    field::text_field,
    post::PostMarker,
    user::{Author, UserMarker},
};
use serde::{Deserialize, Serialize};

pub const COMMENT_TEXT_MAX_LEN: usize = 5_000;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CommentMarker;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct Comment {
    pub id: Id<CommentMarker>,
    pub post: Id<PostMarker>,
    pub author: Author,
    pub text: CommentText,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct CreateComment {
    pub post: Id<PostMarker>,
    pub author: Id<UserMarker>,
    pub text: CommentText,
}

text_field!(CommentText: "Comment", max_len = COMMENT_TEXT_MAX_LEN);
