use crate::model::{
    Id,
    field::text_field,
    user::{Author, UserMarker},
};
use serde::{Deserialize, Serialize};
use time::Date;

pub const POST_TITLE_MAX_LEN: usize = 250;
pub const POST_SUBTITLE_MAX_LEN: usize = 250;
pub const POST_BODY_MAX_LEN: usize = 100_000;
pub const IMAGE_URL_MAX_LEN: usize = 250;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub author: Author,
    /// Formatted once at creation, see [`format_post_date`].
    pub date: String,
    #[serde(flatten)]
    pub content: PostContent,
}

/// Everything about a post the admin can edit.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct PostContent {
    pub title: PostTitle,
    pub subtitle: PostSubtitle,
    pub body: PostBody,
    pub img_url: ImageUrl,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct CreatePost {
    pub author: Id<UserMarker>,
    pub date: String,
    pub content: PostContent,
}

text_field!(PostTitle: "Title", max_len = POST_TITLE_MAX_LEN);
text_field!(PostSubtitle: "Subtitle", max_len = POST_SUBTITLE_MAX_LEN);
text_field!(PostBody: "Body", max_len = POST_BODY_MAX_LEN);
text_field!(ImageUrl: "Image URL", max_len = IMAGE_URL_MAX_LEN, check = is_http_url);

/// Formats a post date as e.g. `October 07, 2026`.
#[must_use]
pub fn format_post_date(date: Date) -> String {
    format!("{} {:02}, {}", date.month(), date.day(), date.year())
}

fn is_http_url(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));

    rest.is_some_and(|rest| !rest.is_empty() && !rest.starts_with('/'))
        && !value.chars().any(char::is_whitespace)
}
