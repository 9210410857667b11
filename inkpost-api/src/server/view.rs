//! The data each page is rendered from, sent as JSON.

use crate::server::{
    flash::{self, Flash},
    form::CommentForm,
    json::Json,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::SignedCookieJar;
use inkpost_common::model::{comment::Comment, post::Post, user::User};
use serde::Serialize;

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct PageContext {
    pub current_user: Option<User>,
    pub flashes: Vec<Flash>,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct IndexView {
    #[serde(flatten)]
    pub page: PageContext,
    pub posts: Vec<Post>,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub page: PageContext,
    pub post: Post,
    pub comments: Vec<Comment>,
    pub form: CommentForm,
    pub errors: Vec<String>,
}

#[derive(Clone, Serialize)]
pub struct FormView<F> {
    #[serde(flatten)]
    pub page: PageContext,
    pub form: F,
    pub errors: Vec<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct StaticView {
    #[serde(flatten)]
    pub page: PageContext,
    pub title: &'static str,
}

impl PageContext {
    /// Builds the context for a page shown to `current_user`, consuming pending flashes.
    pub fn take(jar: SignedCookieJar, current_user: Option<User>) -> (SignedCookieJar, Self) {
        let (jar, flashes) = flash::take(jar);

        (
            jar,
            Self {
                current_user,
                flashes,
            },
        )
    }
}

pub fn render<V: Serialize>(jar: SignedCookieJar, status: StatusCode, view: V) -> Response {
    (status, jar, Json(view)).into_response()
}

/// Shows `form` again, with `errors` if it was rejected.
pub fn render_form<F: Serialize>(
    jar: SignedCookieJar,
    current_user: Option<User>,
    status: StatusCode,
    form: F,
    errors: Vec<String>,
) -> Response {
    let (jar, page) = PageContext::take(jar, current_user);

    render(jar, status, FormView { page, form, errors })
}
