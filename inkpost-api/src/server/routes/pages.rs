use crate::server::{
    ServerRouter,
    session::CurrentUser,
    view::{PageContext, StaticView, render},
};
use axum::{http::StatusCode, response::Response, routing::get};
use axum_extra::extract::SignedCookieJar;
use inkpost_common::model::user::User;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .route("/about", get(about))
        .route("/contact", get(contact))
}

async fn about(CurrentUser(user): CurrentUser, jar: SignedCookieJar) -> Response {
    static_page(jar, user, "About")
}

async fn contact(CurrentUser(user): CurrentUser, jar: SignedCookieJar) -> Response {
    static_page(jar, user, "Contact")
}

fn static_page(jar: SignedCookieJar, user: Option<User>, title: &'static str) -> Response {
    let (jar, page) = PageContext::take(jar, user);
    render(jar, StatusCode::OK, StaticView { page, title })
}
