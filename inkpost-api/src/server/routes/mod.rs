use crate::server::ServerRouter;
use axum::Router;

mod pages;
mod posts;
mod users;

pub const INDEX_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/login";

pub fn routes() -> ServerRouter {
    Router::new()
        .merge(posts::routes())
        .merge(users::routes())
        .merge(pages::routes())
}
