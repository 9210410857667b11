use crate::server::{
    Result, ServerError, ServerRouter,
    flash::{self, Flash},
    form::{CommentForm, Form, PostForm},
    routes::{INDEX_PATH, LOGIN_PATH},
    session::{AdminUser, CurrentUser},
    view::{IndexView, PageContext, PostView, render, render_form},
};
use axum::{
    extract::{FromRequest, Request, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::{
    extract::SignedCookieJar,
    routing::{RouterExt, TypedPath},
};
use inkpost_common::model::{
    Id,
    comment::CreateComment,
    post::{CreatePost, Post, PostMarker, format_post_date},
    user::User,
};
use inkpost_db::client::{DbClient, DbError};
use serde::Deserialize;
use std::sync::Arc;
use time::UtcDateTime;
use tracing::{debug, info};

const DUPLICATE_TITLE: &str = "A post with that title already exists.";

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .route(INDEX_PATH, get(list_posts))
        .typed_get(show_post)
        .typed_post(comment_on_post)
        .route("/new-post", get(new_post_form).post(create_post))
        .typed_get(edit_post_form)
        .typed_post(update_post)
        .typed_get(delete_post)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/post/{id}", rejection(ServerError))]
struct PostPath {
    id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/edit-post/{id}", rejection(ServerError))]
struct EditPostPath {
    id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/delete/{id}", rejection(ServerError))]
struct DeletePostPath {
    id: Id<PostMarker>,
}

async fn list_posts(
    State(db): State<Arc<DbClient>>,
    CurrentUser(user): CurrentUser,
    jar: SignedCookieJar,
) -> Result<Response> {
    let posts = db.fetch_posts().await?;
    let (jar, page) = PageContext::take(jar, user);

    Ok(render(jar, StatusCode::OK, IndexView { page, posts }))
}

async fn fetch_post(db: &DbClient, id: Id<PostMarker>) -> Result<Post> {
    db.fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))
}

async fn show_post(
    PostPath { id }: PostPath,
    State(db): State<Arc<DbClient>>,
    CurrentUser(user): CurrentUser,
    jar: SignedCookieJar,
) -> Result<Response> {
    let post = fetch_post(&db, id).await?;
    let comments = db.fetch_post_comments(id).await?;
    let (jar, page) = PageContext::take(jar, user);

    let view = PostView {
        page,
        post,
        comments,
        form: CommentForm::default(),
        errors: Vec::new(),
    };
    Ok(render(jar, StatusCode::OK, view))
}

async fn comment_on_post(
    PostPath { id }: PostPath,
    State(db): State<Arc<DbClient>>,
    CurrentUser(user): CurrentUser,
    jar: SignedCookieJar,
    request: Request,
) -> Result<Response> {
    let post = fetch_post(&db, id).await?;

    let Some(user) = user else {
        let jar = flash::push(jar, Flash::warning("You need to log in to leave a comment."))?;
        return Ok((jar, Redirect::to(LOGIN_PATH)).into_response());
    };
    // Anonymous bodies are never parsed.
    let Form(form) = Form::<CommentForm>::from_request(request, &()).await?;

    let text = match form.validate() {
        Ok(text) => text,
        Err(errors) => {
            let comments = db.fetch_post_comments(id).await?;
            let (jar, page) = PageContext::take(jar, Some(user));
            let view = PostView {
                page,
                post,
                comments,
                form,
                errors,
            };
            return Ok(render(jar, StatusCode::UNPROCESSABLE_ENTITY, view));
        }
    };

    let comment_id = db
        .create_comment(&CreateComment {
            post: id,
            author: user.id,
            text,
        })
        .await?;
    debug!(%comment_id, post_id = %id, user_id = %user.id, "Comment created");

    Ok(Redirect::to(&PostPath { id }.to_string()).into_response())
}

fn post_editor(
    jar: SignedCookieJar,
    admin: User,
    form: PostForm,
    errors: Vec<String>,
) -> Response {
    let status = if errors.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };

    render_form(jar, Some(admin), status, form, errors)
}

async fn new_post_form(AdminUser(admin): AdminUser, jar: SignedCookieJar) -> Response {
    post_editor(jar, admin, PostForm::default(), Vec::new())
}

async fn create_post(
    AdminUser(admin): AdminUser,
    State(db): State<Arc<DbClient>>,
    jar: SignedCookieJar,
    Form(form): Form<PostForm>,
) -> Result<Response> {
    let content = match form.validate() {
        Ok(content) => content,
        Err(errors) => return Ok(post_editor(jar, admin, form, errors)),
    };

    let post = CreatePost {
        author: admin.id,
        date: format_post_date(UtcDateTime::now().date()),
        content,
    };
    match db.create_post(&post).await {
        Ok(post_id) => {
            info!(%post_id, user_id = %admin.id, "Post created");
            Ok(Redirect::to(INDEX_PATH).into_response())
        }
        Err(DbError::DuplicateTitle) => {
            Ok(post_editor(jar, admin, form, vec![DUPLICATE_TITLE.to_owned()]))
        }
        Err(err) => Err(err.into()),
    }
}

async fn edit_post_form(
    EditPostPath { id }: EditPostPath,
    AdminUser(admin): AdminUser,
    State(db): State<Arc<DbClient>>,
    jar: SignedCookieJar,
) -> Result<Response> {
    let post = fetch_post(&db, id).await?;

    Ok(post_editor(jar, admin, PostForm::from(&post.content), Vec::new()))
}

async fn update_post(
    EditPostPath { id }: EditPostPath,
    AdminUser(admin): AdminUser,
    State(db): State<Arc<DbClient>>,
    jar: SignedCookieJar,
    Form(form): Form<PostForm>,
) -> Result<Response> {
    let content = match form.validate() {
        Ok(content) => content,
        Err(errors) => return Ok(post_editor(jar, admin, form, errors)),
    };

    match db.update_post(id, &content).await {
        Ok(true) => {
            info!(post_id = %id, user_id = %admin.id, "Post edited");
            Ok(Redirect::to(&PostPath { id }.to_string()).into_response())
        }
        Ok(false) => Err(ServerError::PostByIdNotFound(id)),
        Err(DbError::DuplicateTitle) => {
            Ok(post_editor(jar, admin, form, vec![DUPLICATE_TITLE.to_owned()]))
        }
        Err(err) => Err(err.into()),
    }
}

async fn delete_post(
    DeletePostPath { id }: DeletePostPath,
    AdminUser(admin): AdminUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Redirect> {
    if !db.delete_post(id).await? {
        return Err(ServerError::PostByIdNotFound(id));
    }

    info!(post_id = %id, user_id = %admin.id, "Post deleted");
    Ok(Redirect::to(INDEX_PATH))
}
