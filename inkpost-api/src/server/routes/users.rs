use crate::server::{
    Result, ServerRouter,
    flash::{self, Flash},
    form::{Form, LoginForm, RegisterForm},
    routes::{INDEX_PATH, LOGIN_PATH},
    session::{self, CurrentUser, SessionLifetime},
    view::render_form,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::SignedCookieJar;
use inkpost_common::model::{auth::HashedPassword, user::CreateUser};
use inkpost_db::client::{DbClient, DbError};
use std::sync::Arc;
use tracing::info;

const ALREADY_REGISTERED: &str = "You already signed up with that email, log in instead.";
// Shared by unknown emails and wrong passwords.
const INVALID_CREDENTIALS: &str = "Invalid email or password.";

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .route("/register", get(register_form).post(register))
        .route(LOGIN_PATH, get(login_form).post(login))
        .route("/logout", get(logout))
}

async fn register_form(CurrentUser(user): CurrentUser, jar: SignedCookieJar) -> Response {
    render_form(jar, user, StatusCode::OK, RegisterForm::default(), Vec::new())
}

async fn register(
    State(db): State<Arc<DbClient>>,
    State(lifetime): State<SessionLifetime>,
    CurrentUser(current_user): CurrentUser,
    jar: SignedCookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<Response> {
    let registration = match form.validate() {
        Ok(registration) => registration,
        Err(errors) => {
            let status = StatusCode::UNPROCESSABLE_ENTITY;
            return Ok(render_form(jar, current_user, status, form, errors));
        }
    };

    if db.fetch_user_by_email(&registration.email).await?.is_some() {
        return already_registered(jar);
    }

    let new_user = CreateUser {
        name: registration.name,
        email: registration.email,
        password_hash: HashedPassword::hash(&registration.password)?,
    };
    let user = match db.create_user(&new_user).await {
        Ok(user) => user,
        Err(DbError::DuplicateEmail) => return already_registered(jar),
        Err(err) => return Err(err.into()),
    };
    info!(user_id = %user.id, role = %user.role, "User registered");

    let jar = session::start(jar, &db, lifetime, user.id).await?;
    Ok((jar, Redirect::to(INDEX_PATH)).into_response())
}

fn already_registered(jar: SignedCookieJar) -> Result<Response> {
    let jar = flash::push(jar, Flash::warning(ALREADY_REGISTERED))?;
    Ok((jar, Redirect::to(LOGIN_PATH)).into_response())
}

async fn login_form(CurrentUser(user): CurrentUser, jar: SignedCookieJar) -> Response {
    render_form(jar, user, StatusCode::OK, LoginForm::default(), Vec::new())
}

async fn login(
    State(db): State<Arc<DbClient>>,
    State(lifetime): State<SessionLifetime>,
    CurrentUser(current_user): CurrentUser,
    jar: SignedCookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let attempt = match form.validate() {
        Ok(attempt) => attempt,
        Err(errors) => {
            let status = StatusCode::UNPROCESSABLE_ENTITY;
            return Ok(render_form(jar, current_user, status, form, errors));
        }
    };

    let verified_user = match db.fetch_credentials_by_email(&attempt.email).await? {
        Some(credentials) => credentials
            .password_hash
            .verify(&attempt.password)?
            .then_some(credentials.user),
        None => None,
    };
    let Some(user) = verified_user else {
        info!("Rejected login attempt");
        let errors = vec![INVALID_CREDENTIALS.to_owned()];
        return Ok(render_form(jar, current_user, StatusCode::UNAUTHORIZED, form, errors));
    };
    info!(user_id = %user.id, "User logged in");

    let jar = session::start(jar, &db, lifetime, user.id).await?;
    let jar = flash::push(jar, Flash::info("Logged in successfully."))?;
    Ok((jar, Redirect::to(INDEX_PATH)).into_response())
}

async fn logout(State(db): State<Arc<DbClient>>, jar: SignedCookieJar) -> Result<Response> {
    let jar = session::end(jar, &db).await?;
    let jar = flash::push(jar, Flash::info("You have been logged out."))?;

    Ok((jar, Redirect::to(INDEX_PATH)).into_response())
}
