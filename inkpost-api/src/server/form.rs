//! Submitted forms and their validation into model types.
//!
//! Every field is taken as a plain string so that a bad value leads to a
//! re-rendered form listing what is wrong, not to a rejected request.

use crate::server::ServerError;
use axum::extract::FromRequest;
use inkpost_common::model::{
    auth::PlaintextPassword,
    comment::CommentText,
    field::InvalidFieldError,
    post::{ImageUrl, PostBody, PostContent, PostSubtitle, PostTitle},
    user::{Email, UserName},
};
use serde::{Deserialize, Serialize};

#[derive(FromRequest, Debug, Clone, Copy, Default)]
#[from_request(via(axum::Form), rejection(ServerError))]
pub struct Form<T>(pub T);

#[derive(Clone, Eq, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

pub struct Registration {
    pub name: UserName,
    pub email: Email,
    pub password: PlaintextPassword,
}

#[derive(Clone, Eq, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

pub struct LoginAttempt {
    pub email: Email,
    pub password: PlaintextPassword,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CommentForm {
    pub text: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PostForm {
    pub title: String,
    pub subtitle: String,
    pub body: String,
    pub img_url: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default)]
struct FieldErrors(Vec<InvalidFieldError>);

impl FieldErrors {
    fn check<T>(&mut self, result: Result<T, InvalidFieldError>) -> Option<T> {
        result.map_err(|err| self.0.push(err)).ok()
    }

    fn into_messages(self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl RegisterForm {
    pub fn validate(&self) -> Result<Registration, Vec<String>> {
        let mut errors = FieldErrors::default();
        let name = errors.check(UserName::new(self.name.clone()));
        let email = errors.check(Email::new(self.email.clone()));
        let password = errors.check(PlaintextPassword::new(self.password.clone()));

        match (name, email, password) {
            (Some(name), Some(email), Some(password)) => Ok(Registration {
                name,
                email,
                password,
            }),
            _ => Err(errors.into_messages()),
        }
    }
}

impl LoginForm {
    pub fn validate(&self) -> Result<LoginAttempt, Vec<String>> {
        let mut errors = FieldErrors::default();
        let email = errors.check(Email::new(self.email.clone()));
        let password = errors.check(PlaintextPassword::new(self.password.clone()));

        match (email, password) {
            (Some(email), Some(password)) => Ok(LoginAttempt { email, password }),
            _ => Err(errors.into_messages()),
        }
    }
}

impl CommentForm {
    pub fn validate(&self) -> Result<CommentText, Vec<String>> {
        let mut errors = FieldErrors::default();
        errors
            .check(CommentText::new(self.text.clone()))
            .ok_or_else(|| errors.into_messages())
    }
}

impl PostForm {
    pub fn validate(&self) -> Result<PostContent, Vec<String>> {
        let mut errors = FieldErrors::default();
        let title = errors.check(PostTitle::new(self.title.clone()));
        let subtitle = errors.check(PostSubtitle::new(self.subtitle.clone()));
        let body = errors.check(PostBody::new(self.body.clone()));
        let img_url = errors.check(ImageUrl::new(self.img_url.clone()));

        match (title, subtitle, body, img_url) {
            (Some(title), Some(subtitle), Some(body), Some(img_url)) => Ok(PostContent {
                title,
                subtitle,
                body,
                img_url,
            }),
            _ => Err(errors.into_messages()),
        }
    }
}

impl From<&PostContent> for PostForm {
    fn from(content: &PostContent) -> Self {
        Self {
            title: content.title.get().to_owned(),
            subtitle: content.subtitle.get().to_owned(),
            body: content.body.get().to_owned(),
            img_url: content.img_url.get().to_owned(),
        }
    }
}
