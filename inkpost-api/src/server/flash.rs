//! One-shot messages carried to the next rendered view in a signed cookie.

use crate::server::Result;
use axum_extra::extract::{
    SignedCookieJar,
    cookie::{Cookie, SameSite},
};
use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

const FLASH_COOKIE: &str = "flash";

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashCategory {
    Info,
    Warning,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Flash {
    pub category: FlashCategory,
    pub message: String,
}

impl Flash {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            category: FlashCategory::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            category: FlashCategory::Warning,
            message: message.into(),
        }
    }
}

pub fn push(jar: SignedCookieJar, flash: Flash) -> Result<SignedCookieJar> {
    let mut flashes = pending(&jar);
    flashes.push(flash);

    let encoded = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(&flashes)?);
    let cookie = Cookie::build((FLASH_COOKIE, encoded))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);

    Ok(jar.add(cookie))
}

/// Removes and returns all pending flashes.
pub fn take(jar: SignedCookieJar) -> (SignedCookieJar, Vec<Flash>) {
    if jar.get(FLASH_COOKIE).is_none() {
        return (jar, Vec::new());
    }

    let flashes = pending(&jar);
    (jar.remove(Cookie::build(FLASH_COOKIE).path("/")), flashes)
}

// Undecodable flashes are dropped; they were only ever informational.
fn pending(jar: &SignedCookieJar) -> Vec<Flash> {
    jar.get(FLASH_COOKIE)
        .and_then(|cookie| BASE64_URL_SAFE_NO_PAD.decode(cookie.value()).ok())
        .and_then(|json| serde_json::from_slice(&json).ok())
        .unwrap_or_default()
}
