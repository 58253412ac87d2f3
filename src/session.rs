#![cfg(feature = "web")]
//! Cookie-backed flash messages and CSRF tokens.

use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Serialize;
use uuid::Uuid;

const FLASH_COOKIE: &str = "flash";
pub const CSRF_COOKIE: &str = "csrf_token";

/// One-shot message shown on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
    pub category: String,
    pub message: String,
}

pub fn set_flash(jar: CookieJar, category: &str, message: &str) -> CookieJar {
    let value = format!("{}:{}", category, urlencoding::encode(message));
    jar.add(Cookie::build((FLASH_COOKIE, value)).path("/").http_only(true))
}

/// Read and clear the pending flash message, if any.
pub fn take_flash(jar: CookieJar) -> (CookieJar, Option<Flash>) {
    let Some(cookie) = jar.get(FLASH_COOKIE) else {
        return (jar, None);
    };
    let flash = parse_flash(cookie.value());
    (jar.remove(Cookie::build(FLASH_COOKIE).path("/")), flash)
}

fn parse_flash(value: &str) -> Option<Flash> {
    let (category, encoded) = value.split_once(':')?;
    let message = urlencoding::decode(encoded).ok()?.into_owned();
    Some(Flash {
        category: category.to_string(),
        message,
    })
}

/// The CSRF token for this browser, minting one when the cookie is absent.
pub fn csrf_token(jar: CookieJar) -> (CookieJar, String) {
    if let Some(cookie) = jar.get(CSRF_COOKIE) {
        if !cookie.value().is_empty() {
            let token = cookie.value().to_string();
            return (jar, token);
        }
    }
    let token = Uuid::new_v4().to_string();
    let cookie = Cookie::build((CSRF_COOKIE, token.clone()))
        .path("/")
        .http_only(true);
    (jar.add(cookie), token)
}

/// Double-submit check: the form field must echo the cookie.
pub fn verify_csrf(jar: &CookieJar, submitted: &str) -> bool {
    match jar.get(CSRF_COOKIE) {
        Some(cookie) => !submitted.is_empty() && cookie.value() == submitted,
        None => false,
    }
}
