use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Extension, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use http::StatusCode;

use crate::error::{ErrorKind, Result};
use crate::routes;

use super::extract::SESSION_COOKIE;
use super::{ConfigExt, Router};

pub fn router() -> Router {
    Router::new()
        .route(routes::ADMIN_LOGIN, post(login))
        .route(routes::ADMIN_LOGOUT, post(logout))
}

#[derive(Debug, Deserialize)]
pub struct LoginData {
    password: String,
}

/// Exchanges the admin secret for a session cookie. With no secret
/// configured the exchange always fails.
pub async fn login(
    Extension(config): ConfigExt,
    mut cookies: CookieJar,
    Json(data): Json<LoginData>,
) -> Result<(CookieJar, impl IntoResponse)> {
    if config.admin.secret.is_empty() || data.password != config.admin.secret {
        return Err(ErrorKind::Unauthorized.into());
    }

    cookies = cookies.add(
        Cookie::build((SESSION_COOKIE, config.admin.secret.clone()))
            .http_only(true)
            .path("/"),
    );

    Ok((cookies, StatusCode::NO_CONTENT))
}

pub async fn logout(mut cookies: CookieJar) -> (CookieJar, StatusCode) {
    cookies = cookies.remove(Cookie::from(SESSION_COOKIE));
    (cookies, StatusCode::NO_CONTENT)
}
