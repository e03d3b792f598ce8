use std::ops::Deref;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::async_trait;
use axum_extra::extract::CookieJar;

use crate::error::{Error, ErrorKind};
use crate::track::Client;
use crate::Config;

/// Name of the operator session cookie.
pub const SESSION_COOKIE: &str = "operator_session";

/// Proof of an authenticated operator session.
///
/// Extraction succeeds only when the session cookie matches the
/// configured admin secret. With no secret configured every request is
/// rejected; the operator surface fails closed.
pub struct OperatorSession;

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for OperatorSession {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = parts
            .extensions
            .get::<Arc<Config>>()
            .expect("config extension unavailable")
            .clone();

        if config.admin.secret.is_empty() {
            return Err(ErrorKind::Unauthorized.into());
        }

        let jar = CookieJar::from_request_parts(parts, state)
            .await
            .map_err(Error::from)?;
        match jar.get(SESSION_COOKIE) {
            Some(cookie) if cookie.value() == config.admin.secret => Ok(OperatorSession),
            _ => Err(ErrorKind::Unauthorized.into()),
        }
    }
}

/// Remote client metadata, extracted on the tracking surface.
///
/// The ip takes the first `x-forwarded-for` hop when present, then
/// `x-real-ip`. Extraction never rejects.
#[derive(Clone, Debug)]
pub struct ClientMeta(pub Client);

impl Deref for ClientMeta {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());
        let user_agent = headers
            .get(http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        Ok(ClientMeta(Client { ip, user_agent }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwarded_for_takes_the_first_hop() {
        let request = http::Request::builder()
            .uri("/")
            .header("x-forwarded-for", "9.9.9.9, 10.0.0.1")
            .header(http::header::USER_AGENT, "test/1.0")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let ClientMeta(client) = ClientMeta::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(client.ip, "9.9.9.9");
        assert_eq!(client.user_agent, "test/1.0");
    }

    #[tokio::test]
    async fn missing_headers_degrade_to_unknown() {
        let request = http::Request::builder().uri("/").body(()).unwrap();
        let (mut parts, _) = request.into_parts();

        let ClientMeta(client) = ClientMeta::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(client.ip, "unknown");
        assert_eq!(client.user_agent, "");
    }

    #[tokio::test]
    async fn operator_session_fails_closed_without_a_secret() {
        let request = http::Request::builder().uri("/").body(()).unwrap();
        let (mut parts, _) = request.into_parts();
        parts.extensions.insert(Arc::new(Config::default()));

        let result = OperatorSession::from_request_parts(&mut parts, &()).await;
        assert!(result.is_err());
    }
}
