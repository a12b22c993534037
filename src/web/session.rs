// 🍪 Session Cookie - token in, Principal out

use super::AppState;
use crate::auth::{self, Principal};
use crate::error::AppError;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use chrono::Utc;

pub const SESSION_COOKIE: &str = "sf_session";

/// Raw session token from the Cookie header, if any
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token.to_string())
        .filter(|token| !token.is_empty())
}

/// Set-Cookie value for a fresh session
pub fn session_cookie(token: &str, ttl: chrono::Duration) -> String {
    format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        ttl.num_seconds()
    )
}

/// Set-Cookie value that removes the session cookie
pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthenticated("Please log in to continue.".to_string()))?;

        let conn = state.conn();
        auth::resolve_session(&conn, &token, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; sf_session=abc-123; other=1"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc-123"));

        headers.insert(header::COOKIE, HeaderValue::from_static("sf_session="));
        assert_eq!(session_token(&headers), None);
    }

    #[test]
    fn test_cookie_attributes() {
        let cookie = session_cookie("tok", chrono::Duration::hours(2));
        assert!(cookie.starts_with("sf_session=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=7200"));
        assert!(clear_session_cookie().contains("Max-Age=0"));
    }
}
