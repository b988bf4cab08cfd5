use crate::models::User;
use crate::services::{api_token, auth};
use crate::web::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum_extra::extract::CookieJar;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub const SESSION_COOKIE: &str = "session";

fn session_user(state: &AppState, headers: &HeaderMap) -> anyhow::Result<Option<User>> {
    let cookies = CookieJar::from_headers(headers);
    match cookies.get(SESSION_COOKIE) {
        Some(cookie) => auth::validate_session(&state.db, cookie.value()),
        None => Ok(None),
    }
}

/// `/accounts/login?next=<path>` for the request being rejected.
pub fn login_redirect(uri: &axum::http::Uri) -> Redirect {
    let next = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let encoded: String = url::form_urlencoded::byte_serialize(next.as_bytes()).collect();
    Redirect::to(&format!("/accounts/login?next={}", encoded))
}

/// A signed-in browser user. Anonymous requests are redirected to the login page.
pub struct CurrentUser(pub User);

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = Response;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> Pin<Box<dyn Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        let state = state.clone();
        let headers = parts.headers.clone();
        let uri = parts.uri.clone();
        Box::pin(async move {
            match session_user(&state, &headers) {
                Ok(Some(user)) => Ok(CurrentUser(user)),
                Ok(None) => Err(login_redirect(&uri).into_response()),
                Err(e) => {
                    tracing::error!("Session lookup failed: {:?}", e);
                    Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
                }
            }
        })
    }
}

pub struct OptionalUser(pub Option<User>);

impl FromRequestParts<Arc<AppState>> for OptionalUser {
    type Rejection = StatusCode;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> Pin<Box<dyn Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        let state = state.clone();
        let headers = parts.headers.clone();
        Box::pin(async move {
            let user = session_user(&state, &headers).ok().flatten();
            Ok(OptionalUser(user))
        })
    }
}

/// Raw key from `Authorization: Token <key>` or `Authorization: Bearer <key>`.
pub fn api_key(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, key) = value.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer") {
        let key = key.trim();
        (!key.is_empty()).then(|| key.to_string())
    } else {
        None
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Token")],
        Json(serde_json::json!({
            "error": "Unauthorized",
            "message": message,
        })),
    )
        .into_response()
}

/// An API caller authenticated by key or, failing that, by session cookie.
pub struct ApiUser(pub User);

impl FromRequestParts<Arc<AppState>> for ApiUser {
    type Rejection = Response;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> Pin<Box<dyn Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        let state = state.clone();
        let headers = parts.headers.clone();
        Box::pin(async move {
            let lookup = match api_key(&headers) {
                Some(key) => api_token::validate_token(&state.db, &key),
                None => session_user(&state, &headers),
            };
            match lookup {
                Ok(Some(user)) => Ok(ApiUser(user)),
                Ok(None) if headers.contains_key(header::AUTHORIZATION) => {
                    Err(unauthorized("Invalid token"))
                }
                Ok(None) => Err(unauthorized(
                    "Authentication credentials were not provided",
                )),
                Err(e) => {
                    tracing::error!("API authentication failed: {:?}", e);
                    Err((
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(serde_json::json!({"error": "Internal server error"})),
                    )
                        .into_response())
                }
            }
        })
    }
}
