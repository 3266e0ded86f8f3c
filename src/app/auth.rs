use crate::state;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// The authenticated caller, inserted by the middleware for handlers that
/// need a user id. With auth disabled (local development) every request runs
/// as this fallback user.
#[derive(Debug, Clone)]
pub(crate) struct AuthUser(pub(crate) String);

const LOCAL_USER: &str = "local";

#[derive(Serialize)]
struct AuthErrorResponse {
    error: &'static str,
}

pub(crate) async fn auth_middleware(
    State(state): State<state::AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let auth = match &state.auth {
        Some(auth) => auth,
        None => {
            req.extensions_mut().insert(AuthUser(LOCAL_USER.to_string()));
            return next.run(req).await;
        }
    };

    if is_auth_bypass_path(req.uri().path()) {
        return next.run(req).await;
    }

    let token =
        bearer_token(req.headers()).or_else(|| auth_cookie(req.headers(), auth.cookie_name()));
    if let Some(token) = token
        && let Ok(subject) = auth.verify_token(token)
    {
        req.extensions_mut().insert(AuthUser(subject));
        return next.run(req).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        Json(AuthErrorResponse {
            error: "unauthorized",
        }),
    )
        .into_response()
}

fn is_auth_bypass_path(path: &str) -> bool {
    path == "/health"
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn auth_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    for header in headers.get_all(COOKIE).iter() {
        if let Ok(raw) = header.to_str()
            && let Some(value) = cookie_from_header(raw, name)
        {
            return Some(value);
        }
    }
    None
}

fn cookie_from_header<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    for part in header.split(';') {
        let trimmed = part.trim();
        if let Some((cookie_name, cookie_value)) = trimmed.split_once('=')
            && cookie_name == name
        {
            return Some(cookie_value);
        }
    }
    None
}
