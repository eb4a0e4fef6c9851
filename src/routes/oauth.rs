// ABOUTME: OAuth route handlers for the HMRC connect, callback, status, and disconnect flow
// ABOUTME: The CSRF state cookie is set on connect and must match the stored state on callback
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::constants::oauth as oauth_constants;
use crate::errors::{AppError, AppResult, ErrorCode};

/// `GET /oauth/hmrc/connect/:user_id`
///
/// Generates the authorization state, pins it in an `httpOnly` cookie, and
/// redirects the user to HMRC.
pub async fn connect(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    jar: CookieJar,
) -> AppResult<impl IntoResponse> {
    let authorization = state.oauth.begin_authorization(user_id).await?;

    let mut cookie = Cookie::new(oauth_constants::STATE_COOKIE, authorization.state.clone());
    cookie.set_http_only(true);
    cookie.set_secure(state.secure_cookies);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path("/");

    Ok((
        jar.add(cookie),
        Redirect::temporary(&authorization.authorization_url),
    ))
}

/// Query parameters HMRC sends back to the redirect URI
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Present when the user denied the authorization
    pub error: Option<String>,
}

/// `GET /oauth/hmrc/callback`
///
/// Fails closed before any token exchange unless the returned `state`
/// matches both the CSRF cookie and the stored single-use server-side state.
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> AppResult<impl IntoResponse> {
    let cookie_state = jar
        .get(oauth_constants::STATE_COOKIE)
        .map(|c| c.value().to_owned());

    let mut removal = Cookie::from(oauth_constants::STATE_COOKIE);
    removal.set_path("/");
    let cleared = jar.remove(removal);

    if let Some(error) = query.error {
        return Err(AppError::new(
            ErrorCode::AuthRequired,
            format!("HMRC authorization was not granted ({error})"),
        ));
    }

    let (code, returned_state) = match (query.code, query.state) {
        (Some(code), Some(state)) => (code, state),
        _ => {
            return Err(AppError::new(
                ErrorCode::InvalidState,
                "callback is missing code or state",
            ))
        }
    };

    // Browser-bound factor: the state must round-trip through the cookie
    // set on connect, not just match the server-side store.
    if cookie_state.as_deref() != Some(returned_state.as_str()) {
        return Err(AppError::new(
            ErrorCode::InvalidState,
            ErrorCode::InvalidState.description(),
        ));
    }

    let response = state.oauth.handle_callback(&code, &returned_state).await?;

    Ok((cleared, Json(response)))
}

/// `GET /oauth/hmrc/status/:user_id`
pub async fn status(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let connection = state.oauth.connection(user_id).await?;

    Ok(Json(connection.map_or_else(
        || serde_json::json!({ "connected": false }),
        |record| {
            serde_json::json!({
                "connected": true,
                "expiresAt": record.expires_at,
                "scope": record.scope,
            })
        },
    )))
}

/// `DELETE /oauth/hmrc/:user_id`
pub async fn disconnect(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.oauth.disconnect(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
