use super::{field_errors, make_context, require_staff};
use crate::error::FieldErrors;
use crate::models::{CreateSeries, User, UserType};
use crate::services::{auth, series};
use crate::web::error::AppResult;
use crate::web::extractors::CurrentUser;
use crate::web::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct UserFilter {
    #[serde(rename = "type")]
    user_type: Option<String>,
}

fn render_index(
    state: &AppState,
    user: &User,
    user_type: Option<UserType>,
    errors: &FieldErrors,
    status: StatusCode,
) -> AppResult<Response> {
    let mut ctx = make_context(state, Some(user));
    ctx.insert("series_list", &series::list_series_with_counts(&state.db)?);
    ctx.insert("users", &auth::list_users(&state.db, user_type)?);
    ctx.insert("user_type", &user_type);
    ctx.insert("errors", errors);
    let html = state.templates.render("admin/index.html", &ctx)?;
    Ok((status, Html(html)).into_response())
}

pub async fn index(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<UserFilter>,
) -> AppResult<Response> {
    if let Err(e) = require_staff(&user) {
        return Ok(e);
    }
    let user_type = filter.user_type.as_deref().and_then(|t| t.parse().ok());
    render_index(&state, &user, user_type, &FieldErrors::new(), StatusCode::OK)
}

pub async fn create_series(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<CreateSeries>,
) -> AppResult<Response> {
    if let Err(e) = require_staff(&user) {
        return Ok(e);
    }
    let slug = form.slug.as_deref().filter(|s| !s.trim().is_empty());
    if let Err(e) = series::create_series(&state.db, &form.title, slug) {
        let errors = field_errors(e)?;
        return render_index(&state, &user, None, &errors, StatusCode::BAD_REQUEST);
    }
    state.cache.invalidate_catalog();
    Ok(Redirect::to("/admin").into_response())
}

pub async fn delete_series(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    if let Err(e) = require_staff(&user) {
        return Ok(e);
    }
    if !series::delete_series(&state.db, id)? {
        return Ok(StatusCode::NOT_FOUND.into_response());
    }
    state.cache.invalidate_catalog();
    Ok(Redirect::to("/admin").into_response())
}
