//! Public course catalog and media.

use super::{make_context, not_found_page};
use crate::models::{CourseSummary, SeriesWithCount};
use crate::services::cache::{self, ALL_COURSES, ALL_SERIES};
use crate::services::{courses, enrollment, media, modules, series};
use crate::web::error::AppResult;
use crate::web::extractors::OptionalUser;
use crate::web::state::AppState;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use std::sync::Arc;

fn all_series(state: &AppState) -> anyhow::Result<Vec<SeriesWithCount>> {
    state
        .cache
        .get_or_load(ALL_SERIES, || series::list_series_with_counts(&state.db))
}

fn render_list(
    state: &AppState,
    user: Option<&crate::models::User>,
    current: Option<&SeriesWithCount>,
    course_list: &[CourseSummary],
) -> AppResult<Response> {
    let mut ctx = make_context(state, user);
    ctx.insert("series_list", &all_series(state)?);
    ctx.insert("series", &current);
    ctx.insert("courses", course_list);
    let html = state.templates.render("courses/list.html", &ctx)?;
    Ok(Html(html).into_response())
}

pub async fn course_list(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
) -> AppResult<Response> {
    let all = state
        .cache
        .get_or_load(ALL_COURSES, || courses::list_course_summaries(&state.db, None))?;
    render_list(&state, user.as_ref(), None, &all)
}

pub async fn series_courses(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
    Path(slug): Path<String>,
) -> AppResult<Response> {
    let listed = all_series(&state)?;
    let Some(current) = listed.iter().find(|s| s.series.slug == slug) else {
        return not_found_page(&state, user.as_ref());
    };
    let key = cache::series_courses_key(current.series.id);
    let filtered = state.cache.get_or_load(&key, || {
        courses::list_course_summaries(&state.db, Some(current.series.id))
    })?;
    render_list(&state, user.as_ref(), Some(current), &filtered)
}

pub async fn course_detail(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
    Path(slug): Path<String>,
) -> AppResult<Response> {
    let Some(course) = courses::get_course_by_slug(&state.db, &slug)? else {
        return not_found_page(&state, user.as_ref());
    };
    let course_series = series::get_series_by_id(&state.db, course.series_id)?;
    let course_modules = modules::list_modules(&state.db, course.id)?;
    let enrolled = match &user {
        Some(u) => enrollment::is_enrolled(&state.db, u.id, course.id)?,
        None => false,
    };

    let mut ctx = make_context(&state, user.as_ref());
    ctx.insert("overview_html", &state.markdown.render(&course.overview));
    ctx.insert("course", &course);
    ctx.insert("series", &course_series);
    ctx.insert("modules", &course_modules);
    ctx.insert("enrolled", &enrolled);
    let html = state.templates.render("courses/detail.html", &ctx)?;
    Ok(Html(html).into_response())
}

pub async fn serve_media(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> AppResult<Response> {
    let Some(file_path) = media::resolve(&state.media_dir, &path) else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    let content = match tokio::fs::read(&file_path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(StatusCode::NOT_FOUND.into_response())
        }
        Err(e) => return Err(e.into()),
    };
    let mime = mime_guess::from_path(&file_path).first_or_octet_stream();

    Ok(([(header::CONTENT_TYPE, mime.as_ref())], content).into_response())
}
