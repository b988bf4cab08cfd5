use super::accounts::{signup_errors, start_session};
use super::{make_context, not_found_page};
use crate::models::{Registration, UserType};
use crate::services::{auth, contents, courses, enrollment, modules};
use crate::web::error::AppResult;
use crate::web::extractors::CurrentUser;
use crate::web::state::AppState;
use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Student self-registration: creates the account, signs it in and sends it
/// to the enrolled-courses page.
pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(mut form): Form<Registration>,
) -> AppResult<Response> {
    form.user_type = UserType::Student;
    let user_id = match auth::register(&state.db, &form) {
        Ok(id) => id,
        Err(e) => return signup_errors(&state, &form, e),
    };
    let jar = start_session(&state, jar, user_id)?;
    Ok((jar, Redirect::to("/students/courses")).into_response())
}

#[derive(Deserialize)]
pub struct EnrollForm {
    course_id: i64,
}

pub async fn enroll_course(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<EnrollForm>,
) -> AppResult<Response> {
    enrollment::enroll(&state.db, user.id, form.course_id)?;
    Ok(Redirect::to(&format!("/students/course/{}", form.course_id)).into_response())
}

pub async fn course_list(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    let enrolled = enrollment::list_enrolled_courses(&state.db, user.id)?;
    let mut ctx = make_context(&state, Some(&user));
    ctx.insert("courses", &enrolled);
    let html = state.templates.render("students/course_list.html", &ctx)?;
    Ok(Html(html).into_response())
}

#[derive(Serialize)]
struct RenderedContent {
    kind: String,
    title: String,
    html: String,
}

fn render_course(
    state: &AppState,
    user: &crate::models::User,
    course_id: i64,
    module_id: Option<i64>,
) -> AppResult<Response> {
    if !enrollment::is_enrolled(&state.db, user.id, course_id)? {
        return not_found_page(state, Some(user));
    }
    let Some(course) = courses::get_course(&state.db, course_id)? else {
        return not_found_page(state, Some(user));
    };
    let course_modules = modules::list_modules(&state.db, course.id)?;

    let current = match module_id {
        Some(id) => match course_modules.iter().find(|m| m.id == id) {
            Some(m) => Some(m),
            None => return not_found_page(state, Some(user)),
        },
        None => course_modules.first(),
    };

    let rendered: Vec<RenderedContent> = match current {
        Some(module) => contents::list_module_contents(&state.db, module.id)?
            .iter()
            .map(|c| RenderedContent {
                kind: c.item.kind().to_string(),
                title: c.item.title.clone(),
                html: contents::render_item(&state.markdown, &c.item),
            })
            .collect(),
        None => Vec::new(),
    };

    let mut ctx = make_context(state, Some(user));
    ctx.insert("course", &course);
    ctx.insert("modules", &course_modules);
    ctx.insert("module", &current);
    ctx.insert("contents", &rendered);
    let html = state.templates.render("students/course_detail.html", &ctx)?;
    Ok(Html(html).into_response())
}

pub async fn course_detail(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(course_id): Path<i64>,
) -> AppResult<Response> {
    render_course(&state, &user, course_id, None)
}

pub async fn course_module(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path((course_id, module_id)): Path<(i64, i64)>,
) -> AppResult<Response> {
    render_course(&state, &user, course_id, Some(module_id))
}
