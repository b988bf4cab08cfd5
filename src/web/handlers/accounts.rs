use super::{field_errors, make_context, safe_next};
use crate::models::{Registration, UserType};
use crate::services::auth;
use crate::web::error::AppResult;
use crate::web::extractors::{OptionalUser, SESSION_COOKIE};
use crate::web::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use std::sync::Arc;
use time::Duration;

/// Opens a session for `user_id` and adds its cookie to the jar.
pub(crate) fn start_session(state: &AppState, jar: CookieJar, user_id: i64) -> anyhow::Result<CookieJar> {
    let token = auth::create_session(&state.db, user_id, state.session_days)?;
    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(axum_extra::extract::cookie::SameSite::Lax)
        .max_age(Duration::days(state.session_days))
        .build();
    Ok(jar.add(cookie))
}

#[derive(Deserialize)]
pub struct NextParam {
    next: Option<String>,
}

pub async fn login_form(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
    Query(params): Query<NextParam>,
) -> AppResult<Response> {
    if user.is_some() {
        return Ok(Redirect::to(&safe_next(params.next.as_deref(), "/")).into_response());
    }
    let mut ctx = make_context(&state, None);
    ctx.insert("next", &params.next);
    let html = state.templates.render("accounts/login.html", &ctx)?;
    Ok(Html(html).into_response())
}

#[derive(Deserialize)]
pub struct LoginForm {
    email: String,
    password: String,
    #[serde(default)]
    next: Option<String>,
}

fn login_error(state: &AppState, form: &LoginForm, status: StatusCode, message: &str) -> AppResult<Response> {
    let mut ctx = make_context(state, None);
    ctx.insert("error", message);
    ctx.insert("email", &form.email);
    ctx.insert("next", &form.next);
    let html = state.templates.render("accounts/login.html", &ctx)?;
    Ok((status, Html(html)).into_response())
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let rate_key = format!("login:{}", auth::normalize_email(&form.email));
    if !state.login_limiter.check(&rate_key) {
        tracing::warn!("Login rate limit hit for {}", form.email);
        return login_error(
            &state,
            &form,
            StatusCode::TOO_MANY_REQUESTS,
            "Too many login attempts. Please try again later.",
        );
    }

    match auth::authenticate(&state.db, &form.email, &form.password)? {
        Some(user) => {
            state.login_limiter.clear(&rate_key);
            let jar = start_session(&state, jar, user.id)?;
            let fallback = if user.can_teach() {
                "/courses/manage"
            } else {
                "/students/courses"
            };
            let target = safe_next(form.next.as_deref(), fallback);
            Ok((jar, Redirect::to(&target)).into_response())
        }
        None => {
            state.login_limiter.record_attempt(&rate_key);
            tracing::warn!("Rejected login for {}", form.email);
            login_error(
                &state,
                &form,
                StatusCode::UNAUTHORIZED,
                "Please enter a correct email and password",
            )
        }
    }
}

pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> AppResult<Response> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        auth::delete_session(&state.db, cookie.value())?;
    }

    let cookie = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(Duration::ZERO)
        .build();

    Ok((jar.remove(cookie), Redirect::to("/accounts/login")).into_response())
}

pub async fn signup_form(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
) -> AppResult<Response> {
    if user.is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    let mut ctx = make_context(&state, None);
    ctx.insert("user_type", &UserType::Student);
    let html = state.templates.render("accounts/signup.html", &ctx)?;
    Ok(Html(html).into_response())
}

/// Renders the signup form again with the submitted values and field errors.
pub(crate) fn signup_errors(
    state: &AppState,
    form: &Registration,
    err: anyhow::Error,
) -> AppResult<Response> {
    let errors = field_errors(err)?;
    let mut ctx = make_context(state, None);
    ctx.insert("errors", &errors);
    ctx.insert("email", &form.email);
    ctx.insert("name", &form.name);
    ctx.insert("user_type", &form.user_type);
    let html = state.templates.render("accounts/signup.html", &ctx)?;
    Ok((StatusCode::BAD_REQUEST, Html(html)).into_response())
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<Registration>,
) -> AppResult<Response> {
    let user_id = match auth::register(&state.db, &form) {
        Ok(id) => id,
        Err(e) => return signup_errors(&state, &form, e),
    };
    let jar = start_session(&state, jar, user_id)?;
    let target = match form.user_type {
        UserType::Instructor => "/courses/manage",
        UserType::Student => "/students/courses",
    };
    Ok((jar, Redirect::to(target)).into_response())
}
