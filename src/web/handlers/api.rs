//! REST API under `/api/v1`.

use crate::error::ServiceError;
use crate::models::{Course, Module, Registration, User};
use crate::services::{api_token, auth, contents, courses, enrollment, modules, series};
use crate::web::error::json_error;
use crate::web::extractors::{api_key, ApiUser};
use crate::web::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct PaginationParams {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

fn paginate(
    page: Option<usize>,
    per_page: Option<usize>,
    default_size: usize,
    max_size: usize,
) -> (usize, usize, usize) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(default_size).min(max_size).max(1);
    // SQLite binds integers as i64.
    let offset = (page - 1).saturating_mul(per_page).min(i64::MAX as usize);
    (page, per_page, offset)
}

fn json_envelope<T: Serialize>(data: &T, total: i64, page: usize, per_page: usize) -> Response {
    Json(serde_json::json!({
        "data": data,
        "meta": {
            "total": total,
            "page": page,
            "per_page": per_page,
        }
    }))
    .into_response()
}

fn respond<T: Serialize>(result: anyhow::Result<T>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(e) => json_error(e),
    }
}

#[derive(Serialize)]
struct ModuleBody {
    order: u32,
    title: String,
    description: String,
}

impl From<&Module> for ModuleBody {
    fn from(module: &Module) -> Self {
        Self {
            order: module.order,
            title: module.title.clone(),
            description: module.description.clone(),
        }
    }
}

#[derive(Serialize)]
struct CourseBody<M> {
    id: i64,
    series: i64,
    title: String,
    slug: String,
    overview: String,
    released_date: String,
    owner: Option<i64>,
    modules: Vec<M>,
}

impl<M> CourseBody<M> {
    fn new(course: Course, modules: Vec<M>) -> Self {
        Self {
            id: course.id,
            series: course.series_id,
            title: course.title,
            slug: course.slug,
            overview: course.overview,
            released_date: course.released_date,
            owner: course.owner_id,
            modules,
        }
    }
}

#[derive(Serialize)]
struct RenderedItem {
    kind: String,
    title: String,
    html: String,
}

#[derive(Serialize)]
struct ContentBody {
    order: u32,
    item: RenderedItem,
}

#[derive(Serialize)]
struct ModuleWithContents {
    #[serde(flatten)]
    module: ModuleBody,
    contents: Vec<ContentBody>,
}

fn course_body(state: &AppState, course: Course) -> anyhow::Result<CourseBody<ModuleBody>> {
    let course_modules = modules::list_modules(&state.db, course.id)?;
    Ok(CourseBody::new(
        course,
        course_modules.iter().map(ModuleBody::from).collect(),
    ))
}

fn find_course(state: &AppState, id: i64) -> anyhow::Result<Course> {
    courses::get_course(&state.db, id)?.ok_or_else(|| ServiceError::NotFound("Course").into())
}

/// GET /api/v1/series
pub async fn list_series(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Response {
    let api = &state.config.api;
    let (page, per_page, offset) =
        paginate(params.page, params.per_page, api.default_page_size, api.max_page_size);
    match series::list_series(&state.db) {
        Ok(all) => {
            let total = all.len() as i64;
            let paged: Vec<_> = all.into_iter().skip(offset).take(per_page).collect();
            json_envelope(&paged, total, page, per_page)
        }
        Err(e) => json_error(e),
    }
}

/// GET /api/v1/series/:id
pub async fn get_series(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    respond(
        series::get_series_by_id(&state.db, id)
            .and_then(|s| s.ok_or_else(|| ServiceError::NotFound("Series").into())),
    )
}

/// GET /api/v1/courses
pub async fn list_courses(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Response {
    let api = &state.config.api;
    let (page, per_page, offset) =
        paginate(params.page, params.per_page, api.default_page_size, api.max_page_size);
    let result = (|| {
        let total = courses::count_courses(&state.db)?;
        let bodies = courses::list_courses(&state.db, per_page, offset)?
            .into_iter()
            .map(|c| course_body(&state, c))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok::<_, anyhow::Error>((total, bodies))
    })();
    match result {
        Ok((total, bodies)) => json_envelope(&bodies, total, page, per_page),
        Err(e) => json_error(e),
    }
}

/// GET /api/v1/courses/:id
pub async fn get_course(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    respond(find_course(&state, id).and_then(|c| course_body(&state, c)))
}

/// GET /api/v1/courses/:id/contents, for enrolled students only.
pub async fn course_contents(
    State(state): State<Arc<AppState>>,
    ApiUser(user): ApiUser,
    Path(id): Path<i64>,
) -> Response {
    let result: anyhow::Result<CourseBody<ModuleWithContents>> = (|| {
        let course = find_course(&state, id)?;
        if !enrollment::is_enrolled(&state.db, user.id, course.id)? {
            return Err(ServiceError::Forbidden.into());
        }
        let mut bodies = Vec::new();
        for module in modules::list_modules(&state.db, course.id)? {
            let items = contents::list_module_contents(&state.db, module.id)?
                .into_iter()
                .map(|c| ContentBody {
                    order: c.content.order,
                    item: RenderedItem {
                        kind: c.item.kind().to_string(),
                        html: contents::render_item(&state.markdown, &c.item),
                        title: c.item.title,
                    },
                })
                .collect();
            bodies.push(ModuleWithContents {
                module: ModuleBody::from(&module),
                contents: items,
            });
        }
        Ok(CourseBody::new(course, bodies))
    })();
    respond(result)
}

fn enroll_user(state: &AppState, user: &User, course_id: i64) -> Response {
    match enrollment::enroll(&state.db, user.id, course_id) {
        Ok(_) => Json(serde_json::json!({"enrolled": true})).into_response(),
        Err(e) => json_error(e),
    }
}

/// POST /api/v1/courses/:id/enroll
pub async fn enroll_action(
    State(state): State<Arc<AppState>>,
    ApiUser(user): ApiUser,
    Path(id): Path<i64>,
) -> Response {
    enroll_user(&state, &user, id)
}

/// POST /api/v1/enroll/:id
pub async fn enroll(
    State(state): State<Arc<AppState>>,
    ApiUser(user): ApiUser,
    Path(id): Path<i64>,
) -> Response {
    enroll_user(&state, &user, id)
}

fn key_response(state: &AppState, user_id: i64, status: StatusCode) -> Response {
    match api_token::create_token(&state.db, user_id) {
        Ok(key) => (status, Json(serde_json::json!({"key": key}))).into_response(),
        Err(e) => json_error(e),
    }
}

/// POST /api/v1/auth/registration
pub async fn registration(
    State(state): State<Arc<AppState>>,
    Json(form): Json<Registration>,
) -> Response {
    match auth::register(&state.db, &form) {
        Ok(user_id) => key_response(&state, user_id, StatusCode::CREATED),
        Err(e) => json_error(e),
    }
}

#[derive(Deserialize)]
pub struct LoginBody {
    email: String,
    password: String,
}

/// POST /api/v1/auth/login
pub async fn login(State(state): State<Arc<AppState>>, Json(body): Json<LoginBody>) -> Response {
    let rate_key = format!("login:{}", auth::normalize_email(&body.email));
    if !state.login_limiter.check(&rate_key) {
        tracing::warn!("API login rate limit hit for {}", body.email);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "Too Many Requests",
                "message": "Too many login attempts. Please try again later.",
            })),
        )
            .into_response();
    }

    match auth::authenticate(&state.db, &body.email, &body.password) {
        Ok(Some(user)) => {
            state.login_limiter.clear(&rate_key);
            key_response(&state, user.id, StatusCode::OK)
        }
        Ok(None) => {
            state.login_limiter.record_attempt(&rate_key);
            tracing::warn!("Rejected API login for {}", body.email);
            json_error(
                ServiceError::invalid(
                    "non_field_errors",
                    "Unable to log in with provided credentials",
                )
                .into(),
            )
        }
        Err(e) => json_error(e),
    }
}

/// POST /api/v1/auth/logout. Revokes the key the request was made with.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    ApiUser(_user): ApiUser,
    headers: HeaderMap,
) -> Response {
    if let Some(key) = api_key(&headers) {
        if let Err(e) = api_token::revoke_token(&state.db, &key) {
            return json_error(e);
        }
    }
    Json(serde_json::json!({"detail": "Successfully logged out"})).into_response()
}

/// GET /api/v1/auth/user
pub async fn current_user(ApiUser(user): ApiUser) -> Response {
    Json(serde_json::json!({
        "id": user.id,
        "email": user.email,
        "name": user.name,
        "type": user.user_type,
    }))
    .into_response()
}
