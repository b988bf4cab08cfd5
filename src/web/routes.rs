use super::handlers;
use super::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

/// Room for multipart framing and the text fields around an upload.
const FORM_OVERHEAD: usize = 1024 * 1024;

pub fn catalog_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(|| async { Redirect::to("/courses") }))
        .route("/courses", get(handlers::catalog::course_list))
        .route("/courses/series/:slug", get(handlers::catalog::series_courses))
        .route("/courses/course/:slug", get(handlers::catalog::course_detail))
}

pub fn manage_routes(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    let upload_limit = DefaultBodyLimit::max(max_upload_bytes + FORM_OVERHEAD);
    Router::new()
        .route("/courses/manage", get(handlers::manage::course_list))
        .route(
            "/courses/manage/create",
            get(handlers::manage::create_form)
                .post(handlers::manage::create)
                .layer(upload_limit),
        )
        .route(
            "/courses/manage/:id/edit",
            get(handlers::manage::edit_form)
                .post(handlers::manage::edit)
                .layer(upload_limit),
        )
        .route(
            "/courses/manage/:id/delete",
            get(handlers::manage::delete_form).post(handlers::manage::delete),
        )
        .route(
            "/courses/manage/:id/modules",
            get(handlers::manage::modules_form).post(handlers::manage::modules_save),
        )
        .route(
            "/courses/manage/module/:id/contents",
            get(handlers::manage::content_list),
        )
        .route(
            "/courses/manage/module/:id/content/:kind",
            get(handlers::manage::content_create_form)
                .post(handlers::manage::content_create)
                .layer(upload_limit),
        )
        .route(
            "/courses/manage/module/:id/content/:kind/:item_id",
            get(handlers::manage::content_edit_form)
                .post(handlers::manage::content_update)
                .layer(upload_limit),
        )
        .route(
            "/courses/manage/content/:id/delete",
            post(handlers::manage::content_delete),
        )
        .route(
            "/courses/manage/module/order",
            post(handlers::manage::module_order),
        )
        .route(
            "/courses/manage/content/order",
            post(handlers::manage::content_order),
        )
}

pub fn student_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/students/register", post(handlers::students::register))
        .route(
            "/students/enroll-course",
            post(handlers::students::enroll_course),
        )
        .route("/students/courses", get(handlers::students::course_list))
        .route(
            "/students/course/:id",
            get(handlers::students::course_detail),
        )
        .route(
            "/students/course/:id/:module_id",
            get(handlers::students::course_module),
        )
}

pub fn account_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/accounts/login",
            get(handlers::accounts::login_form).post(handlers::accounts::login),
        )
        .route("/accounts/logout", post(handlers::accounts::logout))
        .route(
            "/accounts/signup",
            get(handlers::accounts::signup_form).post(handlers::accounts::signup),
        )
}

pub fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin", get(handlers::admin::index))
        .route("/admin/series", post(handlers::admin::create_series))
        .route(
            "/admin/series/:id/delete",
            post(handlers::admin::delete_series),
        )
}

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/series", get(handlers::api::list_series))
        .route("/api/v1/series/:id", get(handlers::api::get_series))
        .route("/api/v1/courses", get(handlers::api::list_courses))
        .route("/api/v1/courses/:id", get(handlers::api::get_course))
        .route(
            "/api/v1/courses/:id/enroll",
            post(handlers::api::enroll_action),
        )
        .route(
            "/api/v1/courses/:id/contents",
            get(handlers::api::course_contents),
        )
        .route("/api/v1/enroll/:id", post(handlers::api::enroll))
        .route(
            "/api/v1/auth/registration",
            post(handlers::api::registration),
        )
        .route("/api/v1/auth/login", post(handlers::api::login))
        .route("/api/v1/auth/logout", post(handlers::api::logout))
        .route("/api/v1/auth/user", get(handlers::api::current_user))
}

pub fn media_routes() -> Router<Arc<AppState>> {
    Router::new().route("/media/*path", get(handlers::catalog::serve_media))
}
