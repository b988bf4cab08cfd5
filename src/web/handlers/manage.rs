//! Instructor course management. Every lookup is scoped to the signed-in
//! owner, so other instructors' courses answer 404.

use super::{field_errors, make_context, not_found_page, require_instructor, MultipartForm};
use crate::error::{FieldErrors, ServiceError};
use crate::models::{Course, CourseInput, CourseSummary, ItemBody, ItemKind, ItemUpdate, Module, NewItem, User};
use crate::services::media::{self, Upload, COURSE_IMAGES};
use crate::services::{contents, courses, modules, series};
use crate::web::error::AppResult;
use crate::web::extractors::CurrentUser;
use crate::web::state::AppState;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Redirect, Response};
use axum::Form;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tera::Context;

const COURSE_LIST: &str = "/courses/manage";

fn manage_context(state: &AppState, user: &User) -> Context {
    make_context(state, Some(user))
}

fn module_contents_url(module_id: i64) -> String {
    format!("/courses/manage/module/{}/contents", module_id)
}

fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(
        crate::error::service_error(err),
        Some(ServiceError::NotFound(_))
    )
}

#[derive(Serialize)]
struct ManagedCourse {
    #[serde(flatten)]
    summary: CourseSummary,
    first_module_id: Option<i64>,
}

pub async fn course_list(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    if let Err(e) = require_instructor(&user) {
        return Ok(e);
    }

    let owned = courses::list_owned_courses(&state.db, user.id)?
        .into_iter()
        .map(|summary| {
            let first_module_id = modules::list_modules(&state.db, summary.course.id)?
                .first()
                .map(|m| m.id);
            Ok(ManagedCourse {
                summary,
                first_module_id,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let mut ctx = manage_context(&state, &user);
    ctx.insert("courses", &owned);
    let html = state.templates.render("manage/course_list.html", &ctx)?;
    Ok(Html(html).into_response())
}

fn course_input(form: &MultipartForm) -> CourseInput {
    CourseInput {
        series_id: form.text("series_id").trim().parse().unwrap_or(0),
        title: form.text("title"),
        overview: form.text("overview"),
    }
}

fn render_course_form(
    state: &AppState,
    user: &User,
    course: Option<&Course>,
    input: Option<&CourseInput>,
    errors: &FieldErrors,
    status: StatusCode,
) -> AppResult<Response> {
    let mut ctx = manage_context(state, user);
    ctx.insert("series_list", &series::list_series(&state.db)?);
    ctx.insert("course", &course);
    ctx.insert("is_new", &course.is_none());
    ctx.insert("series_id", &input.map(|i| i.series_id).or(course.map(|c| c.series_id)));
    ctx.insert(
        "title",
        &input.map(|i| i.title.as_str()).or(course.map(|c| c.title.as_str())),
    );
    ctx.insert(
        "overview",
        &input
            .map(|i| i.overview.as_str())
            .or(course.map(|c| c.overview.as_str())),
    );
    ctx.insert("errors", errors);
    let html = state.templates.render("manage/course_form.html", &ctx)?;
    Ok((status, Html(html)).into_response())
}

/// Stores a submitted hero image, reporting bad uploads as field errors.
fn store_hero(state: &AppState, upload: Option<&Upload>) -> anyhow::Result<Option<String>> {
    upload
        .map(|u| media::store_image(&state.media_dir, COURSE_IMAGES, u, state.max_upload_bytes))
        .transpose()
}

pub async fn create_form(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    if let Err(e) = require_instructor(&user) {
        return Ok(e);
    }
    render_course_form(&state, &user, None, None, &FieldErrors::new(), StatusCode::OK)
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    if let Err(e) = require_instructor(&user) {
        return Ok(e);
    }

    let mut form = MultipartForm::read(multipart).await?;
    let input = course_input(&form);
    let hero_upload = form.take_file("hero_image");

    let hero = match store_hero(&state, hero_upload.as_ref()) {
        Ok(hero) => hero,
        Err(e) => {
            let errors = field_errors(e)?;
            return render_course_form(&state, &user, None, Some(&input), &errors, StatusCode::BAD_REQUEST);
        }
    };

    let course_id = match courses::create_course(&state.db, user.id, &input) {
        Ok(id) => id,
        Err(e) => {
            if let Some(path) = &hero {
                media::remove_upload(&state.media_dir, path);
            }
            let errors = field_errors(e)?;
            return render_course_form(&state, &user, None, Some(&input), &errors, StatusCode::BAD_REQUEST);
        }
    };
    if let Some(path) = &hero {
        courses::set_hero_image(&state.db, user.id, course_id, Some(path))?;
    }
    state.cache.invalidate_catalog();

    Ok(Redirect::to(COURSE_LIST).into_response())
}

pub async fn edit_form(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    if let Err(e) = require_instructor(&user) {
        return Ok(e);
    }
    match courses::get_owned_course(&state.db, user.id, id) {
        Ok(course) => render_course_form(
            &state,
            &user,
            Some(&course),
            None,
            &FieldErrors::new(),
            StatusCode::OK,
        ),
        Err(e) if is_not_found(&e) => not_found_page(&state, Some(&user)),
        Err(e) => Err(e.into()),
    }
}

pub async fn edit(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> AppResult<Response> {
    if let Err(e) = require_instructor(&user) {
        return Ok(e);
    }
    let course = match courses::get_owned_course(&state.db, user.id, id) {
        Ok(course) => course,
        Err(e) if is_not_found(&e) => return not_found_page(&state, Some(&user)),
        Err(e) => return Err(e.into()),
    };

    let mut form = MultipartForm::read(multipart).await?;
    let input = course_input(&form);
    let clear_hero = form.checked("hero_image_clear");
    let hero_upload = form.take_file("hero_image");

    let hero = match store_hero(&state, hero_upload.as_ref()) {
        Ok(hero) => hero,
        Err(e) => {
            let errors = field_errors(e)?;
            return render_course_form(&state, &user, Some(&course), Some(&input), &errors, StatusCode::BAD_REQUEST);
        }
    };

    if let Err(e) = courses::update_course(&state.db, user.id, course.id, &input) {
        if let Some(path) = &hero {
            media::remove_upload(&state.media_dir, path);
        }
        let errors = field_errors(e)?;
        return render_course_form(&state, &user, Some(&course), Some(&input), &errors, StatusCode::BAD_REQUEST);
    }

    if hero.is_some() || clear_hero {
        let previous = courses::set_hero_image(&state.db, user.id, course.id, hero.as_deref())?;
        if let Some(old) = previous {
            media::remove_upload(&state.media_dir, &old);
        }
    }
    state.cache.invalidate_catalog();

    Ok(Redirect::to(COURSE_LIST).into_response())
}

pub async fn delete_form(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    if let Err(e) = require_instructor(&user) {
        return Ok(e);
    }
    let course = match courses::get_owned_course(&state.db, user.id, id) {
        Ok(course) => course,
        Err(e) if is_not_found(&e) => return not_found_page(&state, Some(&user)),
        Err(e) => return Err(e.into()),
    };
    let mut ctx = manage_context(&state, &user);
    ctx.insert("course", &course);
    let html = state.templates.render("manage/course_delete.html", &ctx)?;
    Ok(Html(html).into_response())
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    if let Err(e) = require_instructor(&user) {
        return Ok(e);
    }
    match courses::delete_course(&state.db, &state.media_dir, user.id, id) {
        Ok(()) => {
            state.cache.invalidate_catalog();
            Ok(Redirect::to(COURSE_LIST).into_response())
        }
        Err(e) if is_not_found(&e) => not_found_page(&state, Some(&user)),
        Err(e) => Err(e.into()),
    }
}

fn render_formset(
    state: &AppState,
    user: &User,
    course: &Course,
    rows: &[crate::models::ModuleFormRow],
    errors: &FieldErrors,
    status: StatusCode,
) -> AppResult<Response> {
    let mut ctx = manage_context(state, user);
    ctx.insert("course", course);
    ctx.insert("rows", rows);
    ctx.insert("total_forms", &rows.len());
    ctx.insert("errors", errors);
    let html = state.templates.render("manage/module_formset.html", &ctx)?;
    Ok((status, Html(html)).into_response())
}

pub async fn modules_form(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    if let Err(e) = require_instructor(&user) {
        return Ok(e);
    }
    let course = match courses::get_owned_course(&state.db, user.id, id) {
        Ok(course) => course,
        Err(e) if is_not_found(&e) => return not_found_page(&state, Some(&user)),
        Err(e) => return Err(e.into()),
    };
    let rows = modules::formset_initial(&modules::list_modules(&state.db, course.id)?);
    render_formset(&state, &user, &course, &rows, &FieldErrors::new(), StatusCode::OK)
}

pub async fn modules_save(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Form(pairs): Form<HashMap<String, String>>,
) -> AppResult<Response> {
    if let Err(e) = require_instructor(&user) {
        return Ok(e);
    }
    let course = match courses::get_owned_course(&state.db, user.id, id) {
        Ok(course) => course,
        Err(e) if is_not_found(&e) => return not_found_page(&state, Some(&user)),
        Err(e) => return Err(e.into()),
    };

    let rows = modules::formset_rows(&pairs);
    if let Err(e) = modules::apply_formset(&state.db, &state.media_dir, user.id, course.id, &rows) {
        let errors = field_errors(e)?;
        return render_formset(&state, &user, &course, &rows, &errors, StatusCode::BAD_REQUEST);
    }
    state.cache.invalidate_catalog();

    Ok(Redirect::to(COURSE_LIST).into_response())
}

/// The owned module plus its course, or a 404 page.
fn owned_module(state: &AppState, user: &User, module_id: i64) -> AppResult<Result<(Module, Course), Response>> {
    let module = match modules::get_owned_module(&state.db, user.id, module_id) {
        Ok(module) => module,
        Err(e) if is_not_found(&e) => return Ok(Err(not_found_page(state, Some(user))?)),
        Err(e) => return Err(e.into()),
    };
    let course = courses::get_owned_course(&state.db, user.id, module.course_id)?;
    Ok(Ok((module, course)))
}

pub async fn content_list(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(module_id): Path<i64>,
) -> AppResult<Response> {
    if let Err(e) = require_instructor(&user) {
        return Ok(e);
    }
    let (module, course) = match owned_module(&state, &user, module_id)? {
        Ok(found) => found,
        Err(response) => return Ok(response),
    };

    let mut ctx = manage_context(&state, &user);
    ctx.insert("course", &course);
    ctx.insert("module", &module);
    ctx.insert("modules", &modules::list_modules(&state.db, course.id)?);
    ctx.insert("contents", &contents::list_module_contents(&state.db, module.id)?);
    ctx.insert("kinds", &ItemKind::ALL);
    let html = state.templates.render("manage/content_list.html", &ctx)?;
    Ok(Html(html).into_response())
}

/// Form field carrying the payload of each kind.
fn payload_field(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Text => "content",
        other => other.payload_column(),
    }
}

struct ContentFormView<'a> {
    module: &'a Module,
    kind: ItemKind,
    item_id: Option<i64>,
    title: &'a str,
    payload: &'a str,
}

fn render_content_form(
    state: &AppState,
    user: &User,
    view: ContentFormView<'_>,
    errors: &FieldErrors,
    status: StatusCode,
) -> AppResult<Response> {
    let mut ctx = manage_context(state, user);
    ctx.insert("module", view.module);
    ctx.insert("kind", &view.kind);
    ctx.insert("item_id", &view.item_id);
    ctx.insert("title", view.title);
    ctx.insert("payload", view.payload);
    ctx.insert("payload_field", payload_field(view.kind));
    ctx.insert("is_upload", &view.kind.is_upload());
    ctx.insert("errors", errors);
    let html = state.templates.render("manage/content_form.html", &ctx)?;
    Ok((status, Html(html)).into_response())
}

/// Reads the kind-specific payload. Uploads are stored right away and
/// returned as their media path.
fn read_payload(
    state: &AppState,
    kind: ItemKind,
    form: &mut MultipartForm,
) -> anyhow::Result<Option<String>> {
    let field = payload_field(kind);
    match kind {
        ItemKind::Text | ItemKind::Video => Ok(Some(form.text(field))),
        ItemKind::Image => form
            .take_file(field)
            .map(|u| media::store_image(&state.media_dir, "images", &u, state.max_upload_bytes))
            .transpose(),
        ItemKind::File => form
            .take_file(field)
            .map(|u| media::store_upload(&state.media_dir, "files", &u, state.max_upload_bytes))
            .transpose(),
    }
}

fn parse_kind(kind: &str) -> Option<ItemKind> {
    kind.parse().ok()
}

pub async fn content_create_form(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path((module_id, kind)): Path<(i64, String)>,
) -> AppResult<Response> {
    if let Err(e) = require_instructor(&user) {
        return Ok(e);
    }
    let Some(kind) = parse_kind(&kind) else {
        return not_found_page(&state, Some(&user));
    };
    let (module, _) = match owned_module(&state, &user, module_id)? {
        Ok(found) => found,
        Err(response) => return Ok(response),
    };
    let view = ContentFormView {
        module: &module,
        kind,
        item_id: None,
        title: "",
        payload: "",
    };
    render_content_form(&state, &user, view, &FieldErrors::new(), StatusCode::OK)
}

pub async fn content_create(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path((module_id, kind)): Path<(i64, String)>,
    multipart: Multipart,
) -> AppResult<Response> {
    if let Err(e) = require_instructor(&user) {
        return Ok(e);
    }
    let Some(kind) = parse_kind(&kind) else {
        return not_found_page(&state, Some(&user));
    };
    let (module, _) = match owned_module(&state, &user, module_id)? {
        Ok(found) => found,
        Err(response) => return Ok(response),
    };

    let mut form = MultipartForm::read(multipart).await?;
    let title = form.text("title");
    let payload = match read_payload(&state, kind, &mut form) {
        Ok(Some(payload)) => payload,
        Ok(None) => {
            let mut errors = FieldErrors::new();
            errors.add(payload_field(kind), "This field is required");
            let view = ContentFormView { module: &module, kind, item_id: None, title: &title, payload: "" };
            return render_content_form(&state, &user, view, &errors, StatusCode::BAD_REQUEST);
        }
        Err(e) => {
            let errors = field_errors(e)?;
            let view = ContentFormView { module: &module, kind, item_id: None, title: &title, payload: "" };
            return render_content_form(&state, &user, view, &errors, StatusCode::BAD_REQUEST);
        }
    };

    let item = NewItem {
        title: title.clone(),
        body: ItemBody::new(kind, payload.clone()),
    };
    if let Err(e) = contents::create_item_content(&state.db, user.id, module.id, &item) {
        if kind.is_upload() {
            media::remove_upload(&state.media_dir, &payload);
        }
        let errors = field_errors(e)?;
        let shown = if kind.is_upload() { "" } else { payload.as_str() };
        let view = ContentFormView { module: &module, kind, item_id: None, title: &title, payload: shown };
        return render_content_form(&state, &user, view, &errors, StatusCode::BAD_REQUEST);
    }

    Ok(Redirect::to(&module_contents_url(module.id)).into_response())
}

pub async fn content_edit_form(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path((module_id, kind, item_id)): Path<(i64, String, i64)>,
) -> AppResult<Response> {
    if let Err(e) = require_instructor(&user) {
        return Ok(e);
    }
    let Some(kind) = parse_kind(&kind) else {
        return not_found_page(&state, Some(&user));
    };
    let (module, _) = match owned_module(&state, &user, module_id)? {
        Ok(found) => found,
        Err(response) => return Ok(response),
    };
    let item = match contents::get_owned_item(&state.db, user.id, kind, item_id) {
        Ok(item) => item,
        Err(e) if is_not_found(&e) => return not_found_page(&state, Some(&user)),
        Err(e) => return Err(e.into()),
    };
    let view = ContentFormView {
        module: &module,
        kind,
        item_id: Some(item.id),
        title: &item.title,
        payload: item.body.payload(),
    };
    render_content_form(&state, &user, view, &FieldErrors::new(), StatusCode::OK)
}

pub async fn content_update(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path((module_id, kind, item_id)): Path<(i64, String, i64)>,
    multipart: Multipart,
) -> AppResult<Response> {
    if let Err(e) = require_instructor(&user) {
        return Ok(e);
    }
    let Some(kind) = parse_kind(&kind) else {
        return not_found_page(&state, Some(&user));
    };
    let (module, _) = match owned_module(&state, &user, module_id)? {
        Ok(found) => found,
        Err(response) => return Ok(response),
    };
    let item = match contents::get_owned_item(&state.db, user.id, kind, item_id) {
        Ok(item) => item,
        Err(e) if is_not_found(&e) => return not_found_page(&state, Some(&user)),
        Err(e) => return Err(e.into()),
    };

    let mut form = MultipartForm::read(multipart).await?;
    let title = form.text("title");
    let payload = match read_payload(&state, kind, &mut form) {
        Ok(payload) => payload,
        Err(e) => {
            let errors = field_errors(e)?;
            let view = ContentFormView {
                module: &module,
                kind,
                item_id: Some(item.id),
                title: &title,
                payload: item.body.payload(),
            };
            return render_content_form(&state, &user, view, &errors, StatusCode::BAD_REQUEST);
        }
    };

    let update = ItemUpdate {
        title: title.clone(),
        payload: payload.clone(),
    };
    match contents::update_owned_item(&state.db, user.id, kind, item.id, &update) {
        Ok((_, replaced)) => {
            if let Some(old) = replaced {
                media::remove_upload(&state.media_dir, &old);
            }
            Ok(Redirect::to(&module_contents_url(module.id)).into_response())
        }
        Err(e) => {
            if let (true, Some(stored)) = (kind.is_upload(), &payload) {
                media::remove_upload(&state.media_dir, stored);
            }
            let errors = field_errors(e)?;
            let shown = match (&payload, kind.is_upload()) {
                (Some(p), false) => p.as_str(),
                _ => item.body.payload(),
            };
            let view = ContentFormView {
                module: &module,
                kind,
                item_id: Some(item.id),
                title: &title,
                payload: shown,
            };
            render_content_form(&state, &user, view, &errors, StatusCode::BAD_REQUEST)
        }
    }
}

pub async fn content_delete(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    if let Err(e) = require_instructor(&user) {
        return Ok(e);
    }
    match contents::delete_content(&state.db, &state.media_dir, user.id, id) {
        Ok(content) => Ok(Redirect::to(&module_contents_url(content.module_id)).into_response()),
        Err(e) if is_not_found(&e) => not_found_page(&state, Some(&user)),
        Err(e) => Err(e.into()),
    }
}

/// POST /courses/manage/module/order
pub async fn module_order(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(orders): Json<BTreeMap<i64, u32>>,
) -> AppResult<Response> {
    if let Err(e) = require_instructor(&user) {
        return Ok(e);
    }
    modules::reorder_modules(&state.db, user.id, &orders)?;
    Ok(Json(serde_json::json!({"saved": "OK"})).into_response())
}

/// POST /courses/manage/content/order
pub async fn content_order(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(orders): Json<BTreeMap<i64, u32>>,
) -> AppResult<Response> {
    if let Err(e) = require_instructor(&user) {
        return Ok(e);
    }
    contents::reorder_contents(&state.db, user.id, &orders)?;
    Ok(Json(serde_json::json!({"saved": "OK"})).into_response())
}
