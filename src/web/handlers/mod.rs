pub mod accounts;
pub mod admin;
pub mod api;
pub mod catalog;
pub mod manage;
pub mod students;

use crate::error::{FieldErrors, ServiceError};
use crate::models::User;
use crate::services::media::Upload;
use crate::web::error::AppResult;
use crate::web::state::AppState;
use axum::extract::Multipart;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use std::collections::HashMap;
use tera::Context;

pub(crate) fn make_context(state: &AppState, user: Option<&User>) -> Context {
    let mut ctx = Context::new();
    ctx.insert("site", &state.config.site);
    ctx.insert("user", &user);
    ctx.insert("can_teach", &user.map(User::can_teach).unwrap_or(false));
    ctx.insert(
        "can_administer",
        &user.map(User::can_administer).unwrap_or(false),
    );
    ctx
}

pub(crate) fn not_found_page(state: &AppState, user: Option<&User>) -> AppResult<Response> {
    let ctx = make_context(state, user);
    let html = state.templates.render("404.html", &ctx)?;
    Ok((StatusCode::NOT_FOUND, Html(html)).into_response())
}

/// Course management is open to instructors and superusers.
pub(crate) fn require_instructor(user: &User) -> Result<(), Response> {
    if user.can_teach() {
        Ok(())
    } else {
        Err((StatusCode::FORBIDDEN, "Instructor access required").into_response())
    }
}

pub(crate) fn require_staff(user: &User) -> Result<(), Response> {
    if user.can_administer() {
        Ok(())
    } else {
        Err((StatusCode::FORBIDDEN, "Staff access required").into_response())
    }
}

/// Field errors carried by a failed service call; any other error is returned.
pub(crate) fn field_errors(err: anyhow::Error) -> Result<FieldErrors, anyhow::Error> {
    match crate::error::service_error(&err) {
        Some(ServiceError::Validation(fields)) => Ok(fields.clone()),
        _ => Err(err),
    }
}

/// Local redirect target from a `next` parameter; anything else goes home.
pub(crate) fn safe_next(next: Option<&str>, fallback: &str) -> String {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") && !n.contains('\\') => n.to_string(),
        _ => fallback.to_string(),
    }
}

/// Text fields and non-empty file parts of a multipart form.
pub(crate) struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<Upload>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart) -> anyhow::Result<Self> {
        let mut fields = HashMap::new();
        let mut files = Vec::new();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let data = field.bytes().await?;
                    if !file_name.is_empty() && !data.is_empty() {
                        files.push(Upload {
                            field: name,
                            file_name,
                            data: data.to_vec(),
                        });
                    }
                }
                None => {
                    let value = field.text().await?;
                    fields.insert(name, value);
                }
            }
        }
        Ok(Self { fields, files })
    }

    pub fn text(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    pub fn checked(&self, name: &str) -> bool {
        self.fields
            .get(name)
            .map(|v| matches!(v.as_str(), "on" | "true" | "1"))
            .unwrap_or(false)
    }

    pub fn take_file(&mut self, name: &str) -> Option<Upload> {
        let index = self.files.iter().position(|f| f.field == name)?;
        Some(self.files.remove(index))
    }
}
