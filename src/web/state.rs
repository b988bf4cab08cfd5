use crate::services::cache::CatalogCache;
use crate::services::markdown::MarkdownRenderer;
use crate::web::security::RateLimiter;
use crate::{Config, Database};
use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use tera::{Tera, Value};

pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub templates: Tera,
    pub markdown: MarkdownRenderer,
    pub media_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub session_days: i64,
    pub cache: CatalogCache,
    pub login_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: Config, db: Database) -> Result<Self> {
        let mut templates = Tera::default();

        templates.register_filter("format_date", format_date_filter);
        templates.register_filter("truncate_str", truncate_str_filter);
        templates.add_raw_templates(vec![
            ("base.html", include_str!("../../templates/base.html")),
            ("404.html", include_str!("../../templates/404.html")),
            ("accounts/login.html", include_str!("../../templates/accounts/login.html")),
            ("accounts/signup.html", include_str!("../../templates/accounts/signup.html")),
            ("courses/list.html", include_str!("../../templates/courses/list.html")),
            ("courses/detail.html", include_str!("../../templates/courses/detail.html")),
            ("manage/course_list.html", include_str!("../../templates/manage/course_list.html")),
            ("manage/course_form.html", include_str!("../../templates/manage/course_form.html")),
            ("manage/course_delete.html", include_str!("../../templates/manage/course_delete.html")),
            ("manage/module_formset.html", include_str!("../../templates/manage/module_formset.html")),
            ("manage/content_list.html", include_str!("../../templates/manage/content_list.html")),
            ("manage/content_form.html", include_str!("../../templates/manage/content_form.html")),
            ("students/course_list.html", include_str!("../../templates/students/course_list.html")),
            ("students/course_detail.html", include_str!("../../templates/students/course_detail.html")),
            ("admin/index.html", include_str!("../../templates/admin/index.html")),
        ])?;

        let media_dir = PathBuf::from(&config.media.upload_dir);
        let max_upload_bytes = config.media.max_upload_bytes()?;
        let session_days = config.auth.session_days()?;
        let cache = CatalogCache::new(config.cache.ttl());

        Ok(Self {
            config,
            db,
            templates,
            markdown: MarkdownRenderer::new(),
            media_dir,
            max_upload_bytes,
            session_days,
            cache,
            login_limiter: RateLimiter::default(),
        })
    }
}

fn format_date_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let date_str = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("format_date requires a string"))?;

    let format = args
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("%B %d, %Y");

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(date_str) {
        return Ok(Value::String(dt.format(format).to_string()));
    }

    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(date_str, "%Y-%m-%d %H:%M:%S") {
        return Ok(Value::String(dt.format(format).to_string()));
    }

    Ok(Value::String(date_str.to_string()))
}

/// Shortens to `len` characters, appending an ellipsis when cut.
fn truncate_str_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let s = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("truncate_str requires a string"))?;
    let len = args.get("len").and_then(|v| v.as_u64()).unwrap_or(120) as usize;
    if s.chars().count() > len {
        let cut: String = s.chars().take(len).collect();
        Ok(Value::String(format!("{}…", cut.trim_end())))
    } else {
        Ok(Value::String(s.to_string()))
    }
}
