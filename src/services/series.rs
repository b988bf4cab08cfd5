//! Series: top-level groupings of courses (curriculum tracks).

use crate::error::ServiceError;
use crate::models::{Series, SeriesWithCount};
use crate::services::slug::{slug_or_title, validate_slug};
use crate::Database;
use anyhow::Result;
use rusqlite::OptionalExtension;

const MAX_TITLE_LENGTH: usize = 200;

pub fn create_series(db: &Database, title: &str, slug: Option<&str>) -> Result<i64> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ServiceError::invalid("title", "Series title cannot be empty").into());
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ServiceError::invalid(
            "title",
            format!("Series title must be {} characters or less", MAX_TITLE_LENGTH),
        )
        .into());
    }
    let slug = slug_or_title(slug, title);
    if !validate_slug(&slug) {
        return Err(ServiceError::invalid(
            "slug",
            "Slug must be 1-200 characters, lowercase letters, numbers, and hyphens only",
        )
        .into());
    }
    if get_series_by_slug(db, &slug)?.is_some() {
        return Err(ServiceError::invalid("slug", "Series with this slug already exists").into());
    }

    let conn = db.get()?;
    conn.execute(
        "INSERT INTO series (title, slug) VALUES (?, ?)",
        (title, &slug),
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!("Created series '{}' ({})", title, slug);
    Ok(id)
}

pub fn update_series(db: &Database, id: i64, title: Option<&str>, slug: Option<&str>) -> Result<()> {
    let current = get_series_by_id(db, id)?.ok_or(ServiceError::NotFound("Series"))?;

    let title = title.map(str::trim).filter(|t| !t.is_empty()).unwrap_or(&current.title);
    let slug = slug.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(&current.slug);
    if !validate_slug(slug) {
        return Err(ServiceError::invalid("slug", "Invalid slug").into());
    }

    let conn = db.get()?;
    conn.execute(
        "UPDATE series SET title = ?, slug = ? WHERE id = ?",
        (title, slug, id),
    )?;
    Ok(())
}

/// Deletes a series together with its courses.
pub fn delete_series(db: &Database, id: i64) -> Result<bool> {
    let conn = db.get()?;
    let affected = conn.execute("DELETE FROM series WHERE id = ?", [id])?;
    Ok(affected > 0)
}

pub fn get_series_by_id(db: &Database, id: i64) -> Result<Option<Series>> {
    let conn = db.get()?;
    let series = conn
        .query_row(
            "SELECT id, title, slug FROM series WHERE id = ?",
            [id],
            row_to_series,
        )
        .optional()?;
    Ok(series)
}

pub fn get_series_by_slug(db: &Database, slug: &str) -> Result<Option<Series>> {
    let conn = db.get()?;
    let series = conn
        .query_row(
            "SELECT id, title, slug FROM series WHERE slug = ?",
            [slug],
            row_to_series,
        )
        .optional()?;
    Ok(series)
}

pub fn list_series(db: &Database) -> Result<Vec<Series>> {
    let conn = db.get()?;
    let mut stmt = conn.prepare("SELECT id, title, slug FROM series ORDER BY title ASC, id ASC")?;
    let series = stmt
        .query_map([], row_to_series)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(series)
}

/// Every series with its number of courses.
pub fn list_series_with_counts(db: &Database) -> Result<Vec<SeriesWithCount>> {
    let conn = db.get()?;
    let mut stmt = conn.prepare(
        r#"
        SELECT s.id, s.title, s.slug, COUNT(c.id)
        FROM series s
        LEFT JOIN courses c ON c.series_id = s.id
        GROUP BY s.id
        ORDER BY s.title ASC, s.id ASC
        "#,
    )?;
    let series = stmt
        .query_map([], |row| {
            Ok(SeriesWithCount {
                series: row_to_series(row)?,
                total_courses: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(series)
}

fn row_to_series(row: &rusqlite::Row) -> rusqlite::Result<Series> {
    Ok(Series {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
    })
}
