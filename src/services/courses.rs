//! Courses, always read and written through their owner for management.

use crate::error::{FieldErrors, ServiceError};
use crate::models::{Course, CourseInput, CourseSummary, CourseWithModules};
use crate::services::{contents, media, modules, slug::generate_slug};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

const MAX_TITLE_LENGTH: usize = 200;

const COURSE_COLUMNS: &str =
    "c.id, c.owner_id, c.series_id, c.title, c.slug, c.overview, c.hero_image, c.released_date, c.updated";

fn validate_input(conn: &Connection, input: &CourseInput) -> Result<()> {
    let mut errors = FieldErrors::new();
    let title = input.title.trim();
    if title.is_empty() {
        errors.add("title", "This field is required");
    } else if title.chars().count() > MAX_TITLE_LENGTH {
        errors.add(
            "title",
            format!("Ensure this value has at most {} characters", MAX_TITLE_LENGTH),
        );
    } else if generate_slug(title).is_empty() {
        errors.add("title", "Title must contain letters or numbers");
    }
    let series_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM series WHERE id = ?)",
        [input.series_id],
        |row| row.get(0),
    )?;
    if !series_exists {
        errors.add("series_id", "Select a valid choice");
    }
    errors.into_result()?;
    Ok(())
}

/// Creates a course owned by `owner_id`. The slug always follows the title.
pub fn create_course(db: &Database, owner_id: i64, input: &CourseInput) -> Result<i64> {
    let conn = db.get()?;
    validate_input(&conn, input)?;

    let title = input.title.trim();
    conn.execute(
        "INSERT INTO courses (owner_id, series_id, title, slug, overview) VALUES (?, ?, ?, ?, ?)",
        (
            owner_id,
            input.series_id,
            title,
            generate_slug(title),
            input.overview.trim(),
        ),
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!("Course {} '{}' created by user {}", id, title, owner_id);
    Ok(id)
}

pub fn update_course(db: &Database, owner_id: i64, course_id: i64, input: &CourseInput) -> Result<()> {
    let conn = db.get()?;
    validate_input(&conn, input)?;

    let title = input.title.trim();
    let affected = conn.execute(
        "UPDATE courses SET series_id = ?, title = ?, slug = ?, overview = ?, updated = CURRENT_TIMESTAMP WHERE id = ? AND owner_id = ?",
        (
            input.series_id,
            title,
            generate_slug(title),
            input.overview.trim(),
            course_id,
            owner_id,
        ),
    )?;
    if affected == 0 {
        return Err(ServiceError::NotFound("Course").into());
    }
    Ok(())
}

/// Replaces the hero image path and returns the previous one so the caller
/// can remove the old file.
pub fn set_hero_image(
    db: &Database,
    owner_id: i64,
    course_id: i64,
    image: Option<&str>,
) -> Result<Option<String>> {
    let course = get_owned_course(db, owner_id, course_id)?;
    let conn = db.get()?;
    conn.execute(
        "UPDATE courses SET hero_image = ?, updated = CURRENT_TIMESTAMP WHERE id = ? AND owner_id = ?",
        (image, course_id, owner_id),
    )?;
    Ok(course.hero_image)
}

/// Deletes an owned course. Modules, contents and items go with it through
/// the storage cascade; uploaded files are removed afterwards.
pub fn delete_course(db: &Database, media_dir: &Path, owner_id: i64, course_id: i64) -> Result<()> {
    let course = get_owned_course(db, owner_id, course_id)?;

    let mut conn = db.get()?;
    let tx = conn.transaction()?;
    let mut blobs = course_blobs(&tx, course_id)?;
    tx.execute(
        "DELETE FROM courses WHERE id = ? AND owner_id = ?",
        (course_id, owner_id),
    )?;
    tx.commit()?;

    blobs.extend(course.hero_image);
    for blob in &blobs {
        media::remove_upload(media_dir, blob);
    }
    tracing::info!("Course {} deleted by user {}", course_id, owner_id);
    Ok(())
}

/// Uploaded files referenced by the items placed in a course.
fn course_blobs(conn: &Connection, course_id: i64) -> Result<Vec<String>> {
    contents::blobs_where(
        conn,
        "ct.module_id IN (SELECT id FROM modules WHERE course_id = ?1)",
        course_id,
    )
}

pub fn get_course(db: &Database, id: i64) -> Result<Option<Course>> {
    let conn = db.get()?;
    let course = conn
        .query_row(
            &format!("SELECT {} FROM courses c WHERE c.id = ?", COURSE_COLUMNS),
            [id],
            row_to_course,
        )
        .optional()?;
    Ok(course)
}

/// Slugs follow titles and are not unique; the newest course wins.
pub fn get_course_by_slug(db: &Database, slug: &str) -> Result<Option<Course>> {
    let conn = db.get()?;
    let course = conn
        .query_row(
            &format!(
                "SELECT {} FROM courses c WHERE c.slug = ? ORDER BY c.released_date DESC, c.id DESC LIMIT 1",
                COURSE_COLUMNS
            ),
            [slug],
            row_to_course,
        )
        .optional()?;
    Ok(course)
}

/// A course owned by `owner_id`, or NotFound (also for courses that exist
/// but belong to someone else).
pub fn get_owned_course(db: &Database, owner_id: i64, course_id: i64) -> Result<Course> {
    let conn = db.get()?;
    let course = conn
        .query_row(
            &format!(
                "SELECT {} FROM courses c WHERE c.id = ? AND c.owner_id = ?",
                COURSE_COLUMNS
            ),
            (course_id, owner_id),
            row_to_course,
        )
        .optional()?;
    course.ok_or_else(|| ServiceError::NotFound("Course").into())
}

fn query_summaries(conn: &Connection, filter: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<CourseSummary>> {
    let sql = format!(
        r#"
        SELECT {}, s.title, (SELECT COUNT(*) FROM modules m WHERE m.course_id = c.id)
        FROM courses c
        JOIN series s ON s.id = c.series_id
        WHERE {}
        ORDER BY c.released_date DESC, c.id DESC
        "#,
        COURSE_COLUMNS, filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let courses = stmt
        .query_map(params, |row| {
            Ok(CourseSummary {
                course: row_to_course(row)?,
                series_title: row.get(9)?,
                total_modules: row.get(10)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(courses)
}

/// The catalog: every course (optionally one series) with its module count.
pub fn list_course_summaries(db: &Database, series_id: Option<i64>) -> Result<Vec<CourseSummary>> {
    let conn = db.get()?;
    match series_id {
        Some(id) => query_summaries(&conn, "c.series_id = ?", &[&id]),
        None => query_summaries(&conn, "1 = 1", &[]),
    }
}

/// Management list: only the courses `owner_id` created.
pub fn list_owned_courses(db: &Database, owner_id: i64) -> Result<Vec<CourseSummary>> {
    let conn = db.get()?;
    query_summaries(&conn, "c.owner_id = ?", &[&owner_id])
}

/// Catalog entries of the courses `user_id` is enrolled in.
pub fn list_enrolled_summaries(db: &Database, user_id: i64) -> Result<Vec<CourseSummary>> {
    let conn = db.get()?;
    query_summaries(
        &conn,
        "c.id IN (SELECT course_id FROM course_students WHERE user_id = ?)",
        &[&user_id],
    )
}

pub fn list_courses(db: &Database, limit: usize, offset: usize) -> Result<Vec<Course>> {
    let conn = db.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM courses c ORDER BY c.released_date DESC, c.id DESC LIMIT ? OFFSET ?",
        COURSE_COLUMNS
    ))?;
    let courses = stmt
        .query_map((limit, offset), row_to_course)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(courses)
}

pub fn count_courses(db: &Database) -> Result<i64> {
    let conn = db.get()?;
    let count = conn.query_row("SELECT COUNT(*) FROM courses", [], |row| row.get(0))?;
    Ok(count)
}

pub fn course_with_modules(db: &Database, id: i64) -> Result<Option<CourseWithModules>> {
    let Some(course) = get_course(db, id)? else {
        return Ok(None);
    };
    let modules = modules::list_modules(db, course.id)?;
    Ok(Some(CourseWithModules { course, modules }))
}

pub(crate) fn row_to_course(row: &rusqlite::Row) -> rusqlite::Result<Course> {
    Ok(Course {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        series_id: row.get(2)?,
        title: row.get(3)?,
        slug: row.get(4)?,
        overview: row.get(5)?,
        hero_image: row.get(6)?,
        released_date: row.get(7)?,
        updated: row.get(8)?,
    })
}
