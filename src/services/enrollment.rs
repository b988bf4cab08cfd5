use crate::error::ServiceError;
use crate::models::CourseSummary;
use crate::services::courses;
use crate::Database;
use anyhow::Result;

/// Adds `user_id` to the students of `course_id`. Enrolling twice is a no-op.
/// Returns whether a new membership was recorded.
pub fn enroll(db: &Database, user_id: i64, course_id: i64) -> Result<bool> {
    if courses::get_course(db, course_id)?.is_none() {
        return Err(ServiceError::NotFound("Course").into());
    }
    let conn = db.get()?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO course_students (course_id, user_id) VALUES (?, ?)",
        (course_id, user_id),
    )?;
    if inserted > 0 {
        tracing::info!("User {} enrolled in course {}", user_id, course_id);
    }
    Ok(inserted > 0)
}

pub fn is_enrolled(db: &Database, user_id: i64, course_id: i64) -> Result<bool> {
    let conn = db.get()?;
    let enrolled = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM course_students WHERE course_id = ? AND user_id = ?)",
        (course_id, user_id),
        |row| row.get(0),
    )?;
    Ok(enrolled)
}

pub fn list_enrolled_courses(db: &Database, user_id: i64) -> Result<Vec<CourseSummary>> {
    courses::list_enrolled_summaries(db, user_id)
}

pub fn count_students(db: &Database, course_id: i64) -> Result<i64> {
    let conn = db.get()?;
    let count = conn.query_row(
        "SELECT COUNT(*) FROM course_students WHERE course_id = ?",
        [course_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
