//! Course modules: ordered sections of a course.

use crate::error::{FieldErrors, ServiceError};
use crate::models::{Module, ModuleFormRow};
use crate::services::ordering::MODULE_ORDER;
use crate::services::{contents, media};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const MAX_TITLE_LENGTH: usize = 200;

/// Extra blank rows offered by the formset.
pub const FORMSET_EXTRA: usize = 2;

const OWNED_BY: &str = "course_id IN (SELECT id FROM courses WHERE owner_id = ?)";

fn insert_module(
    conn: &Connection,
    course_id: i64,
    title: &str,
    description: &str,
    order: Option<u32>,
) -> Result<Module> {
    let order = MODULE_ORDER.resolve(conn, order, &[&course_id])?;
    conn.execute(
        "INSERT INTO modules (course_id, title, description, sort_order) VALUES (?, ?, ?, ?)",
        (course_id, title, description, order),
    )?;
    Ok(Module {
        id: conn.last_insert_rowid(),
        course_id,
        title: title.to_string(),
        description: description.to_string(),
        order,
    })
}

/// Adds a module to a course. Without an explicit `order` it is placed after
/// the course's current last module.
pub fn create_module(
    db: &Database,
    course_id: i64,
    title: &str,
    description: &str,
    order: Option<u32>,
) -> Result<Module> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ServiceError::invalid("title", "This field is required").into());
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ServiceError::invalid(
            "title",
            format!("Ensure this value has at most {} characters", MAX_TITLE_LENGTH),
        )
        .into());
    }
    let mut conn = db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let module = insert_module(&tx, course_id, title, description.trim(), order)?;
    tx.commit()?;
    Ok(module)
}

pub fn list_modules(db: &Database, course_id: i64) -> Result<Vec<Module>> {
    let conn = db.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, course_id, title, description, sort_order FROM modules WHERE course_id = ? ORDER BY sort_order ASC, id ASC",
    )?;
    let modules = stmt
        .query_map([course_id], row_to_module)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(modules)
}

pub fn get_module(db: &Database, id: i64) -> Result<Option<Module>> {
    let conn = db.get()?;
    let module = conn
        .query_row(
            "SELECT id, course_id, title, description, sort_order FROM modules WHERE id = ?",
            [id],
            row_to_module,
        )
        .optional()?;
    Ok(module)
}

/// A module whose course is owned by `owner_id`, or NotFound.
pub fn get_owned_module(db: &Database, owner_id: i64, module_id: i64) -> Result<Module> {
    let conn = db.get()?;
    let module = conn
        .query_row(
            r#"
            SELECT m.id, m.course_id, m.title, m.description, m.sort_order
            FROM modules m
            JOIN courses c ON c.id = m.course_id
            WHERE m.id = ? AND c.owner_id = ?
            "#,
            (module_id, owner_id),
            row_to_module,
        )
        .optional()?;
    module.ok_or_else(|| ServiceError::NotFound("Module").into())
}

/// Applies `id → order` to the modules of courses owned by `owner_id`.
pub fn reorder_modules(db: &Database, owner_id: i64, orders: &BTreeMap<i64, u32>) -> Result<usize> {
    let mut conn = db.get()?;
    MODULE_ORDER.apply_orders(&mut conn, OWNED_BY, owner_id, orders)
}

/// Reads formset rows from submitted `form-N-field` pairs.
pub fn formset_rows(pairs: &HashMap<String, String>) -> Vec<ModuleFormRow> {
    let total = pairs
        .get("form-TOTAL_FORMS")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0)
        .min(1000);

    (0..total)
        .map(|i| {
            let field = |name: &str| pairs.get(&format!("form-{}-{}", i, name));
            ModuleFormRow {
                id: field("id").and_then(|v| v.trim().parse().ok()),
                title: field("title").cloned().unwrap_or_default(),
                description: field("description").cloned().unwrap_or_default(),
                delete: field("DELETE")
                    .map(|v| matches!(v.as_str(), "on" | "true" | "1"))
                    .unwrap_or(false),
            }
        })
        .collect()
}

/// Rows for rendering: the course's modules followed by blank extras.
pub fn formset_initial(modules: &[Module]) -> Vec<ModuleFormRow> {
    modules
        .iter()
        .map(|m| ModuleFormRow {
            id: Some(m.id),
            title: m.title.clone(),
            description: m.description.clone(),
            delete: false,
        })
        .chain(std::iter::repeat_with(ModuleFormRow::default).take(FORMSET_EXTRA))
        .collect()
}

/// Saves a submitted formset for an owned course in one transaction:
/// existing rows are updated or deleted, filled-in extra rows are appended
/// with the next order, blank extra rows are ignored. Field errors are keyed
/// `form-N-field`. Uploads of items in deleted modules are removed after commit.
pub fn apply_formset(
    db: &Database,
    media_dir: &Path,
    owner_id: i64,
    course_id: i64,
    rows: &[ModuleFormRow],
) -> Result<()> {
    let mut conn = db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let owned: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM courses WHERE id = ? AND owner_id = ?)",
        (course_id, owner_id),
        |row| row.get(0),
    )?;
    if !owned {
        return Err(ServiceError::NotFound("Course").into());
    }

    let existing: Vec<i64> = {
        let mut stmt = tx.prepare("SELECT id FROM modules WHERE course_id = ?")?;
        let ids = stmt
            .query_map([course_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };

    let mut errors = FieldErrors::new();
    for (i, row) in rows.iter().enumerate() {
        if row.is_blank() || row.delete {
            continue;
        }
        if let Some(id) = row.id {
            if !existing.contains(&id) {
                errors.add(&format!("form-{}-id", i), "Select a valid choice");
            }
        }
        let title = row.title.trim();
        if title.is_empty() {
            errors.add(&format!("form-{}-title", i), "This field is required");
        } else if title.chars().count() > MAX_TITLE_LENGTH {
            errors.add(
                &format!("form-{}-title", i),
                format!("Ensure this value has at most {} characters", MAX_TITLE_LENGTH),
            );
        }
    }
    errors.into_result()?;

    let mut blobs = Vec::new();
    for row in rows {
        match row.id {
            Some(id) if row.delete => {
                blobs.extend(contents::blobs_where(&tx, "ct.module_id = ?1", id)?);
                tx.execute(
                    "DELETE FROM modules WHERE id = ? AND course_id = ?",
                    (id, course_id),
                )?;
            }
            Some(id) => {
                tx.execute(
                    "UPDATE modules SET title = ?, description = ? WHERE id = ? AND course_id = ?",
                    (row.title.trim(), row.description.trim(), id, course_id),
                )?;
            }
            None if row.is_blank() || row.delete => {}
            None => {
                insert_module(&tx, course_id, row.title.trim(), row.description.trim(), None)?;
            }
        }
    }

    tx.commit()?;

    for blob in &blobs {
        media::remove_upload(media_dir, blob);
    }
    Ok(())
}

pub(crate) fn row_to_module(row: &rusqlite::Row) -> rusqlite::Result<Module> {
    Ok(Module {
        id: row.get(0)?,
        course_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        order: row.get(4)?,
    })
}
