//! Module contents: ordered placements of polymorphic items.
//!
//! A `contents` row points at one row of `text_items`, `video_items`,
//! `image_items` or `file_items` through `(item_kind, item_id)`; the table is
//! chosen with [`ItemKind::table`]. Removing a content row removes its item.

use crate::error::{FieldErrors, ServiceError};
use crate::models::{Content, ContentWithItem, Item, ItemBody, ItemKind, ItemUpdate, NewItem};
use crate::services::markdown::{html_escape, MarkdownRenderer};
use crate::services::media;
use crate::services::ordering::CONTENT_ORDER;
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use std::collections::BTreeMap;
use std::path::Path;

const MAX_TITLE_LENGTH: usize = 250;

const OWNED_BY: &str = "module_id IN (SELECT m.id FROM modules m JOIN courses c ON c.id = m.course_id WHERE c.owner_id = ?)";

pub fn validate_video_url(value: &str) -> Result<()> {
    let parsed = url::Url::parse(value.trim()).map_err(|_| anyhow::anyhow!("Enter a valid URL"))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        anyhow::bail!("Enter a valid URL");
    }
    Ok(())
}

fn validate_fields(kind: ItemKind, title: &str, payload: Option<&str>) -> Result<()> {
    let mut errors = FieldErrors::new();
    let title = title.trim();
    if title.is_empty() {
        errors.add("title", "This field is required");
    } else if title.chars().count() > MAX_TITLE_LENGTH {
        errors.add(
            "title",
            format!("Ensure this value has at most {} characters", MAX_TITLE_LENGTH),
        );
    }
    if let Some(payload) = payload {
        let field = kind.payload_column();
        match kind {
            ItemKind::Video => {
                if let Err(e) = validate_video_url(payload) {
                    errors.add(field, e.to_string());
                }
            }
            ItemKind::Image | ItemKind::File => {
                if payload.trim().is_empty() {
                    errors.add(field, "This field is required");
                }
            }
            ItemKind::Text => {}
        }
    }
    errors.into_result()?;
    Ok(())
}

fn insert_item(conn: &Connection, creator_id: i64, item: &NewItem) -> Result<i64> {
    let kind = item.body.kind();
    let sql = format!(
        "INSERT INTO {} (creator_id, title, {}) VALUES (?, ?, ?)",
        kind.table(),
        kind.payload_column()
    );
    conn.execute(&sql, (creator_id, item.title.trim(), item.body.payload().trim()))?;
    Ok(conn.last_insert_rowid())
}

fn insert_content(
    conn: &Connection,
    module_id: i64,
    kind: ItemKind,
    item_id: i64,
    order: Option<u32>,
) -> Result<Content> {
    let order = CONTENT_ORDER.resolve(conn, order, &[&module_id])?;
    conn.execute(
        "INSERT INTO contents (module_id, item_kind, item_id, sort_order) VALUES (?, ?, ?, ?)",
        (module_id, kind.to_string(), item_id, order),
    )?;
    Ok(Content {
        id: conn.last_insert_rowid(),
        module_id,
        item_kind: kind,
        item_id,
        order,
    })
}

/// Creates an item by `creator_id` and places it last in the module.
pub fn create_item_content(
    db: &Database,
    creator_id: i64,
    module_id: i64,
    item: &NewItem,
) -> Result<ContentWithItem> {
    let kind = item.body.kind();
    validate_fields(kind, &item.title, Some(item.body.payload()))?;

    let mut conn = db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let item_id = insert_item(&tx, creator_id, item)?;
    let content = insert_content(&tx, module_id, kind, item_id, None)?;
    let item = get_item_with(&tx, kind, item_id)?.ok_or(ServiceError::NotFound("Item"))?;
    tx.commit()?;

    tracing::info!(
        "Added {} item {} to module {} at position {}",
        kind,
        item_id,
        module_id,
        content.order
    );
    Ok(ContentWithItem { content, item })
}

/// Places an existing item in a module. `order` overrides the computed position.
pub fn add_content(
    db: &Database,
    module_id: i64,
    kind: ItemKind,
    item_id: i64,
    order: Option<u32>,
) -> Result<Content> {
    let mut conn = db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if get_item_with(&tx, kind, item_id)?.is_none() {
        return Err(ServiceError::NotFound("Item").into());
    }
    let content = insert_content(&tx, module_id, kind, item_id, order)?;
    tx.commit()?;
    Ok(content)
}

fn get_item_with(conn: &Connection, kind: ItemKind, id: i64) -> Result<Option<Item>> {
    let sql = format!(
        "SELECT id, creator_id, title, {}, created, updated FROM {} WHERE id = ?",
        kind.payload_column(),
        kind.table()
    );
    let item = conn
        .query_row(&sql, [id], |row| {
            Ok(Item {
                id: row.get(0)?,
                creator_id: row.get(1)?,
                title: row.get(2)?,
                body: ItemBody::new(kind, row.get(3)?),
                created: row.get(4)?,
                updated: row.get(5)?,
            })
        })
        .optional()?;
    Ok(item)
}

pub fn get_item(db: &Database, kind: ItemKind, id: i64) -> Result<Option<Item>> {
    let conn = db.get()?;
    get_item_with(&conn, kind, id)
}

/// An item created by `creator_id`, or NotFound.
pub fn get_owned_item(db: &Database, creator_id: i64, kind: ItemKind, id: i64) -> Result<Item> {
    get_item(db, kind, id)?
        .filter(|item| item.creator_id == creator_id)
        .ok_or_else(|| ServiceError::NotFound("Item").into())
}

/// Updates an item created by `creator_id`. Returns the updated item and, when
/// an uploaded payload was replaced, the path of the superseded file.
pub fn update_owned_item(
    db: &Database,
    creator_id: i64,
    kind: ItemKind,
    id: i64,
    update: &ItemUpdate,
) -> Result<(Item, Option<String>)> {
    let current = get_owned_item(db, creator_id, kind, id)?;
    validate_fields(kind, &update.title, update.payload.as_deref())?;

    let payload = update
        .payload
        .as_deref()
        .map(str::trim)
        .unwrap_or(current.body.payload());

    let conn = db.get()?;
    let sql = format!(
        "UPDATE {} SET title = ?, {} = ?, updated = CURRENT_TIMESTAMP WHERE id = ? AND creator_id = ?",
        kind.table(),
        kind.payload_column()
    );
    conn.execute(&sql, (update.title.trim(), payload, id, creator_id))?;

    let replaced = current
        .body
        .blob_path()
        .filter(|old| *old != payload)
        .map(String::from);
    let item = get_item_with(&conn, kind, id)?.ok_or(ServiceError::NotFound("Item"))?;
    Ok((item, replaced))
}

/// A content row inside a course owned by `owner_id`, or NotFound.
pub fn get_owned_content(db: &Database, owner_id: i64, content_id: i64) -> Result<Content> {
    let conn = db.get()?;
    let content = conn
        .query_row(
            r#"
            SELECT ct.id, ct.module_id, ct.item_kind, ct.item_id, ct.sort_order
            FROM contents ct
            JOIN modules m ON m.id = ct.module_id
            JOIN courses c ON c.id = m.course_id
            WHERE ct.id = ? AND c.owner_id = ?
            "#,
            (content_id, owner_id),
            row_to_content,
        )
        .optional()?;
    content.ok_or_else(|| ServiceError::NotFound("Content").into())
}

/// Removes a content row of an owned course: first the referenced item, then
/// the row itself, then the item's uploaded file if it had one.
pub fn delete_content(db: &Database, media_dir: &Path, owner_id: i64, content_id: i64) -> Result<Content> {
    let content = get_owned_content(db, owner_id, content_id)?;

    let mut conn = db.get()?;
    let tx = conn.transaction()?;
    let item = get_item_with(&tx, content.item_kind, content.item_id)?;
    tx.execute(
        &format!("DELETE FROM {} WHERE id = ?", content.item_kind.table()),
        [content.item_id],
    )?;
    tx.execute("DELETE FROM contents WHERE id = ?", [content.id])?;
    tx.commit()?;

    if let Some(blob) = item.as_ref().and_then(|i| i.body.blob_path()) {
        media::remove_upload(media_dir, blob);
    }
    tracing::info!(
        "Removed content {} ({} item {}) from module {}",
        content.id,
        content.item_kind,
        content.item_id,
        content.module_id
    );
    Ok(content)
}

/// Contents of a module in order, each resolved to its item.
/// Uploaded files referenced by contents whose module matches `module_filter`
/// (a condition on `ct.module_id` with one `?1` parameter).
pub(crate) fn blobs_where(conn: &Connection, module_filter: &str, id: i64) -> Result<Vec<String>> {
    let sql = format!(
        r#"
        SELECT i.image FROM contents ct
        JOIN image_items i ON ct.item_kind = 'image' AND i.id = ct.item_id
        WHERE {f}
        UNION ALL
        SELECT fi.file FROM contents ct
        JOIN file_items fi ON ct.item_kind = 'file' AND fi.id = ct.item_id
        WHERE {f}
        "#,
        f = module_filter,
    );
    let mut stmt = conn.prepare(&sql)?;
    let blobs = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(blobs)
}

pub fn list_module_contents(db: &Database, module_id: i64) -> Result<Vec<ContentWithItem>> {
    let conn = db.get()?;
    let contents: Vec<Content> = {
        let mut stmt = conn.prepare(
            "SELECT id, module_id, item_kind, item_id, sort_order FROM contents WHERE module_id = ? ORDER BY sort_order ASC, id ASC",
        )?;
        let rows = stmt
            .query_map([module_id], row_to_content)?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let mut result = Vec::with_capacity(contents.len());
    for content in contents {
        match get_item_with(&conn, content.item_kind, content.item_id)? {
            Some(item) => result.push(ContentWithItem { content, item }),
            None => tracing::warn!(
                "Content {} points at missing {} item {}",
                content.id,
                content.item_kind,
                content.item_id
            ),
        }
    }
    Ok(result)
}

/// Applies `id → order` to contents of courses owned by `owner_id`.
pub fn reorder_contents(db: &Database, owner_id: i64, orders: &BTreeMap<i64, u32>) -> Result<usize> {
    let mut conn = db.get()?;
    CONTENT_ORDER.apply_orders(&mut conn, OWNED_BY, owner_id, orders)
}

/// HTML for an item as shown to students.
pub fn render_item(renderer: &MarkdownRenderer, item: &Item) -> String {
    let title = html_escape(&item.title);
    match &item.body {
        ItemBody::Text { content } => renderer.render(content),
        ItemBody::Video { url } => match embed_url(url) {
            Some(embed) => format!(
                r#"<iframe class="video-embed" src="{}" title="{}" width="640" height="360" allowfullscreen></iframe>"#,
                html_escape(&embed),
                title
            ),
            None => format!(
                r#"<a class="video-link" href="{}" rel="noopener noreferrer">{}</a>"#,
                html_escape(url),
                title
            ),
        },
        ItemBody::Image { image } => format!(
            r#"<img class="content-image" src="/media/{}" alt="{}">"#,
            html_escape(image),
            title
        ),
        ItemBody::File { file } => format!(
            r#"<a class="content-file" href="/media/{}" download>{}</a>"#,
            html_escape(file),
            title
        ),
    }
}

/// Player URL for the video hosts that allow embedding.
fn embed_url(value: &str) -> Option<String> {
    let parsed = url::Url::parse(value).ok()?;
    let host = parsed.host_str()?.trim_start_matches("www.");
    match host {
        "youtube.com" | "m.youtube.com" => parsed
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| format!("https://www.youtube.com/embed/{}", v)),
        "youtu.be" => parsed
            .path_segments()?
            .next()
            .filter(|id| !id.is_empty())
            .map(|id| format!("https://www.youtube.com/embed/{}", id)),
        "vimeo.com" => parsed
            .path_segments()?
            .next()
            .filter(|id| id.chars().all(|c| c.is_ascii_digit()) && !id.is_empty())
            .map(|id| format!("https://player.vimeo.com/video/{}", id)),
        _ => None,
    }
}

pub(crate) fn row_to_content(row: &rusqlite::Row) -> rusqlite::Result<Content> {
    let kind: String = row.get(2)?;
    let item_kind = kind.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown item kind '{}'", kind).into(),
        )
    })?;
    Ok(Content {
        id: row.get(0)?,
        module_id: row.get(1)?,
        item_kind,
        item_id: row.get(3)?,
        order: row.get(4)?,
    })
}
