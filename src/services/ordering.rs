//! Per-parent ordering columns.
//!
//! An [`OrderField`] names an integer column whose values form a sequence
//! among sibling rows, where siblings are the rows sharing the same values in
//! the `for_fields` columns. New rows get `max + 1` within their group (or 0
//! for the first row); existing rows are never renumbered on insert.

use crate::error::ServiceError;
use anyhow::{bail, Result};
use rusqlite::{Connection, ErrorCode, ToSql, TransactionBehavior};
use std::collections::BTreeMap;

/// Largest order a client may assign, leaving room for `max + 1`.
pub const MAX_ORDER: u32 = i32::MAX as u32;

#[derive(Debug, Clone, Copy)]
pub struct OrderField {
    pub table: &'static str,
    pub column: &'static str,
    pub for_fields: &'static [&'static str],
}

/// Modules are ordered within their course.
pub const MODULE_ORDER: OrderField = OrderField {
    table: "modules",
    column: "sort_order",
    for_fields: &["course_id"],
};

/// Contents are ordered within their module.
pub const CONTENT_ORDER: OrderField = OrderField {
    table: "contents",
    column: "sort_order",
    for_fields: &["module_id"],
};

impl OrderField {
    fn scope_filter(&self) -> String {
        if self.for_fields.is_empty() {
            return "1 = 1".to_string();
        }
        self.for_fields
            .iter()
            .enumerate()
            .map(|(i, field)| format!("{} = ?{}", field, i + 1))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Next free value in the group identified by `scope`, which must hold
    /// one value per entry of `for_fields`, in the same order.
    pub fn next_value(&self, conn: &Connection, scope: &[&dyn ToSql]) -> Result<u32> {
        if scope.len() != self.for_fields.len() {
            bail!(
                "{}.{} is scoped by {} field(s), got {}",
                self.table,
                self.column,
                self.for_fields.len(),
                scope.len()
            );
        }
        let sql = format!(
            "SELECT MAX({}) FROM {} WHERE {}",
            self.column,
            self.table,
            self.scope_filter()
        );
        let max: Option<i64> = conn.query_row(&sql, scope, |row| row.get(0))?;
        Ok(match max {
            Some(m) if m >= 0 => u32::try_from(m + 1)?,
            _ => 0,
        })
    }

    /// The explicit value when one was supplied, otherwise [`Self::next_value`].
    pub fn resolve(
        &self,
        conn: &Connection,
        explicit: Option<u32>,
        scope: &[&dyn ToSql],
    ) -> Result<u32> {
        match explicit {
            Some(order) => Ok(order),
            None => self.next_value(conn, scope),
        }
    }

    /// Writes `orders` (row id → order) to the rows matched by `owned_filter`,
    /// a SQL condition over the table's columns with a single `?` bound to
    /// `owner_id`. Rows outside the filter are skipped. Returns the number of
    /// rows updated.
    ///
    /// Targeted rows are first parked on negative values so that permutations
    /// of existing orders do not trip the `(parent, order)` unique index
    /// midway. A mapping that leaves two siblings on the same value is
    /// rejected as a whole, as is any value above [`MAX_ORDER`].
    pub fn apply_orders(
        &self,
        conn: &mut Connection,
        owned_filter: &str,
        owner_id: i64,
        orders: &BTreeMap<i64, u32>,
    ) -> Result<usize> {
        if let Some((id, order)) = orders.iter().find(|(_, order)| **order > MAX_ORDER) {
            return Err(ServiceError::invalid(
                &id.to_string(),
                format!("Order {} exceeds the maximum of {}", order, MAX_ORDER),
            )
            .into());
        }

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let park_sql = format!(
            "UPDATE {t} SET {c} = -id - 1 WHERE id = ?1 AND {f}",
            t = self.table,
            c = self.column,
            f = owned_filter.replace('?', "?2"),
        );
        let set_sql = format!(
            "UPDATE {t} SET {c} = ?1 WHERE id = ?2 AND {c} < 0 AND {f}",
            t = self.table,
            c = self.column,
            f = owned_filter.replace('?', "?3"),
        );

        for id in orders.keys() {
            tx.execute(&park_sql, (id, owner_id))?;
        }

        let mut updated = 0;
        for (id, order) in orders {
            match tx.execute(&set_sql, (order, id, owner_id)) {
                Ok(n) => updated += n,
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    return Err(ServiceError::Conflict(format!(
                        "Order {} is already taken by a sibling of record {}",
                        order, id
                    ))
                    .into());
                }
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit()?;
        Ok(updated)
    }
}
