//! In-process cache for the public catalog queries.
//!
//! Entries are stored as JSON values under string keys and expire after the
//! configured TTL. Course and series writes invalidate the catalog keys
//! explicitly so instructors see their changes without waiting for expiry.

use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

pub const ALL_SERIES: &str = "all_series";
pub const ALL_COURSES: &str = "all_courses";

/// Key for the course list of one series.
pub fn series_courses_key(series_id: i64) -> String {
    format!("subject_{}_courses", series_id)
}

struct Entry {
    stored: Instant,
    value: serde_json::Value,
}

pub struct CatalogCache {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

impl CatalogCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.read();
        let entry = entries.get(key)?;
        if entry.stored.elapsed() >= self.ttl {
            return None;
        }
        serde_json::from_value(entry.value.clone()).ok()
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        if self.ttl.is_zero() {
            return;
        }
        match serde_json::to_value(value) {
            Ok(value) => {
                self.write().insert(
                    key.to_string(),
                    Entry {
                        stored: Instant::now(),
                        value,
                    },
                );
            }
            Err(e) => tracing::warn!("Not caching {}: {}", key, e),
        }
    }

    /// Returns the cached value for `key` or computes, stores and returns it.
    pub fn get_or_load<T, F>(&self, key: &str, load: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = load()?;
        self.set(key, &value);
        Ok(value)
    }

    pub fn invalidate(&self, key: &str) {
        self.write().remove(key);
    }

    /// Drops every catalog list: all courses, all series and the per-series lists.
    pub fn invalidate_catalog(&self) {
        let mut entries = self.write();
        entries.retain(|key, _| {
            key != ALL_COURSES && key != ALL_SERIES && !key.starts_with("subject_")
        });
        tracing::debug!("Catalog cache invalidated");
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Removes expired entries.
    pub fn cleanup(&self) {
        let ttl = self.ttl;
        self.write().retain(|_, entry| entry.stored.elapsed() < ttl);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
