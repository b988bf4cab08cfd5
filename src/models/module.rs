use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Module {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub description: String,
    pub order: u32,
}

/// One row of the module formset.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ModuleFormRow {
    pub id: Option<i64>,
    pub title: String,
    pub description: String,
    pub delete: bool,
}

impl ModuleFormRow {
    /// A blank extra row carries nothing to save.
    pub fn is_blank(&self) -> bool {
        self.id.is_none() && self.title.trim().is_empty() && self.description.trim().is_empty()
    }
}
