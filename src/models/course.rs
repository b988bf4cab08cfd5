use super::Module;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub owner_id: Option<i64>,
    pub series_id: i64,
    pub title: String,
    pub slug: String,
    pub overview: String,
    pub hero_image: Option<String>,
    pub released_date: String,
    pub updated: String,
}

/// Catalog row: a course annotated with its module count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseSummary {
    #[serde(flatten)]
    pub course: Course,
    pub series_title: String,
    pub total_modules: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseWithModules {
    #[serde(flatten)]
    pub course: Course,
    pub modules: Vec<Module>,
}

/// Editable course fields. The owner and slug are never taken from input.
#[derive(Debug, Clone, Deserialize)]
pub struct CourseInput {
    pub series_id: i64,
    pub title: String,
    #[serde(default)]
    pub overview: String,
}
