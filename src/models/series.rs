use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Series {
    pub id: i64,
    pub title: String,
    pub slug: String,
}

/// A series annotated with the number of courses it groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesWithCount {
    #[serde(flatten)]
    pub series: Series,
    pub total_courses: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateSeries {
    pub title: String,
    pub slug: Option<String>,
}
