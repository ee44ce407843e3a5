//! Search-query builders for outline and lesson generation.

use chrono::Datelike;

/// Broad queries about a subject, for course-structure generation.
#[must_use]
pub fn build_structure_queries(subject: &str, year: i32) -> Vec<String> {
    vec![
        format!("{subject} comprehensive guide"),
        format!("{subject} key topics to learn"),
        format!("{subject} latest developments {year}"),
    ]
}

/// Specific queries about one lesson topic.
#[must_use]
pub fn build_lesson_queries(title: &str) -> Vec<String> {
    vec![title.to_string(), format!("{title} guide explanation")]
}

/// The current calendar year (UTC).
#[must_use]
pub fn current_year() -> i32 {
    chrono::Utc::now().year()
}
