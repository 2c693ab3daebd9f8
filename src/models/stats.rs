use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub course_types_count: usize,
    pub courses_count: usize,
    pub active_offerings_count: usize,
    pub total_students_count: usize,
}
