use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;
use crate::models::require_text;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CourseType {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCourseTypeRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCourseTypeRequest {
    pub name: Option<String>,
}

impl NewCourseTypeRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text("name", &self.name)
    }
}

impl UpdateCourseTypeRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        match &self.name {
            Some(name) => require_text("name", name),
            None => Ok(()),
        }
    }
}
