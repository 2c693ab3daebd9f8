use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;
use crate::models::{Course, CourseType, require_text};

pub const DEFAULT_MAX_CAPACITY: i32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum OfferingStatus {
    #[default]
    Active,
    Full,
    Inactive,
}

impl OfferingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferingStatus::Active => "active",
            OfferingStatus::Full => "full",
            OfferingStatus::Inactive => "inactive",
        }
    }

    /// `full` once enrollment reaches capacity, `active` below it.
    /// An inactive offering stays inactive whatever its counter does.
    pub fn for_enrollment(self, current_enrollment: i32, max_capacity: i32) -> OfferingStatus {
        if self == OfferingStatus::Inactive {
            OfferingStatus::Inactive
        } else if current_enrollment >= max_capacity {
            OfferingStatus::Full
        } else {
            OfferingStatus::Active
        }
    }

    /// Active and full offerings are both "running"; only inactive ones are not.
    pub fn is_running(&self) -> bool {
        !matches!(self, OfferingStatus::Inactive)
    }
}

/// `current_enrollment` is only ever written by the enrollment ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CourseOffering {
    pub id: String,
    pub course_id: String,
    pub course_type_id: String,
    pub max_capacity: i32,
    pub current_enrollment: i32,
    pub status: OfferingStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCourseOfferingRequest {
    pub course_id: String,
    pub course_type_id: String,
    pub max_capacity: Option<i32>,
    pub status: Option<OfferingStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCourseOfferingRequest {
    pub course_id: Option<String>,
    pub course_type_id: Option<String>,
    pub max_capacity: Option<i32>,
    pub status: Option<OfferingStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseOfferingWithDetails {
    #[serde(flatten)]
    pub offering: CourseOffering,
    pub course: Course,
    pub course_type: CourseType,
}

fn require_capacity(max_capacity: i32) -> Result<(), AppError> {
    if max_capacity < 1 {
        return Err(AppError::BadRequest(
            "maxCapacity must be at least 1".to_string(),
        ));
    }
    Ok(())
}

impl NewCourseOfferingRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text("courseId", &self.course_id)?;
        require_text("courseTypeId", &self.course_type_id)?;
        if let Some(max_capacity) = self.max_capacity {
            require_capacity(max_capacity)?;
        }
        Ok(())
    }
}

impl UpdateCourseOfferingRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(course_id) = &self.course_id {
            require_text("courseId", course_id)?;
        }
        if let Some(course_type_id) = &self.course_type_id {
            require_text("courseTypeId", course_type_id)?;
        }
        if let Some(max_capacity) = self.max_capacity {
            require_capacity(max_capacity)?;
        }
        Ok(())
    }
}
