use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;
use crate::models::{CourseOfferingWithDetails, require_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Confirmed,
    Waitlisted,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Confirmed => "confirmed",
            RegistrationStatus::Waitlisted => "waitlisted",
        }
    }
}

/// Status is decided once at registration time and never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StudentRegistration {
    pub id: String,
    pub student_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub course_offering_id: String,
    pub status: RegistrationStatus,
    pub registration_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudentRegistrationRequest {
    pub student_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub course_offering_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRegistrationWithDetails {
    #[serde(flatten)]
    pub registration: StudentRegistration,
    pub course_offering: CourseOfferingWithDetails,
}

impl NewStudentRegistrationRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text("studentName", &self.student_name)?;
        require_text("email", &self.email)?;
        if !self.email.contains('@') {
            return Err(AppError::BadRequest(
                "email must be a valid email address".to_string(),
            ));
        }
        require_text("courseOfferingId", &self.course_offering_id)
    }

    /// Blank phone numbers from the form are stored as absent.
    pub fn normalized(mut self) -> Self {
        self.phone = self
            .phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        self
    }
}
