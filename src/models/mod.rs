pub mod course;
pub mod course_offering;
pub mod course_type;
pub mod stats;
pub mod student_registration;

pub use course::{Course, NewCourseRequest, UpdateCourseRequest};
pub use course_offering::{
    CourseOffering, CourseOfferingWithDetails, DEFAULT_MAX_CAPACITY, NewCourseOfferingRequest,
    OfferingStatus, UpdateCourseOfferingRequest,
};
pub use course_type::{CourseType, NewCourseTypeRequest, UpdateCourseTypeRequest};
pub use stats::Stats;
pub use student_registration::{
    NewStudentRegistrationRequest, RegistrationStatus, StudentRegistration,
    StudentRegistrationWithDetails,
};

use crate::error::AppError;

pub(crate) fn require_text(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    Ok(())
}
