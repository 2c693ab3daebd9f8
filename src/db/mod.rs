pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::*;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Persistence contract shared by the SQLite store and the in-memory store.
///
/// Lists come back newest first. Lookups and mutations by id report absence
/// as `Ok(None)` / `Ok(false)` instead of an error. Nothing here cascades.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn ping(&self) -> Result<(), AppError>;

    async fn list_course_types(&self) -> Result<Vec<CourseType>, AppError>;
    async fn get_course_type(&self, id: &str) -> Result<Option<CourseType>, AppError>;
    async fn insert_course_type(&self, req: NewCourseTypeRequest) -> Result<CourseType, AppError>;
    async fn update_course_type(
        &self,
        id: &str,
        req: UpdateCourseTypeRequest,
    ) -> Result<Option<CourseType>, AppError>;
    async fn delete_course_type(&self, id: &str) -> Result<bool, AppError>;

    async fn list_courses(&self) -> Result<Vec<Course>, AppError>;
    async fn get_course(&self, id: &str) -> Result<Option<Course>, AppError>;
    async fn insert_course(&self, req: NewCourseRequest) -> Result<Course, AppError>;
    async fn update_course(
        &self,
        id: &str,
        req: UpdateCourseRequest,
    ) -> Result<Option<Course>, AppError>;
    async fn delete_course(&self, id: &str) -> Result<bool, AppError>;

    async fn list_offerings(&self) -> Result<Vec<CourseOffering>, AppError>;
    async fn get_offering(&self, id: &str) -> Result<Option<CourseOffering>, AppError>;
    async fn insert_offering(
        &self,
        req: NewCourseOfferingRequest,
    ) -> Result<CourseOffering, AppError>;
    /// Administrative update. Leaves `current_enrollment` alone and does not
    /// recompute `status` against it.
    async fn update_offering(
        &self,
        id: &str,
        req: UpdateCourseOfferingRequest,
    ) -> Result<Option<CourseOffering>, AppError>;
    async fn delete_offering(&self, id: &str) -> Result<bool, AppError>;

    async fn list_registrations(&self) -> Result<Vec<StudentRegistration>, AppError>;
    async fn get_registration(&self, id: &str) -> Result<Option<StudentRegistration>, AppError>;
    async fn insert_registration(
        &self,
        req: NewStudentRegistrationRequest,
        status: RegistrationStatus,
    ) -> Result<StudentRegistration, AppError>;
    async fn delete_registration(&self, id: &str) -> Result<bool, AppError>;

    /// Takes one seat in a single atomic step: bumps `current_enrollment`
    /// and rederives `status`, but only while the offering is below
    /// `max_capacity`. `None` when the offering is full or does not exist.
    async fn increment_enrollment_if_open(
        &self,
        offering_id: &str,
    ) -> Result<Option<CourseOffering>, AppError>;

    /// Gives one seat back in a single atomic step, clamping the counter at
    /// zero and rederiving `status`. `None` when the offering does not exist.
    async fn decrement_enrollment(
        &self,
        offering_id: &str,
    ) -> Result<Option<CourseOffering>, AppError>;
}
