use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::EntityStore;
use crate::error::AppError;
use crate::models::*;

/// Rows are kept in insertion order; listing walks them backwards.
#[derive(Default)]
struct Tables {
    course_types: Vec<CourseType>,
    courses: Vec<Course>,
    offerings: Vec<CourseOffering>,
    registrations: Vec<StudentRegistration>,
}

/// Process-local store used by tests and `STORE_BACKEND=memory`.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T: Clone>(rows: &[T]) -> Vec<T> {
    rows.iter().rev().cloned().collect()
}

fn find<'a, T, F>(rows: &'a [T], id: &str, id_of: F) -> Option<&'a T>
where
    F: Fn(&T) -> &str,
{
    rows.iter().find(|row| id_of(row) == id)
}

fn find_mut<'a, T, F>(rows: &'a mut [T], id: &str, id_of: F) -> Option<&'a mut T>
where
    F: Fn(&T) -> &str,
{
    rows.iter_mut().find(|row| id_of(row) == id)
}

fn remove<T, F>(rows: &mut Vec<T>, id: &str, id_of: F) -> bool
where
    F: Fn(&T) -> &str,
{
    let before = rows.len();
    rows.retain(|row| id_of(row) != id);
    rows.len() < before
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn list_course_types(&self) -> Result<Vec<CourseType>, AppError> {
        Ok(newest_first(&self.tables.read().await.course_types))
    }

    async fn get_course_type(&self, id: &str) -> Result<Option<CourseType>, AppError> {
        let tables = self.tables.read().await;
        Ok(find(&tables.course_types, id, |t| t.id.as_str()).cloned())
    }

    async fn insert_course_type(&self, req: NewCourseTypeRequest) -> Result<CourseType, AppError> {
        let mut tables = self.tables.write().await;
        if tables.course_types.iter().any(|t| t.name == req.name) {
            return Err(AppError::BadRequest(
                "Course type name already exists".to_string(),
            ));
        }

        let course_type = CourseType {
            id: Uuid::new_v4().to_string(),
            name: req.name,
            created_at: Utc::now(),
        };
        tables.course_types.push(course_type.clone());
        Ok(course_type)
    }

    async fn update_course_type(
        &self,
        id: &str,
        req: UpdateCourseTypeRequest,
    ) -> Result<Option<CourseType>, AppError> {
        let mut tables = self.tables.write().await;
        if let Some(name) = &req.name {
            if tables.course_types.iter().any(|t| t.id != id && &t.name == name) {
                return Err(AppError::BadRequest(
                    "Course type name already exists".to_string(),
                ));
            }
        }

        let Some(current) = find_mut(&mut tables.course_types, id, |t| t.id.as_str()) else {
            return Ok(None);
        };
        if let Some(name) = req.name {
            current.name = name;
        }
        Ok(Some(current.clone()))
    }

    async fn delete_course_type(&self, id: &str) -> Result<bool, AppError> {
        Ok(remove(&mut self.tables.write().await.course_types, id, |t| t.id.as_str()))
    }

    async fn list_courses(&self) -> Result<Vec<Course>, AppError> {
        Ok(newest_first(&self.tables.read().await.courses))
    }

    async fn get_course(&self, id: &str) -> Result<Option<Course>, AppError> {
        let tables = self.tables.read().await;
        Ok(find(&tables.courses, id, |c| c.id.as_str()).cloned())
    }

    async fn insert_course(&self, req: NewCourseRequest) -> Result<Course, AppError> {
        let course = Course {
            id: Uuid::new_v4().to_string(),
            name: req.name,
            language: req.language,
            created_at: Utc::now(),
        };
        self.tables.write().await.courses.push(course.clone());
        Ok(course)
    }

    async fn update_course(
        &self,
        id: &str,
        req: UpdateCourseRequest,
    ) -> Result<Option<Course>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(current) = find_mut(&mut tables.courses, id, |c| c.id.as_str()) else {
            return Ok(None);
        };
        if let Some(name) = req.name {
            current.name = name;
        }
        if let Some(language) = req.language {
            current.language = language;
        }
        Ok(Some(current.clone()))
    }

    async fn delete_course(&self, id: &str) -> Result<bool, AppError> {
        Ok(remove(&mut self.tables.write().await.courses, id, |c| c.id.as_str()))
    }

    async fn list_offerings(&self) -> Result<Vec<CourseOffering>, AppError> {
        Ok(newest_first(&self.tables.read().await.offerings))
    }

    async fn get_offering(&self, id: &str) -> Result<Option<CourseOffering>, AppError> {
        let tables = self.tables.read().await;
        Ok(find(&tables.offerings, id, |o| o.id.as_str()).cloned())
    }

    async fn insert_offering(
        &self,
        req: NewCourseOfferingRequest,
    ) -> Result<CourseOffering, AppError> {
        let offering = CourseOffering {
            id: Uuid::new_v4().to_string(),
            course_id: req.course_id,
            course_type_id: req.course_type_id,
            max_capacity: req.max_capacity.unwrap_or(DEFAULT_MAX_CAPACITY),
            current_enrollment: 0,
            status: req.status.unwrap_or_default(),
            created_at: Utc::now(),
        };
        self.tables.write().await.offerings.push(offering.clone());
        Ok(offering)
    }

    async fn update_offering(
        &self,
        id: &str,
        req: UpdateCourseOfferingRequest,
    ) -> Result<Option<CourseOffering>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(current) = find_mut(&mut tables.offerings, id, |o| o.id.as_str()) else {
            return Ok(None);
        };
        if let Some(course_id) = req.course_id {
            current.course_id = course_id;
        }
        if let Some(course_type_id) = req.course_type_id {
            current.course_type_id = course_type_id;
        }
        if let Some(max_capacity) = req.max_capacity {
            current.max_capacity = max_capacity;
        }
        if let Some(status) = req.status {
            current.status = status;
        }
        Ok(Some(current.clone()))
    }

    async fn delete_offering(&self, id: &str) -> Result<bool, AppError> {
        Ok(remove(&mut self.tables.write().await.offerings, id, |o| o.id.as_str()))
    }

    async fn list_registrations(&self) -> Result<Vec<StudentRegistration>, AppError> {
        Ok(newest_first(&self.tables.read().await.registrations))
    }

    async fn get_registration(&self, id: &str) -> Result<Option<StudentRegistration>, AppError> {
        let tables = self.tables.read().await;
        Ok(find(&tables.registrations, id, |r| r.id.as_str()).cloned())
    }

    async fn insert_registration(
        &self,
        req: NewStudentRegistrationRequest,
        status: RegistrationStatus,
    ) -> Result<StudentRegistration, AppError> {
        let registration = StudentRegistration {
            id: Uuid::new_v4().to_string(),
            student_name: req.student_name,
            email: req.email,
            phone: req.phone,
            course_offering_id: req.course_offering_id,
            status,
            registration_date: Utc::now(),
        };
        self.tables
            .write()
            .await
            .registrations
            .push(registration.clone());
        Ok(registration)
    }

    async fn delete_registration(&self, id: &str) -> Result<bool, AppError> {
        Ok(remove(&mut self.tables.write().await.registrations, id, |r| r.id.as_str()))
    }

    async fn increment_enrollment_if_open(
        &self,
        offering_id: &str,
    ) -> Result<Option<CourseOffering>, AppError> {
        let mut tables = self.tables.write().await;
        match find_mut(&mut tables.offerings, offering_id, |o| o.id.as_str()) {
            Some(offering) if offering.current_enrollment < offering.max_capacity => {
                offering.current_enrollment += 1;
                offering.status = offering
                    .status
                    .for_enrollment(offering.current_enrollment, offering.max_capacity);
                Ok(Some(offering.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn decrement_enrollment(
        &self,
        offering_id: &str,
    ) -> Result<Option<CourseOffering>, AppError> {
        let mut tables = self.tables.write().await;
        Ok(find_mut(&mut tables.offerings, offering_id, |o| o.id.as_str()).map(|offering| {
            offering.current_enrollment = (offering.current_enrollment - 1).max(0);
            offering.status = offering
                .status
                .for_enrollment(offering.current_enrollment, offering.max_capacity);
            offering.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_missing_returns_none() {
        let store = MemoryStore::new();
        let updated = store
            .update_course(
                "missing",
                UpdateCourseRequest {
                    name: Some("x".to_string()),
                    language: None,
                },
            )
            .await
            .expect("update should not fail");
        assert!(updated.is_none());
        assert!(!store.delete_course("missing").await.expect("delete should not fail"));
    }

    #[tokio::test]
    async fn test_rename_to_existing_course_type_is_rejected() {
        let store = MemoryStore::new();
        store
            .insert_course_type(NewCourseTypeRequest { name: "Group".to_string() })
            .await
            .expect("Failed to insert");
        let special = store
            .insert_course_type(NewCourseTypeRequest { name: "Special".to_string() })
            .await
            .expect("Failed to insert");

        let renamed = store
            .update_course_type(
                &special.id,
                UpdateCourseTypeRequest { name: Some("Group".to_string()) },
            )
            .await;
        assert!(matches!(renamed, Err(AppError::BadRequest(_))));

        let kept = store
            .update_course_type(
                &special.id,
                UpdateCourseTypeRequest { name: Some("Special".to_string()) },
            )
            .await
            .expect("renaming to its own name is fine");
        assert_eq!(kept.map(|t| t.name), Some("Special".to_string()));
    }

    #[tokio::test]
    async fn test_newest_first_and_partial_merge() {
        let store = MemoryStore::new();
        let first = store
            .insert_course(NewCourseRequest {
                name: "Hindi Literature".to_string(),
                language: "Hindi".to_string(),
            })
            .await
            .expect("Failed to insert");
        store
            .insert_course(NewCourseRequest {
                name: "Urdu Poetry".to_string(),
                language: "Urdu".to_string(),
            })
            .await
            .expect("Failed to insert");

        let updated = store
            .update_course(
                &first.id,
                UpdateCourseRequest {
                    name: None,
                    language: Some("Hindustani".to_string()),
                },
            )
            .await
            .expect("Failed to update")
            .expect("Course not found");
        assert_eq!(updated.name, "Hindi Literature");
        assert_eq!(updated.language, "Hindustani");

        let names: Vec<String> = store
            .list_courses()
            .await
            .expect("Failed to list")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Urdu Poetry", "Hindi Literature"]);
    }

    #[tokio::test]
    async fn test_enrollment_counter_bounds() {
        let store = MemoryStore::new();
        let course_type = store
            .insert_course_type(NewCourseTypeRequest { name: "Individual".to_string() })
            .await
            .expect("Failed to insert");
        let course = store
            .insert_course(NewCourseRequest {
                name: "Hindi Literature".to_string(),
                language: "Hindi".to_string(),
            })
            .await
            .expect("Failed to insert");
        let offering = store
            .insert_offering(NewCourseOfferingRequest {
                course_id: course.id,
                course_type_id: course_type.id,
                max_capacity: Some(1),
                status: None,
            })
            .await
            .expect("Failed to insert");

        let taken = store
            .increment_enrollment_if_open(&offering.id)
            .await
            .expect("Failed to increment")
            .expect("Seat should be open");
        assert_eq!(taken.current_enrollment, 1);
        assert_eq!(taken.status, OfferingStatus::Full);
        assert!(store.increment_enrollment_if_open(&offering.id).await.expect("increment").is_none());

        for _ in 0..2 {
            let released = store
                .decrement_enrollment(&offering.id)
                .await
                .expect("Failed to decrement")
                .expect("Offering not found");
            assert_eq!(released.current_enrollment, 0);
            assert_eq!(released.status, OfferingStatus::Active);
        }
        assert!(store.decrement_enrollment("missing").await.expect("decrement").is_none());
    }
}
