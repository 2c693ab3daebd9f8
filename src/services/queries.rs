use std::collections::HashMap;
use std::sync::Arc;

use crate::db::EntityStore;
use crate::error::AppError;
use crate::models::*;

/// Read-only composite views, joined in memory by foreign key.
/// Rows whose references dangle are left out of the lists.
pub struct QueryFacade {
    store: Arc<dyn EntityStore>,
}

struct Catalog {
    courses: HashMap<String, Course>,
    course_types: HashMap<String, CourseType>,
}

impl Catalog {
    fn details(&self, offering: CourseOffering) -> Option<CourseOfferingWithDetails> {
        let course = self.courses.get(&offering.course_id)?.clone();
        let course_type = self.course_types.get(&offering.course_type_id)?.clone();
        Some(CourseOfferingWithDetails {
            offering,
            course,
            course_type,
        })
    }
}

impl QueryFacade {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    async fn catalog(&self) -> Result<Catalog, AppError> {
        let courses = self
            .store
            .list_courses()
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        let course_types = self
            .store
            .list_course_types()
            .await?
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        Ok(Catalog {
            courses,
            course_types,
        })
    }

    pub async fn offering_with_details(
        &self,
        offering: CourseOffering,
    ) -> Result<Option<CourseOfferingWithDetails>, AppError> {
        let Some(course) = self.store.get_course(&offering.course_id).await? else {
            return Ok(None);
        };
        let Some(course_type) = self.store.get_course_type(&offering.course_type_id).await? else {
            return Ok(None);
        };
        Ok(Some(CourseOfferingWithDetails {
            offering,
            course,
            course_type,
        }))
    }

    pub async fn offering_with_details_by_id(
        &self,
        id: &str,
    ) -> Result<Option<CourseOfferingWithDetails>, AppError> {
        match self.store.get_offering(id).await? {
            Some(offering) => self.offering_with_details(offering).await,
            None => Ok(None),
        }
    }

    pub async fn registration_with_details(
        &self,
        registration: StudentRegistration,
    ) -> Result<Option<StudentRegistrationWithDetails>, AppError> {
        let Some(offering) = self.store.get_offering(&registration.course_offering_id).await? else {
            return Ok(None);
        };
        Ok(self
            .offering_with_details(offering)
            .await?
            .map(|course_offering| StudentRegistrationWithDetails {
                registration,
                course_offering,
            }))
    }

    pub async fn list_offerings_with_details(
        &self,
    ) -> Result<Vec<CourseOfferingWithDetails>, AppError> {
        let catalog = self.catalog().await?;
        Ok(self
            .store
            .list_offerings()
            .await?
            .into_iter()
            .filter_map(|o| catalog.details(o))
            .collect())
    }

    pub async fn list_registrations_with_details(
        &self,
    ) -> Result<Vec<StudentRegistrationWithDetails>, AppError> {
        self.registrations_matching(|_| true).await
    }

    pub async fn list_registrations_for_offering(
        &self,
        offering_id: &str,
    ) -> Result<Vec<StudentRegistrationWithDetails>, AppError> {
        self.registrations_matching(|r| r.course_offering_id == offering_id)
            .await
    }

    async fn registrations_matching<F>(
        &self,
        keep: F,
    ) -> Result<Vec<StudentRegistrationWithDetails>, AppError>
    where
        F: Fn(&StudentRegistration) -> bool + Send,
    {
        let catalog = self.catalog().await?;
        let offerings: HashMap<String, CourseOfferingWithDetails> = self
            .store
            .list_offerings()
            .await?
            .into_iter()
            .filter_map(|o| catalog.details(o))
            .map(|d| (d.offering.id.clone(), d))
            .collect();

        Ok(self
            .store
            .list_registrations()
            .await?
            .into_iter()
            .filter(|r| keep(r))
            .filter_map(|registration| {
                let course_offering = offerings.get(&registration.course_offering_id)?.clone();
                Some(StudentRegistrationWithDetails {
                    registration,
                    course_offering,
                })
            })
            .collect())
    }

    /// `active_offerings_count` counts every offering that is not inactive.
    pub async fn stats(&self) -> Result<Stats, AppError> {
        let course_types_count = self.store.list_course_types().await?.len();
        let courses_count = self.store.list_courses().await?.len();
        let active_offerings_count = self
            .store
            .list_offerings()
            .await?
            .iter()
            .filter(|o| o.status.is_running())
            .count();
        let total_students_count = self.store.list_registrations().await?.len();

        Ok(Stats {
            course_types_count,
            courses_count,
            active_offerings_count,
            total_students_count,
        })
    }
}
