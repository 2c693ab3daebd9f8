use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::db::EntityStore;
use crate::error::AppError;
use crate::models::{CourseOffering, NewStudentRegistrationRequest, RegistrationStatus, StudentRegistration};

/// Owns every write to an offering's `current_enrollment` and derived status.
///
/// Each seat change is one conditional update in the store, so concurrent
/// registrations never overbook and never have to retry.
pub struct EnrollmentLedger {
    store: Arc<dyn EntityStore>,
}

impl EnrollmentLedger {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Records a registration, confirmed while seats remain and waitlisted after.
    ///
    /// Fails with `ReferentialFailure` when the offering does not exist.
    pub async fn register(
        &self,
        req: NewStudentRegistrationRequest,
    ) -> Result<StudentRegistration, AppError> {
        let offering_id = req.course_offering_id.clone();
        let seat = self.claim_seat(&offering_id).await?;
        let status = match seat {
            Some(_) => RegistrationStatus::Confirmed,
            None => RegistrationStatus::Waitlisted,
        };

        match self.store.insert_registration(req, status).await {
            Ok(registration) => {
                info!(
                    "Registered {} for offering {} ({})",
                    registration.id,
                    offering_id,
                    status.as_str()
                );
                Ok(registration)
            }
            Err(e) => {
                if seat.is_some() {
                    if let Err(release_err) = self.release_seat(&offering_id).await {
                        warn!(
                            "Failed to release seat on offering {} after insert error: {}",
                            offering_id, release_err
                        );
                    }
                }
                Err(e)
            }
        }
    }

    /// Deletes a registration. A confirmed one gives its seat back; waitlisted
    /// registrations are never promoted. Returns false for unknown ids.
    pub async fn unregister(&self, registration_id: &str) -> Result<bool, AppError> {
        let Some(registration) = self.store.get_registration(registration_id).await? else {
            return Ok(false);
        };

        // only the request that actually removed the row gives the seat back
        let deleted = self.store.delete_registration(registration_id).await?;
        if !deleted {
            return Ok(false);
        }

        if registration.status == RegistrationStatus::Confirmed
            && self.release_seat(&registration.course_offering_id).await?.is_none()
        {
            debug!(
                "Offering {} no longer exists, no seat to release",
                registration.course_offering_id
            );
        }

        info!("Unregistered {} ({})", registration_id, registration.status.as_str());
        Ok(true)
    }

    /// `Some(updated offering)` when a seat was taken, `None` when the
    /// offering is at capacity.
    async fn claim_seat(&self, offering_id: &str) -> Result<Option<CourseOffering>, AppError> {
        if let Some(updated) = self.store.increment_enrollment_if_open(offering_id).await? {
            debug!(
                "Offering {} enrollment now {}/{} ({})",
                offering_id,
                updated.current_enrollment,
                updated.max_capacity,
                updated.status.as_str()
            );
            return Ok(Some(updated));
        }

        let offering = self
            .store
            .get_offering(offering_id)
            .await?
            .ok_or_else(|| AppError::ReferentialFailure("Course offering not found".to_string()))?;

        debug!(
            "Offering {} at capacity ({}/{}), waitlisting",
            offering_id, offering.current_enrollment, offering.max_capacity
        );
        Ok(None)
    }

    /// Decrements the counter, clamped at zero. `None` if the offering is gone.
    async fn release_seat(&self, offering_id: &str) -> Result<Option<CourseOffering>, AppError> {
        let updated = self.store.decrement_enrollment(offering_id).await?;
        if let Some(offering) = &updated {
            debug!(
                "Offering {} enrollment now {}/{} ({})",
                offering_id,
                offering.current_enrollment,
                offering.max_capacity,
                offering.status.as_str()
            );
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::*;

    async fn setup(max_capacity: i32) -> (Arc<dyn EntityStore>, EnrollmentLedger, CourseOffering) {
        let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
        let offering = insert_offering(store.as_ref(), max_capacity).await;
        let ledger = EnrollmentLedger::new(store.clone());
        (store, ledger, offering)
    }

    async fn insert_offering(store: &dyn EntityStore, max_capacity: i32) -> CourseOffering {
        let course_type = store
            .insert_course_type(NewCourseTypeRequest { name: format!("Type {}", max_capacity) })
            .await
            .expect("Failed to insert course type");
        let course = store
            .insert_course(NewCourseRequest {
                name: "Urdu Poetry".to_string(),
                language: "Urdu".to_string(),
            })
            .await
            .expect("Failed to insert course");
        store
            .insert_offering(NewCourseOfferingRequest {
                course_id: course.id,
                course_type_id: course_type.id,
                max_capacity: Some(max_capacity),
                status: None,
            })
            .await
            .expect("Failed to insert offering")
    }

    fn student(name: &str, offering_id: &str) -> NewStudentRegistrationRequest {
        NewStudentRegistrationRequest {
            student_name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            phone: None,
            course_offering_id: offering_id.to_string(),
        }
    }

    async fn offering(store: &Arc<dyn EntityStore>, id: &str) -> CourseOffering {
        store
            .get_offering(id)
            .await
            .expect("Failed to fetch offering")
            .expect("Offering not found")
    }

    async fn confirmed_count(store: &Arc<dyn EntityStore>, offering_id: &str) -> i32 {
        store
            .list_registrations()
            .await
            .expect("Failed to list registrations")
            .iter()
            .filter(|r| r.course_offering_id == offering_id && r.status == RegistrationStatus::Confirmed)
            .count() as i32
    }

    #[tokio::test]
    async fn test_capacity_two_scenario() {
        let (store, ledger, o) = setup(2).await;

        let a = ledger.register(student("A", &o.id)).await.expect("register A");
        assert_eq!(a.status, RegistrationStatus::Confirmed);
        let after_a = offering(&store, &o.id).await;
        assert_eq!(after_a.current_enrollment, 1);
        assert_eq!(after_a.status, OfferingStatus::Active);

        let b = ledger.register(student("B", &o.id)).await.expect("register B");
        assert_eq!(b.status, RegistrationStatus::Confirmed);
        let after_b = offering(&store, &o.id).await;
        assert_eq!(after_b.current_enrollment, 2);
        assert_eq!(after_b.status, OfferingStatus::Full);

        let c = ledger.register(student("C", &o.id)).await.expect("register C");
        assert_eq!(c.status, RegistrationStatus::Waitlisted);
        let after_c = offering(&store, &o.id).await;
        assert_eq!(after_c.current_enrollment, 2);
        assert_eq!(after_c.status, OfferingStatus::Full);

        assert!(ledger.unregister(&a.id).await.expect("unregister A"));
        let after_cancel = offering(&store, &o.id).await;
        assert_eq!(after_cancel.current_enrollment, 1);
        assert_eq!(after_cancel.status, OfferingStatus::Active);

        // no promotion off the waitlist
        let c_after = store
            .get_registration(&c.id)
            .await
            .expect("Failed to fetch")
            .expect("C should still exist");
        assert_eq!(c_after.status, RegistrationStatus::Waitlisted);
    }

    #[tokio::test]
    async fn test_unknown_offering_is_referential_failure() {
        let (store, ledger, _) = setup(3).await;

        let err = ledger.register(student("A", "missing")).await.unwrap_err();
        match err {
            AppError::ReferentialFailure(msg) => assert_eq!(msg, "Course offering not found"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(store.list_registrations().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_unregister_waitlisted_leaves_counter() {
        let (store, ledger, o) = setup(1).await;

        ledger.register(student("A", &o.id)).await.expect("register A");
        let waiting = ledger.register(student("B", &o.id)).await.expect("register B");
        assert_eq!(waiting.status, RegistrationStatus::Waitlisted);

        let before = offering(&store, &o.id).await;
        assert!(ledger.unregister(&waiting.id).await.expect("unregister B"));
        let after = offering(&store, &o.id).await;

        assert_eq!(after.current_enrollment, before.current_enrollment);
        assert_eq!(after.status, before.status);
    }

    #[tokio::test]
    async fn test_unregister_unknown_id_has_no_effect() {
        let (store, ledger, o) = setup(2).await;
        ledger.register(student("A", &o.id)).await.expect("register A");

        assert!(!ledger.unregister("missing").await.expect("unregister"));
        assert_eq!(offering(&store, &o.id).await.current_enrollment, 1);
        assert_eq!(store.list_registrations().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_after_offering_deleted() {
        let (store, ledger, o) = setup(2).await;
        let a = ledger.register(student("A", &o.id)).await.expect("register A");

        assert!(store.delete_offering(&o.id).await.expect("delete offering"));
        assert!(ledger.unregister(&a.id).await.expect("unregister A"));
        assert!(store.get_registration(&a.id).await.expect("fetch").is_none());
    }

    #[tokio::test]
    async fn test_inactive_offering_keeps_status() {
        let (store, ledger, o) = setup(1).await;
        store
            .update_offering(
                &o.id,
                UpdateCourseOfferingRequest {
                    status: Some(OfferingStatus::Inactive),
                    ..Default::default()
                },
            )
            .await
            .expect("update")
            .expect("offering exists");

        let a = ledger.register(student("A", &o.id)).await.expect("register A");
        assert_eq!(a.status, RegistrationStatus::Confirmed);
        let after = offering(&store, &o.id).await;
        assert_eq!(after.current_enrollment, 1);
        assert_eq!(after.status, OfferingStatus::Inactive);

        ledger.unregister(&a.id).await.expect("unregister A");
        let after = offering(&store, &o.id).await;
        assert_eq!(after.current_enrollment, 0);
        assert_eq!(after.status, OfferingStatus::Inactive);
    }

    #[tokio::test]
    async fn test_counter_matches_confirmed_registrations() {
        let (store, ledger, o) = setup(3).await;
        let mut ids = Vec::new();

        for name in ["A", "B", "C", "D", "E"] {
            ids.push(ledger.register(student(name, &o.id)).await.expect("register").id);
        }
        assert_eq!(offering(&store, &o.id).await.current_enrollment, confirmed_count(&store, &o.id).await);

        for id in [&ids[4], &ids[0], &ids[2]] {
            ledger.unregister(id).await.expect("unregister");
            assert_eq!(
                offering(&store, &o.id).await.current_enrollment,
                confirmed_count(&store, &o.id).await
            );
        }

        for name in ["F", "G", "H"] {
            ledger.register(student(name, &o.id)).await.expect("register");
            assert_eq!(
                offering(&store, &o.id).await.current_enrollment,
                confirmed_count(&store, &o.id).await
            );
        }

        let final_state = offering(&store, &o.id).await;
        assert_eq!(final_state.current_enrollment, 3);
        assert_eq!(final_state.status, OfferingStatus::Full);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations_never_overbook() {
        let (store, ledger, o) = setup(5).await;
        let ledger = Arc::new(ledger);

        let mut handles = Vec::new();
        for i in 0..20 {
            let ledger = ledger.clone();
            let offering_id = o.id.clone();
            handles.push(tokio::spawn(async move {
                ledger.register(student(&format!("S{}", i), &offering_id)).await
            }));
        }
        for handle in handles {
            handle.await.expect("task panicked").expect("register failed");
        }

        let after = offering(&store, &o.id).await;
        assert_eq!(after.current_enrollment, 5);
        assert_eq!(confirmed_count(&store, &o.id).await, 5);
        assert_eq!(store.list_registrations().await.expect("list").len(), 20);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_unregisters_release_each_seat_once() {
        let (store, ledger, o) = setup(6).await;
        let ledger = Arc::new(ledger);

        let mut ids = Vec::new();
        for i in 0..9 {
            ids.push(ledger.register(student(&format!("S{}", i), &o.id)).await.expect("register").id);
        }

        let mut handles = Vec::new();
        for id in ids.iter().chain(ids.iter()) {
            let ledger = ledger.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move { ledger.unregister(&id).await }));
        }
        let mut removed = 0;
        for handle in handles {
            if handle.await.expect("task panicked").expect("unregister failed") {
                removed += 1;
            }
        }

        assert_eq!(removed, 9);
        let after = offering(&store, &o.id).await;
        assert_eq!(after.current_enrollment, 0);
        assert_eq!(after.status, OfferingStatus::Active);
    }

    /// Delegates to a `MemoryStore` but refuses to write registrations.
    struct RejectingRegistrations(MemoryStore);

    #[async_trait]
    impl EntityStore for RejectingRegistrations {
        async fn ping(&self) -> Result<(), AppError> { self.0.ping().await }
        async fn list_course_types(&self) -> Result<Vec<CourseType>, AppError> { self.0.list_course_types().await }
        async fn get_course_type(&self, id: &str) -> Result<Option<CourseType>, AppError> { self.0.get_course_type(id).await }
        async fn insert_course_type(&self, req: NewCourseTypeRequest) -> Result<CourseType, AppError> { self.0.insert_course_type(req).await }
        async fn update_course_type(&self, id: &str, req: UpdateCourseTypeRequest) -> Result<Option<CourseType>, AppError> { self.0.update_course_type(id, req).await }
        async fn delete_course_type(&self, id: &str) -> Result<bool, AppError> { self.0.delete_course_type(id).await }
        async fn list_courses(&self) -> Result<Vec<Course>, AppError> { self.0.list_courses().await }
        async fn get_course(&self, id: &str) -> Result<Option<Course>, AppError> { self.0.get_course(id).await }
        async fn insert_course(&self, req: NewCourseRequest) -> Result<Course, AppError> { self.0.insert_course(req).await }
        async fn update_course(&self, id: &str, req: UpdateCourseRequest) -> Result<Option<Course>, AppError> { self.0.update_course(id, req).await }
        async fn delete_course(&self, id: &str) -> Result<bool, AppError> { self.0.delete_course(id).await }
        async fn list_offerings(&self) -> Result<Vec<CourseOffering>, AppError> { self.0.list_offerings().await }
        async fn get_offering(&self, id: &str) -> Result<Option<CourseOffering>, AppError> { self.0.get_offering(id).await }
        async fn insert_offering(&self, req: NewCourseOfferingRequest) -> Result<CourseOffering, AppError> { self.0.insert_offering(req).await }
        async fn update_offering(&self, id: &str, req: UpdateCourseOfferingRequest) -> Result<Option<CourseOffering>, AppError> { self.0.update_offering(id, req).await }
        async fn delete_offering(&self, id: &str) -> Result<bool, AppError> { self.0.delete_offering(id).await }
        async fn list_registrations(&self) -> Result<Vec<StudentRegistration>, AppError> { self.0.list_registrations().await }
        async fn get_registration(&self, id: &str) -> Result<Option<StudentRegistration>, AppError> { self.0.get_registration(id).await }
        async fn insert_registration(&self, _req: NewStudentRegistrationRequest, _status: RegistrationStatus) -> Result<StudentRegistration, AppError> {
            Err(AppError::InternalServerError)
        }
        async fn delete_registration(&self, id: &str) -> Result<bool, AppError> { self.0.delete_registration(id).await }
        async fn increment_enrollment_if_open(&self, offering_id: &str) -> Result<Option<CourseOffering>, AppError> { self.0.increment_enrollment_if_open(offering_id).await }
        async fn decrement_enrollment(&self, offering_id: &str) -> Result<Option<CourseOffering>, AppError> { self.0.decrement_enrollment(offering_id).await }
    }

    #[tokio::test]
    async fn test_failed_insert_releases_claimed_seat() {
        let store: Arc<dyn EntityStore> = Arc::new(RejectingRegistrations(MemoryStore::new()));
        let o = insert_offering(store.as_ref(), 1).await;
        let ledger = EnrollmentLedger::new(store.clone());

        assert!(ledger.register(student("A", &o.id)).await.is_err());

        let after = offering(&store, &o.id).await;
        assert_eq!(after.current_enrollment, 0);
        assert_eq!(after.status, OfferingStatus::Active);
    }
}
