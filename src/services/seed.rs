use tracing::info;

use crate::db::EntityStore;
use crate::error::AppError;
use crate::models::{NewCourseOfferingRequest, NewCourseRequest, NewCourseTypeRequest, OfferingStatus};

/// Fills an empty store with a small demo catalog. Returns false when the
/// store already had course types and nothing was written.
pub async fn seed_demo_data(store: &dyn EntityStore) -> Result<bool, AppError> {
    if !store.list_course_types().await?.is_empty() {
        info!("Store already has data, skipping demo seed");
        return Ok(false);
    }

    let mut type_ids = Vec::new();
    for name in ["Individual", "Group", "Special"] {
        let course_type = store
            .insert_course_type(NewCourseTypeRequest { name: name.to_string() })
            .await?;
        type_ids.push(course_type.id);
    }

    let mut course_ids = Vec::new();
    for (name, language) in [
        ("English Grammar", "English"),
        ("Hindi Literature", "Hindi"),
        ("Urdu Poetry", "Urdu"),
    ] {
        let course = store
            .insert_course(NewCourseRequest {
                name: name.to_string(),
                language: language.to_string(),
            })
            .await?;
        course_ids.push(course.id);
    }

    // (course, type, capacity)
    let offerings = [(0, 0, 10), (0, 1, 20), (1, 0, 15), (1, 1, 25), (2, 2, 12)];
    for (course, course_type, max_capacity) in offerings {
        store
            .insert_offering(NewCourseOfferingRequest {
                course_id: course_ids[course].clone(),
                course_type_id: type_ids[course_type].clone(),
                max_capacity: Some(max_capacity),
                status: Some(OfferingStatus::Active),
            })
            .await?;
    }

    info!(
        "Seeded demo data: {} course types, {} courses, {} offerings",
        type_ids.len(),
        course_ids.len(),
        offerings.len()
    );
    Ok(true)
}
