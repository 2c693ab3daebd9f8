use std::time::Instant;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::put;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::*;
use crate::state::AppState;

type JsonBody<T> = Result<Json<T>, JsonRejection>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/course-types", get(list_course_types).post(create_course_type))
        .route("/api/course-types/{id}", put(update_course_type).delete(delete_course_type))
        .route("/api/courses", get(list_courses).post(create_course))
        .route("/api/courses/{id}", put(update_course).delete(delete_course))
        .route("/api/course-offerings", get(list_offerings).post(create_offering))
        .route(
            "/api/course-offerings/{id}",
            get(get_offering).put(update_offering).delete(delete_offering),
        )
        .route(
            "/api/student-registrations",
            get(list_registrations).post(create_registration),
        )
        .route(
            "/api/student-registrations/by-offering/{offering_id}",
            get(list_registrations_for_offering),
        )
        .route(
            "/api/student-registrations/{id}",
            axum::routing::delete(delete_registration),
        )
        .route("/api/stats", get(stats))
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(log_requests)),
        )
        .with_state(state)
}

async fn log_requests(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    if path.starts_with("/api") {
        let status = response.status();
        let elapsed = start.elapsed().as_millis();
        if status.is_server_error() {
            warn!("{} {} {} in {}ms", method, path, status.as_u16(), elapsed);
        } else {
            info!("{} {} {} in {}ms", method, path, status.as_u16(), elapsed);
        }
    }

    response
}

fn deleted_or_not_found(deleted: bool, what: &str) -> Result<StatusCode, AppError> {
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("{} not found", what)))
    }
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.store.ping().await?;
    Ok(StatusCode::OK)
}

async fn list_course_types(
    State(state): State<AppState>,
) -> Result<Json<Vec<CourseType>>, AppError> {
    Ok(Json(state.store.list_course_types().await?))
}

async fn create_course_type(
    State(state): State<AppState>,
    payload: JsonBody<NewCourseTypeRequest>,
) -> Result<(StatusCode, Json<CourseType>), AppError> {
    let Json(req) = payload?;
    req.validate()?;
    let course_type = state.store.insert_course_type(req).await?;
    Ok((StatusCode::CREATED, Json(course_type)))
}

async fn update_course_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: JsonBody<UpdateCourseTypeRequest>,
) -> Result<Json<CourseType>, AppError> {
    let Json(req) = payload?;
    req.validate()?;
    let course_type = state
        .store
        .update_course_type(&id, req)
        .await?
        .ok_or_else(|| AppError::NotFound("Course type not found".to_string()))?;
    Ok(Json(course_type))
}

async fn delete_course_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let deleted = state.store.delete_course_type(&id).await?;
    deleted_or_not_found(deleted, "Course type")
}

async fn list_courses(State(state): State<AppState>) -> Result<Json<Vec<Course>>, AppError> {
    Ok(Json(state.store.list_courses().await?))
}

async fn create_course(
    State(state): State<AppState>,
    payload: JsonBody<NewCourseRequest>,
) -> Result<(StatusCode, Json<Course>), AppError> {
    let Json(req) = payload?;
    req.validate()?;
    let course = state.store.insert_course(req).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

async fn update_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: JsonBody<UpdateCourseRequest>,
) -> Result<Json<Course>, AppError> {
    let Json(req) = payload?;
    req.validate()?;
    let course = state
        .store
        .update_course(&id, req)
        .await?
        .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;
    Ok(Json(course))
}

async fn delete_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let deleted = state.store.delete_course(&id).await?;
    deleted_or_not_found(deleted, "Course")
}

async fn list_offerings(
    State(state): State<AppState>,
) -> Result<Json<Vec<CourseOfferingWithDetails>>, AppError> {
    Ok(Json(state.queries().list_offerings_with_details().await?))
}

async fn get_offering(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CourseOfferingWithDetails>, AppError> {
    let offering = state
        .queries()
        .offering_with_details_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Course offering not found".to_string()))?;
    Ok(Json(offering))
}

async fn create_offering(
    State(state): State<AppState>,
    payload: JsonBody<NewCourseOfferingRequest>,
) -> Result<(StatusCode, Json<CourseOffering>), AppError> {
    let Json(req) = payload?;
    req.validate()?;
    let offering = state.store.insert_offering(req).await?;
    Ok((StatusCode::CREATED, Json(offering)))
}

async fn update_offering(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: JsonBody<UpdateCourseOfferingRequest>,
) -> Result<Json<CourseOffering>, AppError> {
    let Json(req) = payload?;
    req.validate()?;
    let offering = state
        .store
        .update_offering(&id, req)
        .await?
        .ok_or_else(|| AppError::NotFound("Course offering not found".to_string()))?;
    Ok(Json(offering))
}

async fn delete_offering(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let deleted = state.store.delete_offering(&id).await?;
    deleted_or_not_found(deleted, "Course offering")
}

async fn list_registrations(
    State(state): State<AppState>,
) -> Result<Json<Vec<StudentRegistrationWithDetails>>, AppError> {
    Ok(Json(state.queries().list_registrations_with_details().await?))
}

async fn list_registrations_for_offering(
    State(state): State<AppState>,
    Path(offering_id): Path<String>,
) -> Result<Json<Vec<StudentRegistrationWithDetails>>, AppError> {
    let registrations = state
        .queries()
        .list_registrations_for_offering(&offering_id)
        .await?;
    Ok(Json(registrations))
}

async fn create_registration(
    State(state): State<AppState>,
    payload: JsonBody<NewStudentRegistrationRequest>,
) -> Result<(StatusCode, Json<StudentRegistration>), AppError> {
    let Json(req) = payload?;
    req.validate()?;
    let registration = state.ledger().register(req.normalized()).await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

async fn delete_registration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let deleted = state.ledger().unregister(&id).await?;
    deleted_or_not_found(deleted, "Registration")
}

async fn stats(State(state): State<AppState>) -> Result<Json<Stats>, AppError> {
    Ok(Json(state.queries().stats().await?))
}
