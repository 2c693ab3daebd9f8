use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use uuid::Uuid;

use crate::db::EntityStore;
use crate::error::AppError;
use crate::models::*;

const OFFERING_COLUMNS: &str =
    "id, course_id, course_type_id, max_capacity, current_enrollment, status, created_at";

const REGISTRATION_COLUMNS: &str =
    "id, student_name, email, phone, course_offering_id, status, registration_date";

#[derive(Clone)]
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Opens (creating if needed) the database file and applies migrations.
    ///
    /// Foreign keys stay unenforced: deleting a referenced row is allowed.
    /// Writers queue on the database lock for up to five seconds.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(false)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Each SQLite memory connection is its own database, so the pool holds
    /// exactly one connection and never recycles it.
    pub async fn connect_in_memory() -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        Ok(())
    }
}

fn map_unique_violation(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AppError::BadRequest(message.to_string())
        }
        _ => AppError::Database(err),
    }
}

async fn delete_by_id(db: &SqlitePool, table: &str, id: &str) -> Result<bool, AppError> {
    let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?1", table))
        .bind(id)
        .execute(db)
        .await?
        .rows_affected();

    Ok(result > 0)
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("select 1").execute(&self.db).await?;
        Ok(())
    }

    async fn list_course_types(&self) -> Result<Vec<CourseType>, AppError> {
        let rows = sqlx::query_as::<_, CourseType>(
            "SELECT id, name, created_at FROM course_types ORDER BY created_at DESC, rowid DESC",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn get_course_type(&self, id: &str) -> Result<Option<CourseType>, AppError> {
        let row = sqlx::query_as::<_, CourseType>(
            "SELECT id, name, created_at FROM course_types WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn insert_course_type(&self, req: NewCourseTypeRequest) -> Result<CourseType, AppError> {
        let course_type = CourseType {
            id: Uuid::new_v4().to_string(),
            name: req.name,
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO course_types (id, name, created_at) VALUES (?1, ?2, ?3)")
            .bind(&course_type.id)
            .bind(&course_type.name)
            .bind(course_type.created_at)
            .execute(&self.db)
            .await
            .map_err(|e| map_unique_violation(e, "Course type name already exists"))?;

        Ok(course_type)
    }

    async fn update_course_type(
        &self,
        id: &str,
        req: UpdateCourseTypeRequest,
    ) -> Result<Option<CourseType>, AppError> {
        let mut current = match self.get_course_type(id).await? {
            Some(t) => t,
            None => return Ok(None),
        };

        if let Some(name) = req.name {
            current.name = name;
        }

        sqlx::query("UPDATE course_types SET name = ?1 WHERE id = ?2")
            .bind(&current.name)
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| map_unique_violation(e, "Course type name already exists"))?;

        Ok(Some(current))
    }

    async fn delete_course_type(&self, id: &str) -> Result<bool, AppError> {
        delete_by_id(&self.db, "course_types", id).await
    }

    async fn list_courses(&self) -> Result<Vec<Course>, AppError> {
        let rows = sqlx::query_as::<_, Course>(
            "SELECT id, name, language, created_at FROM courses ORDER BY created_at DESC, rowid DESC",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn get_course(&self, id: &str) -> Result<Option<Course>, AppError> {
        let row = sqlx::query_as::<_, Course>(
            "SELECT id, name, language, created_at FROM courses WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn insert_course(&self, req: NewCourseRequest) -> Result<Course, AppError> {
        let course = Course {
            id: Uuid::new_v4().to_string(),
            name: req.name,
            language: req.language,
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO courses (id, name, language, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(&course.id)
            .bind(&course.name)
            .bind(&course.language)
            .bind(course.created_at)
            .execute(&self.db)
            .await?;

        Ok(course)
    }

    async fn update_course(
        &self,
        id: &str,
        req: UpdateCourseRequest,
    ) -> Result<Option<Course>, AppError> {
        let mut current = match self.get_course(id).await? {
            Some(c) => c,
            None => return Ok(None),
        };

        if let Some(name) = req.name {
            current.name = name;
        }
        if let Some(language) = req.language {
            current.language = language;
        }

        sqlx::query("UPDATE courses SET name = ?1, language = ?2 WHERE id = ?3")
            .bind(&current.name)
            .bind(&current.language)
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(Some(current))
    }

    async fn delete_course(&self, id: &str) -> Result<bool, AppError> {
        delete_by_id(&self.db, "courses", id).await
    }

    async fn list_offerings(&self) -> Result<Vec<CourseOffering>, AppError> {
        let rows = sqlx::query_as::<_, CourseOffering>(&format!(
            "SELECT {} FROM course_offerings ORDER BY created_at DESC, rowid DESC",
            OFFERING_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn get_offering(&self, id: &str) -> Result<Option<CourseOffering>, AppError> {
        let row = sqlx::query_as::<_, CourseOffering>(&format!(
            "SELECT {} FROM course_offerings WHERE id = ?1",
            OFFERING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
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

        sqlx::query(&format!(
            "INSERT INTO course_offerings ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            OFFERING_COLUMNS
        ))
        .bind(&offering.id)
        .bind(&offering.course_id)
        .bind(&offering.course_type_id)
        .bind(offering.max_capacity)
        .bind(offering.current_enrollment)
        .bind(offering.status)
        .bind(offering.created_at)
        .execute(&self.db)
        .await?;

        Ok(offering)
    }

    async fn update_offering(
        &self,
        id: &str,
        req: UpdateCourseOfferingRequest,
    ) -> Result<Option<CourseOffering>, AppError> {
        let mut current = match self.get_offering(id).await? {
            Some(o) => o,
            None => return Ok(None),
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

        // current_enrollment is only written by the enrollment primitives below
        sqlx::query(
            r#"
            UPDATE course_offerings
            SET course_id = ?1,
                course_type_id = ?2,
                max_capacity = ?3,
                status = ?4
            WHERE id = ?5
            "#,
        )
        .bind(&current.course_id)
        .bind(&current.course_type_id)
        .bind(current.max_capacity)
        .bind(current.status)
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(Some(current))
    }

    async fn delete_offering(&self, id: &str) -> Result<bool, AppError> {
        delete_by_id(&self.db, "course_offerings", id).await
    }

    async fn list_registrations(&self) -> Result<Vec<StudentRegistration>, AppError> {
        let rows = sqlx::query_as::<_, StudentRegistration>(&format!(
            "SELECT {} FROM student_registrations ORDER BY registration_date DESC, rowid DESC",
            REGISTRATION_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn get_registration(&self, id: &str) -> Result<Option<StudentRegistration>, AppError> {
        let row = sqlx::query_as::<_, StudentRegistration>(&format!(
            "SELECT {} FROM student_registrations WHERE id = ?1",
            REGISTRATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
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

        sqlx::query(&format!(
            "INSERT INTO student_registrations ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            REGISTRATION_COLUMNS
        ))
        .bind(&registration.id)
        .bind(&registration.student_name)
        .bind(&registration.email)
        .bind(&registration.phone)
        .bind(&registration.course_offering_id)
        .bind(registration.status)
        .bind(registration.registration_date)
        .execute(&self.db)
        .await?;

        Ok(registration)
    }

    async fn delete_registration(&self, id: &str) -> Result<bool, AppError> {
        delete_by_id(&self.db, "student_registrations", id).await
    }

    async fn increment_enrollment_if_open(
        &self,
        offering_id: &str,
    ) -> Result<Option<CourseOffering>, AppError> {
        // SET expressions all read the pre-update row
        let row = sqlx::query_as::<_, CourseOffering>(&format!(
            r#"
            UPDATE course_offerings
            SET current_enrollment = current_enrollment + 1,
                status = CASE
                    WHEN status = 'inactive' THEN 'inactive'
                    WHEN current_enrollment + 1 >= max_capacity THEN 'full'
                    ELSE 'active'
                END
            WHERE id = ?1 AND current_enrollment < max_capacity
            RETURNING {}
            "#,
            OFFERING_COLUMNS
        ))
        .bind(offering_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn decrement_enrollment(
        &self,
        offering_id: &str,
    ) -> Result<Option<CourseOffering>, AppError> {
        let row = sqlx::query_as::<_, CourseOffering>(&format!(
            r#"
            UPDATE course_offerings
            SET current_enrollment = MAX(current_enrollment - 1, 0),
                status = CASE
                    WHEN status = 'inactive' THEN 'inactive'
                    WHEN MAX(current_enrollment - 1, 0) >= max_capacity THEN 'full'
                    ELSE 'active'
                END
            WHERE id = ?1
            RETURNING {}
            "#,
            OFFERING_COLUMNS
        ))
        .bind(offering_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }
}
