//! Handlers for catalog seeding and timetable endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/departments` | Body: `{"code","name"}` |
//! | `POST` | `/levels` | Body: `{"department_id","code","name"}` |
//! | `POST` | `/courses` | Body: `{"department_id","code","title"}` |
//! | `POST` | `/students` | Body: `{"matric_number","full_name","department_id"}` |
//! | `POST` | `/timetables` | Body: `{"department_id","level_id","name"}` |
//! | `POST` | `/timetables/{id}/slots` | 400 on an inverted window or foreign course |
//! | `GET`  | `/timetables/{id}/conflicts` | Overlapping slot pairs |
//! | `POST` | `/timetables/{id}/publish` | 400 while conflicts exist |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use rollcall_core::{
  catalog::{NewCourse, NewDepartment, NewLevel, NewTimetable, SlotConflict, Timetable},
  store::AttendanceStore,
  student::NewStudent,
};
use rollcall_engine::{Engine, catalog::SlotRequest};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Seeding ──────────────────────────────────────────────────────────────────

/// `POST /departments`
pub async fn create_department<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Json(body): Json<NewDepartment>,
) -> Result<impl IntoResponse, ApiError> {
  Ok((StatusCode::CREATED, Json(engine.add_department(body).await?)))
}

/// `POST /levels`
pub async fn create_level<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Json(body): Json<NewLevel>,
) -> Result<impl IntoResponse, ApiError> {
  Ok((StatusCode::CREATED, Json(engine.add_level(body).await?)))
}

/// `POST /courses`
pub async fn create_course<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Json(body): Json<NewCourse>,
) -> Result<impl IntoResponse, ApiError> {
  Ok((StatusCode::CREATED, Json(engine.add_course(body).await?)))
}

/// `POST /students`
pub async fn create_student<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Json(body): Json<NewStudent>,
) -> Result<impl IntoResponse, ApiError> {
  Ok((StatusCode::CREATED, Json(engine.add_student(body).await?)))
}

/// `POST /timetables`
pub async fn create_timetable<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Json(body): Json<NewTimetable>,
) -> Result<impl IntoResponse, ApiError> {
  Ok((StatusCode::CREATED, Json(engine.add_timetable(body).await?)))
}

// ─── Timetables ───────────────────────────────────────────────────────────────

/// `POST /timetables/{id}/slots`
pub async fn add_slot<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<SlotRequest>,
) -> Result<impl IntoResponse, ApiError> {
  Ok((StatusCode::CREATED, Json(engine.add_slot(id, body).await?)))
}

/// `GET /timetables/{id}/conflicts`
pub async fn conflicts<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<SlotConflict>>, ApiError> {
  Ok(Json(engine.timetable_conflicts(id).await?))
}

/// `POST /timetables/{id}/publish`
pub async fn publish<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Timetable>, ApiError> {
  Ok(Json(engine.publish_timetable(id).await?))
}
