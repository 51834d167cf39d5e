//! Handlers for `/students/{id}/...` endpoints: enrollment writes and the
//! per-student reads.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `PUT`    | `/students/{id}/level` | Body: `{"level_id"}`; clears course selections |
//! | `GET`    | `/students/{id}/courses` | Offered courses at the current level |
//! | `PUT`    | `/students/{id}/courses/{course_id}` | Body: `{"is_offered","reason"?}` |
//! | `POST`   | `/students/{id}/courses/batch` | Body: `{"offerings":[...],"reason"?}` |
//! | `POST`   | `/students/{id}/registrations` | Body: `{"course_id","level_id"?}` |
//! | `POST`   | `/students/{id}/registrations/{course_id}/approve` | `?level_id=` |
//! | `DELETE` | `/students/{id}/registrations/{course_id}` | `?level_id=` |
//! | `GET`    | `/students/{id}/current-slot` | `?at=`; `null` when no class |
//! | `GET`    | `/students/{id}/eligibility` | `?slot_id=&at=` |
//! | `GET`    | `/students/{id}/attendance-summary` | |
//! | `GET`    | `/students/{id}/audit-summary` | |
//!
//! Where `level_id` is optional it defaults to the student's selected level.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use rollcall_core::{
  attendance::CourseAttendance,
  audit::AuditSummary,
  catalog::TimetableSlot,
  eligibility::{EligibilityDecision, IneligibilityReason},
  enrollment::{LevelChangeOutcome, SelectionChange},
  store::AttendanceStore,
};
use rollcall_engine::{Engine, enrollment::OfferedCourse};
use serde::Deserialize;
use uuid::Uuid;

use crate::{actor::Actor, error::ApiError};

const DEFAULT_OFFERING_REASON: &str = "Course offering updated";

/// Resolve an optional level to the student's selected one.
async fn level_or_selected<S: AttendanceStore>(
  engine: &Engine<S>,
  student_id: Uuid,
  level_id: Option<Uuid>,
) -> Result<Uuid, ApiError> {
  if let Some(level_id) = level_id {
    return Ok(level_id);
  }
  let selected = engine
    .level_selection(student_id)
    .await?
    .ok_or(rollcall_engine::Error::from(IneligibilityReason::NoLevelSelected))?;
  Ok(selected.level_id)
}

// ─── Level ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LevelBody {
  pub level_id: Uuid,
}

/// `PUT /students/{id}/level`
pub async fn set_level<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
  Actor(actor): Actor,
  Json(body): Json<LevelBody>,
) -> Result<Json<LevelChangeOutcome>, ApiError> {
  Ok(Json(engine.set_level(id, body.level_id, actor).await?))
}

// ─── Offerings ────────────────────────────────────────────────────────────────

/// `GET /students/{id}/courses`
pub async fn offered_courses<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<OfferedCourse>>, ApiError> {
  Ok(Json(engine.offered_courses(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct OfferingBody {
  pub is_offered: bool,
  pub reason:     Option<String>,
}

/// `PUT /students/{id}/courses/{course_id}`
pub async fn set_offering<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Path((id, course_id)): Path<(Uuid, Uuid)>,
  Actor(actor): Actor,
  Json(body): Json<OfferingBody>,
) -> Result<Json<SelectionChange>, ApiError> {
  let reason = body.reason.unwrap_or_else(|| DEFAULT_OFFERING_REASON.to_owned());
  Ok(Json(
    engine
      .set_course_offering(id, course_id, body.is_offered, actor, reason)
      .await?,
  ))
}

#[derive(Debug, Deserialize)]
pub struct OfferingItem {
  pub course_id:  Uuid,
  pub is_offered: bool,
}

#[derive(Debug, Deserialize)]
pub struct BatchBody {
  pub offerings: Vec<OfferingItem>,
  pub reason:    Option<String>,
}

/// `POST /students/{id}/courses/batch`
pub async fn set_offerings<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
  Actor(actor): Actor,
  Json(body): Json<BatchBody>,
) -> Result<Json<Vec<SelectionChange>>, ApiError> {
  if body.offerings.is_empty() {
    return Err(ApiError::BadRequest("offerings must not be empty".into()));
  }
  let offerings = body.offerings.into_iter().map(|o| (o.course_id, o.is_offered)).collect();
  let reason = body.reason.unwrap_or_else(|| DEFAULT_OFFERING_REASON.to_owned());
  Ok(Json(engine.set_course_offerings(id, offerings, actor, reason).await?))
}

// ─── Registrations ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
  pub course_id: Uuid,
  pub level_id:  Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct LevelParams {
  pub level_id: Option<Uuid>,
}

/// `POST /students/{id}/registrations`
pub async fn register<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
  Actor(actor): Actor,
  Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, ApiError> {
  let level_id = level_or_selected(&engine, id, body.level_id).await?;
  let change = engine.register_course(id, body.course_id, level_id, actor).await?;
  Ok((StatusCode::CREATED, Json(change)))
}

/// `POST /students/{id}/registrations/{course_id}/approve`
pub async fn approve<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Path((id, course_id)): Path<(Uuid, Uuid)>,
  Query(params): Query<LevelParams>,
  Actor(actor): Actor,
) -> Result<Json<SelectionChange>, ApiError> {
  let level_id = level_or_selected(&engine, id, params.level_id).await?;
  Ok(Json(engine.approve_registration(id, course_id, level_id, actor).await?))
}

/// `DELETE /students/{id}/registrations/{course_id}`
pub async fn cancel<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Path((id, course_id)): Path<(Uuid, Uuid)>,
  Query(params): Query<LevelParams>,
  Actor(actor): Actor,
) -> Result<Json<SelectionChange>, ApiError> {
  let level_id = level_or_selected(&engine, id, params.level_id).await?;
  Ok(Json(engine.cancel_registration(id, course_id, level_id, actor).await?))
}

// ─── Reads ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AtParams {
  pub at: Option<DateTime<Utc>>,
}

/// `GET /students/{id}/current-slot[?at=<rfc3339>]`
pub async fn current_slot<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<AtParams>,
) -> Result<Json<Option<TimetableSlot>>, ApiError> {
  let now = params.at.unwrap_or_else(Utc::now);
  Ok(Json(engine.resolve_current_slot(id, now).await?))
}

#[derive(Debug, Deserialize)]
pub struct EligibilityParams {
  pub slot_id: Uuid,
  pub at:      Option<DateTime<Utc>>,
}

/// `GET /students/{id}/eligibility?slot_id=<id>[&at=<rfc3339>]`
///
/// Always 200 with the full decision; ineligibility is in the body.
pub async fn eligibility<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<EligibilityParams>,
) -> Result<Json<EligibilityDecision>, ApiError> {
  let now = params.at.unwrap_or_else(Utc::now);
  Ok(Json(engine.validate_eligibility(id, params.slot_id, now).await?))
}

/// `GET /students/{id}/attendance-summary`
pub async fn attendance_summary<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<CourseAttendance>>, ApiError> {
  Ok(Json(engine.attendance_summary(id).await?))
}

/// `GET /students/{id}/audit-summary`
pub async fn audit_summary<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<AuditSummary>, ApiError> {
  Ok(Json(engine.audit_summary(id).await?))
}
