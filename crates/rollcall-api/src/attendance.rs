//! Handlers for the attendance ledger.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/attendance` | Body: `{"student_id"\|"matric_number","at"?}`; 409 when already marked |
//! | `GET`  | `/attendance` | Optional `?student_id=&slot_id=&date=` |
//! | `POST` | `/observations` | Same body as `/attendance`; the presence feed |
//! | `POST` | `/sweeps/absent` | Optional `?at=`; runs the auto-absent sweep |

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use rollcall_core::{
  attendance::{AttendanceQuery, AttendanceRecord},
  store::AttendanceStore,
};
use rollcall_engine::{Engine, sweep::SweepReport};
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::ApiError, students::AtParams};

/// Identifies a student by id or matriculation number.
#[derive(Debug, Deserialize)]
pub struct MarkBody {
  pub student_id:    Option<Uuid>,
  pub matric_number: Option<String>,
  pub at:            Option<DateTime<Utc>>,
}

impl MarkBody {
  async fn resolve_student<S: AttendanceStore>(&self, engine: &Engine<S>) -> Result<Uuid, ApiError> {
    match (self.student_id, self.matric_number.as_deref()) {
      (Some(id), _) => Ok(id),
      (None, Some(matric)) => Ok(engine.student_by_matric(matric).await?.student_id),
      (None, None) => Err(ApiError::BadRequest(
        "one of student_id or matric_number is required".into(),
      )),
    }
  }
}

/// `POST /attendance`
pub async fn mark<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Json(body): Json<MarkBody>,
) -> Result<impl IntoResponse, ApiError> {
  let student_id = body.resolve_student(&engine).await?;
  let now = body.at.unwrap_or_else(Utc::now);
  let record = engine.mark_attendance(student_id, now).await?;
  Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /attendance`
pub async fn list<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Query(query): Query<AttendanceQuery>,
) -> Result<Json<Vec<AttendanceRecord>>, ApiError> {
  Ok(Json(engine.list_attendance(query).await?))
}

/// `POST /observations`
pub async fn observe<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Json(body): Json<MarkBody>,
) -> Result<Json<AttendanceRecord>, ApiError> {
  let student_id = body.resolve_student(&engine).await?;
  let observed_at = body.at.unwrap_or_else(Utc::now);
  Ok(Json(engine.record_observation(student_id, observed_at).await?))
}

/// `POST /sweeps/absent`
pub async fn sweep<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Query(params): Query<AtParams>,
) -> Result<Json<SweepReport>, ApiError> {
  let now = params.at.unwrap_or_else(Utc::now);
  Ok(Json(engine.run_auto_absent_sweep(now).await?))
}
