//! Handlers for `/sessions` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/sessions` | Body: `{"slot_id","date"}`; get-or-create |
//! | `GET`  | `/sessions/{id}` | 404 if not found |
//! | `POST` | `/sessions/{id}/open` | 409 unless scheduled |
//! | `POST` | `/sessions/{id}/activate` | 409 unless open |
//! | `POST` | `/sessions/{id}/close` | 409 unless open or active |
//! | `POST` | `/sessions/{id}/cancel` | Body: `{"reason"}`; 409 once terminal |

use axum::{
  Json,
  extract::{Path, State},
};
use chrono::{NaiveDate, Utc};
use rollcall_core::{session::ClassSession, store::AttendanceStore};
use rollcall_engine::Engine;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct EnsureBody {
  pub slot_id: Uuid,
  pub date:    NaiveDate,
}

/// `POST /sessions`
pub async fn ensure<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Json(body): Json<EnsureBody>,
) -> Result<Json<ClassSession>, ApiError> {
  Ok(Json(engine.ensure_session(body.slot_id, body.date).await?))
}

/// `GET /sessions/{id}`
pub async fn get_one<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ClassSession>, ApiError> {
  Ok(Json(engine.session(id).await?))
}

/// `POST /sessions/{id}/open`
pub async fn open<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ClassSession>, ApiError> {
  Ok(Json(engine.open_session(id, Utc::now()).await?))
}

/// `POST /sessions/{id}/activate`
pub async fn activate<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ClassSession>, ApiError> {
  Ok(Json(engine.activate_session(id, Utc::now()).await?))
}

/// `POST /sessions/{id}/close`
pub async fn close<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ClassSession>, ApiError> {
  Ok(Json(engine.close_session(id, Utc::now()).await?))
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
  pub reason: String,
}

/// `POST /sessions/{id}/cancel`
pub async fn cancel<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<CancelBody>,
) -> Result<Json<ClassSession>, ApiError> {
  if body.reason.trim().is_empty() {
    return Err(ApiError::BadRequest("reason must not be empty".into()));
  }
  Ok(Json(engine.cancel_session(id, body.reason, Utc::now()).await?))
}
