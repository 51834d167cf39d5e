//! Handler for `GET /audit`.
//!
//! Optional filters: `student_id`, `course_id`, `department_id`,
//! `action` (`CREATE`, `UPDATE`, `DELETE`), `batch_id`, `limit`. Newest first.

use axum::{
  Json,
  extract::{Query, State},
};
use rollcall_core::{
  audit::{AuditLogEntry, AuditQuery},
  store::AttendanceStore,
};
use rollcall_engine::Engine;

use crate::error::ApiError;

/// `GET /audit`
pub async fn history<S: AttendanceStore + 'static>(
  State(engine): State<Engine<S>>,
  Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditLogEntry>>, ApiError> {
  Ok(Json(engine.audit_history(query).await?))
}
