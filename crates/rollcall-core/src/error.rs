//! Error taxonomy for `rollcall-core`.
//!
//! Every variant is an expected, recoverable outcome. Callers surface the
//! [`Error::code`] and the `Display` message; neither changes between
//! releases.

use thiserror::Error;
use uuid::Uuid;

use crate::{
  attendance::AttendanceRecord,
  eligibility::IneligibilityReason,
  session::{SessionAction, SessionState},
};

#[derive(Debug, Error)]
pub enum Error {
  /// One of the ordered eligibility checks failed.
  #[error("{0}")]
  NotEligible(#[from] IneligibilityReason),

  #[error("No ongoing class found for student")]
  NoCurrentClass,

  /// The (student, slot, date) key already has a record; the existing record
  /// is carried so callers can show it.
  #[error("Attendance already marked for this class today")]
  AlreadyMarked(Box<AttendanceRecord>),

  #[error("Cannot {action} session {session_id} in {state} state")]
  SessionStateViolation {
    session_id: Uuid,
    state:      SessionState,
    action:     SessionAction,
  },

  #[error("Validation failure: {0}")]
  Validation(String),

  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: String },
}

impl Error {
  pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
    Self::NotFound { entity, id: id.to_string() }
  }

  /// Stable machine-readable code for this outcome.
  pub fn code(&self) -> &'static str {
    match self {
      Self::NotEligible(reason) => reason.code(),
      Self::NoCurrentClass => "no_current_class",
      Self::AlreadyMarked(_) => "already_marked",
      Self::SessionStateViolation { .. } => "session_state_violation",
      Self::Validation(_) => "validation_failure",
      Self::NotFound { .. } => "not_found",
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
