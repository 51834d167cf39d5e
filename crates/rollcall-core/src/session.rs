//! Session lifecycle: the state machine for one calendar occurrence of a
//! timetable slot.
//!
//! ```text
//! scheduled ──open──▶ open ──activate──▶ active
//!     │                 │ ╲                │
//!     │                 │  ╲──close──▶ closed ◀──close──┘
//!     └──────cancel─────┴──────cancel──────┴──▶ cancelled
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

/// Minimum presence percentage used when a session is created.
pub const DEFAULT_ATTENDANCE_THRESHOLD: f64 = 50.0;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
  Scheduled,
  Open,
  Active,
  Closed,
  Cancelled,
}

impl SessionState {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Closed | Self::Cancelled)
  }
}

/// An operator action on a session.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionAction {
  Open,
  Activate,
  Close,
  Cancel,
}

impl SessionAction {
  /// States from which this action may be applied.
  pub fn allowed_from(self) -> &'static [SessionState] {
    use SessionState::*;
    match self {
      Self::Open => &[Scheduled],
      Self::Activate => &[Open],
      Self::Close => &[Open, Active],
      Self::Cancel => &[Scheduled, Open, Active],
    }
  }

  /// The state this action leads to.
  pub fn target(self) -> SessionState {
    match self {
      Self::Open => SessionState::Open,
      Self::Activate => SessionState::Active,
      Self::Close => SessionState::Closed,
      Self::Cancel => SessionState::Cancelled,
    }
  }

  /// Apply this action to a session in `state`, or explain why not.
  pub fn apply(self, session_id: Uuid, state: SessionState) -> Result<SessionState> {
    if self.allowed_from().contains(&state) {
      Ok(self.target())
    } else {
      Err(Error::SessionStateViolation { session_id, state, action: self })
    }
  }
}

/// One concrete occurrence of a slot on a date. Unique per (slot, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSession {
  pub session_id:           Uuid,
  pub slot_id:              Uuid,
  pub date:                 NaiveDate,
  pub state:                SessionState,
  pub attendance_threshold: f64,
  pub opened_at:            Option<DateTime<Utc>>,
  pub activated_at:         Option<DateTime<Utc>>,
  pub closed_at:            Option<DateTime<Utc>>,
  pub cancelled_at:         Option<DateTime<Utc>>,
  pub cancel_reason:        Option<String>,
  pub created_at:           DateTime<Utc>,
}

/// Input to [`crate::store::AttendanceStore::transition_session`].
#[derive(Debug, Clone)]
pub struct SessionTransition {
  pub session_id: Uuid,
  pub action:     SessionAction,
  pub at:         DateTime<Utc>,
  /// Only stored for [`SessionAction::Cancel`].
  pub reason:     Option<String>,
}
