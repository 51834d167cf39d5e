//! Enrollment state: a student's chosen level and per-course opt-in flags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditContext, AuditLogEntry};

// ─── Level selection ─────────────────────────────────────────────────────────

/// The single academic level a student has chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSelection {
  pub student_id:  Uuid,
  pub level_id:    Uuid,
  pub selected_at: DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

/// Input to [`crate::store::AttendanceStore::change_level`].
#[derive(Debug, Clone)]
pub struct LevelChange {
  pub student_id:    Uuid,
  pub department_id: Uuid,
  pub level_id:      Uuid,
  /// Context applied to the DELETE entries of the cascade.
  pub audit:         AuditContext,
}

/// Result of a level change: the new selection plus every course selection
/// the cascade removed, with the audit entries that were written for them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelChangeOutcome {
  pub selection: LevelSelection,
  pub removed:   Vec<CourseSelection>,
  pub audit:     Vec<AuditLogEntry>,
}

// ─── Course selection ────────────────────────────────────────────────────────

/// An explicit per-course row. Absence of a row means "offered, default".
///
/// Invariant: `is_approved` implies `is_offered`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSelection {
  pub selection_id:  Uuid,
  pub student_id:    Uuid,
  pub department_id: Uuid,
  pub level_id:      Uuid,
  pub course_id:     Uuid,
  pub is_offered:    bool,
  pub is_approved:   bool,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

/// Three-valued lookup result for "is this student taking this course?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferingStatus {
  Offered { approved: bool },
  NotOffered,
  /// No row exists; readers treat this as offered.
  NoExplicitSelection,
}

impl OfferingStatus {
  pub fn from_selection(selection: Option<&CourseSelection>) -> Self {
    match selection {
      Some(s) if s.is_offered => Self::Offered { approved: s.is_approved },
      Some(_) => Self::NotOffered,
      None => Self::NoExplicitSelection,
    }
  }

  pub fn is_offered(self) -> bool { !matches!(self, Self::NotOffered) }

  /// Offered and not waiting on an approval. Default rows count as approved
  /// timetable courses.
  pub fn is_expected(self) -> bool {
    matches!(
      self,
      Self::Offered { approved: true } | Self::NoExplicitSelection
    )
  }
}

/// The mutation applied to one (student, course, level) row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOp {
  Upsert { is_offered: bool, is_approved: bool },
  Delete,
}

/// One row-level write handed to
/// [`crate::store::AttendanceStore::write_course_selections`].
#[derive(Debug, Clone)]
pub struct SelectionWrite {
  pub student_id:    Uuid,
  pub department_id: Uuid,
  pub level_id:      Uuid,
  pub course_id:     Uuid,
  pub op:            SelectionOp,
}

/// Before/after state of one written row and the audit entry it produced, if
/// any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionChange {
  pub before: Option<CourseSelection>,
  pub after:  Option<CourseSelection>,
  pub audit:  Option<AuditLogEntry>,
}

// ─── Expected participants ───────────────────────────────────────────────────

/// A student expected in a class, handed to the presence finalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
  pub student_id:    Uuid,
  pub department_id: Uuid,
  pub level_id:      Uuid,
  pub course_id:     Uuid,
  /// The explicit row, or `None` when the student is offered by default.
  pub selection_id:  Option<Uuid>,
}
