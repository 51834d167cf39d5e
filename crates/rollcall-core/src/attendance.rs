//! Attendance ledger records and the presence rules that classify them.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Time credited to a student after each detection.
pub const DETECTION_BUFFER_SECS: i64 = 30;

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
pub enum AttendanceStatus {
  Present,
  Late,
  Absent,
  Partial,
}

impl AttendanceStatus {
  /// Status for a check-in at `now` into a class starting at `start`.
  /// Arriving exactly on time counts as present.
  pub fn for_check_in(now: NaiveTime, start: NaiveTime) -> Self {
    if now <= start { Self::Present } else { Self::Late }
  }

  /// Whether this status counts towards attended classes.
  pub fn is_attended(self) -> bool { !matches!(self, Self::Absent) }
}

/// How a record entered the ledger.
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
pub enum AttendanceSource {
  CheckIn,
  Observation,
  Sweep,
}

/// At most one per (student, slot, date).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
  pub record_id:         Uuid,
  pub student_id:        Uuid,
  pub slot_id:           Uuid,
  pub date:              NaiveDate,
  pub status:            AttendanceStatus,
  pub source:            AttendanceSource,
  pub recorded_at:       DateTime<Utc>,
  pub detection_count:   u32,
  pub first_detected_at: Option<DateTime<Utc>>,
  pub last_detected_at:  Option<DateTime<Utc>>,
  pub presence_secs:     Option<i64>,
  pub class_secs:        Option<i64>,
}

impl AttendanceRecord {
  /// Presence as a percentage of the class length, clamped to `0..=100`.
  pub fn presence_percentage(&self) -> f64 {
    match (self.presence_secs, self.class_secs) {
      (Some(p), Some(c)) if c > 0 => {
        (p as f64 / c as f64 * 100.0).clamp(0.0, 100.0)
      }
      _ => 0.0,
    }
  }

  /// Presence implied by the detections so far: the span between first and
  /// last detection plus a fixed buffer per detection, capped at the class
  /// length.
  pub fn estimated_presence_secs(&self) -> i64 {
    let span = match (self.first_detected_at, self.last_detected_at) {
      (Some(first), Some(last)) => (last - first).num_seconds().max(0),
      _ => return 0,
    };
    let total = span + DETECTION_BUFFER_SECS * i64::from(self.detection_count);
    match self.class_secs {
      Some(cap) => total.min(cap),
      None => total,
    }
  }
}

/// Input to [`crate::store::AttendanceStore::insert_attendance`] and
/// [`crate::store::AttendanceStore::record_detection`].
#[derive(Debug, Clone)]
pub struct NewAttendance {
  pub student_id: Uuid,
  pub slot_id:    Uuid,
  pub date:       NaiveDate,
  pub status:     AttendanceStatus,
  pub source:     AttendanceSource,
  pub class_secs: Option<i64>,
}

/// Outcome of an idempotent insert keyed on (student, slot, date).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendanceInsert {
  Inserted(AttendanceRecord),
  /// A record already existed; it is returned unchanged.
  Existing(AttendanceRecord),
}

impl AttendanceInsert {
  pub fn record(&self) -> &AttendanceRecord {
    match self {
      Self::Inserted(r) | Self::Existing(r) => r,
    }
  }
}

/// Filter for [`crate::store::AttendanceStore::list_attendance`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttendanceQuery {
  pub student_id: Option<Uuid>,
  pub slot_id:    Option<Uuid>,
  pub date:       Option<NaiveDate>,
}

// ─── Presence classification ─────────────────────────────────────────────────

/// Minimum presence percentages for each status.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PresenceThresholds {
  pub present: f64,
  pub partial: f64,
  pub late:    f64,
}

impl Default for PresenceThresholds {
  fn default() -> Self { Self { present: 75.0, partial: 50.0, late: 25.0 } }
}

impl PresenceThresholds {
  pub fn classify(&self, percentage: f64) -> AttendanceStatus {
    if percentage >= self.present {
      AttendanceStatus::Present
    } else if percentage >= self.partial {
      AttendanceStatus::Partial
    } else if percentage >= self.late {
      AttendanceStatus::Late
    } else {
      AttendanceStatus::Absent
    }
  }
}

// ─── Summary ─────────────────────────────────────────────────────────────────

/// Attendance totals for one course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseAttendance {
  pub course_id:  Uuid,
  pub total:      usize,
  pub attended:   usize,
  pub percentage: f64,
}

impl CourseAttendance {
  pub fn tally(course_id: Uuid, records: &[AttendanceRecord]) -> Self {
    let total = records.len();
    let attended = records.iter().filter(|r| r.status.is_attended()).count();
    let percentage = if total == 0 {
      0.0
    } else {
      (attended as f64 / total as f64 * 10_000.0).round() / 100.0
    };
    Self { course_id, total, attended, percentage }
  }
}
