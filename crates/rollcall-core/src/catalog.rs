//! Schedule catalog: departments, levels, courses, and the weekly recurring
//! timetable slots that every other component reads.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, SubsecRound, Utc, Weekday};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

// ─── Organisation ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
  pub department_id: Uuid,
  pub code:          String,
  pub name:          String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDepartment {
  pub code: String,
  pub name: String,
}

/// An academic level (e.g. "100 Level"). Belongs to exactly one department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcademicLevel {
  pub level_id:      Uuid,
  pub department_id: Uuid,
  pub code:          String,
  pub name:          String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewLevel {
  pub department_id: Uuid,
  pub code:          String,
  pub name:          String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
  pub course_id:     Uuid,
  pub department_id: Uuid,
  pub code:          String,
  pub title:         String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCourse {
  pub department_id: Uuid,
  pub code:          String,
  pub title:         String,
}

// ─── Time ────────────────────────────────────────────────────────────────────

/// Day of the week as stored on a slot (`MON` … `SUN`).
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
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum DayOfWeek {
  Mon,
  Tue,
  Wed,
  Thu,
  Fri,
  Sat,
  Sun,
}

impl From<Weekday> for DayOfWeek {
  fn from(w: Weekday) -> Self {
    match w {
      Weekday::Mon => Self::Mon,
      Weekday::Tue => Self::Tue,
      Weekday::Wed => Self::Wed,
      Weekday::Thu => Self::Thu,
      Weekday::Fri => Self::Fri,
      Weekday::Sat => Self::Sat,
      Weekday::Sun => Self::Sun,
    }
  }
}

/// An instant projected onto the institution's local calendar, to the whole
/// second (slot times carry no finer precision).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalMoment {
  pub date: NaiveDate,
  pub day:  DayOfWeek,
  pub time: NaiveTime,
}

impl LocalMoment {
  pub fn at(now: DateTime<Utc>, offset: FixedOffset) -> Self {
    let local = now.with_timezone(&offset).trunc_subsecs(0);
    Self {
      date: local.date_naive(),
      day:  local.weekday().into(),
      time: local.time(),
    }
  }
}

// ─── Timetable ───────────────────────────────────────────────────────────────

/// A weekly timetable for one (department, level) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timetable {
  pub timetable_id:  Uuid,
  pub department_id: Uuid,
  pub level_id:      Uuid,
  pub name:          String,
  pub is_published:  bool,
  pub created_at:    DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTimetable {
  pub department_id: Uuid,
  pub level_id:      Uuid,
  pub name:          String,
}

/// One weekly recurring class. Department and level are copied from the
/// owning timetable so the eligibility scan needs no join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimetableSlot {
  pub slot_id:       Uuid,
  pub timetable_id:  Uuid,
  pub department_id: Uuid,
  pub level_id:      Uuid,
  pub course_id:     Uuid,
  pub instructor:    Option<String>,
  pub day_of_week:   DayOfWeek,
  pub start_time:    NaiveTime,
  pub end_time:      NaiveTime,
  pub venue:         String,
  pub created_at:    DateTime<Utc>,
}

impl TimetableSlot {
  /// `true` when `moment` is on this slot's day and inside the closed window
  /// `[start, end]`.
  pub fn is_running_at(&self, moment: &LocalMoment) -> bool {
    self.day_of_week == moment.day
      && self.start_time <= moment.time
      && moment.time <= self.end_time
  }

  /// `true` when both slots share a day and their windows intersect. Slots
  /// that merely touch (one ends as the other starts) do not overlap.
  pub fn overlaps_with(&self, other: &TimetableSlot) -> bool {
    self.day_of_week == other.day_of_week
      && self.start_time < other.end_time
      && self.end_time > other.start_time
  }

  pub fn duration_secs(&self) -> i64 {
    (self.end_time - self.start_time).num_seconds()
  }

  pub fn window_label(&self) -> String {
    format!(
      "{}-{}",
      self.start_time.format("%H:%M"),
      self.end_time.format("%H:%M")
    )
  }
}

/// Input to [`crate::store::AttendanceStore::add_slot`]. Department and level
/// are taken from the timetable by the caller.
#[derive(Debug, Clone)]
pub struct NewSlot {
  pub timetable_id:  Uuid,
  pub department_id: Uuid,
  pub level_id:      Uuid,
  pub course_id:     Uuid,
  pub instructor:    Option<String>,
  pub day_of_week:   DayOfWeek,
  pub start_time:    NaiveTime,
  pub end_time:      NaiveTime,
  pub venue:         String,
}

/// Filter for [`crate::store::AttendanceStore::list_slots`]. Unset fields do
/// not constrain the result.
#[derive(Debug, Clone, Default)]
pub struct SlotQuery {
  pub timetable_id:  Option<Uuid>,
  pub department_id: Option<Uuid>,
  pub level_id:      Option<Uuid>,
  pub course_id:     Option<Uuid>,
  pub day_of_week:   Option<DayOfWeek>,
}

/// A pair of slots in one timetable that overlap on the same day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotConflict {
  pub first:  TimetableSlot,
  pub second: TimetableSlot,
}

/// Every overlapping pair among `slots`, in input order.
pub fn find_conflicts(slots: &[TimetableSlot]) -> Vec<SlotConflict> {
  let mut conflicts = Vec::new();
  for (i, a) in slots.iter().enumerate() {
    for b in &slots[i + 1..] {
      if a.overlaps_with(b) {
        conflicts.push(SlotConflict { first: a.clone(), second: b.clone() });
      }
    }
  }
  conflicts
}
