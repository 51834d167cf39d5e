//! Eligibility rules: may this student receive attendance for this slot now?
//!
//! The checks run in a fixed order and stop at the first failure; the
//! reported reason is always that of the earliest failing check:
//!
//! 1. the student has selected a level;
//! 2. the student's department is the slot's department;
//! 3. the selected level is the slot's level;
//! 4. the student has not opted out of the slot's course;
//! 5. the slot is running on the current day and time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
  catalog::{LocalMoment, TimetableSlot},
  enrollment::{LevelSelection, OfferingStatus},
  student::Student,
};

/// Why a student is not eligible. Variant order is check order.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Error, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IneligibilityReason {
  #[error("Student has not selected an academic level")]
  NoLevelSelected,
  #[error("Student department does not match timetable department")]
  DepartmentMismatch,
  #[error("Student level does not match timetable slot level")]
  LevelMismatch,
  #[error("Student is not offering this course")]
  CourseNotOffered,
  #[error("Class is not currently ongoing")]
  OutsideTimeWindow,
}

impl IneligibilityReason {
  pub fn code(self) -> &'static str {
    match self {
      Self::NoLevelSelected => "no_level_selected",
      Self::DepartmentMismatch => "department_mismatch",
      Self::LevelMismatch => "level_mismatch",
      Self::CourseNotOffered => "course_not_offered",
      Self::OutsideTimeWindow => "outside_time_window",
    }
  }
}

/// The student's state as seen by the check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSnapshot {
  pub student_id:    Uuid,
  pub matric_number: String,
  pub department_id: Uuid,
  pub level_id:      Option<Uuid>,
}

/// Always fully populated, whatever the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityDecision {
  pub eligible: bool,
  /// Human-readable; never empty.
  pub reason:   String,
  pub failure:  Option<IneligibilityReason>,
  pub details:  BTreeMap<String, String>,
  pub student:  StudentSnapshot,
}

impl EligibilityDecision {
  pub fn into_result(self) -> Result<Self, IneligibilityReason> {
    match self.failure {
      Some(reason) => Err(reason),
      None => Ok(self),
    }
  }
}

/// Everything the checks read.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityInput<'a> {
  pub student:  &'a Student,
  pub level:    Option<&'a LevelSelection>,
  pub slot:     &'a TimetableSlot,
  /// The student's offering of `slot.course_id` at their selected level.
  pub offering: OfferingStatus,
  pub now:      LocalMoment,
}

fn details<const N: usize>(pairs: [(&str, String); N]) -> BTreeMap<String, String> {
  pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
}

/// Run the ordered checks.
pub fn evaluate(input: EligibilityInput<'_>) -> EligibilityDecision {
  let EligibilityInput { student, level, slot, offering, now } = input;

  let snapshot = StudentSnapshot {
    student_id:    student.student_id,
    matric_number: student.matric_number.clone(),
    department_id: student.department_id,
    level_id:      level.map(|l| l.level_id),
  };

  let fail = |reason: IneligibilityReason, details: BTreeMap<String, String>| {
    EligibilityDecision {
      eligible: false,
      reason: reason.to_string(),
      failure: Some(reason),
      details,
      student: snapshot.clone(),
    }
  };

  let Some(level) = level else {
    return fail(IneligibilityReason::NoLevelSelected, BTreeMap::new());
  };

  if student.department_id != slot.department_id {
    return fail(
      IneligibilityReason::DepartmentMismatch,
      details([
        ("student_department", student.department_id.to_string()),
        ("timetable_department", slot.department_id.to_string()),
      ]),
    );
  }

  if level.level_id != slot.level_id {
    return fail(
      IneligibilityReason::LevelMismatch,
      details([
        ("student_level", level.level_id.to_string()),
        ("slot_level", slot.level_id.to_string()),
      ]),
    );
  }

  if !offering.is_offered() {
    return fail(
      IneligibilityReason::CourseNotOffered,
      details([
        ("course_id", slot.course_id.to_string()),
        ("is_offered", "false".to_owned()),
      ]),
    );
  }

  if !slot.is_running_at(&now) {
    return fail(
      IneligibilityReason::OutsideTimeWindow,
      details([
        ("current_day", now.day.to_string()),
        ("class_day", slot.day_of_week.to_string()),
        ("current_time", now.time.format("%H:%M").to_string()),
        ("time_slot", slot.window_label()),
      ]),
    );
  }

  EligibilityDecision {
    eligible: true,
    reason:   "Student is eligible for attendance".to_owned(),
    failure:  None,
    details:  details([
      ("course_id", slot.course_id.to_string()),
      ("slot_id", slot.slot_id.to_string()),
      ("venue", slot.venue.clone()),
      ("time_slot", slot.window_label()),
    ]),
    student:  snapshot,
  }
}

#[cfg(test)]
mod tests {
  use chrono::{NaiveDate, NaiveTime, Utc};
  use proptest::prelude::*;

  use super::*;
  use crate::catalog::DayOfWeek;

  struct Fixture {
    student: Student,
    level:   LevelSelection,
    slot:    TimetableSlot,
  }

  fn fixture() -> Fixture {
    let department_id = Uuid::new_v4();
    let level_id = Uuid::new_v4();
    let student = Student {
      student_id: Uuid::new_v4(),
      matric_number: "CSC/2021/001".into(),
      full_name: "Ada Obi".into(),
      department_id,
      created_at: Utc::now(),
    };
    let level = LevelSelection {
      student_id: student.student_id,
      level_id,
      selected_at: Utc::now(),
      updated_at: Utc::now(),
    };
    let slot = TimetableSlot {
      slot_id: Uuid::new_v4(),
      timetable_id: Uuid::new_v4(),
      department_id,
      level_id,
      course_id: Uuid::new_v4(),
      instructor: Some("Dr. Eze".into()),
      day_of_week: DayOfWeek::Mon,
      start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
      end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
      venue: "LT1".into(),
      created_at: Utc::now(),
    };
    Fixture { student, level, slot }
  }

  fn monday(h: u32, m: u32) -> LocalMoment {
    LocalMoment {
      date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
      day:  DayOfWeek::Mon,
      time: NaiveTime::from_hms_opt(h, m, 0).unwrap(),
    }
  }

  #[test]
  fn eligible_inside_window_with_default_offering() {
    let f = fixture();
    let decision = evaluate(EligibilityInput {
      student:  &f.student,
      level:    Some(&f.level),
      slot:     &f.slot,
      offering: OfferingStatus::NoExplicitSelection,
      now:      monday(9, 5),
    });
    assert!(decision.eligible);
    assert_eq!(decision.failure, None);
    assert!(!decision.reason.is_empty());
    assert_eq!(decision.student.level_id, Some(f.level.level_id));
    assert_eq!(decision.details["venue"], "LT1");
  }

  #[test]
  fn missing_level_still_reports_snapshot() {
    let f = fixture();
    let decision = evaluate(EligibilityInput {
      student:  &f.student,
      level:    None,
      slot:     &f.slot,
      offering: OfferingStatus::NotOffered,
      now:      monday(23, 0),
    });
    assert!(!decision.eligible);
    assert_eq!(decision.failure, Some(IneligibilityReason::NoLevelSelected));
    assert_eq!(decision.reason, "Student has not selected an academic level");
    assert_eq!(decision.student.department_id, f.student.department_id);
    assert_eq!(decision.student.level_id, None);
  }

  #[test]
  fn wrong_day_is_outside_window() {
    let f = fixture();
    let mut now = monday(9, 30);
    now.day = DayOfWeek::Tue;
    let decision = evaluate(EligibilityInput {
      student:  &f.student,
      level:    Some(&f.level),
      slot:     &f.slot,
      offering: OfferingStatus::Offered { approved: true },
      now,
    });
    assert_eq!(decision.failure, Some(IneligibilityReason::OutsideTimeWindow));
    assert_eq!(decision.details["class_day"], "MON");
  }

  proptest! {
    /// Whatever combination of conditions fails, the reported reason is the
    /// first failing check in order.
    #[test]
    fn first_failing_check_wins(
      no_level in any::<bool>(),
      wrong_department in any::<bool>(),
      wrong_level in any::<bool>(),
      opted_out in any::<bool>(),
      minute_of_day in 0u32..(24 * 60),
      wrong_day in any::<bool>(),
    ) {
      let mut f = fixture();
      if wrong_department {
        f.slot.department_id = Uuid::new_v4();
      }
      if wrong_level {
        f.level.level_id = Uuid::new_v4();
      }
      let offering = if opted_out {
        OfferingStatus::NotOffered
      } else {
        OfferingStatus::NoExplicitSelection
      };
      let mut now = monday(minute_of_day / 60, minute_of_day % 60);
      if wrong_day {
        now.day = DayOfWeek::Wed;
      }
      let outside = wrong_day || !(9 * 60..=10 * 60).contains(&minute_of_day);

      let expected = [
        (no_level, IneligibilityReason::NoLevelSelected),
        (wrong_department, IneligibilityReason::DepartmentMismatch),
        (wrong_level, IneligibilityReason::LevelMismatch),
        (opted_out, IneligibilityReason::CourseNotOffered),
        (outside, IneligibilityReason::OutsideTimeWindow),
      ]
      .into_iter()
      .find_map(|(failed, reason)| failed.then_some(reason));

      let decision = evaluate(EligibilityInput {
        student: &f.student,
        level: (!no_level).then_some(&f.level),
        slot: &f.slot,
        offering,
        now,
      });

      prop_assert_eq!(decision.failure, expected);
      prop_assert_eq!(decision.eligible, expected.is_none());
      prop_assert!(!decision.reason.is_empty());
    }
  }
}
