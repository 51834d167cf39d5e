//! The auto-absent sweep.
//!
//! Runs over every slot that ended earlier today and gives each expected
//! student without a record an `absent` one. Students who opted out get
//! nothing at all. Safe to run repeatedly: existing records are left as
//! they are.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rollcall_core::{
  attendance::{AttendanceInsert, AttendanceSource, AttendanceStatus, NewAttendance},
  catalog::{SlotQuery, TimetableSlot},
  enrollment::OfferingStatus,
  session::SessionState,
  store::AttendanceStore,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{Engine, Error, Result};

/// Counts from one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
  /// Slots that ended today before the sweep ran.
  pub slots:      usize,
  /// Absent records written by this run.
  pub created:    usize,
  /// Students who already had a record.
  pub existing:   usize,
  /// Students skipped because they opted out of the course.
  pub opted_out:  usize,
  /// Students skipped because their registration awaits approval.
  pub unapproved: usize,
  /// Slots skipped because today's session was cancelled.
  pub cancelled:  usize,
}

impl<S: AttendanceStore> Engine<S> {
  pub async fn run_auto_absent_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
    let moment = self.local(now);
    let slots = self
      .store
      .list_slots(SlotQuery { day_of_week: Some(moment.day), ..Default::default() })
      .await
      .map_err(Error::store)?;

    let mut report = SweepReport::default();
    for slot in slots.iter().filter(|s| s.end_time < moment.time) {
      report.slots += 1;
      let session = self
        .store
        .find_session(slot.slot_id, moment.date)
        .await
        .map_err(Error::store)?;
      if session.is_some_and(|s| s.state == SessionState::Cancelled) {
        report.cancelled += 1;
        continue;
      }
      self.sweep_slot(slot, moment.date, &mut report).await?;
    }

    tracing::info!(
      date = %moment.date,
      slots = report.slots,
      created = report.created,
      existing = report.existing,
      opted_out = report.opted_out,
      unapproved = report.unapproved,
      cancelled = report.cancelled,
      "auto-absent sweep finished"
    );
    Ok(report)
  }

  async fn sweep_slot(
    &self,
    slot: &TimetableSlot,
    date: NaiveDate,
    report: &mut SweepReport,
  ) -> Result<()> {
    let students = self
      .store
      .list_students_at_level(slot.department_id, slot.level_id)
      .await
      .map_err(Error::store)?;
    let rows: HashMap<Uuid, _> = self
      .store
      .list_selections_for_course(slot.course_id, slot.level_id)
      .await
      .map_err(Error::store)?
      .into_iter()
      .map(|row| (row.student_id, row))
      .collect();

    for student in students {
      match OfferingStatus::from_selection(rows.get(&student.student_id)) {
        OfferingStatus::NotOffered => {
          report.opted_out += 1;
          continue;
        }
        OfferingStatus::Offered { approved: false } => {
          report.unapproved += 1;
          continue;
        }
        OfferingStatus::Offered { approved: true } | OfferingStatus::NoExplicitSelection => {}
      }

      let outcome = self
        .store
        .insert_attendance(NewAttendance {
          student_id: student.student_id,
          slot_id: slot.slot_id,
          date,
          status: AttendanceStatus::Absent,
          source: AttendanceSource::Sweep,
          class_secs: Some(slot.duration_secs()),
        })
        .await
        .map_err(Error::store)?;
      match outcome {
        AttendanceInsert::Inserted(_) => report.created += 1,
        AttendanceInsert::Existing(_) => report.existing += 1,
      }
    }
    Ok(())
  }
}
