//! Eligibility engine: current-slot resolution, the ordered eligibility
//! checks, and check-in marking.

use chrono::{DateTime, NaiveDate, Utc};
use rollcall_core::{
  attendance::{
    AttendanceInsert, AttendanceQuery, AttendanceRecord, AttendanceSource, AttendanceStatus,
    NewAttendance,
  },
  catalog::TimetableSlot,
  eligibility::{self, EligibilityDecision, EligibilityInput},
  enrollment::OfferingStatus,
  store::AttendanceStore,
  student::Student,
};
use uuid::Uuid;

use crate::{
  cache::{CacheKey, CacheTag},
  collaborators::Notification,
  Engine, Error, Result,
};

impl<S: AttendanceStore> Engine<S> {
  /// The slot the student should be attending at `now`, if any.
  ///
  /// Overlapping slots for one (department, level) resolve to the
  /// earliest-created one. A slot the student opted out of resolves to
  /// `None` rather than falling through to another slot.
  pub async fn resolve_current_slot(
    &self,
    student_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<Option<TimetableSlot>> {
    let student = self.student(student_id).await?;
    let Some(level) = self.level_selection(student_id).await? else {
      return Ok(None);
    };
    let moment = self.local(now);
    let key = CacheKey::new("current_slot", &[&student_id, &moment.date, &moment.time]);
    let tags = [
      CacheTag::Student(student_id),
      CacheTag::DepartmentLevel(student.department_id, level.level_id),
    ];
    self
      .cached(key, self.ttl.eligibility, &tags, move || async move {
        let slots = self.slots_for(student.department_id, level.level_id).await?;
        let Some(slot) = slots.into_iter().find(|s| s.is_running_at(&moment)) else {
          return Ok(None);
        };
        let status = self
          .offering_status(student_id, slot.course_id, level.level_id)
          .await?;
        Ok(status.is_offered().then_some(slot))
      })
      .await
  }

  /// Run the ordered eligibility checks for `slot_id` at `now`.
  pub async fn validate_eligibility(
    &self,
    student_id: Uuid,
    slot_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<EligibilityDecision> {
    let student = self.student(student_id).await?;
    let slot = self.slot(slot_id).await?;
    self.evaluate(&student, &slot, now).await
  }

  /// Record a check-in for whatever the student is attending at `now`.
  ///
  /// The store's (student, slot, date) uniqueness decides concurrent
  /// callers: the loser gets [`rollcall_core::Error::AlreadyMarked`] carrying
  /// the winner's record.
  pub async fn mark_attendance(
    &self,
    student_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<AttendanceRecord> {
    let student = self.student(student_id).await?;
    let slot = self
      .resolve_current_slot(student_id, now)
      .await?
      .ok_or(rollcall_core::Error::NoCurrentClass)?;
    self.evaluate(&student, &slot, now).await?.into_result()?;

    let moment = self.local(now);
    if let Some(existing) = self.existing_record(student_id, slot.slot_id, moment.date).await? {
      return Err(already_marked(existing));
    }

    let inserted = self
      .store
      .insert_attendance(NewAttendance {
        student_id,
        slot_id: slot.slot_id,
        date: moment.date,
        status: AttendanceStatus::for_check_in(moment.time, slot.start_time),
        source: AttendanceSource::CheckIn,
        class_secs: Some(slot.duration_secs()),
      })
      .await
      .map_err(Error::store)?;

    let record = match inserted {
      AttendanceInsert::Inserted(record) => record,
      AttendanceInsert::Existing(existing) => return Err(already_marked(existing)),
    };
    tracing::info!(
      %student_id,
      slot_id = %record.slot_id,
      date = %record.date,
      status = %record.status,
      "attendance marked"
    );
    self.notify(Notification::AttendanceMarked { record: record.clone() });
    Ok(record)
  }

  // ── Helpers ───────────────────────────────────────────────────────────────

  pub(crate) async fn evaluate(
    &self,
    student: &Student,
    slot: &TimetableSlot,
    now: DateTime<Utc>,
  ) -> Result<EligibilityDecision> {
    let level = self.level_selection(student.student_id).await?;
    let offering = match &level {
      Some(level) => {
        self
          .offering_status(student.student_id, slot.course_id, level.level_id)
          .await?
      }
      None => OfferingStatus::NoExplicitSelection,
    };
    let decision = eligibility::evaluate(EligibilityInput {
      student,
      level: level.as_ref(),
      slot,
      offering,
      now: self.local(now),
    });
    if let Some(failure) = decision.failure {
      tracing::debug!(
        student_id = %student.student_id,
        slot_id = %slot.slot_id,
        code = failure.code(),
        "not eligible"
      );
    }
    Ok(decision)
  }

  async fn existing_record(
    &self,
    student_id: Uuid,
    slot_id: Uuid,
    date: NaiveDate,
  ) -> Result<Option<AttendanceRecord>> {
    let mut records = self
      .store
      .list_attendance(AttendanceQuery {
        student_id: Some(student_id),
        slot_id:    Some(slot_id),
        date:       Some(date),
      })
      .await
      .map_err(Error::store)?;
    Ok(records.pop())
  }
}

fn already_marked(record: AttendanceRecord) -> Error {
  rollcall_core::Error::AlreadyMarked(Box::new(record)).into()
}
