//! Attendance ledger: the observation feed, record listings, and per-course
//! summaries.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rollcall_core::{
  attendance::{
    AttendanceQuery, AttendanceRecord, AttendanceSource, AttendanceStatus, CourseAttendance,
    NewAttendance,
  },
  store::AttendanceStore,
};
use uuid::Uuid;

use crate::{Engine, Error, Result};

impl<S: AttendanceStore> Engine<S> {
  /// Register one presence detection for the student's current class.
  ///
  /// The first detection creates the record. Each detection then recomputes
  /// the estimated presence and, for records not created by a check-in,
  /// reclassifies the status from the presence percentage.
  pub async fn record_observation(
    &self,
    student_id: Uuid,
    observed_at: DateTime<Utc>,
  ) -> Result<AttendanceRecord> {
    let student = self.student(student_id).await?;
    let slot = self
      .resolve_current_slot(student_id, observed_at)
      .await?
      .ok_or(rollcall_core::Error::NoCurrentClass)?;
    self.evaluate(&student, &slot, observed_at).await?.into_result()?;

    let moment = self.local(observed_at);
    let record = self
      .store
      .record_detection(
        NewAttendance {
          student_id,
          slot_id: slot.slot_id,
          date: moment.date,
          status: AttendanceStatus::Absent,
          source: AttendanceSource::Observation,
          class_secs: Some(slot.duration_secs()),
        },
        observed_at,
      )
      .await
      .map_err(Error::store)?;

    let presence_secs = record.estimated_presence_secs();
    let status = match record.source {
      AttendanceSource::CheckIn => None,
      _ => {
        let estimate = AttendanceRecord { presence_secs: Some(presence_secs), ..record.clone() };
        Some(self.thresholds.classify(estimate.presence_percentage()))
      }
    };

    let record = self
      .store
      .update_presence(record.record_id, presence_secs, status)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("attendance record", record.record_id))?;
    tracing::debug!(
      %student_id,
      slot_id = %record.slot_id,
      detections = record.detection_count,
      presence_secs,
      status = %record.status,
      "observation recorded"
    );
    Ok(record)
  }

  pub async fn list_attendance(&self, query: AttendanceQuery) -> Result<Vec<AttendanceRecord>> {
    self.store.list_attendance(query).await.map_err(Error::store)
  }

  /// Totals per offered course, in timetable order.
  pub async fn attendance_summary(&self, student_id: Uuid) -> Result<Vec<CourseAttendance>> {
    let offered = self.offered_courses(student_id).await?;
    let records = self
      .list_attendance(AttendanceQuery { student_id: Some(student_id), ..Default::default() })
      .await?;

    let mut course_of_slot: HashMap<Uuid, Uuid> = HashMap::new();
    let mut by_course: BTreeMap<Uuid, Vec<AttendanceRecord>> = BTreeMap::new();
    for record in records {
      let course_id = match course_of_slot.get(&record.slot_id) {
        Some(id) => *id,
        None => {
          let id = self.slot(record.slot_id).await?.course_id;
          course_of_slot.insert(record.slot_id, id);
          id
        }
      };
      by_course.entry(course_id).or_default().push(record);
    }

    Ok(
      offered
        .iter()
        .map(|o| {
          let records = by_course.get(&o.course.course_id).map(Vec::as_slice).unwrap_or_default();
          CourseAttendance::tally(o.course.course_id, records)
        })
        .collect(),
    )
  }
}
