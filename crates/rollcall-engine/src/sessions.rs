//! Session lifecycle service.
//!
//! Every transition is checked twice: against the state read here, so the
//! caller gets a precise violation, and again by the store's compare-and-set
//! so two operators racing the same transition cannot both win.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use rollcall_core::{
  enrollment::{CourseSelection, OfferingStatus, Registration},
  session::{ClassSession, SessionAction, SessionTransition},
  store::AttendanceStore,
};
use uuid::Uuid;

use crate::{collaborators::Notification, Engine, Error, Result};

impl<S: AttendanceStore> Engine<S> {
  /// The session for (slot, date), created in `scheduled` state if needed.
  pub async fn ensure_session(&self, slot_id: Uuid, date: NaiveDate) -> Result<ClassSession> {
    self.slot(slot_id).await?;
    self.store.ensure_session(slot_id, date).await.map_err(Error::store)
  }

  pub async fn session(&self, session_id: Uuid) -> Result<ClassSession> {
    self
      .store
      .get_session(session_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("session", session_id))
  }

  pub async fn open_session(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<ClassSession> {
    self.transition(session_id, SessionAction::Open, now, None).await
  }

  pub async fn activate_session(
    &self,
    session_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<ClassSession> {
    self.transition(session_id, SessionAction::Activate, now, None).await
  }

  /// Close the session and hand its expected participants to the presence
  /// finalizer, once.
  pub async fn close_session(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<ClassSession> {
    let session = self.transition(session_id, SessionAction::Close, now, None).await?;
    let expected = self.expected_participants(&session).await?;
    if let Err(error) = self.finalizer.finalize_session(&session, &expected) {
      tracing::warn!(%session_id, %error, "presence finalization failed");
    }
    Ok(session)
  }

  pub async fn cancel_session(
    &self,
    session_id: Uuid,
    reason: impl Into<String>,
    now: DateTime<Utc>,
  ) -> Result<ClassSession> {
    let session = self
      .transition(session_id, SessionAction::Cancel, now, Some(reason.into()))
      .await?;
    self.notify(Notification::SessionCancelled { session: session.clone() });
    Ok(session)
  }

  /// Students expected in class, each listed once.
  ///
  /// Students at the slot's level are expected unless they opted out or are
  /// awaiting approval. An approved registration for the slot's course and
  /// level counts too, whatever level the student has selected.
  pub async fn expected_participants(&self, session: &ClassSession) -> Result<Vec<Registration>> {
    let slot = self.slot(session.slot_id).await?;
    let students = self
      .store
      .list_students_at_level(slot.department_id, slot.level_id)
      .await
      .map_err(Error::store)?;
    let rows = self
      .store
      .list_selections_for_course(slot.course_id, slot.level_id)
      .await
      .map_err(Error::store)?;
    let by_student: HashMap<Uuid, &CourseSelection> =
      rows.iter().map(|row| (row.student_id, row)).collect();

    let registration = |student_id: Uuid, row: Option<&CourseSelection>| Registration {
      student_id,
      department_id: slot.department_id,
      level_id: slot.level_id,
      course_id: slot.course_id,
      selection_id: row.map(|r| r.selection_id),
    };

    let mut seen = HashSet::new();
    let mut expected = Vec::new();
    for student in &students {
      let row = by_student.get(&student.student_id).copied();
      if OfferingStatus::from_selection(row).is_expected() && seen.insert(student.student_id) {
        expected.push(registration(student.student_id, row));
      }
    }
    // Approved registrations from students whose selected level differs.
    for row in &rows {
      if row.is_offered && row.is_approved && seen.insert(row.student_id) {
        expected.push(registration(row.student_id, Some(row)));
      }
    }
    Ok(expected)
  }

  async fn transition(
    &self,
    session_id: Uuid,
    action: SessionAction,
    now: DateTime<Utc>,
    reason: Option<String>,
  ) -> Result<ClassSession> {
    let current = self.session(session_id).await?;
    action.apply(session_id, current.state)?;

    let updated = self
      .store
      .transition_session(SessionTransition { session_id, action, at: now, reason })
      .await
      .map_err(Error::store)?;

    match updated {
      Some(session) => {
        tracing::info!(%session_id, %action, state = %session.state, "session transitioned");
        Ok(session)
      }
      None => {
        // Lost a race; report the state that won.
        let state = self.session(session_id).await?.state;
        Err(rollcall_core::Error::SessionStateViolation { session_id, state, action }.into())
      }
    }
  }
}
