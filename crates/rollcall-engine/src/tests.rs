//! Engine scenarios against an in-memory SQLite store.
//!
//! 2024-01-01 is a Monday; the engine runs on UTC unless a test says
//! otherwise.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use parking_lot::Mutex;
use rollcall_core::{
  attendance::{AttendanceQuery, AttendanceSource, AttendanceStatus},
  audit::{ActorContext, AuditAction, AuditQuery},
  catalog::{DayOfWeek, NewCourse, NewDepartment, NewLevel, NewTimetable, Timetable, TimetableSlot},
  eligibility::IneligibilityReason,
  enrollment::{OfferingStatus, Registration},
  session::{ClassSession, SessionState},
  student::{NewStudent, Student},
};
use rollcall_store_sqlite::SqliteStore;
use uuid::Uuid;

use crate::{
  cache::{CacheClient, CacheKey, MemoryCache, TtlTable},
  catalog::SlotRequest,
  collaborators::{CollaboratorError, Notification, Notifier, PresenceFinalizer},
  Engine, Error,
};

// ─── Fixture ─────────────────────────────────────────────────────────────────

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, 0).unwrap()
}

fn monday() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() }

fn time(hour: u32, minute: u32) -> NaiveTime { NaiveTime::from_hms_opt(hour, minute, 0).unwrap() }

fn actor() -> ActorContext {
  ActorContext { ip_address: Some("10.0.0.7".into()), ..Default::default() }
}

/// One department with levels 100 and 200. Level 100 has CSC101 on Monday
/// 09:00-10:00; level 200 has CSC201 on Monday 11:00-12:00.
struct World {
  engine:       Engine<SqliteStore>,
  department:   Uuid,
  level:        Uuid,
  other:        Uuid,
  course:       Uuid,
  other_course: Uuid,
  timetable:    Timetable,
  slot:         TimetableSlot,
}

async fn engine() -> Engine<SqliteStore> {
  Engine::new(SqliteStore::open_in_memory().await.expect("in-memory store"))
}

async fn world_with(engine: Engine<SqliteStore>) -> World {
  let department = engine
    .add_department(NewDepartment { code: "CSC".into(), name: "Computer Science".into() })
    .await
    .unwrap();
  let dept = department.department_id;
  let level = engine
    .add_level(NewLevel { department_id: dept, code: "100".into(), name: "100 Level".into() })
    .await
    .unwrap();
  let other = engine
    .add_level(NewLevel { department_id: dept, code: "200".into(), name: "200 Level".into() })
    .await
    .unwrap();
  let course = engine
    .add_course(NewCourse { department_id: dept, code: "CSC101".into(), title: "Computing I".into() })
    .await
    .unwrap();
  let other_course = engine
    .add_course(NewCourse { department_id: dept, code: "CSC201".into(), title: "Computing II".into() })
    .await
    .unwrap();

  let timetable = engine
    .add_timetable(NewTimetable {
      department_id: dept,
      level_id:      level.level_id,
      name:          "100 Level, first semester".into(),
    })
    .await
    .unwrap();
  let slot = engine
    .add_slot(timetable.timetable_id, SlotRequest {
      course_id:   course.course_id,
      instructor:  Some("Dr. Eze".into()),
      day_of_week: DayOfWeek::Mon,
      start_time:  time(9, 0),
      end_time:    time(10, 0),
      venue:       "LT1".into(),
    })
    .await
    .unwrap();

  let other_timetable = engine
    .add_timetable(NewTimetable {
      department_id: dept,
      level_id:      other.level_id,
      name:          "200 Level, first semester".into(),
    })
    .await
    .unwrap();
  engine
    .add_slot(other_timetable.timetable_id, SlotRequest {
      course_id:   other_course.course_id,
      instructor:  None,
      day_of_week: DayOfWeek::Mon,
      start_time:  time(11, 0),
      end_time:    time(12, 0),
      venue:       "LT2".into(),
    })
    .await
    .unwrap();

  World {
    engine,
    department: dept,
    level: level.level_id,
    other: other.level_id,
    course: course.course_id,
    other_course: other_course.course_id,
    timetable,
    slot,
  }
}

async fn world() -> World { world_with(engine().await).await }

impl World {
  /// A new student at level 100.
  async fn student(&self, matric: &str) -> Student {
    let student = self.unleveled_student(matric).await;
    self.engine.set_level(student.student_id, self.level, actor()).await.unwrap();
    student
  }

  async fn unleveled_student(&self, matric: &str) -> Student {
    self
      .engine
      .add_student(NewStudent {
        matric_number: matric.into(),
        full_name:     format!("Student {matric}"),
        department_id: self.department,
      })
      .await
      .unwrap()
  }

  async fn records(&self, student_id: Uuid) -> Vec<rollcall_core::attendance::AttendanceRecord> {
    self
      .engine
      .list_attendance(AttendanceQuery { student_id: Some(student_id), ..Default::default() })
      .await
      .unwrap()
  }
}

fn domain(err: Error) -> rollcall_core::Error {
  match err {
    Error::Domain(e) => e,
    Error::Store(e) => panic!("unexpected store error: {e}"),
  }
}

// ─── Recording collaborators ─────────────────────────────────────────────────

#[derive(Default)]
struct RecordingFinalizer {
  calls: Mutex<Vec<(Uuid, Vec<Registration>)>>,
}

impl PresenceFinalizer for RecordingFinalizer {
  fn finalize_session(
    &self,
    session: &ClassSession,
    expected: &[Registration],
  ) -> Result<(), CollaboratorError> {
    self.calls.lock().push((session.session_id, expected.to_vec()));
    Ok(())
  }
}

#[derive(Default)]
struct RecordingNotifier {
  seen:  Mutex<Vec<Notification>>,
  fails: bool,
}

impl Notifier for RecordingNotifier {
  fn notify(&self, notification: &Notification) -> Result<(), CollaboratorError> {
    self.seen.lock().push(notification.clone());
    if self.fails {
      return Err("mailer offline".into());
    }
    Ok(())
  }
}

// ─── Marking ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn check_in_after_start_is_late() {
  let w = world().await;
  let s = w.student("CSC/24/001").await;

  let record = w.engine.mark_attendance(s.student_id, at(9, 5)).await.unwrap();
  assert_eq!(record.status, AttendanceStatus::Late);
  assert_eq!(record.source, AttendanceSource::CheckIn);
  assert_eq!(record.slot_id, w.slot.slot_id);
  assert_eq!(record.date, monday());
  assert_eq!(record.class_secs, Some(3600));
}

#[tokio::test]
async fn check_in_on_the_hour_is_present() {
  let w = world().await;
  let s = w.student("CSC/24/001").await;
  let record = w.engine.mark_attendance(s.student_id, at(9, 0)).await.unwrap();
  assert_eq!(record.status, AttendanceStatus::Present);
}

#[tokio::test]
async fn check_in_before_start_finds_no_class() {
  let w = world().await;
  let s = w.student("CSC/24/001").await;
  let err = domain(w.engine.mark_attendance(s.student_id, at(8, 58)).await.unwrap_err());
  assert!(matches!(err, rollcall_core::Error::NoCurrentClass));
  assert!(w.records(s.student_id).await.is_empty());
}

#[tokio::test]
async fn cached_lookup_before_a_mid_minute_start_does_not_block_check_in() {
  let w = world().await;
  let s = w.student("CSC/24/001").await;
  w.engine
    .add_slot(w.timetable.timetable_id, SlotRequest {
      course_id:   w.course,
      instructor:  None,
      day_of_week: DayOfWeek::Tue,
      start_time:  NaiveTime::from_hms_opt(9, 0, 30).unwrap(),
      end_time:    time(10, 0),
      venue:       "LT1".into(),
    })
    .await
    .unwrap();
  let tuesday = |second| Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, second).unwrap();

  assert_eq!(w.engine.resolve_current_slot(s.student_id, tuesday(10)).await.unwrap(), None);
  let record = w.engine.mark_attendance(s.student_id, tuesday(45)).await.unwrap();
  assert_eq!(record.status, AttendanceStatus::Late);
  assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
}

#[tokio::test]
async fn local_offset_decides_today_and_time() {
  let offset = chrono::FixedOffset::east_opt(3600).unwrap();
  let w = world_with(engine().await.with_offset(offset)).await;
  let s = w.student("CSC/24/001").await;

  // 08:30 UTC is 09:30 at UTC+1.
  let record = w.engine.mark_attendance(s.student_id, at(8, 30)).await.unwrap();
  assert_eq!(record.status, AttendanceStatus::Late);
}

#[tokio::test]
async fn marking_is_idempotent() {
  let w = world().await;
  let s = w.student("CSC/24/001").await;

  let first = w.engine.mark_attendance(s.student_id, at(9, 0)).await.unwrap();
  let err = domain(w.engine.mark_attendance(s.student_id, at(9, 20)).await.unwrap_err());
  match err {
    rollcall_core::Error::AlreadyMarked(existing) => {
      assert_eq!(existing.record_id, first.record_id);
      assert_eq!(existing.status, AttendanceStatus::Present);
    }
    other => panic!("expected already_marked, got {other:?}"),
  }
  assert_eq!(w.records(s.student_id).await.len(), 1);
}

#[tokio::test]
async fn concurrent_marks_have_one_winner() {
  let w = world().await;
  let s = w.student("CSC/24/001").await;

  let (a, b) = tokio::join!(
    w.engine.mark_attendance(s.student_id, at(9, 1)),
    w.engine.mark_attendance(s.student_id, at(9, 1)),
  );
  let results = [a, b];
  assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
  let loser = results.into_iter().find_map(Result::err).unwrap();
  assert_eq!(loser.code(), "already_marked");
  assert_eq!(w.records(s.student_id).await.len(), 1);
}

#[tokio::test]
async fn opted_out_student_has_no_current_class() {
  let w = world().await;
  let s = w.student("CSC/24/001").await;
  w.engine
    .set_course_offering(s.student_id, w.course, false, actor(), "Dropped")
    .await
    .unwrap();

  assert_eq!(w.engine.resolve_current_slot(s.student_id, at(9, 10)).await.unwrap(), None);
  let err = w.engine.mark_attendance(s.student_id, at(9, 10)).await.unwrap_err();
  assert_eq!(err.code(), "no_current_class");
}

#[tokio::test]
async fn marked_attendance_is_notified_and_notifier_failure_is_ignored() {
  let notifier = Arc::new(RecordingNotifier { fails: true, ..Default::default() });
  let w = world_with(engine().await.with_notifier(notifier.clone())).await;
  let s = w.student("CSC/24/001").await;

  let record = w.engine.mark_attendance(s.student_id, at(9, 3)).await.unwrap();
  let seen = notifier.seen.lock();
  assert_eq!(seen.len(), 1);
  assert!(matches!(&seen[0], Notification::AttendanceMarked { record: r } if r == &record));
}

// ─── Eligibility ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn eligibility_reports_first_failing_check() {
  let w = world().await;

  // No level and outside the window: the level check wins.
  let s = w.unleveled_student("CSC/24/002").await;
  let d = w.engine.validate_eligibility(s.student_id, w.slot.slot_id, at(7, 0)).await.unwrap();
  assert!(!d.eligible);
  assert_eq!(d.failure, Some(IneligibilityReason::NoLevelSelected));
  assert!(!d.reason.is_empty());
  assert_eq!(d.student.level_id, None);

  // Wrong level and outside the window: the level mismatch wins.
  w.engine.set_level(s.student_id, w.other, actor()).await.unwrap();
  let d = w.engine.validate_eligibility(s.student_id, w.slot.slot_id, at(7, 0)).await.unwrap();
  assert_eq!(d.failure, Some(IneligibilityReason::LevelMismatch));
  assert_eq!(d.student.level_id, Some(w.other));
}

#[tokio::test]
async fn eligibility_success_carries_slot_details() {
  let w = world().await;
  let s = w.student("CSC/24/001").await;
  let d = w.engine.validate_eligibility(s.student_id, w.slot.slot_id, at(9, 30)).await.unwrap();
  assert!(d.eligible);
  assert_eq!(d.reason, "Student is eligible for attendance");
  assert_eq!(d.details["venue"], "LT1");
  assert_eq!(d.details["time_slot"], "09:00-10:00");
}

#[tokio::test]
async fn opted_out_course_fails_before_time_window() {
  let w = world().await;
  let s = w.student("CSC/24/001").await;
  w.engine
    .set_course_offering(s.student_id, w.course, false, actor(), "Dropped")
    .await
    .unwrap();
  let d = w.engine.validate_eligibility(s.student_id, w.slot.slot_id, at(18, 0)).await.unwrap();
  assert_eq!(d.failure, Some(IneligibilityReason::CourseNotOffered));
}

// ─── Enrollment and audit ────────────────────────────────────────────────────

#[tokio::test]
async fn offering_changes_are_audited_once_per_real_change() {
  let w = world().await;
  let s = w.student("CSC/24/001").await;
  let e = &w.engine;

  e.set_course_offering(s.student_id, w.course, false, actor(), "Opt out").await.unwrap();
  e.set_course_offering(s.student_id, w.course, true, actor(), "Opt in").await.unwrap();
  let unchanged = e
    .set_course_offering(s.student_id, w.course, true, actor(), "Opt in again")
    .await
    .unwrap();
  assert!(unchanged.audit.is_none());

  let history = e
    .audit_history(AuditQuery { student_id: Some(s.student_id), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(history.len(), 2);
  // Newest first.
  assert_eq!(history[0].action, AuditAction::Update);
  assert_eq!(history[0].old_is_offered, Some(false));
  assert!(history[0].new_is_offered);
  assert_eq!(history[1].action, AuditAction::Create);
  assert_eq!(history[1].actor.ip_address.as_deref(), Some("10.0.0.7"));

  let summary = e.audit_summary(s.student_id).await.unwrap();
  assert_eq!(summary.total_changes, 2);
  assert_eq!(summary.unique_courses, 1);
}

#[tokio::test]
async fn bulk_offerings_share_one_batch() {
  let w = world().await;
  let s = w.student("CSC/24/001").await;

  let changes = w
    .engine
    .set_course_offerings(s.student_id, vec![(w.course, false)], actor(), "Semester plan")
    .await
    .unwrap();
  assert_eq!(changes.len(), 1);
  let batch = changes[0].audit.as_ref().and_then(|a| a.batch_id).expect("batched");

  let entries = w
    .engine
    .audit_history(AuditQuery { batch_id: Some(batch), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(entries.len(), 1);
  assert!(entries.iter().all(|e| e.reason == "Semester plan"));
}

#[tokio::test]
async fn offering_requires_level_and_scheduled_course() {
  let w = world().await;
  let s = w.unleveled_student("CSC/24/003").await;
  let err = w
    .engine
    .set_course_offering(s.student_id, w.course, false, actor(), "x")
    .await
    .unwrap_err();
  assert_eq!(err.code(), "no_level_selected");

  w.engine.set_level(s.student_id, w.level, actor()).await.unwrap();
  let err = w
    .engine
    .set_course_offering(s.student_id, w.other_course, true, actor(), "x")
    .await
    .unwrap_err();
  assert_eq!(err.code(), "validation_failure");
}

#[tokio::test]
async fn level_change_empties_selections_and_refreshes_offered_courses() {
  let w = world().await;
  let s = w.student("CSC/24/001").await;
  let e = &w.engine;

  let before = e.offered_courses(s.student_id).await.unwrap();
  assert_eq!(before.len(), 1);
  assert_eq!(before[0].course.course_id, w.course);
  assert_eq!(before[0].status, OfferingStatus::NoExplicitSelection);

  e.set_course_offering(s.student_id, w.course, true, actor(), "Confirm").await.unwrap();
  let outcome = e.set_level(s.student_id, w.other, actor()).await.unwrap();
  assert_eq!(outcome.removed.len(), 1);
  assert!(outcome.audit.iter().all(|a| a.reason == "Academic level changed"));

  assert!(e.course_selections(s.student_id, w.level).await.unwrap().is_empty());
  let after = e.offered_courses(s.student_id).await.unwrap();
  assert_eq!(after.len(), 1);
  assert_eq!(after[0].course.course_id, w.other_course);
}

#[tokio::test]
async fn level_from_another_department_is_rejected() {
  let w = world().await;
  let s = w.unleveled_student("CSC/24/004").await;
  let physics = w
    .engine
    .add_department(NewDepartment { code: "PHY".into(), name: "Physics".into() })
    .await
    .unwrap();
  let level = w
    .engine
    .add_level(NewLevel {
      department_id: physics.department_id,
      code:          "100".into(),
      name:          "100 Level".into(),
    })
    .await
    .unwrap();
  let err = w.engine.set_level(s.student_id, level.level_id, actor()).await.unwrap_err();
  assert_eq!(err.code(), "validation_failure");
}

#[tokio::test]
async fn registration_awaits_approval() {
  let w = world().await;
  let s = w.student("CSC/24/001").await;
  let e = &w.engine;

  e.set_course_offering(s.student_id, w.course, false, actor(), "Opt out").await.unwrap();
  let registered = e.register_course(s.student_id, w.course, w.level, actor()).await.unwrap();
  let row = registered.after.expect("row");
  assert!(row.is_offered && !row.is_approved);

  let err = e.register_course(s.student_id, w.course, w.level, actor()).await.unwrap_err();
  assert_eq!(err.code(), "validation_failure");

  let approved = e.approve_registration(s.student_id, w.course, w.level, actor()).await.unwrap();
  assert!(approved.after.expect("row").is_approved);
  assert!(approved.audit.is_none());

  let cancelled = e.cancel_registration(s.student_id, w.course, w.level, actor()).await.unwrap();
  assert_eq!(cancelled.audit.map(|a| a.action), Some(AuditAction::Delete));
  let err = e.cancel_registration(s.student_id, w.course, w.level, actor()).await.unwrap_err();
  assert_eq!(err.code(), "not_found");
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn publish_refuses_overlapping_slots() {
  let w = world().await;
  let e = &w.engine;
  e.add_slot(w.timetable.timetable_id, SlotRequest {
    course_id:   w.course,
    instructor:  None,
    day_of_week: DayOfWeek::Mon,
    start_time:  time(9, 30),
    end_time:    time(10, 30),
    venue:       "LT3".into(),
  })
  .await
  .unwrap();

  assert_eq!(e.timetable_conflicts(w.timetable.timetable_id).await.unwrap().len(), 1);
  let err = domain(e.publish_timetable(w.timetable.timetable_id).await.unwrap_err());
  assert!(matches!(&err, rollcall_core::Error::Validation(m) if m.contains("1 overlapping")));
}

#[tokio::test]
async fn overlapping_slots_resolve_to_earliest_created() {
  let w = world().await;
  let s = w.student("CSC/24/001").await;
  w.engine
    .add_slot(w.timetable.timetable_id, SlotRequest {
      course_id:   w.course,
      instructor:  None,
      day_of_week: DayOfWeek::Mon,
      start_time:  time(9, 30),
      end_time:    time(10, 30),
      venue:       "LT3".into(),
    })
    .await
    .unwrap();
  let slot = w.engine.resolve_current_slot(s.student_id, at(9, 45)).await.unwrap();
  assert_eq!(slot.map(|s| s.slot_id), Some(w.slot.slot_id));
}

#[tokio::test]
async fn inverted_slot_window_is_rejected() {
  let w = world().await;
  let err = w
    .engine
    .add_slot(w.timetable.timetable_id, SlotRequest {
      course_id:   w.course,
      instructor:  None,
      day_of_week: DayOfWeek::Tue,
      start_time:  time(10, 0),
      end_time:    time(10, 0),
      venue:       "LT1".into(),
    })
    .await
    .unwrap_err();
  assert_eq!(err.code(), "validation_failure");
}

// ─── Sessions ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn close_finalizes_expected_students_once() {
  let finalizer = Arc::new(RecordingFinalizer::default());
  let w = world_with(engine().await.with_finalizer(finalizer.clone())).await;
  let e = &w.engine;
  let default = w.student("CSC/24/001").await;
  let opted_out = w.student("CSC/24/002").await;
  let pending = w.student("CSC/24/003").await;
  w.unleveled_student("CSC/24/004").await;

  e.set_course_offering(opted_out.student_id, w.course, false, actor(), "Opt out").await.unwrap();
  e.set_course_offering(pending.student_id, w.course, false, actor(), "Opt out").await.unwrap();
  e.register_course(pending.student_id, w.course, w.level, actor()).await.unwrap();

  let session = e.ensure_session(w.slot.slot_id, monday()).await.unwrap();
  e.open_session(session.session_id, at(8, 55)).await.unwrap();
  e.activate_session(session.session_id, at(9, 0)).await.unwrap();
  let closed = e.close_session(session.session_id, at(10, 0)).await.unwrap();
  assert_eq!(closed.state, SessionState::Closed);
  assert!(closed.closed_at.is_some());

  let err = e.close_session(session.session_id, at(10, 1)).await.unwrap_err();
  assert_eq!(err.code(), "session_state_violation");

  let calls = finalizer.calls.lock();
  assert_eq!(calls.len(), 1);
  let (session_id, expected) = &calls[0];
  assert_eq!(*session_id, session.session_id);
  assert_eq!(expected.len(), 1);
  assert_eq!(expected[0].student_id, default.student_id);
  assert_eq!(expected[0].selection_id, None);
}

#[tokio::test]
async fn close_includes_approved_registrants_from_other_levels() {
  let finalizer = Arc::new(RecordingFinalizer::default());
  let w = world_with(engine().await.with_finalizer(finalizer.clone())).await;
  let e = &w.engine;
  let local = w.student("CSC/24/001").await;
  let carry_over = w.unleveled_student("CSC/23/009").await;
  let unapproved = w.unleveled_student("CSC/23/010").await;
  for s in [&carry_over, &unapproved] {
    e.set_level(s.student_id, w.other, actor()).await.unwrap();
    e.register_course(s.student_id, w.course, w.level, actor()).await.unwrap();
  }
  let approved = e
    .approve_registration(carry_over.student_id, w.course, w.level, actor())
    .await
    .unwrap()
    .after
    .expect("row");

  let session = e.ensure_session(w.slot.slot_id, monday()).await.unwrap();
  e.open_session(session.session_id, at(8, 55)).await.unwrap();
  e.close_session(session.session_id, at(10, 0)).await.unwrap();

  let calls = finalizer.calls.lock();
  assert_eq!(calls.len(), 1);
  let expected = &calls[0].1;
  let ids: Vec<Uuid> = expected.iter().map(|r| r.student_id).collect();
  assert_eq!(ids, vec![local.student_id, carry_over.student_id]);
  assert_eq!(expected[1].selection_id, Some(approved.selection_id));
  assert_eq!(expected[1].level_id, w.level);
}

#[tokio::test]
async fn transitions_require_their_source_state() {
  let w = world().await;
  let e = &w.engine;
  let session = e.ensure_session(w.slot.slot_id, monday()).await.unwrap();
  assert_eq!(e.ensure_session(w.slot.slot_id, monday()).await.unwrap(), session);

  let err = domain(e.activate_session(session.session_id, at(9, 0)).await.unwrap_err());
  assert!(matches!(
    err,
    rollcall_core::Error::SessionStateViolation { state: SessionState::Scheduled, .. }
  ));
  let err = e.close_session(session.session_id, at(9, 0)).await.unwrap_err();
  assert_eq!(err.code(), "session_state_violation");

  e.open_session(session.session_id, at(9, 0)).await.unwrap();
  let err = e.open_session(session.session_id, at(9, 1)).await.unwrap_err();
  assert_eq!(err.code(), "session_state_violation");
}

#[tokio::test]
async fn cancel_records_reason_and_notifies() {
  let notifier = Arc::new(RecordingNotifier::default());
  let finalizer = Arc::new(RecordingFinalizer::default());
  let w = world_with(
    engine().await.with_notifier(notifier.clone()).with_finalizer(finalizer.clone()),
  )
  .await;
  let e = &w.engine;

  let session = e.ensure_session(w.slot.slot_id, monday()).await.unwrap();
  let cancelled = e.cancel_session(session.session_id, "Lecturer ill", at(8, 0)).await.unwrap();
  assert_eq!(cancelled.state, SessionState::Cancelled);
  assert_eq!(cancelled.cancel_reason.as_deref(), Some("Lecturer ill"));
  assert!(finalizer.calls.lock().is_empty());
  assert!(matches!(
    notifier.seen.lock().as_slice(),
    [Notification::SessionCancelled { .. }]
  ));

  let err = e.cancel_session(session.session_id, "again", at(8, 1)).await.unwrap_err();
  assert_eq!(err.code(), "session_state_violation");
}

// ─── Sweep ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sweep_marks_absentees_and_skips_opted_out() {
  let w = world().await;
  let e = &w.engine;
  let present = w.student("CSC/24/001").await;
  let absent = w.student("CSC/24/002").await;
  let opted_out = w.student("CSC/24/003").await;
  e.set_course_offering(opted_out.student_id, w.course, false, actor(), "Opt out").await.unwrap();
  e.mark_attendance(present.student_id, at(9, 0)).await.unwrap();

  // Level 200's slot has not ended at 10:30.
  let report = e.run_auto_absent_sweep(at(10, 30)).await.unwrap();
  assert_eq!(report.slots, 1);
  assert_eq!(report.created, 1);
  assert_eq!(report.existing, 1);
  assert_eq!(report.opted_out, 1);

  let records = w.records(absent.student_id).await;
  assert_eq!(records.len(), 1);
  assert_eq!(records[0].status, AttendanceStatus::Absent);
  assert_eq!(records[0].source, AttendanceSource::Sweep);
  assert!(w.records(opted_out.student_id).await.is_empty());
  assert_eq!(w.records(present.student_id).await[0].status, AttendanceStatus::Present);

  let rerun = e.run_auto_absent_sweep(at(10, 45)).await.unwrap();
  assert_eq!(rerun.created, 0);
  assert_eq!(rerun.existing, 2);
}

#[tokio::test]
async fn sweep_skips_cancelled_sessions_and_other_days() {
  let w = world().await;
  let e = &w.engine;
  let s = w.student("CSC/24/001").await;

  let tuesday = Utc.with_ymd_and_hms(2024, 1, 2, 18, 0, 0).unwrap();
  assert_eq!(e.run_auto_absent_sweep(tuesday).await.unwrap().slots, 0);

  let session = e.ensure_session(w.slot.slot_id, monday()).await.unwrap();
  e.cancel_session(session.session_id, "Public holiday", at(7, 0)).await.unwrap();
  let report = e.run_auto_absent_sweep(at(10, 30)).await.unwrap();
  assert_eq!(report.cancelled, 1);
  assert_eq!(report.created, 0);
  assert!(w.records(s.student_id).await.is_empty());
}

// ─── Observations and summaries ──────────────────────────────────────────────

#[tokio::test]
async fn observations_accumulate_presence() {
  let w = world().await;
  let s = w.student("CSC/24/001").await;

  let first = w.engine.record_observation(s.student_id, at(9, 0)).await.unwrap();
  assert_eq!(first.detection_count, 1);
  assert_eq!(first.presence_secs, Some(30));
  assert_eq!(first.status, AttendanceStatus::Absent);

  // 40 minutes span plus two 30 second buffers: 2460 of 3600 seconds.
  let second = w.engine.record_observation(s.student_id, at(9, 40)).await.unwrap();
  assert_eq!(second.record_id, first.record_id);
  assert_eq!(second.detection_count, 2);
  assert_eq!(second.presence_secs, Some(2460));
  assert_eq!(second.status, AttendanceStatus::Partial);

  let err = w.engine.mark_attendance(s.student_id, at(9, 41)).await.unwrap_err();
  assert_eq!(err.code(), "already_marked");
}

#[tokio::test]
async fn observation_keeps_check_in_status() {
  let w = world().await;
  let s = w.student("CSC/24/001").await;
  w.engine.mark_attendance(s.student_id, at(9, 0)).await.unwrap();
  let record = w.engine.record_observation(s.student_id, at(9, 1)).await.unwrap();
  assert_eq!(record.status, AttendanceStatus::Present);
  assert_eq!(record.source, AttendanceSource::CheckIn);
  assert_eq!(record.detection_count, 1);
}

#[tokio::test]
async fn summary_counts_attended_classes_per_course() {
  let w = world().await;
  let s = w.student("CSC/24/001").await;
  w.engine.mark_attendance(s.student_id, at(9, 10)).await.unwrap();

  let summary = w.engine.attendance_summary(s.student_id).await.unwrap();
  assert_eq!(summary.len(), 1);
  assert_eq!(summary[0].course_id, w.course);
  assert_eq!(summary[0].total, 1);
  assert_eq!(summary[0].attended, 1);
  assert_eq!(summary[0].percentage, 100.0);
}

// ─── Cache ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn writes_invalidate_cached_offerings() {
  let cache = Arc::new(MemoryCache::new());
  let w = world_with(engine().await.with_cache(cache.clone())).await;
  let s = w.student("CSC/24/001").await;

  assert_eq!(w.engine.offered_courses(s.student_id).await.unwrap().len(), 1);
  assert!(!cache.is_empty());

  w.engine
    .set_course_offering(s.student_id, w.course, false, actor(), "Opt out")
    .await
    .unwrap();
  assert!(w.engine.offered_courses(s.student_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn slot_additions_invalidate_schedule() {
  let w = world().await;
  let s = w.student("CSC/24/001").await;
  assert_eq!(w.engine.resolve_current_slot(s.student_id, at(14, 0)).await.unwrap(), None);

  let added = w
    .engine
    .add_slot(w.timetable.timetable_id, SlotRequest {
      course_id:   w.course,
      instructor:  None,
      day_of_week: DayOfWeek::Mon,
      start_time:  time(14, 0),
      end_time:    time(15, 0),
      venue:       "LT1".into(),
    })
    .await
    .unwrap();
  let slot = w.engine.resolve_current_slot(s.student_id, at(14, 0)).await.unwrap();
  assert_eq!(slot.map(|s| s.slot_id), Some(added.slot_id));
}

#[tokio::test]
async fn zero_ttl_disables_caching() {
  let cache = Arc::new(MemoryCache::new());
  let zero = TtlTable {
    identity:    Duration::ZERO,
    schedule:    Duration::ZERO,
    selections:  Duration::ZERO,
    eligibility: Duration::ZERO,
  };
  let w = world_with(engine().await.with_cache(cache.clone()).with_ttl(zero)).await;
  let s = w.student("CSC/24/001").await;

  w.engine.mark_attendance(s.student_id, at(9, 0)).await.unwrap();
  w.engine.offered_courses(s.student_id).await.unwrap();
  assert_eq!(cache.get(&CacheKey::new("student", &[&s.student_id])), None);
  assert_eq!(cache.get(&CacheKey::new("level_selection", &[&s.student_id])), None);
}
