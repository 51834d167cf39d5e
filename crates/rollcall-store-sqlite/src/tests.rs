//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{NaiveDate, NaiveTime, Utc};
use rollcall_core::{
  attendance::{AttendanceInsert, AttendanceQuery, AttendanceSource, AttendanceStatus, NewAttendance},
  audit::{ActorContext, AuditAction, AuditContext, AuditQuery},
  catalog::{DayOfWeek, NewCourse, NewDepartment, NewLevel, NewSlot, NewTimetable, SlotQuery, TimetableSlot},
  enrollment::{LevelChange, SelectionOp, SelectionWrite},
  session::{SessionAction, SessionState, SessionTransition},
  store::AttendanceStore,
  student::{NewStudent, Student},
};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

/// One department with two levels, one course, a Monday 09:00-10:00 slot at
/// the first level, and a student.
struct World {
  department: Uuid,
  level:      Uuid,
  other:      Uuid,
  course:     Uuid,
  slot:       TimetableSlot,
  student:    Student,
}

async fn world(s: &SqliteStore) -> World {
  let department = s
    .add_department(NewDepartment { code: "CSC".into(), name: "Computer Science".into() })
    .await
    .unwrap();
  let level = s
    .add_level(NewLevel {
      department_id: department.department_id,
      code:          "100".into(),
      name:          "100 Level".into(),
    })
    .await
    .unwrap();
  let other = s
    .add_level(NewLevel {
      department_id: department.department_id,
      code:          "200".into(),
      name:          "200 Level".into(),
    })
    .await
    .unwrap();
  let course = s
    .add_course(NewCourse {
      department_id: department.department_id,
      code:          "CSC101".into(),
      title:         "Introduction to Computing".into(),
    })
    .await
    .unwrap();
  let timetable = s
    .add_timetable(NewTimetable {
      department_id: department.department_id,
      level_id:      level.level_id,
      name:          "First semester".into(),
    })
    .await
    .unwrap();
  let slot = s
    .add_slot(NewSlot {
      timetable_id:  timetable.timetable_id,
      department_id: department.department_id,
      level_id:      level.level_id,
      course_id:     course.course_id,
      instructor:    Some("Dr. Eze".into()),
      day_of_week:   DayOfWeek::Mon,
      start_time:    NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
      end_time:      NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
      venue:         "LT1".into(),
    })
    .await
    .unwrap();
  let student = s
    .add_student(NewStudent {
      matric_number: "CSC/2024/001".into(),
      full_name:     "Ada Obi".into(),
      department_id: department.department_id,
    })
    .await
    .unwrap();
  World {
    department: department.department_id,
    level: level.level_id,
    other: other.level_id,
    course: course.course_id,
    slot,
    student,
  }
}

fn ctx(reason: &str) -> AuditContext {
  AuditContext::new(
    ActorContext { ip_address: Some("10.0.0.1".into()), ..Default::default() },
    reason,
  )
}

fn upsert(w: &World, level: Uuid, is_offered: bool, is_approved: bool) -> SelectionWrite {
  SelectionWrite {
    student_id:    w.student.student_id,
    department_id: w.department,
    level_id:      level,
    course_id:     w.course,
    op:            SelectionOp::Upsert { is_offered, is_approved },
  }
}

async fn select_level(s: &SqliteStore, w: &World, level: Uuid) {
  s.change_level(LevelChange {
    student_id:    w.student.student_id,
    department_id: w.department,
    level_id:      level,
    audit:         ctx("Academic level changed"),
  })
  .await
  .unwrap();
}

fn monday() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() }

// ─── Catalog ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn slot_roundtrip_and_filters() {
  let s = store().await;
  let w = world(&s).await;

  let fetched = s.get_slot(w.slot.slot_id).await.unwrap().unwrap();
  assert_eq!(fetched, w.slot);

  let monday = s
    .list_slots(SlotQuery {
      department_id: Some(w.department),
      day_of_week: Some(DayOfWeek::Mon),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(monday.len(), 1);

  let tuesday = s
    .list_slots(SlotQuery { day_of_week: Some(DayOfWeek::Tue), ..Default::default() })
    .await
    .unwrap();
  assert!(tuesday.is_empty());
}

#[tokio::test]
async fn publishing_sets_flag() {
  let s = store().await;
  let w = world(&s).await;
  let published = s
    .mark_timetable_published(w.slot.timetable_id)
    .await
    .unwrap()
    .unwrap();
  assert!(published.is_published);
  assert!(s.mark_timetable_published(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn matric_number_is_unique() {
  let s = store().await;
  let w = world(&s).await;
  let dup = s
    .add_student(NewStudent {
      matric_number: w.student.matric_number.clone(),
      full_name:     "Someone Else".into(),
      department_id: w.department,
    })
    .await;
  assert!(dup.is_err());

  let found = s.find_student_by_matric("CSC/2024/001").await.unwrap().unwrap();
  assert_eq!(found.student_id, w.student.student_id);
}

// ─── Enrollment ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn selection_writes_are_audited() {
  let s = store().await;
  let w = world(&s).await;
  select_level(&s, &w, w.level).await;

  // Create, then a real update, then a no-op update.
  let changes = s
    .write_course_selections(vec![upsert(&w, w.level, false, false)], ctx("opt out"))
    .await
    .unwrap();
  assert_eq!(changes[0].audit.as_ref().unwrap().action, AuditAction::Create);

  let changes = s
    .write_course_selections(vec![upsert(&w, w.level, true, false)], ctx("opt in"))
    .await
    .unwrap();
  let entry = changes[0].audit.as_ref().unwrap();
  assert_eq!(entry.action, AuditAction::Update);
  assert_eq!(entry.old_is_offered, Some(false));
  assert!(entry.new_is_offered);
  assert_eq!(entry.actor.ip_address.as_deref(), Some("10.0.0.1"));

  let changes = s
    .write_course_selections(vec![upsert(&w, w.level, true, true)], ctx("approve"))
    .await
    .unwrap();
  assert!(changes[0].audit.is_none());
  assert!(changes[0].after.as_ref().unwrap().is_approved);

  let entries = s
    .list_audit_entries(AuditQuery {
      student_id: Some(w.student.student_id),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(entries.len(), 2);
  // Newest first.
  assert_eq!(entries[0].action, AuditAction::Update);
}

#[tokio::test]
async fn one_row_per_student_course_level() {
  let s = store().await;
  let w = world(&s).await;
  select_level(&s, &w, w.level).await;

  for offered in [true, false, true] {
    s.write_course_selections(vec![upsert(&w, w.level, offered, false)], ctx("toggle"))
      .await
      .unwrap();
  }
  let rows = s.list_course_selections(w.student.student_id, None).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert!(rows[0].is_offered);
}

#[tokio::test]
async fn approved_without_offered_is_rejected() {
  let s = store().await;
  let w = world(&s).await;
  let result = s
    .write_course_selections(vec![upsert(&w, w.level, false, true)], ctx("bad"))
    .await;
  assert!(result.is_err());
  assert!(s.list_course_selections(w.student.student_id, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn level_change_clears_selections_with_batched_deletes() {
  let s = store().await;
  let w = world(&s).await;
  select_level(&s, &w, w.level).await;
  s.write_course_selections(vec![upsert(&w, w.level, false, false)], ctx("opt out"))
    .await
    .unwrap();

  let outcome = s
    .change_level(LevelChange {
      student_id:    w.student.student_id,
      department_id: w.department,
      level_id:      w.other,
      audit:         ctx("Academic level changed").batched(),
    })
    .await
    .unwrap();

  assert_eq!(outcome.selection.level_id, w.other);
  assert_eq!(outcome.removed.len(), 1);
  assert_eq!(outcome.audit.len(), 1);
  assert_eq!(outcome.audit[0].action, AuditAction::Delete);
  assert_eq!(outcome.audit[0].old_is_offered, Some(false));
  assert!(outcome.audit[0].batch_id.is_some());
  assert!(s.list_course_selections(w.student.student_id, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn reselecting_same_level_keeps_selections() {
  let s = store().await;
  let w = world(&s).await;
  select_level(&s, &w, w.level).await;
  s.write_course_selections(vec![upsert(&w, w.level, false, false)], ctx("opt out"))
    .await
    .unwrap();

  let outcome = s
    .change_level(LevelChange {
      student_id:    w.student.student_id,
      department_id: w.department,
      level_id:      w.level,
      audit:         ctx("Academic level changed"),
    })
    .await
    .unwrap();
  assert!(outcome.removed.is_empty());
  assert_eq!(s.list_course_selections(w.student.student_id, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn students_at_level_follow_their_selection() {
  let s = store().await;
  let w = world(&s).await;
  assert!(s.list_students_at_level(w.department, w.level).await.unwrap().is_empty());
  select_level(&s, &w, w.level).await;
  let at_level = s.list_students_at_level(w.department, w.level).await.unwrap();
  assert_eq!(at_level.len(), 1);
  assert!(s.list_students_at_level(w.department, w.other).await.unwrap().is_empty());
}

// ─── Audit ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn audit_failure_does_not_block_selection_write() {
  let s = store().await;
  let w = world(&s).await;

  s.conn
    .call(|conn| {
      conn.execute_batch("DROP TABLE audit_log")?;
      Ok(())
    })
    .await
    .unwrap();

  let changes = s
    .write_course_selections(vec![upsert(&w, w.level, false, false)], ctx("opt out"))
    .await
    .unwrap();
  assert!(changes[0].audit.is_none());

  let row = s
    .get_course_selection(w.student.student_id, w.course, w.level)
    .await
    .unwrap()
    .unwrap();
  assert!(!row.is_offered);
}

#[tokio::test]
async fn audit_log_rejects_updates_and_deletes() {
  let s = store().await;
  let w = world(&s).await;
  s.write_course_selections(vec![upsert(&w, w.level, false, false)], ctx("opt out"))
    .await
    .unwrap();

  let update = s
    .conn
    .call(|conn| Ok(conn.execute("UPDATE audit_log SET reason = 'x'", [])?))
    .await;
  assert!(update.is_err());
  let delete = s
    .conn
    .call(|conn| Ok(conn.execute("DELETE FROM audit_log", [])?))
    .await;
  assert!(delete.is_err());
}

// ─── Sessions ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ensure_session_is_idempotent() {
  let s = store().await;
  let w = world(&s).await;
  let a = s.ensure_session(w.slot.slot_id, monday()).await.unwrap();
  let b = s.ensure_session(w.slot.slot_id, monday()).await.unwrap();
  assert_eq!(a.session_id, b.session_id);
  assert_eq!(a.state, SessionState::Scheduled);
}

#[tokio::test]
async fn transitions_compare_and_set() {
  let s = store().await;
  let w = world(&s).await;
  let session = s.ensure_session(w.slot.slot_id, monday()).await.unwrap();

  let transition = |action| SessionTransition {
    session_id: session.session_id,
    action,
    at: Utc::now(),
    reason: Some("staff strike".into()),
  };

  // Activate is not allowed from scheduled.
  assert!(s.transition_session(transition(SessionAction::Activate)).await.unwrap().is_none());

  let opened = s.transition_session(transition(SessionAction::Open)).await.unwrap().unwrap();
  assert_eq!(opened.state, SessionState::Open);
  assert!(opened.opened_at.is_some());
  assert!(opened.cancel_reason.is_none());

  let cancelled = s.transition_session(transition(SessionAction::Cancel)).await.unwrap().unwrap();
  assert_eq!(cancelled.state, SessionState::Cancelled);
  assert_eq!(cancelled.cancel_reason.as_deref(), Some("staff strike"));

  assert!(s.transition_session(transition(SessionAction::Close)).await.unwrap().is_none());
}

// ─── Attendance ──────────────────────────────────────────────────────────────

fn check_in(w: &World) -> NewAttendance {
  NewAttendance {
    student_id: w.student.student_id,
    slot_id:    w.slot.slot_id,
    date:       monday(),
    status:     AttendanceStatus::Late,
    source:     AttendanceSource::CheckIn,
    class_secs: Some(w.slot.duration_secs()),
  }
}

#[tokio::test]
async fn second_insert_returns_existing_record() {
  let s = store().await;
  let w = world(&s).await;

  let first = s.insert_attendance(check_in(&w)).await.unwrap();
  assert!(matches!(first, AttendanceInsert::Inserted(_)));

  let mut again = check_in(&w);
  again.status = AttendanceStatus::Present;
  let second = s.insert_attendance(again).await.unwrap();
  let AttendanceInsert::Existing(existing) = second else {
    panic!("expected existing record");
  };
  assert_eq!(existing.record_id, first.record().record_id);
  assert_eq!(existing.status, AttendanceStatus::Late);

  let all = s
    .list_attendance(AttendanceQuery {
      student_id: Some(w.student.student_id),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn detections_accumulate_on_one_record() {
  let s = store().await;
  let w = world(&s).await;
  let start = Utc::now();

  let mut input = check_in(&w);
  input.source = AttendanceSource::Observation;
  input.status = AttendanceStatus::Absent;

  let first = s.record_detection(input.clone(), start).await.unwrap();
  assert_eq!(first.detection_count, 1);

  let later = start + chrono::Duration::minutes(20);
  let second = s.record_detection(input, later).await.unwrap();
  assert_eq!(second.record_id, first.record_id);
  assert_eq!(second.detection_count, 2);
  assert_eq!(second.last_detected_at.unwrap().timestamp(), later.timestamp());
  assert_eq!(second.first_detected_at.unwrap().timestamp(), start.timestamp());

  let updated = s
    .update_presence(second.record_id, 1260, Some(AttendanceStatus::Late))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(updated.presence_secs, Some(1260));
  assert_eq!(updated.status, AttendanceStatus::Late);
}
