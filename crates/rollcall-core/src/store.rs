//! The `AttendanceStore` trait.
//!
//! Implemented by storage backends (e.g. `rollcall-store-sqlite`). The
//! engine and HTTP layers depend on this abstraction, not on any concrete
//! backend.
//!
//! Backends enforce the uniqueness rules (one level per student, one
//! selection row per (student, course, level), one session per (slot, date),
//! one attendance record per (student, slot, date)) themselves, so that
//! concurrent callers cannot race past them.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
  attendance::{AttendanceInsert, AttendanceQuery, AttendanceRecord, AttendanceStatus, NewAttendance},
  audit::{AuditContext, AuditLogEntry, AuditQuery},
  catalog::{
    AcademicLevel, Course, Department, NewCourse, NewDepartment, NewLevel, NewSlot,
    NewTimetable, SlotQuery, Timetable, TimetableSlot,
  },
  enrollment::{
    CourseSelection, LevelChange, LevelChangeOutcome, LevelSelection, SelectionChange,
    SelectionWrite,
  },
  session::{ClassSession, SessionTransition},
  student::{NewStudent, Student},
};

/// Abstraction over a Rollcall storage backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait AttendanceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Catalog ───────────────────────────────────────────────────────────

  fn add_department(
    &self,
    input: NewDepartment,
  ) -> impl Future<Output = Result<Department, Self::Error>> + Send + '_;

  fn get_department(
    &self,
    department_id: Uuid,
  ) -> impl Future<Output = Result<Option<Department>, Self::Error>> + Send + '_;

  fn add_level(
    &self,
    input: NewLevel,
  ) -> impl Future<Output = Result<AcademicLevel, Self::Error>> + Send + '_;

  fn get_level(
    &self,
    level_id: Uuid,
  ) -> impl Future<Output = Result<Option<AcademicLevel>, Self::Error>> + Send + '_;

  fn list_levels(
    &self,
    department_id: Uuid,
  ) -> impl Future<Output = Result<Vec<AcademicLevel>, Self::Error>> + Send + '_;

  fn add_course(
    &self,
    input: NewCourse,
  ) -> impl Future<Output = Result<Course, Self::Error>> + Send + '_;

  fn get_course(
    &self,
    course_id: Uuid,
  ) -> impl Future<Output = Result<Option<Course>, Self::Error>> + Send + '_;

  fn add_timetable(
    &self,
    input: NewTimetable,
  ) -> impl Future<Output = Result<Timetable, Self::Error>> + Send + '_;

  fn get_timetable(
    &self,
    timetable_id: Uuid,
  ) -> impl Future<Output = Result<Option<Timetable>, Self::Error>> + Send + '_;

  /// Set `is_published`. Returns `None` if the timetable does not exist.
  fn mark_timetable_published(
    &self,
    timetable_id: Uuid,
  ) -> impl Future<Output = Result<Option<Timetable>, Self::Error>> + Send + '_;

  fn add_slot(
    &self,
    input: NewSlot,
  ) -> impl Future<Output = Result<TimetableSlot, Self::Error>> + Send + '_;

  fn get_slot(
    &self,
    slot_id: Uuid,
  ) -> impl Future<Output = Result<Option<TimetableSlot>, Self::Error>> + Send + '_;

  /// Slots matching `query`, in creation order.
  fn list_slots(
    &self,
    query: SlotQuery,
  ) -> impl Future<Output = Result<Vec<TimetableSlot>, Self::Error>> + Send + '_;

  // ── Students ──────────────────────────────────────────────────────────

  fn add_student(
    &self,
    input: NewStudent,
  ) -> impl Future<Output = Result<Student, Self::Error>> + Send + '_;

  fn get_student(
    &self,
    student_id: Uuid,
  ) -> impl Future<Output = Result<Option<Student>, Self::Error>> + Send + '_;

  fn find_student_by_matric<'a>(
    &'a self,
    matric_number: &'a str,
  ) -> impl Future<Output = Result<Option<Student>, Self::Error>> + Send + 'a;

  /// Students in `department_id` whose selected level is `level_id`.
  fn list_students_at_level(
    &self,
    department_id: Uuid,
    level_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Student>, Self::Error>> + Send + '_;

  // ── Enrollment ────────────────────────────────────────────────────────

  fn get_level_selection(
    &self,
    student_id: Uuid,
  ) -> impl Future<Output = Result<Option<LevelSelection>, Self::Error>> + Send + '_;

  /// Set the student's level. When the level actually changes, every course
  /// selection the student holds is deleted in the same transaction and a
  /// DELETE audit entry is written for each. Re-selecting the current level
  /// touches nothing.
  fn change_level(
    &self,
    change: LevelChange,
  ) -> impl Future<Output = Result<LevelChangeOutcome, Self::Error>> + Send + '_;

  fn get_course_selection(
    &self,
    student_id: Uuid,
    course_id: Uuid,
    level_id: Uuid,
  ) -> impl Future<Output = Result<Option<CourseSelection>, Self::Error>> + Send + '_;

  /// The student's explicit rows, optionally restricted to one level.
  fn list_course_selections(
    &self,
    student_id: Uuid,
    level_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<CourseSelection>, Self::Error>> + Send + '_;

  /// Every explicit row for one course at one level.
  fn list_selections_for_course(
    &self,
    course_id: Uuid,
    level_id: Uuid,
  ) -> impl Future<Output = Result<Vec<CourseSelection>, Self::Error>> + Send + '_;

  /// Apply the writes in one transaction. Each write that changes
  /// `is_offered` (or creates or deletes a row) gets an audit entry built
  /// from `audit`. A failed audit insert is logged and skipped; it never
  /// rolls back the selection write.
  fn write_course_selections(
    &self,
    writes: Vec<SelectionWrite>,
    audit: AuditContext,
  ) -> impl Future<Output = Result<Vec<SelectionChange>, Self::Error>> + Send + '_;

  // ── Audit ─────────────────────────────────────────────────────────────

  /// Entries matching `query`, newest first.
  fn list_audit_entries(
    &self,
    query: AuditQuery,
  ) -> impl Future<Output = Result<Vec<AuditLogEntry>, Self::Error>> + Send + '_;

  // ── Sessions ──────────────────────────────────────────────────────────

  /// Return the session for (slot, date), creating it in `scheduled` state
  /// if absent.
  fn ensure_session(
    &self,
    slot_id: Uuid,
    date: NaiveDate,
  ) -> impl Future<Output = Result<ClassSession, Self::Error>> + Send + '_;

  fn get_session(
    &self,
    session_id: Uuid,
  ) -> impl Future<Output = Result<Option<ClassSession>, Self::Error>> + Send + '_;

  fn find_session(
    &self,
    slot_id: Uuid,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Option<ClassSession>, Self::Error>> + Send + '_;

  /// Compare-and-set the session's state. Returns `None` when the session
  /// is not currently in one of the action's allowed source states.
  fn transition_session(
    &self,
    transition: SessionTransition,
  ) -> impl Future<Output = Result<Option<ClassSession>, Self::Error>> + Send + '_;

  // ── Attendance ────────────────────────────────────────────────────────

  /// Insert unless a record for (student, slot, date) exists, in which case
  /// the existing record is returned untouched.
  fn insert_attendance(
    &self,
    input: NewAttendance,
  ) -> impl Future<Output = Result<AttendanceInsert, Self::Error>> + Send + '_;

  fn get_attendance(
    &self,
    record_id: Uuid,
  ) -> impl Future<Output = Result<Option<AttendanceRecord>, Self::Error>> + Send + '_;

  fn list_attendance(
    &self,
    query: AttendanceQuery,
  ) -> impl Future<Output = Result<Vec<AttendanceRecord>, Self::Error>> + Send + '_;

  /// Register one detection at `at`: create the record if needed and bump
  /// its detection count and first/last detection times.
  fn record_detection(
    &self,
    input: NewAttendance,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<AttendanceRecord, Self::Error>> + Send + '_;

  /// Store the computed presence and, when `status` is given, the new status.
  fn update_presence(
    &self,
    record_id: Uuid,
    presence_secs: i64,
    status: Option<AttendanceStatus>,
  ) -> impl Future<Output = Result<Option<AttendanceRecord>, Self::Error>> + Send + '_;
}
