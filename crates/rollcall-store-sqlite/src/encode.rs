//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Instants are stored as RFC 3339 strings, local dates as `YYYY-MM-DD` and
//! local wall-clock times as `HH:MM:SS`. UUIDs are stored as hyphenated
//! lowercase strings. Enums are stored as their `strum` names.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rollcall_core::{
  attendance::AttendanceRecord,
  audit::{ActorContext, AuditLogEntry},
  catalog::{AcademicLevel, Course, Department, Timetable, TimetableSlot},
  enrollment::{CourseSelection, LevelSelection},
  session::ClassSession,
  student::Student,
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<&str>) -> Result<Option<Uuid>> {
  s.map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_time(t: NaiveTime) -> String { t.format("%H:%M:%S").to_string() }

pub fn decode_time(s: &str) -> Result<NaiveTime> {
  NaiveTime::parse_from_str(s, "%H:%M:%S").map_err(|e| Error::DateParse(e.to_string()))
}

/// Parse a `strum`-encoded enum column.
pub fn decode_enum<T: FromStr>(kind: &'static str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::UnknownVariant { kind, value: s.to_owned() })
}

// ─── Row types ───────────────────────────────────────────────────────────────
//
// Each raw row is read inside a `Connection::call` closure and decoded into
// its domain type afterwards, so decode errors surface as this crate's
// `Error` rather than as a database error.

pub struct RawDepartment {
  pub department_id: String,
  pub code:          String,
  pub name:          String,
}

impl RawDepartment {
  pub const COLUMNS: &'static str = "department_id, code, name";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self { department_id: row.get(0)?, code: row.get(1)?, name: row.get(2)? })
  }

  pub fn into_department(self) -> Result<Department> {
    Ok(Department {
      department_id: decode_uuid(&self.department_id)?,
      code:          self.code,
      name:          self.name,
    })
  }
}

pub struct RawLevel {
  pub level_id:      String,
  pub department_id: String,
  pub code:          String,
  pub name:          String,
}

impl RawLevel {
  pub const COLUMNS: &'static str = "level_id, department_id, code, name";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      level_id:      row.get(0)?,
      department_id: row.get(1)?,
      code:          row.get(2)?,
      name:          row.get(3)?,
    })
  }

  pub fn into_level(self) -> Result<AcademicLevel> {
    Ok(AcademicLevel {
      level_id:      decode_uuid(&self.level_id)?,
      department_id: decode_uuid(&self.department_id)?,
      code:          self.code,
      name:          self.name,
    })
  }
}

pub struct RawCourse {
  pub course_id:     String,
  pub department_id: String,
  pub code:          String,
  pub title:         String,
}

impl RawCourse {
  pub const COLUMNS: &'static str = "course_id, department_id, code, title";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      course_id:     row.get(0)?,
      department_id: row.get(1)?,
      code:          row.get(2)?,
      title:         row.get(3)?,
    })
  }

  pub fn into_course(self) -> Result<Course> {
    Ok(Course {
      course_id:     decode_uuid(&self.course_id)?,
      department_id: decode_uuid(&self.department_id)?,
      code:          self.code,
      title:         self.title,
    })
  }
}

pub struct RawTimetable {
  pub timetable_id:  String,
  pub department_id: String,
  pub level_id:      String,
  pub name:          String,
  pub is_published:  bool,
  pub created_at:    String,
}

impl RawTimetable {
  pub const COLUMNS: &'static str =
    "timetable_id, department_id, level_id, name, is_published, created_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      timetable_id:  row.get(0)?,
      department_id: row.get(1)?,
      level_id:      row.get(2)?,
      name:          row.get(3)?,
      is_published:  row.get(4)?,
      created_at:    row.get(5)?,
    })
  }

  pub fn into_timetable(self) -> Result<Timetable> {
    Ok(Timetable {
      timetable_id:  decode_uuid(&self.timetable_id)?,
      department_id: decode_uuid(&self.department_id)?,
      level_id:      decode_uuid(&self.level_id)?,
      name:          self.name,
      is_published:  self.is_published,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawSlot {
  pub slot_id:       String,
  pub timetable_id:  String,
  pub department_id: String,
  pub level_id:      String,
  pub course_id:     String,
  pub instructor:    Option<String>,
  pub day_of_week:   String,
  pub start_time:    String,
  pub end_time:      String,
  pub venue:         String,
  pub created_at:    String,
}

impl RawSlot {
  pub const COLUMNS: &'static str = "slot_id, timetable_id, department_id, \
                                     level_id, course_id, instructor, \
                                     day_of_week, start_time, end_time, venue, \
                                     created_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      slot_id:       row.get(0)?,
      timetable_id:  row.get(1)?,
      department_id: row.get(2)?,
      level_id:      row.get(3)?,
      course_id:     row.get(4)?,
      instructor:    row.get(5)?,
      day_of_week:   row.get(6)?,
      start_time:    row.get(7)?,
      end_time:      row.get(8)?,
      venue:         row.get(9)?,
      created_at:    row.get(10)?,
    })
  }

  pub fn into_slot(self) -> Result<TimetableSlot> {
    Ok(TimetableSlot {
      slot_id:       decode_uuid(&self.slot_id)?,
      timetable_id:  decode_uuid(&self.timetable_id)?,
      department_id: decode_uuid(&self.department_id)?,
      level_id:      decode_uuid(&self.level_id)?,
      course_id:     decode_uuid(&self.course_id)?,
      instructor:    self.instructor,
      day_of_week:   decode_enum("day_of_week", &self.day_of_week)?,
      start_time:    decode_time(&self.start_time)?,
      end_time:      decode_time(&self.end_time)?,
      venue:         self.venue,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawStudent {
  pub student_id:    String,
  pub matric_number: String,
  pub full_name:     String,
  pub department_id: String,
  pub created_at:    String,
}

impl RawStudent {
  pub const COLUMNS: &'static str =
    "student_id, matric_number, full_name, department_id, created_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      student_id:    row.get(0)?,
      matric_number: row.get(1)?,
      full_name:     row.get(2)?,
      department_id: row.get(3)?,
      created_at:    row.get(4)?,
    })
  }

  pub fn into_student(self) -> Result<Student> {
    Ok(Student {
      student_id:    decode_uuid(&self.student_id)?,
      matric_number: self.matric_number,
      full_name:     self.full_name,
      department_id: decode_uuid(&self.department_id)?,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawLevelSelection {
  pub student_id:  String,
  pub level_id:    String,
  pub selected_at: String,
  pub updated_at:  String,
}

impl RawLevelSelection {
  pub const COLUMNS: &'static str = "student_id, level_id, selected_at, updated_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      student_id:  row.get(0)?,
      level_id:    row.get(1)?,
      selected_at: row.get(2)?,
      updated_at:  row.get(3)?,
    })
  }

  pub fn into_selection(self) -> Result<LevelSelection> {
    Ok(LevelSelection {
      student_id:  decode_uuid(&self.student_id)?,
      level_id:    decode_uuid(&self.level_id)?,
      selected_at: decode_dt(&self.selected_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawCourseSelection {
  pub selection_id:  String,
  pub student_id:    String,
  pub department_id: String,
  pub level_id:      String,
  pub course_id:     String,
  pub is_offered:    bool,
  pub is_approved:   bool,
  pub created_at:    String,
  pub updated_at:    String,
}

impl RawCourseSelection {
  pub const COLUMNS: &'static str = "selection_id, student_id, department_id, \
                                     level_id, course_id, is_offered, \
                                     is_approved, created_at, updated_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      selection_id:  row.get(0)?,
      student_id:    row.get(1)?,
      department_id: row.get(2)?,
      level_id:      row.get(3)?,
      course_id:     row.get(4)?,
      is_offered:    row.get(5)?,
      is_approved:   row.get(6)?,
      created_at:    row.get(7)?,
      updated_at:    row.get(8)?,
    })
  }

  pub fn into_selection(self) -> Result<CourseSelection> {
    Ok(CourseSelection {
      selection_id:  decode_uuid(&self.selection_id)?,
      student_id:    decode_uuid(&self.student_id)?,
      department_id: decode_uuid(&self.department_id)?,
      level_id:      decode_uuid(&self.level_id)?,
      course_id:     decode_uuid(&self.course_id)?,
      is_offered:    self.is_offered,
      is_approved:   self.is_approved,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawAuditEntry {
  pub entry_id:       String,
  pub student_id:     String,
  pub course_id:      String,
  pub level_id:       String,
  pub department_id:  String,
  pub action:         String,
  pub old_is_offered: Option<bool>,
  pub new_is_offered: bool,
  pub recorded_at:    String,
  pub ip_address:     Option<String>,
  pub user_agent:     Option<String>,
  pub session_key:    Option<String>,
  pub reason:         String,
  pub batch_id:       Option<String>,
}

impl RawAuditEntry {
  pub const COLUMNS: &'static str = "entry_id, student_id, course_id, level_id, \
                                     department_id, action, old_is_offered, \
                                     new_is_offered, recorded_at, ip_address, \
                                     user_agent, session_key, reason, batch_id";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entry_id:       row.get(0)?,
      student_id:     row.get(1)?,
      course_id:      row.get(2)?,
      level_id:       row.get(3)?,
      department_id:  row.get(4)?,
      action:         row.get(5)?,
      old_is_offered: row.get(6)?,
      new_is_offered: row.get(7)?,
      recorded_at:    row.get(8)?,
      ip_address:     row.get(9)?,
      user_agent:     row.get(10)?,
      session_key:    row.get(11)?,
      reason:         row.get(12)?,
      batch_id:       row.get(13)?,
    })
  }

  pub fn into_entry(self) -> Result<AuditLogEntry> {
    Ok(AuditLogEntry {
      entry_id:       decode_uuid(&self.entry_id)?,
      student_id:     decode_uuid(&self.student_id)?,
      course_id:      decode_uuid(&self.course_id)?,
      level_id:       decode_uuid(&self.level_id)?,
      department_id:  decode_uuid(&self.department_id)?,
      action:         decode_enum("audit action", &self.action)?,
      old_is_offered: self.old_is_offered,
      new_is_offered: self.new_is_offered,
      recorded_at:    decode_dt(&self.recorded_at)?,
      actor:          ActorContext {
        ip_address:  self.ip_address,
        user_agent:  self.user_agent,
        session_key: self.session_key,
      },
      reason:         self.reason,
      batch_id:       decode_opt_uuid(self.batch_id.as_deref())?,
    })
  }
}

pub struct RawSession {
  pub session_id:           String,
  pub slot_id:              String,
  pub date:                 String,
  pub state:                String,
  pub attendance_threshold: f64,
  pub opened_at:            Option<String>,
  pub activated_at:         Option<String>,
  pub closed_at:            Option<String>,
  pub cancelled_at:         Option<String>,
  pub cancel_reason:        Option<String>,
  pub created_at:           String,
}

impl RawSession {
  pub const COLUMNS: &'static str = "session_id, slot_id, date, state, \
                                     attendance_threshold, opened_at, \
                                     activated_at, closed_at, cancelled_at, \
                                     cancel_reason, created_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      session_id:           row.get(0)?,
      slot_id:              row.get(1)?,
      date:                 row.get(2)?,
      state:                row.get(3)?,
      attendance_threshold: row.get(4)?,
      opened_at:            row.get(5)?,
      activated_at:         row.get(6)?,
      closed_at:            row.get(7)?,
      cancelled_at:         row.get(8)?,
      cancel_reason:        row.get(9)?,
      created_at:           row.get(10)?,
    })
  }

  pub fn into_session(self) -> Result<ClassSession> {
    Ok(ClassSession {
      session_id:           decode_uuid(&self.session_id)?,
      slot_id:              decode_uuid(&self.slot_id)?,
      date:                 decode_date(&self.date)?,
      state:                decode_enum("session state", &self.state)?,
      attendance_threshold: self.attendance_threshold,
      opened_at:            decode_opt_dt(self.opened_at.as_deref())?,
      activated_at:         decode_opt_dt(self.activated_at.as_deref())?,
      closed_at:            decode_opt_dt(self.closed_at.as_deref())?,
      cancelled_at:         decode_opt_dt(self.cancelled_at.as_deref())?,
      cancel_reason:        self.cancel_reason,
      created_at:           decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawAttendance {
  pub record_id:         String,
  pub student_id:        String,
  pub slot_id:           String,
  pub date:              String,
  pub status:            String,
  pub source:            String,
  pub recorded_at:       String,
  pub detection_count:   u32,
  pub first_detected_at: Option<String>,
  pub last_detected_at:  Option<String>,
  pub presence_secs:     Option<i64>,
  pub class_secs:        Option<i64>,
}

impl RawAttendance {
  pub const COLUMNS: &'static str = "record_id, student_id, slot_id, date, \
                                     status, source, recorded_at, \
                                     detection_count, first_detected_at, \
                                     last_detected_at, presence_secs, \
                                     class_secs";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:         row.get(0)?,
      student_id:        row.get(1)?,
      slot_id:           row.get(2)?,
      date:              row.get(3)?,
      status:            row.get(4)?,
      source:            row.get(5)?,
      recorded_at:       row.get(6)?,
      detection_count:   row.get(7)?,
      first_detected_at: row.get(8)?,
      last_detected_at:  row.get(9)?,
      presence_secs:     row.get(10)?,
      class_secs:        row.get(11)?,
    })
  }

  pub fn into_record(self) -> Result<AttendanceRecord> {
    Ok(AttendanceRecord {
      record_id:         decode_uuid(&self.record_id)?,
      student_id:        decode_uuid(&self.student_id)?,
      slot_id:           decode_uuid(&self.slot_id)?,
      date:              decode_date(&self.date)?,
      status:            decode_enum("attendance status", &self.status)?,
      source:            decode_enum("attendance source", &self.source)?,
      recorded_at:       decode_dt(&self.recorded_at)?,
      detection_count:   self.detection_count,
      first_detected_at: decode_opt_dt(self.first_detected_at.as_deref())?,
      last_detected_at:  decode_opt_dt(self.last_detected_at.as_deref())?,
      presence_secs:     self.presence_secs,
      class_secs:        self.class_secs,
    })
  }
}
