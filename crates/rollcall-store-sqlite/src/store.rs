//! [`SqliteStore`], the SQLite implementation of [`AttendanceStore`].

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rollcall_core::{
  attendance::{
    AttendanceInsert, AttendanceQuery, AttendanceRecord, AttendanceStatus, NewAttendance,
  },
  audit::{AuditChange, AuditContext, AuditLogEntry, AuditQuery},
  catalog::{
    AcademicLevel, Course, Department, NewCourse, NewDepartment, NewLevel, NewSlot,
    NewTimetable, SlotQuery, Timetable, TimetableSlot,
  },
  enrollment::{
    CourseSelection, LevelChange, LevelChangeOutcome, LevelSelection, SelectionChange,
    SelectionOp, SelectionWrite,
  },
  session::{
    ClassSession, SessionAction, SessionState, SessionTransition,
    DEFAULT_ATTENDANCE_THRESHOLD,
  },
  store::AttendanceStore,
  student::{NewStudent, Student},
};
use rusqlite::{params, types::Value, Connection, OptionalExtension as _, Row, Transaction};
use uuid::Uuid;

use crate::{
  encode::{
    encode_date, encode_dt, encode_time, encode_uuid, RawAttendance, RawAuditEntry,
    RawCourse, RawCourseSelection, RawDepartment, RawLevel, RawLevelSelection,
    RawSession, RawSlot, RawStudent, RawTimetable,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Rollcall store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

type RowMapper<R> = fn(&Row<'_>) -> rusqlite::Result<R>;

fn text(s: String) -> Value { Value::Text(s) }

fn opt_text(s: Option<String>) -> Value { s.map_or(Value::Null, Value::Text) }

fn limit_value(limit: Option<usize>) -> Value {
  // SQLite treats a negative LIMIT as "no limit".
  Value::Integer(limit.map_or(-1, |l| l as i64))
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    tracing::debug!("sqlite schema initialised");
    Ok(())
  }

  /// Run a single-row lookup keyed on one text parameter.
  async fn query_opt<R: Send + 'static>(
    &self,
    sql: String,
    key: String,
    map: RowMapper<R>,
  ) -> Result<Option<R>> {
    Ok(
      self
        .conn
        .call(move |conn| Ok(conn.query_row(&sql, [key], map).optional()?))
        .await?,
    )
  }

  /// Run a multi-row query with positional parameters.
  async fn query_all<R: Send + 'static>(
    &self,
    sql: String,
    args: Vec<Value>,
    map: RowMapper<R>,
  ) -> Result<Vec<R>> {
    Ok(
      self
        .conn
        .call(move |conn| {
          let mut stmt = conn.prepare(&sql)?;
          let rows = stmt
            .query_map(rusqlite::params_from_iter(args), map)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }
}

// ─── Transaction helpers ─────────────────────────────────────────────────────

fn select_course_selection(
  conn: &Connection,
  student_id: &str,
  course_id: &str,
  level_id: &str,
) -> rusqlite::Result<Option<RawCourseSelection>> {
  conn
    .query_row(
      &format!(
        "SELECT {} FROM course_selections
         WHERE student_id = ?1 AND course_id = ?2 AND level_id = ?3",
        RawCourseSelection::COLUMNS
      ),
      params![student_id, course_id, level_id],
      RawCourseSelection::from_row,
    )
    .optional()
}

fn select_attendance_by_key(
  conn: &Connection,
  student_id: &str,
  slot_id: &str,
  date: &str,
) -> rusqlite::Result<RawAttendance> {
  conn.query_row(
    &format!(
      "SELECT {} FROM attendance_records
       WHERE student_id = ?1 AND slot_id = ?2 AND date = ?3",
      RawAttendance::COLUMNS
    ),
    params![student_id, slot_id, date],
    RawAttendance::from_row,
  )
}

/// The audit row for one selection change, built before it is written.
fn pending_audit(
  change: AuditChange,
  student_id: &str,
  course_id: &str,
  level_id: &str,
  department_id: &str,
  ctx: &AuditContext,
) -> RawAuditEntry {
  RawAuditEntry {
    entry_id:       encode_uuid(Uuid::new_v4()),
    student_id:     student_id.to_owned(),
    course_id:      course_id.to_owned(),
    level_id:       level_id.to_owned(),
    department_id:  department_id.to_owned(),
    action:         change.action.as_ref().to_owned(),
    old_is_offered: change.old_is_offered,
    new_is_offered: change.new_is_offered,
    recorded_at:    encode_dt(Utc::now()),
    ip_address:     ctx.actor.ip_address.clone(),
    user_agent:     ctx.actor.user_agent.clone(),
    session_key:    ctx.actor.session_key.clone(),
    reason:         ctx.reason.clone(),
    batch_id:       ctx.batch_id.map(encode_uuid),
  }
}

/// Append an audit row inside a savepoint of the caller's transaction.
///
/// A failed insert rolls back only the savepoint and is logged; the
/// surrounding write goes ahead without an entry.
fn append_audit(
  tx: &mut Transaction<'_>,
  row: RawAuditEntry,
) -> rusqlite::Result<Option<RawAuditEntry>> {
  let sp = tx.savepoint()?;
  let written = sp.execute(
    &format!(
      "INSERT INTO audit_log ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
      RawAuditEntry::COLUMNS
    ),
    params![
      row.entry_id,
      row.student_id,
      row.course_id,
      row.level_id,
      row.department_id,
      row.action,
      row.old_is_offered,
      row.new_is_offered,
      row.recorded_at,
      row.ip_address,
      row.user_agent,
      row.session_key,
      row.reason,
      row.batch_id,
    ],
  );
  match written {
    Ok(_) => {
      sp.commit()?;
      Ok(Some(row))
    }
    Err(error) => {
      tracing::warn!(
        %error,
        student_id = %row.student_id,
        course_id = %row.course_id,
        action = %row.action,
        "audit entry not written; continuing without it"
      );
      Ok(None)
    }
  }
}

fn session_timestamp_column(action: SessionAction) -> &'static str {
  match action {
    SessionAction::Open => "opened_at",
    SessionAction::Activate => "activated_at",
    SessionAction::Close => "closed_at",
    SessionAction::Cancel => "cancelled_at",
  }
}

// ─── AttendanceStore impl ────────────────────────────────────────────────────

impl AttendanceStore for SqliteStore {
  type Error = Error;

  // ── Catalog ───────────────────────────────────────────────────────────────

  async fn add_department(&self, input: NewDepartment) -> Result<Department> {
    let department = Department {
      department_id: Uuid::new_v4(),
      code:          input.code,
      name:          input.name,
    };

    let id_str = encode_uuid(department.department_id);
    let code   = department.code.clone();
    let name   = department.name.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO departments (department_id, code, name) VALUES (?1, ?2, ?3)",
          params![id_str, code, name],
        )?;
        Ok(())
      })
      .await?;

    Ok(department)
  }

  async fn get_department(&self, department_id: Uuid) -> Result<Option<Department>> {
    let sql = format!(
      "SELECT {} FROM departments WHERE department_id = ?1",
      RawDepartment::COLUMNS
    );
    self
      .query_opt(sql, encode_uuid(department_id), RawDepartment::from_row)
      .await?
      .map(RawDepartment::into_department)
      .transpose()
  }

  async fn add_level(&self, input: NewLevel) -> Result<AcademicLevel> {
    let level = AcademicLevel {
      level_id:      Uuid::new_v4(),
      department_id: input.department_id,
      code:          input.code,
      name:          input.name,
    };

    let id_str   = encode_uuid(level.level_id);
    let dept_str = encode_uuid(level.department_id);
    let code     = level.code.clone();
    let name     = level.name.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO academic_levels (level_id, department_id, code, name)
           VALUES (?1, ?2, ?3, ?4)",
          params![id_str, dept_str, code, name],
        )?;
        Ok(())
      })
      .await?;

    Ok(level)
  }

  async fn get_level(&self, level_id: Uuid) -> Result<Option<AcademicLevel>> {
    let sql = format!(
      "SELECT {} FROM academic_levels WHERE level_id = ?1",
      RawLevel::COLUMNS
    );
    self
      .query_opt(sql, encode_uuid(level_id), RawLevel::from_row)
      .await?
      .map(RawLevel::into_level)
      .transpose()
  }

  async fn list_levels(&self, department_id: Uuid) -> Result<Vec<AcademicLevel>> {
    let sql = format!(
      "SELECT {} FROM academic_levels WHERE department_id = ?1 ORDER BY code",
      RawLevel::COLUMNS
    );
    self
      .query_all(sql, vec![text(encode_uuid(department_id))], RawLevel::from_row)
      .await?
      .into_iter()
      .map(RawLevel::into_level)
      .collect()
  }

  async fn add_course(&self, input: NewCourse) -> Result<Course> {
    let course = Course {
      course_id:     Uuid::new_v4(),
      department_id: input.department_id,
      code:          input.code,
      title:         input.title,
    };

    let id_str   = encode_uuid(course.course_id);
    let dept_str = encode_uuid(course.department_id);
    let code     = course.code.clone();
    let title    = course.title.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO courses (course_id, department_id, code, title)
           VALUES (?1, ?2, ?3, ?4)",
          params![id_str, dept_str, code, title],
        )?;
        Ok(())
      })
      .await?;

    Ok(course)
  }

  async fn get_course(&self, course_id: Uuid) -> Result<Option<Course>> {
    let sql = format!("SELECT {} FROM courses WHERE course_id = ?1", RawCourse::COLUMNS);
    self
      .query_opt(sql, encode_uuid(course_id), RawCourse::from_row)
      .await?
      .map(RawCourse::into_course)
      .transpose()
  }

  async fn add_timetable(&self, input: NewTimetable) -> Result<Timetable> {
    let timetable = Timetable {
      timetable_id:  Uuid::new_v4(),
      department_id: input.department_id,
      level_id:      input.level_id,
      name:          input.name,
      is_published:  false,
      created_at:    Utc::now(),
    };

    let id_str    = encode_uuid(timetable.timetable_id);
    let dept_str  = encode_uuid(timetable.department_id);
    let level_str = encode_uuid(timetable.level_id);
    let name      = timetable.name.clone();
    let at_str    = encode_dt(timetable.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO timetables (timetable_id, department_id, level_id, name, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          params![id_str, dept_str, level_str, name, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(timetable)
  }

  async fn get_timetable(&self, timetable_id: Uuid) -> Result<Option<Timetable>> {
    let sql = format!(
      "SELECT {} FROM timetables WHERE timetable_id = ?1",
      RawTimetable::COLUMNS
    );
    self
      .query_opt(sql, encode_uuid(timetable_id), RawTimetable::from_row)
      .await?
      .map(RawTimetable::into_timetable)
      .transpose()
  }

  async fn mark_timetable_published(&self, timetable_id: Uuid) -> Result<Option<Timetable>> {
    let id_str = encode_uuid(timetable_id);

    let raw: Option<RawTimetable> = self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE timetables SET is_published = 1 WHERE timetable_id = ?1",
          params![id_str],
        )?;
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM timetables WHERE timetable_id = ?1",
                RawTimetable::COLUMNS
              ),
              params![id_str],
              RawTimetable::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTimetable::into_timetable).transpose()
  }

  async fn add_slot(&self, input: NewSlot) -> Result<TimetableSlot> {
    let slot = TimetableSlot {
      slot_id:       Uuid::new_v4(),
      timetable_id:  input.timetable_id,
      department_id: input.department_id,
      level_id:      input.level_id,
      course_id:     input.course_id,
      instructor:    input.instructor,
      day_of_week:   input.day_of_week,
      start_time:    input.start_time,
      end_time:      input.end_time,
      venue:         input.venue,
      created_at:    Utc::now(),
    };

    let args = params_vec(&slot);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO timetable_slots ({})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            RawSlot::COLUMNS
          ),
          rusqlite::params_from_iter(args),
        )?;
        Ok(())
      })
      .await?;

    Ok(slot)
  }

  async fn get_slot(&self, slot_id: Uuid) -> Result<Option<TimetableSlot>> {
    let sql = format!("SELECT {} FROM timetable_slots WHERE slot_id = ?1", RawSlot::COLUMNS);
    self
      .query_opt(sql, encode_uuid(slot_id), RawSlot::from_row)
      .await?
      .map(RawSlot::into_slot)
      .transpose()
  }

  async fn list_slots(&self, query: SlotQuery) -> Result<Vec<TimetableSlot>> {
    // Insertion order doubles as the tie-break between overlapping slots.
    let sql = format!(
      "SELECT {} FROM timetable_slots
       WHERE (?1 IS NULL OR timetable_id  = ?1)
         AND (?2 IS NULL OR department_id = ?2)
         AND (?3 IS NULL OR level_id      = ?3)
         AND (?4 IS NULL OR course_id     = ?4)
         AND (?5 IS NULL OR day_of_week   = ?5)
       ORDER BY rowid",
      RawSlot::COLUMNS
    );
    let args = vec![
      opt_text(query.timetable_id.map(encode_uuid)),
      opt_text(query.department_id.map(encode_uuid)),
      opt_text(query.level_id.map(encode_uuid)),
      opt_text(query.course_id.map(encode_uuid)),
      opt_text(query.day_of_week.map(|d| d.as_ref().to_owned())),
    ];
    self
      .query_all(sql, args, RawSlot::from_row)
      .await?
      .into_iter()
      .map(RawSlot::into_slot)
      .collect()
  }

  // ── Students ──────────────────────────────────────────────────────────────

  async fn add_student(&self, input: NewStudent) -> Result<Student> {
    let student = Student {
      student_id:    Uuid::new_v4(),
      matric_number: input.matric_number,
      full_name:     input.full_name,
      department_id: input.department_id,
      created_at:    Utc::now(),
    };

    let id_str   = encode_uuid(student.student_id);
    let matric   = student.matric_number.clone();
    let name     = student.full_name.clone();
    let dept_str = encode_uuid(student.department_id);
    let at_str   = encode_dt(student.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO students (student_id, matric_number, full_name, department_id, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          params![id_str, matric, name, dept_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(student)
  }

  async fn get_student(&self, student_id: Uuid) -> Result<Option<Student>> {
    let sql = format!("SELECT {} FROM students WHERE student_id = ?1", RawStudent::COLUMNS);
    self
      .query_opt(sql, encode_uuid(student_id), RawStudent::from_row)
      .await?
      .map(RawStudent::into_student)
      .transpose()
  }

  async fn find_student_by_matric(&self, matric_number: &str) -> Result<Option<Student>> {
    let sql = format!(
      "SELECT {} FROM students WHERE matric_number = ?1",
      RawStudent::COLUMNS
    );
    self
      .query_opt(sql, matric_number.to_owned(), RawStudent::from_row)
      .await?
      .map(RawStudent::into_student)
      .transpose()
  }

  async fn list_students_at_level(
    &self,
    department_id: Uuid,
    level_id:      Uuid,
  ) -> Result<Vec<Student>> {
    let sql = format!(
      "SELECT {} FROM students
       WHERE department_id = ?1
         AND student_id IN (SELECT student_id FROM level_selections WHERE level_id = ?2)
       ORDER BY matric_number",
      RawStudent::COLUMNS
    );
    let args = vec![text(encode_uuid(department_id)), text(encode_uuid(level_id))];
    self
      .query_all(sql, args, RawStudent::from_row)
      .await?
      .into_iter()
      .map(RawStudent::into_student)
      .collect()
  }

  // ── Enrollment ────────────────────────────────────────────────────────────

  async fn get_level_selection(&self, student_id: Uuid) -> Result<Option<LevelSelection>> {
    let sql = format!(
      "SELECT {} FROM level_selections WHERE student_id = ?1",
      RawLevelSelection::COLUMNS
    );
    self
      .query_opt(sql, encode_uuid(student_id), RawLevelSelection::from_row)
      .await?
      .map(RawLevelSelection::into_selection)
      .transpose()
  }

  async fn change_level(&self, change: LevelChange) -> Result<LevelChangeOutcome> {
    let student_str = encode_uuid(change.student_id);
    let dept_str    = encode_uuid(change.department_id);
    let level_str   = encode_uuid(change.level_id);
    let at_str      = encode_dt(Utc::now());
    let ctx         = change.audit;

    let (selection, removed, audit) = self
      .conn
      .call(move |conn| {
        let mut tx = conn.transaction()?;

        let current: Option<String> = tx
          .query_row(
            "SELECT level_id FROM level_selections WHERE student_id = ?1",
            params![student_str],
            |r| r.get(0),
          )
          .optional()?;

        let mut removed = Vec::new();
        let mut audit = Vec::new();

        if current.as_deref() != Some(level_str.as_str()) {
          tx.execute(
            "INSERT INTO level_selections (student_id, level_id, selected_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT (student_id) DO UPDATE SET
               level_id   = excluded.level_id,
               updated_at = excluded.updated_at",
            params![student_str, level_str, at_str],
          )?;

          removed = {
            let mut stmt = tx.prepare(&format!(
              "SELECT {} FROM course_selections WHERE student_id = ?1 ORDER BY rowid",
              RawCourseSelection::COLUMNS
            ))?;
            let rows = stmt
              .query_map(params![student_str], RawCourseSelection::from_row)?
              .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
          };

          tx.execute(
            "DELETE FROM course_selections WHERE student_id = ?1",
            params![student_str],
          )?;

          for row in &removed {
            let Some(deleted) = AuditChange::between(Some(row.is_offered), None) else {
              continue;
            };
            let pending = pending_audit(
              deleted,
              &row.student_id,
              &row.course_id,
              &row.level_id,
              &dept_str,
              &ctx,
            );
            if let Some(entry) = append_audit(&mut tx, pending)? {
              audit.push(entry);
            }
          }
        }

        let selection = tx.query_row(
          &format!(
            "SELECT {} FROM level_selections WHERE student_id = ?1",
            RawLevelSelection::COLUMNS
          ),
          params![student_str],
          RawLevelSelection::from_row,
        )?;

        tx.commit()?;
        Ok((selection, removed, audit))
      })
      .await?;

    Ok(LevelChangeOutcome {
      selection: selection.into_selection()?,
      removed:   removed
        .into_iter()
        .map(RawCourseSelection::into_selection)
        .collect::<Result<_>>()?,
      audit:     audit
        .into_iter()
        .map(RawAuditEntry::into_entry)
        .collect::<Result<_>>()?,
    })
  }

  async fn get_course_selection(
    &self,
    student_id: Uuid,
    course_id:  Uuid,
    level_id:   Uuid,
  ) -> Result<Option<CourseSelection>> {
    let student_str = encode_uuid(student_id);
    let course_str  = encode_uuid(course_id);
    let level_str   = encode_uuid(level_id);

    let raw = self
      .conn
      .call(move |conn| {
        Ok(select_course_selection(conn, &student_str, &course_str, &level_str)?)
      })
      .await?;

    raw.map(RawCourseSelection::into_selection).transpose()
  }

  async fn list_course_selections(
    &self,
    student_id: Uuid,
    level_id:   Option<Uuid>,
  ) -> Result<Vec<CourseSelection>> {
    let sql = format!(
      "SELECT {} FROM course_selections
       WHERE student_id = ?1 AND (?2 IS NULL OR level_id = ?2)
       ORDER BY rowid",
      RawCourseSelection::COLUMNS
    );
    let args = vec![text(encode_uuid(student_id)), opt_text(level_id.map(encode_uuid))];
    self
      .query_all(sql, args, RawCourseSelection::from_row)
      .await?
      .into_iter()
      .map(RawCourseSelection::into_selection)
      .collect()
  }

  async fn list_selections_for_course(
    &self,
    course_id: Uuid,
    level_id:  Uuid,
  ) -> Result<Vec<CourseSelection>> {
    let sql = format!(
      "SELECT {} FROM course_selections
       WHERE course_id = ?1 AND level_id = ?2
       ORDER BY rowid",
      RawCourseSelection::COLUMNS
    );
    let args = vec![text(encode_uuid(course_id)), text(encode_uuid(level_id))];
    self
      .query_all(sql, args, RawCourseSelection::from_row)
      .await?
      .into_iter()
      .map(RawCourseSelection::into_selection)
      .collect()
  }

  async fn write_course_selections(
    &self,
    writes: Vec<SelectionWrite>,
    audit:  AuditContext,
  ) -> Result<Vec<SelectionChange>> {
    let raws = self
      .conn
      .call(move |conn| {
        let mut tx = conn.transaction()?;
        let mut out = Vec::with_capacity(writes.len());

        for write in writes {
          let student = encode_uuid(write.student_id);
          let dept    = encode_uuid(write.department_id);
          let level   = encode_uuid(write.level_id);
          let course  = encode_uuid(write.course_id);

          let before = select_course_selection(&tx, &student, &course, &level)?;

          match write.op {
            SelectionOp::Upsert { is_offered, is_approved } => {
              tx.execute(
                &format!(
                  "INSERT INTO course_selections ({})
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                   ON CONFLICT (student_id, course_id, level_id) DO UPDATE SET
                     is_offered  = excluded.is_offered,
                     is_approved = excluded.is_approved,
                     updated_at  = excluded.updated_at",
                  RawCourseSelection::COLUMNS
                ),
                params![
                  encode_uuid(Uuid::new_v4()),
                  student,
                  dept,
                  level,
                  course,
                  is_offered,
                  is_approved,
                  encode_dt(Utc::now()),
                ],
              )?;
            }
            SelectionOp::Delete => {
              tx.execute(
                "DELETE FROM course_selections
                 WHERE student_id = ?1 AND course_id = ?2 AND level_id = ?3",
                params![student, course, level],
              )?;
            }
          }

          let after = select_course_selection(&tx, &student, &course, &level)?;

          let change = AuditChange::between(
            before.as_ref().map(|r| r.is_offered),
            after.as_ref().map(|r| r.is_offered),
          );
          let entry = match change {
            Some(change) => append_audit(
              &mut tx,
              pending_audit(change, &student, &course, &level, &dept, &audit),
            )?,
            None => None,
          };

          out.push((before, after, entry));
        }

        tx.commit()?;
        Ok(out)
      })
      .await?;

    raws
      .into_iter()
      .map(|(before, after, entry)| -> Result<SelectionChange> {
        Ok(SelectionChange {
          before: before.map(RawCourseSelection::into_selection).transpose()?,
          after:  after.map(RawCourseSelection::into_selection).transpose()?,
          audit:  entry.map(RawAuditEntry::into_entry).transpose()?,
        })
      })
      .collect()
  }

  // ── Audit ─────────────────────────────────────────────────────────────────

  async fn list_audit_entries(&self, query: AuditQuery) -> Result<Vec<AuditLogEntry>> {
    let sql = format!(
      "SELECT {} FROM audit_log
       WHERE (?1 IS NULL OR student_id    = ?1)
         AND (?2 IS NULL OR course_id     = ?2)
         AND (?3 IS NULL OR department_id = ?3)
         AND (?4 IS NULL OR action        = ?4)
         AND (?5 IS NULL OR batch_id      = ?5)
       ORDER BY rowid DESC
       LIMIT ?6",
      RawAuditEntry::COLUMNS
    );
    let args = vec![
      opt_text(query.student_id.map(encode_uuid)),
      opt_text(query.course_id.map(encode_uuid)),
      opt_text(query.department_id.map(encode_uuid)),
      opt_text(query.action.map(|a| a.as_ref().to_owned())),
      opt_text(query.batch_id.map(encode_uuid)),
      limit_value(query.limit),
    ];
    self
      .query_all(sql, args, RawAuditEntry::from_row)
      .await?
      .into_iter()
      .map(RawAuditEntry::into_entry)
      .collect()
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  async fn ensure_session(&self, slot_id: Uuid, date: NaiveDate) -> Result<ClassSession> {
    let slot_str = encode_uuid(slot_id);
    let date_str = encode_date(date);
    let id_str   = encode_uuid(Uuid::new_v4());
    let at_str   = encode_dt(Utc::now());
    let state    = SessionState::Scheduled.as_ref().to_owned();

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO class_sessions
             (session_id, slot_id, date, state, attendance_threshold, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (slot_id, date) DO NOTHING",
          params![id_str, slot_str, date_str, state, DEFAULT_ATTENDANCE_THRESHOLD, at_str],
        )?;
        Ok(conn.query_row(
          &format!(
            "SELECT {} FROM class_sessions WHERE slot_id = ?1 AND date = ?2",
            RawSession::COLUMNS
          ),
          params![slot_str, date_str],
          RawSession::from_row,
        )?)
      })
      .await?;

    raw.into_session()
  }

  async fn get_session(&self, session_id: Uuid) -> Result<Option<ClassSession>> {
    let sql = format!(
      "SELECT {} FROM class_sessions WHERE session_id = ?1",
      RawSession::COLUMNS
    );
    self
      .query_opt(sql, encode_uuid(session_id), RawSession::from_row)
      .await?
      .map(RawSession::into_session)
      .transpose()
  }

  async fn find_session(&self, slot_id: Uuid, date: NaiveDate) -> Result<Option<ClassSession>> {
    let sql = format!(
      "SELECT {} FROM class_sessions WHERE slot_id = ?1 AND date = ?2",
      RawSession::COLUMNS
    );
    let args = vec![text(encode_uuid(slot_id)), text(encode_date(date))];
    Ok(
      self
        .query_all(sql, args, RawSession::from_row)
        .await?
        .into_iter()
        .next()
        .map(RawSession::into_session)
        .transpose()?,
    )
  }

  async fn transition_session(
    &self,
    transition: SessionTransition,
  ) -> Result<Option<ClassSession>> {
    let action  = transition.action;
    let column  = session_timestamp_column(action);
    let allowed = action
      .allowed_from()
      .iter()
      .map(|s| format!("'{}'", s.as_ref()))
      .collect::<Vec<_>>()
      .join(", ");
    let sql = format!(
      "UPDATE class_sessions
       SET state = ?1, {column} = ?2, cancel_reason = COALESCE(?3, cancel_reason)
       WHERE session_id = ?4 AND state IN ({allowed})"
    );

    let id_str = encode_uuid(transition.session_id);
    let target = action.target().as_ref().to_owned();
    let at_str = encode_dt(transition.at);
    let reason = match action {
      SessionAction::Cancel => transition.reason,
      _ => None,
    };

    let raw = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(&sql, params![target, at_str, reason, id_str])?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(Some(conn.query_row(
          &format!(
            "SELECT {} FROM class_sessions WHERE session_id = ?1",
            RawSession::COLUMNS
          ),
          params![id_str],
          RawSession::from_row,
        )?))
      })
      .await?;

    raw.map(RawSession::into_session).transpose()
  }

  // ── Attendance ────────────────────────────────────────────────────────────

  async fn insert_attendance(&self, input: NewAttendance) -> Result<AttendanceInsert> {
    let id_str      = encode_uuid(Uuid::new_v4());
    let student_str = encode_uuid(input.student_id);
    let slot_str    = encode_uuid(input.slot_id);
    let date_str    = encode_date(input.date);
    let status      = input.status.as_ref().to_owned();
    let source      = input.source.as_ref().to_owned();
    let at_str      = encode_dt(Utc::now());
    let class_secs  = input.class_secs;

    let (inserted, raw) = self
      .conn
      .call(move |conn| {
        let inserted = conn.execute(
          "INSERT INTO attendance_records
             (record_id, student_id, slot_id, date, status, source, recorded_at, class_secs)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
           ON CONFLICT (student_id, slot_id, date) DO NOTHING",
          params![id_str, student_str, slot_str, date_str, status, source, at_str, class_secs],
        )?;
        let raw = select_attendance_by_key(conn, &student_str, &slot_str, &date_str)?;
        Ok((inserted == 1, raw))
      })
      .await?;

    let record = raw.into_record()?;
    Ok(if inserted {
      AttendanceInsert::Inserted(record)
    } else {
      AttendanceInsert::Existing(record)
    })
  }

  async fn get_attendance(&self, record_id: Uuid) -> Result<Option<AttendanceRecord>> {
    let sql = format!(
      "SELECT {} FROM attendance_records WHERE record_id = ?1",
      RawAttendance::COLUMNS
    );
    self
      .query_opt(sql, encode_uuid(record_id), RawAttendance::from_row)
      .await?
      .map(RawAttendance::into_record)
      .transpose()
  }

  async fn list_attendance(&self, query: AttendanceQuery) -> Result<Vec<AttendanceRecord>> {
    let sql = format!(
      "SELECT {} FROM attendance_records
       WHERE (?1 IS NULL OR student_id = ?1)
         AND (?2 IS NULL OR slot_id    = ?2)
         AND (?3 IS NULL OR date       = ?3)
       ORDER BY date, rowid",
      RawAttendance::COLUMNS
    );
    let args = vec![
      opt_text(query.student_id.map(encode_uuid)),
      opt_text(query.slot_id.map(encode_uuid)),
      opt_text(query.date.map(encode_date)),
    ];
    self
      .query_all(sql, args, RawAttendance::from_row)
      .await?
      .into_iter()
      .map(RawAttendance::into_record)
      .collect()
  }

  async fn record_detection(
    &self,
    input: NewAttendance,
    at:    DateTime<Utc>,
  ) -> Result<AttendanceRecord> {
    let id_str      = encode_uuid(Uuid::new_v4());
    let student_str = encode_uuid(input.student_id);
    let slot_str    = encode_uuid(input.slot_id);
    let date_str    = encode_date(input.date);
    let status      = input.status.as_ref().to_owned();
    let source      = input.source.as_ref().to_owned();
    let at_str      = encode_dt(at);
    let class_secs  = input.class_secs;

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO attendance_records
             (record_id, student_id, slot_id, date, status, source, recorded_at,
              detection_count, first_detected_at, last_detected_at, class_secs)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?7, ?7, ?8)
           ON CONFLICT (student_id, slot_id, date) DO UPDATE SET
             detection_count   = detection_count + 1,
             first_detected_at = COALESCE(first_detected_at, excluded.first_detected_at),
             last_detected_at  = excluded.last_detected_at,
             class_secs        = COALESCE(class_secs, excluded.class_secs)",
          params![id_str, student_str, slot_str, date_str, status, source, at_str, class_secs],
        )?;
        Ok(select_attendance_by_key(conn, &student_str, &slot_str, &date_str)?)
      })
      .await?;

    raw.into_record()
  }

  async fn update_presence(
    &self,
    record_id:     Uuid,
    presence_secs: i64,
    status:        Option<AttendanceStatus>,
  ) -> Result<Option<AttendanceRecord>> {
    let id_str = encode_uuid(record_id);
    let status = status.map(|s| s.as_ref().to_owned());

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE attendance_records
           SET presence_secs = ?2, status = COALESCE(?3, status)
           WHERE record_id = ?1",
          params![id_str, presence_secs, status],
        )?;
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM attendance_records WHERE record_id = ?1",
                RawAttendance::COLUMNS
              ),
              params![id_str],
              RawAttendance::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAttendance::into_record).transpose()
  }
}

/// Positional parameters for an insert into `timetable_slots`, in
/// [`RawSlot::COLUMNS`] order.
fn params_vec(slot: &TimetableSlot) -> Vec<Value> {
  vec![
    text(encode_uuid(slot.slot_id)),
    text(encode_uuid(slot.timetable_id)),
    text(encode_uuid(slot.department_id)),
    text(encode_uuid(slot.level_id)),
    text(encode_uuid(slot.course_id)),
    opt_text(slot.instructor.clone()),
    text(slot.day_of_week.as_ref().to_owned()),
    text(encode_time(slot.start_time)),
    text(encode_time(slot.end_time)),
    text(slot.venue.clone()),
    text(encode_dt(slot.created_at)),
  ]
}
