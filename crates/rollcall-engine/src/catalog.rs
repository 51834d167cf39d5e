//! Schedule catalog operations: seeding, validated slot creation, conflict
//! reports, publishing, and the cached lookups the other services read.

use chrono::NaiveTime;
use rollcall_core::{
  catalog::{
    find_conflicts, AcademicLevel, Course, DayOfWeek, Department, NewCourse, NewDepartment,
    NewLevel, NewSlot, NewTimetable, SlotConflict, SlotQuery, Timetable, TimetableSlot,
  },
  store::AttendanceStore,
  student::{NewStudent, Student},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{cache::{CacheKey, CacheTag}, Engine, Error, Result};

/// A slot to add to an existing timetable. Department and level come from
/// the timetable.
#[derive(Debug, Clone, Deserialize)]
pub struct SlotRequest {
  pub course_id:   Uuid,
  pub instructor:  Option<String>,
  pub day_of_week: DayOfWeek,
  pub start_time:  NaiveTime,
  pub end_time:    NaiveTime,
  pub venue:       String,
}

fn require_text(field: &str, value: &str) -> Result<()> {
  if value.trim().is_empty() {
    return Err(Error::validation(format!("{field} must not be empty")));
  }
  Ok(())
}

impl<S: AttendanceStore> Engine<S> {
  // ── Seeding ───────────────────────────────────────────────────────────────

  pub async fn add_department(&self, input: NewDepartment) -> Result<Department> {
    require_text("code", &input.code)?;
    self.store.add_department(input).await.map_err(Error::store)
  }

  pub async fn add_level(&self, input: NewLevel) -> Result<AcademicLevel> {
    require_text("code", &input.code)?;
    self.department(input.department_id).await?;
    self.store.add_level(input).await.map_err(Error::store)
  }

  pub async fn add_course(&self, input: NewCourse) -> Result<Course> {
    require_text("code", &input.code)?;
    self.department(input.department_id).await?;
    self.store.add_course(input).await.map_err(Error::store)
  }

  pub async fn add_timetable(&self, input: NewTimetable) -> Result<Timetable> {
    let level = self.level(input.level_id).await?;
    if level.department_id != input.department_id {
      return Err(Error::validation("level does not belong to the timetable department"));
    }
    self.store.add_timetable(input).await.map_err(Error::store)
  }

  pub async fn add_student(&self, input: NewStudent) -> Result<Student> {
    require_text("matric_number", &input.matric_number)?;
    self.department(input.department_id).await?;
    if self
      .store
      .find_student_by_matric(&input.matric_number)
      .await
      .map_err(Error::store)?
      .is_some()
    {
      return Err(Error::validation(format!(
        "matric number {} is already registered",
        input.matric_number
      )));
    }
    self.store.add_student(input).await.map_err(Error::store)
  }

  /// Add a slot to `timetable_id`. Rejects an empty or inverted window, an
  /// unknown course, and a course from another department.
  pub async fn add_slot(&self, timetable_id: Uuid, input: SlotRequest) -> Result<TimetableSlot> {
    if input.start_time >= input.end_time {
      return Err(Error::validation("slot start time must be before its end time"));
    }
    let timetable = self.timetable(timetable_id).await?;
    let course = self
      .store
      .get_course(input.course_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::validation(format!("unknown course {}", input.course_id)))?;
    if course.department_id != timetable.department_id {
      return Err(Error::validation("course does not belong to the timetable department"));
    }

    let slot = self
      .store
      .add_slot(NewSlot {
        timetable_id,
        department_id: timetable.department_id,
        level_id: timetable.level_id,
        course_id: course.course_id,
        instructor: input.instructor,
        day_of_week: input.day_of_week,
        start_time: input.start_time,
        end_time: input.end_time,
        venue: input.venue,
      })
      .await
      .map_err(Error::store)?;

    self.invalidate(CacheTag::DepartmentLevel(slot.department_id, slot.level_id));
    tracing::info!(
      slot_id = %slot.slot_id,
      %timetable_id,
      day = %slot.day_of_week,
      window = %slot.window_label(),
      "slot added"
    );
    Ok(slot)
  }

  /// Every pair of slots in the timetable that overlap on the same day.
  pub async fn timetable_conflicts(&self, timetable_id: Uuid) -> Result<Vec<SlotConflict>> {
    self.timetable(timetable_id).await?;
    let slots = self
      .store
      .list_slots(SlotQuery { timetable_id: Some(timetable_id), ..Default::default() })
      .await
      .map_err(Error::store)?;
    Ok(find_conflicts(&slots))
  }

  /// Mark the timetable published, refusing while any slots overlap.
  pub async fn publish_timetable(&self, timetable_id: Uuid) -> Result<Timetable> {
    let conflicts = self.timetable_conflicts(timetable_id).await?;
    if !conflicts.is_empty() {
      return Err(Error::validation(format!(
        "timetable has {} overlapping slot pair(s)",
        conflicts.len()
      )));
    }
    let timetable = self
      .store
      .mark_timetable_published(timetable_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("timetable", timetable_id))?;
    self.invalidate(CacheTag::DepartmentLevel(timetable.department_id, timetable.level_id));
    tracing::info!(%timetable_id, "timetable published");
    Ok(timetable)
  }

  // ── Cached lookups ────────────────────────────────────────────────────────

  pub async fn department(&self, department_id: Uuid) -> Result<Department> {
    let key = CacheKey::new("department", &[&department_id]);
    self
      .cached(key, self.ttl.identity, &[], move || async move {
        self
          .store
          .get_department(department_id)
          .await
          .map_err(Error::store)?
          .ok_or_else(|| Error::not_found("department", department_id))
      })
      .await
  }

  pub async fn level(&self, level_id: Uuid) -> Result<AcademicLevel> {
    let key = CacheKey::new("level", &[&level_id]);
    self
      .cached(key, self.ttl.identity, &[], move || async move {
        self
          .store
          .get_level(level_id)
          .await
          .map_err(Error::store)?
          .ok_or_else(|| Error::not_found("level", level_id))
      })
      .await
  }

  pub async fn course(&self, course_id: Uuid) -> Result<Course> {
    let key = CacheKey::new("course", &[&course_id]);
    self
      .cached(key, self.ttl.identity, &[], move || async move {
        self
          .store
          .get_course(course_id)
          .await
          .map_err(Error::store)?
          .ok_or_else(|| Error::not_found("course", course_id))
      })
      .await
  }

  pub async fn student(&self, student_id: Uuid) -> Result<Student> {
    let key = CacheKey::new("student", &[&student_id]);
    self
      .cached(key, self.ttl.identity, &[CacheTag::Student(student_id)], move || async move {
        self
          .store
          .get_student(student_id)
          .await
          .map_err(Error::store)?
          .ok_or_else(|| Error::not_found("student", student_id))
      })
      .await
  }

  pub async fn student_by_matric(&self, matric_number: &str) -> Result<Student> {
    self
      .store
      .find_student_by_matric(matric_number)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("student", matric_number))
  }

  pub async fn timetable(&self, timetable_id: Uuid) -> Result<Timetable> {
    self
      .store
      .get_timetable(timetable_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("timetable", timetable_id))
  }

  pub async fn slot(&self, slot_id: Uuid) -> Result<TimetableSlot> {
    self
      .store
      .get_slot(slot_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("timetable slot", slot_id))
  }

  /// Every slot for (department, level), earliest-created first.
  pub async fn slots_for(&self, department_id: Uuid, level_id: Uuid) -> Result<Vec<TimetableSlot>> {
    let key = CacheKey::new("slots", &[&department_id, &level_id]);
    let tags = [CacheTag::DepartmentLevel(department_id, level_id)];
    self
      .cached(key, self.ttl.schedule, &tags, move || async move {
        self
          .store
          .list_slots(SlotQuery {
            department_id: Some(department_id),
            level_id: Some(level_id),
            ..Default::default()
          })
          .await
          .map_err(Error::store)
      })
      .await
  }
}
