//! Enrollment workflows: level selection, per-course offering flags, direct
//! registrations and their approval, plus the audit queries over them.
//!
//! Every write goes through
//! [`AttendanceStore::write_course_selections`] or
//! [`AttendanceStore::change_level`], which capture the audit entries, and
//! then drops every cache entry tagged with the student.

use std::collections::BTreeSet;

use rollcall_core::{
  audit::{ActorContext, AuditContext, AuditLogEntry, AuditQuery, AuditSummary},
  catalog::Course,
  eligibility::IneligibilityReason,
  enrollment::{
    CourseSelection, LevelChange, LevelChangeOutcome, LevelSelection, OfferingStatus,
    SelectionChange, SelectionOp, SelectionWrite,
  },
  store::AttendanceStore,
  student::Student,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{cache::{CacheKey, CacheTag}, Engine, Error, Result};

/// Reason recorded on the deletions cascaded by a level change.
pub const LEVEL_CHANGE_REASON: &str = "Academic level changed";

/// A course on the student's level timetable with its resolved status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferedCourse {
  pub course: Course,
  pub status: OfferingStatus,
}

impl<S: AttendanceStore> Engine<S> {
  // ── Reads ─────────────────────────────────────────────────────────────────

  pub async fn level_selection(&self, student_id: Uuid) -> Result<Option<LevelSelection>> {
    let key = CacheKey::new("level_selection", &[&student_id]);
    self
      .cached(key, self.ttl.selections, &[CacheTag::Student(student_id)], move || async move {
        self.store.get_level_selection(student_id).await.map_err(Error::store)
      })
      .await
  }

  /// The student's explicit rows at `level_id`.
  pub async fn course_selections(
    &self,
    student_id: Uuid,
    level_id: Uuid,
  ) -> Result<Vec<CourseSelection>> {
    let key = CacheKey::new("course_selections", &[&student_id, &level_id]);
    self
      .cached(key, self.ttl.selections, &[CacheTag::Student(student_id)], move || async move {
        self
          .store
          .list_course_selections(student_id, Some(level_id))
          .await
          .map_err(Error::store)
      })
      .await
  }

  /// Three-valued lookup for (student, course, level).
  pub async fn offering_status(
    &self,
    student_id: Uuid,
    course_id: Uuid,
    level_id: Uuid,
  ) -> Result<OfferingStatus> {
    let rows = self.course_selections(student_id, level_id).await?;
    Ok(OfferingStatus::from_selection(rows.iter().find(|r| r.course_id == course_id)))
  }

  /// Courses on the student's level timetable that they have not opted out
  /// of. Empty when no level is selected.
  pub async fn offered_courses(&self, student_id: Uuid) -> Result<Vec<OfferedCourse>> {
    let student = self.student(student_id).await?;
    let Some(level) = self.level_selection(student_id).await? else {
      return Ok(Vec::new());
    };
    let key = CacheKey::new("offered_courses", &[&student_id, &level.level_id]);
    let tags = [
      CacheTag::Student(student_id),
      CacheTag::DepartmentLevel(student.department_id, level.level_id),
    ];
    self
      .cached(key, self.ttl.selections, &tags, move || async move {
        let slots = self.slots_for(student.department_id, level.level_id).await?;
        let rows = self.course_selections(student_id, level.level_id).await?;

        let mut seen = BTreeSet::new();
        let mut offered = Vec::new();
        for slot in slots {
          if !seen.insert(slot.course_id) {
            continue;
          }
          let status = OfferingStatus::from_selection(
            rows.iter().find(|r| r.course_id == slot.course_id),
          );
          if status.is_offered() {
            offered.push(OfferedCourse { course: self.course(slot.course_id).await?, status });
          }
        }
        Ok(offered)
      })
      .await
  }

  // ── Level selection ───────────────────────────────────────────────────────

  /// Select `level_id` for the student. A real change deletes every course
  /// selection the student holds, each with a DELETE audit entry sharing
  /// one batch id.
  pub async fn set_level(
    &self,
    student_id: Uuid,
    level_id: Uuid,
    actor: ActorContext,
  ) -> Result<LevelChangeOutcome> {
    let student = self.student(student_id).await?;
    let level = self
      .store
      .get_level(level_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::validation(format!("unknown level {level_id}")))?;
    if level.department_id != student.department_id {
      return Err(Error::validation("level does not belong to the student's department"));
    }

    let outcome = self
      .store
      .change_level(LevelChange {
        student_id,
        department_id: student.department_id,
        level_id,
        audit: AuditContext::new(actor, LEVEL_CHANGE_REASON).batched(),
      })
      .await
      .map_err(Error::store)?;

    self.invalidate(CacheTag::Student(student_id));
    tracing::info!(
      %student_id,
      %level_id,
      removed = outcome.removed.len(),
      "level selected"
    );
    Ok(outcome)
  }

  // ── Offering flags ────────────────────────────────────────────────────────

  /// Opt the student in or out of a course on their level timetable.
  /// Approval follows the offering flag.
  pub async fn set_course_offering(
    &self,
    student_id: Uuid,
    course_id: Uuid,
    is_offered: bool,
    actor: ActorContext,
    reason: impl Into<String>,
  ) -> Result<SelectionChange> {
    let mut changes = self
      .write_offerings(student_id, vec![(course_id, is_offered)], AuditContext::new(actor, reason))
      .await?;
    changes
      .pop()
      .ok_or_else(|| Error::validation("no course selection written"))
  }

  /// Bulk form of [`Self::set_course_offering`]: one transaction, one batch
  /// id, one audit entry per affected row.
  pub async fn set_course_offerings(
    &self,
    student_id: Uuid,
    offerings: Vec<(Uuid, bool)>,
    actor: ActorContext,
    reason: impl Into<String>,
  ) -> Result<Vec<SelectionChange>> {
    if offerings.is_empty() {
      return Ok(Vec::new());
    }
    self
      .write_offerings(student_id, offerings, AuditContext::new(actor, reason).batched())
      .await
  }

  async fn write_offerings(
    &self,
    student_id: Uuid,
    offerings: Vec<(Uuid, bool)>,
    audit: AuditContext,
  ) -> Result<Vec<SelectionChange>> {
    let student = self.student(student_id).await?;
    let level = self
      .level_selection(student_id)
      .await?
      .ok_or(IneligibilityReason::NoLevelSelected)?;
    let scheduled = self.scheduled_courses(&student, level.level_id).await?;

    let mut writes = Vec::with_capacity(offerings.len());
    for (course_id, is_offered) in offerings {
      if !scheduled.contains(&course_id) {
        return Err(Error::validation(format!(
          "course {course_id} is not scheduled for the student's level"
        )));
      }
      writes.push(SelectionWrite {
        student_id,
        department_id: student.department_id,
        level_id: level.level_id,
        course_id,
        op: SelectionOp::Upsert { is_offered, is_approved: is_offered },
      });
    }

    self.apply_writes(student_id, writes, audit).await
  }

  // ── Registrations ─────────────────────────────────────────────────────────

  /// Register for a course scheduled at any level of the student's
  /// department. The row awaits approval.
  pub async fn register_course(
    &self,
    student_id: Uuid,
    course_id: Uuid,
    level_id: Uuid,
    actor: ActorContext,
  ) -> Result<SelectionChange> {
    let student = self.student(student_id).await?;
    let level = self.level(level_id).await?;
    if level.department_id != student.department_id {
      return Err(Error::validation("level does not belong to the student's department"));
    }
    if !self.scheduled_courses(&student, level_id).await?.contains(&course_id) {
      return Err(Error::validation(format!(
        "course {course_id} is not scheduled at level {}",
        level.code
      )));
    }
    if let Some(existing) = self
      .store
      .get_course_selection(student_id, course_id, level_id)
      .await
      .map_err(Error::store)?
      && existing.is_offered
    {
      return Err(Error::validation("course is already registered"));
    }

    let write = SelectionWrite {
      student_id,
      department_id: student.department_id,
      level_id,
      course_id,
      op: SelectionOp::Upsert { is_offered: true, is_approved: false },
    };
    self
      .apply_one(student_id, write, AuditContext::new(actor, "Course registration"))
      .await
  }

  /// Approve a pending registration. `is_offered` is unchanged, so no audit
  /// entry is produced.
  pub async fn approve_registration(
    &self,
    student_id: Uuid,
    course_id: Uuid,
    level_id: Uuid,
    actor: ActorContext,
  ) -> Result<SelectionChange> {
    let row = self
      .store
      .get_course_selection(student_id, course_id, level_id)
      .await
      .map_err(Error::store)?
      .filter(|r| r.is_offered)
      .ok_or_else(|| Error::validation("no offered registration to approve"))?;

    let write = SelectionWrite {
      student_id,
      department_id: row.department_id,
      level_id,
      course_id,
      op: SelectionOp::Upsert { is_offered: true, is_approved: true },
    };
    self
      .apply_one(student_id, write, AuditContext::new(actor, "Registration approved"))
      .await
  }

  pub async fn cancel_registration(
    &self,
    student_id: Uuid,
    course_id: Uuid,
    level_id: Uuid,
    actor: ActorContext,
  ) -> Result<SelectionChange> {
    let row = self
      .store
      .get_course_selection(student_id, course_id, level_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("course selection", course_id))?;

    let write = SelectionWrite {
      student_id,
      department_id: row.department_id,
      level_id,
      course_id,
      op: SelectionOp::Delete,
    };
    self
      .apply_one(student_id, write, AuditContext::new(actor, "Registration cancelled"))
      .await
  }

  // ── Audit ─────────────────────────────────────────────────────────────────

  pub async fn audit_history(&self, query: AuditQuery) -> Result<Vec<AuditLogEntry>> {
    self.store.list_audit_entries(query).await.map_err(Error::store)
  }

  pub async fn audit_summary(&self, student_id: Uuid) -> Result<AuditSummary> {
    let entries = self
      .audit_history(AuditQuery { student_id: Some(student_id), ..Default::default() })
      .await?;
    Ok(AuditSummary::from_entries(student_id, &entries))
  }

  // ── Helpers ───────────────────────────────────────────────────────────────

  async fn scheduled_courses(&self, student: &Student, level_id: Uuid) -> Result<BTreeSet<Uuid>> {
    Ok(
      self
        .slots_for(student.department_id, level_id)
        .await?
        .into_iter()
        .map(|s| s.course_id)
        .collect(),
    )
  }

  async fn apply_one(
    &self,
    student_id: Uuid,
    write: SelectionWrite,
    audit: AuditContext,
  ) -> Result<SelectionChange> {
    self
      .apply_writes(student_id, vec![write], audit)
      .await?
      .pop()
      .ok_or_else(|| Error::validation("no course selection written"))
  }

  async fn apply_writes(
    &self,
    student_id: Uuid,
    writes: Vec<SelectionWrite>,
    audit: AuditContext,
  ) -> Result<Vec<SelectionChange>> {
    let reason = audit.reason.clone();
    let changes = self
      .store
      .write_course_selections(writes, audit)
      .await
      .map_err(Error::store)?;
    self.invalidate(CacheTag::Student(student_id));
    tracing::info!(
      %student_id,
      rows = changes.len(),
      audited = changes.iter().filter(|c| c.audit.is_some()).count(),
      reason,
      "course selections written"
    );
    Ok(changes)
  }
}
