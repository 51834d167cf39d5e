//! Audit trail for course-selection changes.
//!
//! Entries are append-only. Which entry (if any) a write produces is decided
//! by [`AuditChange::between`] from the row's `is_offered` value before and
//! after the write, so every backend applies the same rules.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Longest user-agent string kept on an entry.
pub const MAX_USER_AGENT_LEN: usize = 1000;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum AuditAction {
  Create,
  Update,
  Delete,
}

// ─── Context ─────────────────────────────────────────────────────────────────

/// Who made a change, as far as the transport can tell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
  pub ip_address:  Option<String>,
  pub user_agent:  Option<String>,
  pub session_key: Option<String>,
}

impl ActorContext {
  /// Truncate oversize fields to what the log keeps.
  pub fn normalized(mut self) -> Self {
    if let Some(agent) = self.user_agent.as_mut()
      && agent.chars().count() > MAX_USER_AGENT_LEN
    {
      *agent = agent.chars().take(MAX_USER_AGENT_LEN).collect();
    }
    self
  }
}

/// Everything a mutating call records alongside the rows it writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditContext {
  pub actor:    ActorContext,
  pub reason:   String,
  /// Shared by every entry of one logical bulk operation.
  pub batch_id: Option<Uuid>,
}

impl AuditContext {
  pub fn new(actor: ActorContext, reason: impl Into<String>) -> Self {
    Self { actor: actor.normalized(), reason: reason.into(), batch_id: None }
  }

  /// The same context tagged with a fresh batch id.
  pub fn batched(self) -> Self {
    Self { batch_id: Some(Uuid::new_v4()), ..self }
  }
}

// ─── Change rules ────────────────────────────────────────────────────────────

/// The action and offered values to log for one row write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditChange {
  pub action:         AuditAction,
  pub old_is_offered: Option<bool>,
  pub new_is_offered: bool,
}

impl AuditChange {
  /// Decide what to log given a row's `is_offered` before and after a write
  /// (`None` meaning the row does not exist).
  ///
  /// Updates that leave `is_offered` unchanged log nothing. A delete logs
  /// `new_is_offered = false`.
  pub fn between(before: Option<bool>, after: Option<bool>) -> Option<Self> {
    match (before, after) {
      (None, Some(new)) => Some(Self {
        action:         AuditAction::Create,
        old_is_offered: None,
        new_is_offered: new,
      }),
      (Some(old), Some(new)) if old != new => Some(Self {
        action:         AuditAction::Update,
        old_is_offered: Some(old),
        new_is_offered: new,
      }),
      (Some(old), None) => Some(Self {
        action:         AuditAction::Delete,
        old_is_offered: Some(old),
        new_is_offered: false,
      }),
      _ => None,
    }
  }
}

// ─── Entry ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
  pub entry_id:       Uuid,
  pub student_id:     Uuid,
  pub course_id:      Uuid,
  pub level_id:       Uuid,
  pub department_id:  Uuid,
  pub action:         AuditAction,
  pub old_is_offered: Option<bool>,
  pub new_is_offered: bool,
  pub recorded_at:    DateTime<Utc>,
  pub actor:          ActorContext,
  pub reason:         String,
  pub batch_id:       Option<Uuid>,
}

fn offered_label(offered: bool) -> &'static str {
  if offered { "offered" } else { "not offered" }
}

impl AuditLogEntry {
  /// Human-readable one-liner for this change.
  pub fn change_summary(&self) -> String {
    let old = self.old_is_offered.unwrap_or(false);
    match self.action {
      AuditAction::Create => {
        format!("Added course as {}", offered_label(self.new_is_offered))
      }
      AuditAction::Update => format!(
        "Changed from {} to {}",
        offered_label(old),
        offered_label(self.new_is_offered)
      ),
      AuditAction::Delete => {
        format!("Removed course (was {})", offered_label(old))
      }
    }
  }
}

// ─── Queries ─────────────────────────────────────────────────────────────────

/// Filter for [`crate::store::AttendanceStore::list_audit_entries`]. Results
/// are newest first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
  pub student_id:    Option<Uuid>,
  pub course_id:     Option<Uuid>,
  pub department_id: Option<Uuid>,
  pub action:        Option<AuditAction>,
  pub batch_id:      Option<Uuid>,
  pub limit:         Option<usize>,
}

/// Aggregate view of a student's audit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
  pub student_id:     Uuid,
  pub total_changes:  usize,
  pub action_counts:  BTreeMap<AuditAction, usize>,
  pub unique_courses: usize,
  pub first_change:   Option<DateTime<Utc>>,
  pub last_change:    Option<DateTime<Utc>>,
}

impl AuditSummary {
  pub fn from_entries(student_id: Uuid, entries: &[AuditLogEntry]) -> Self {
    let mut action_counts: BTreeMap<AuditAction, usize> = [
      AuditAction::Create,
      AuditAction::Update,
      AuditAction::Delete,
    ]
    .into_iter()
    .map(|a| (a, 0))
    .collect();
    let mut courses = BTreeSet::new();
    for e in entries {
      *action_counts.entry(e.action).or_default() += 1;
      courses.insert(e.course_id);
    }
    Self {
      student_id,
      total_changes: entries.len(),
      action_counts,
      unique_courses: courses.len(),
      first_change: entries.iter().map(|e| e.recorded_at).min(),
      last_change: entries.iter().map(|e| e.recorded_at).max(),
    }
  }
}
