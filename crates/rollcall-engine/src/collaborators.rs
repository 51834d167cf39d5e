//! Outbound collaborators: presence finalization and notifications.
//!
//! Both are synchronous, object-safe hand-off points. Their failures are
//! logged by the engine and never affect the write that triggered them.

use rollcall_core::{
  attendance::AttendanceRecord,
  enrollment::Registration,
  session::ClassSession,
};
use serde::Serialize;

pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// Reconciles partial observation data into terminal attendance statuses
/// once a session has closed. Called exactly once per successful close.
pub trait PresenceFinalizer: Send + Sync {
  fn finalize_session(
    &self,
    session: &ClassSession,
    expected: &[Registration],
  ) -> Result<(), CollaboratorError>;
}

/// Events delivered to the notification collaborator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
  AttendanceMarked { record: AttendanceRecord },
  SessionCancelled { session: ClassSession },
}

pub trait Notifier: Send + Sync {
  fn notify(&self, notification: &Notification) -> Result<(), CollaboratorError>;
}

/// Finalizer that only records the hand-off in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingFinalizer;

impl PresenceFinalizer for LoggingFinalizer {
  fn finalize_session(
    &self,
    session: &ClassSession,
    expected: &[Registration],
  ) -> Result<(), CollaboratorError> {
    tracing::info!(
      session_id = %session.session_id,
      slot_id = %session.slot_id,
      expected = expected.len(),
      "session handed off for presence finalization"
    );
    Ok(())
  }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
  fn notify(&self, _: &Notification) -> Result<(), CollaboratorError> { Ok(()) }
}
