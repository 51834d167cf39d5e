//! Student identity and department membership.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
  pub student_id:    Uuid,
  /// Unique and stable for the lifetime of the student.
  pub matric_number: String,
  pub full_name:     String,
  pub department_id: Uuid,
  pub created_at:    DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewStudent {
  pub matric_number: String,
  pub full_name:     String,
  pub department_id: Uuid,
}
