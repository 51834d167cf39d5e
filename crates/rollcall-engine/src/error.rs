//! Error type for `rollcall-engine`.

use rollcall_core::eligibility::IneligibilityReason;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// An expected, recoverable outcome with a stable code.
  #[error(transparent)]
  Domain(#[from] rollcall_core::Error),

  /// The backing store could not be reached or rejected a write.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }

  pub fn validation(message: impl Into<String>) -> Self {
    Self::Domain(rollcall_core::Error::Validation(message.into()))
  }

  pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
    Self::Domain(rollcall_core::Error::not_found(entity, id))
  }

  pub fn code(&self) -> &'static str {
    match self {
      Self::Domain(e) => e.code(),
      Self::Store(_) => "store_error",
    }
  }
}

impl From<IneligibilityReason> for Error {
  fn from(reason: IneligibilityReason) -> Self { Self::Domain(reason.into()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
