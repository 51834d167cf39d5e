//! JSON REST API for Rollcall.
//!
//! Exposes an axum [`Router`] over a [`rollcall_engine::Engine`]. Auth, TLS,
//! and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", rollcall_api::api_router(engine.clone()))
//! ```

pub mod actor;
pub mod attendance;
pub mod audit;
pub mod catalog;
pub mod error;
pub mod sessions;
pub mod students;

use axum::{
  Router,
  routing::{get, post, put},
};
use rollcall_core::store::AttendanceStore;
use rollcall_engine::Engine;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Build a fully-materialised API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(engine: Engine<S>) -> Router<()>
where
  S: AttendanceStore + 'static,
{
  Router::new()
    // Catalog
    .route("/departments", post(catalog::create_department::<S>))
    .route("/levels", post(catalog::create_level::<S>))
    .route("/courses", post(catalog::create_course::<S>))
    .route("/students", post(catalog::create_student::<S>))
    .route("/timetables", post(catalog::create_timetable::<S>))
    .route("/timetables/{id}/slots", post(catalog::add_slot::<S>))
    .route("/timetables/{id}/conflicts", get(catalog::conflicts::<S>))
    .route("/timetables/{id}/publish", post(catalog::publish::<S>))
    // Enrollment
    .route("/students/{id}/level", put(students::set_level::<S>))
    .route("/students/{id}/courses", get(students::offered_courses::<S>))
    .route("/students/{id}/courses/batch", post(students::set_offerings::<S>))
    .route("/students/{id}/courses/{course_id}", put(students::set_offering::<S>))
    .route("/students/{id}/registrations", post(students::register::<S>))
    .route(
      "/students/{id}/registrations/{course_id}",
      axum::routing::delete(students::cancel::<S>),
    )
    .route(
      "/students/{id}/registrations/{course_id}/approve",
      post(students::approve::<S>),
    )
    // Student reads
    .route("/students/{id}/current-slot", get(students::current_slot::<S>))
    .route("/students/{id}/eligibility", get(students::eligibility::<S>))
    .route("/students/{id}/attendance-summary", get(students::attendance_summary::<S>))
    .route("/students/{id}/audit-summary", get(students::audit_summary::<S>))
    // Attendance
    .route("/attendance", get(attendance::list::<S>).post(attendance::mark::<S>))
    .route("/observations", post(attendance::observe::<S>))
    .route("/sweeps/absent", post(attendance::sweep::<S>))
    // Sessions
    .route("/sessions", post(sessions::ensure::<S>))
    .route("/sessions/{id}", get(sessions::get_one::<S>))
    .route("/sessions/{id}/open", post(sessions::open::<S>))
    .route("/sessions/{id}/activate", post(sessions::activate::<S>))
    .route("/sessions/{id}/close", post(sessions::close::<S>))
    .route("/sessions/{id}/cancel", post(sessions::cancel::<S>))
    // Audit
    .route("/audit", get(audit::history::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(engine)
}
