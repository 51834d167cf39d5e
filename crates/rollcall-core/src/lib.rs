//! Core types, rules, and the storage trait for the Rollcall attendance
//! engine.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! rules that decide eligibility, session transitions, and audit capture are
//! plain functions over the types defined here so they can be tested without
//! a backend.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod attendance;
pub mod audit;
pub mod catalog;
pub mod eligibility;
pub mod enrollment;
pub mod error;
pub mod session;
pub mod store;
pub mod student;

pub use error::{Error, Result};
