//! Extracts the caller's [`ActorContext`] from request headers.

use std::convert::Infallible;

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use rollcall_core::audit::ActorContext;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";
pub const X_SESSION_KEY: &str = "x-session-key";

/// The caller as seen by the audit trail. Never rejects a request.
#[derive(Debug, Clone, Default)]
pub struct Actor(pub ActorContext);

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
  headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .filter(|v| !v.is_empty())
}

/// First hop of `X-Forwarded-For`, else `X-Real-IP`.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
  header_str(headers, X_FORWARDED_FOR)
    .and_then(|v| v.split(',').next())
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .or_else(|| header_str(headers, X_REAL_IP))
    .map(str::to_owned)
}

pub fn actor_context(headers: &HeaderMap) -> ActorContext {
  ActorContext {
    ip_address:  client_ip(headers),
    user_agent:  header_str(headers, header::USER_AGENT.as_str()).map(str::to_owned),
    session_key: header_str(headers, X_SESSION_KEY).map(str::to_owned),
  }
  .normalized()
}

impl<S> FromRequestParts<S> for Actor
where
  S: Send + Sync,
{
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
    Ok(Actor(actor_context(&parts.headers)))
  }
}
