//! Shared User-Agent string for segment and backend HTTP clients.

/// User-Agent sent on every request.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("trackfetch/{version}")
}
