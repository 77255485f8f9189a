//! # taskline_core
//!
//! Core domain logic for Taskline: token lifecycle, the persistence
//! collaborator seam, and the real-time presence/notification layer.

pub mod auth;
pub mod migrate;
pub mod models;
pub mod realtime;
pub mod room;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
