//! Domain models shared by the token, store and real-time layers.

pub mod auth;
pub mod messaging;
