//! Owned payloads handed to subscribers and sinks.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so they can be
//! forwarded verbatim over any JSON transport.

pub mod events;
