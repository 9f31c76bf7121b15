//! Common types shared between the `classify_server` and its HTTP clients.
pub mod protocol;
