//! Bootstrap layer — modules that run before the HTTP surface starts.
//!
//! - **logger** — tracing-subscriber initialisation.

pub mod logger;
