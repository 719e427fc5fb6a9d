//! Subsystem modules for the CodeBuddy server.

pub mod assistant;
pub mod auth;
pub mod comms;
pub mod store;
