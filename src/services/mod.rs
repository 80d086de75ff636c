//! Domain services used by HTTP and websocket routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own identity and persistence concerns so route handlers
//! can stay focused on protocol translation and auth plumbing.

pub mod auth;
pub mod session;
