//! View components: per-session state machines driven by routes and the
//! realtime connection.
//!
//! ARCHITECTURE
//! ============
//! Each view receives its store dependency explicitly. None of them mutate
//! another's state; the sync view only learns about writes through change
//! events.

pub mod creation;
pub mod entry;
pub mod notice;
pub mod shell;
pub mod sync;
