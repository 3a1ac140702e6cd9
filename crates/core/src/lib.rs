//! Domain logic for keepdate with zero I/O.
//!
//! Everything here is deterministic given its inputs (including "now"), so
//! the db, notify and api crates can share one definition of recurrence,
//! notification planning and message wording.

pub mod error;
pub mod event_type;
pub mod message;
pub mod plan;
pub mod recurrence;
pub mod status;
pub mod types;
pub mod upcoming;
