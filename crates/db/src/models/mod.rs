//! Row models and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row, plus the `Deserialize` DTOs used to create or patch it.

pub mod event;
pub mod notification;
pub mod status;
