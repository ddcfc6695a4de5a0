//! Data Transfer Objects for REST request/response serialization.
//!
//! Slugs arrive as plain strings and are validated in the handlers, so a
//! bad slug yields the structured 400 error instead of a body rejection.

pub mod log_dto;
pub mod segment_dto;
pub mod user_dto;

pub use log_dto::*;
pub use segment_dto::*;
pub use user_dto::*;
