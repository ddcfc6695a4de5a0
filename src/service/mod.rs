//! Service layer: engine operations and the background tidy sweeper.
//!
//! [`SegmentationService`] turns validated requests into store calls and
//! writes the audit log. [`TidySweeper`] periodically deletes expired
//! memberships through the same service.

pub mod segmentation_service;
pub mod tidy;

pub use segmentation_service::SegmentationService;
pub use tidy::{TidyHandle, TidySweeper};
