//! Domain layer: identifiers, membership changes, batch reports and
//! audit log events.
//!
//! Nothing in here touches the database; the persistence layer consumes
//! and produces these types.

pub mod batch_report;
pub mod log_event;
pub mod membership;
pub mod slug;
pub mod user_id;

pub use batch_report::{BatchReport, UnitFailure};
pub use log_event::{LogEvent, LogEventType};
pub use membership::{MembershipChange, RemovedMembership, SegmentAppend};
pub use slug::Slug;
pub use user_id::UserId;
