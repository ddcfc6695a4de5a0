//! # user-segmentation
//!
//! User segmentation service: named segments, per-user memberships with
//! optional expiry, and a background sweeper that deletes expired
//! memberships.
//!
//! A batch of membership changes for one user runs in a single
//! transaction with per-change isolation: one failing change never undoes
//! the others. Expired memberships are hidden from reads immediately and
//! physically removed by the sweeper later.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)
//!     │
//!     ├── REST Handlers (api/)
//!     │
//!     ├── SegmentationService (service/)
//!     ├── TidySweeper (service/)
//!     │
//!     ├── SegmentationStore (persistence/)
//!     │     ├── PostgresStore
//!     │     └── MemoryStore
//!     │
//!     └── PostgreSQL
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
