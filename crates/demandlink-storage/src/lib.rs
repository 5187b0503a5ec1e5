//! Persistent storage for command events.
//!
//! Backed by redb. Records are append-only; acknowledgments live in their own
//! table and are joined on read.

pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::RedbEventLog;
