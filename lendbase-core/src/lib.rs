//! Lendbase Core - Data Types
//!
//! Pure data structures shared by every Lendbase crate: entity identity and
//! record metadata, the error taxonomy, the structured predicate model and
//! the per-kind descriptor. This crate performs no I/O.

pub mod clock;
pub mod descriptor;
pub mod error;
pub mod identity;
pub mod predicate;

pub use clock::{Clock, ManualClock, SystemClock};
pub use descriptor::Descriptor;
pub use error::{StoreError, StoreResult};
pub use identity::{EntityId, Meta, Timestamp, UNSET_ID};
pub use predicate::{CompareOp, Cond, Filter, Predicate, SqlValue, IGNORE_COUNT};
