//! # Auction Record Model
//!
//! Clean DTOs that cross every boundary: storage ↔ planner ↔ execution ↔ caller.
//!
//! Design rule: no storage types, no SQL here.
//! This module is pure data: no I/O, no state, no async.

pub mod payload;
pub mod property;
pub mod filter;
pub mod change;

pub use payload::{Payload, parse_currency, fields};
pub use property::{Property, PropertyKey};
pub use filter::{Dimension, FilterSelection, FilterQuery, PriceRange, split_multi};
pub use change::{ChangeEvent, ChangeKind};
