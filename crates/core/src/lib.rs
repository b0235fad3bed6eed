//! `fatoora-core` - domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the invoicing and
//! submission crates: identifiers, the domain error model, optimistic
//! versioning, and fixed-scale decimal amounts. No infrastructure concerns.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, EntryId};
pub use money::{MONEY_SCALE, Money, Quantity, RATE_FRACTION_SCALE, RATE_SCALE, Rate};
pub use value_object::ValueObject;
