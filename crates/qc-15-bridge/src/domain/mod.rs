//! # Domain Module
//!
//! Core domain types for the bridge: batches, votes, keys and quorum.

pub mod batch_builder;
pub mod bitmap;
pub mod bls;
pub mod entities;
pub mod errors;
pub mod events;
pub mod invariants;
pub mod validator;
pub mod value_objects;

pub use batch_builder::*;
pub use bitmap::Bitmap;
pub use bls::{
    aggregate_signatures, verify_aggregate_with_domain, verify_with_domain, BlsPublicKey,
    SigningDomain, ValidatorKey,
};
pub use entities::*;
pub use errors::*;
pub use events::{EventKind, EventTopics, Log, LogFilters};
pub use invariants::*;
pub use validator::*;
pub use value_objects::*;
