//! # Ports Layer (Hexagonal Architecture)
//!
//! - `inbound`: capabilities the bridge offers to the node
//! - `outbound`: dependencies the node must provide

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
