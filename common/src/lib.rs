//! ChainLedger Common Types
//!
//! This crate contains shared types used across the ChainLedger workspace,
//! including entity identifiers and composite keys, amount parsing,
//! calendar day bucketing and currency descriptor resolution.

pub mod identifiers;
pub mod monetary;
pub mod token;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use token::*;
pub use error::*;
pub use time::*;
