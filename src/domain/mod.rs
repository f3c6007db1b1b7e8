//! Domain layer types and invariants.

pub mod entities;
pub mod keys;
pub mod sites;
pub mod types;
