//! Relation storage
//!
//! In-memory relations, the relational operators the rule pipeline is built
//! from, term normalization and binary snapshots.

pub mod normalize;
pub mod ops;
pub mod relation;
pub mod snapshot;

pub use relation::Relation;
