//! Transport-edge adapters.

pub mod query;
