//! In-process implementations of infrastructure ports.

pub mod in_memory;
