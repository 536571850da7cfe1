//! Registration-and-payment controller for a congress enrollment form.
//!
//! Receives visitor requests, resolves which operation is requested (view,
//! validate, submit, cancel, pay), coordinates with the external participant
//! record service and payment gateway, and produces a view model for the host
//! page to render. All authoritative state lives in the external services;
//! this crate owns only per-session nonces and one-shot flags.

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
