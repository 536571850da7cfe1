//! Value objects and the port traits the workflow's collaborators implement.

pub mod config;
pub mod expr;
pub mod participant;
pub mod payment;
pub mod ports;
pub mod request;
pub mod view;
