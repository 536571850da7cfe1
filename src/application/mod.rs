//! Application layer: the registration workflow, the payment sub-workflow and
//! currency conversion. Orchestrates the collaborator ports; owns no durable
//! state of its own.

pub mod currency;
pub mod payment;
pub mod workflow;

use crate::domain::participant::Registration;

/// Host-supplied deployment settings for one registration page.
#[derive(Debug, Clone)]
pub struct Settings {
    pub registration: Registration,
    /// Payment organization the congress charges through, if any.
    pub payment_org: Option<u32>,
    /// Origin of the hosted payment pages, e.g. `https://pay.example.org`.
    pub payments_host: String,
    /// Origin of the page embedding the form, for absolute return URLs.
    pub base_url: String,
    pub congress_name: String,
    /// Localized title for the intent's trigger purpose.
    pub purpose_title: String,
    /// Localized label prefixed to the client-side fee preview.
    pub fees_label: String,
}
