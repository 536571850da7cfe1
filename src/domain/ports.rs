use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::config::FormConfig;
use crate::domain::expr::{Expr, ScriptModule};
use crate::domain::participant::{DataId, Participant, Registration};
use crate::domain::payment::{
    CurrencyCode, IntentHistoryEntry, IntentId, NewPaymentIntent, PaymentMethod,
};
use crate::error::Result;

/// The external participant-record service. All authoritative registration
/// state lives behind this port; the workflow itself persists nothing.
#[async_trait]
pub trait ParticipantRepository: Send + Sync {
    /// Fetches one participant, requesting the given field list. Returns
    /// `RegistrationError::NotFound` for an unresolvable data id.
    async fn fetch(
        &self,
        registration: &Registration,
        data_id: &DataId,
        fields: &[String],
    ) -> Result<Participant>;
    async fn create(&self, registration: &Registration, data: &Map<String, Value>)
    -> Result<DataId>;
    async fn update(
        &self,
        registration: &Registration,
        data_id: &DataId,
        data: &Map<String, Value>,
    ) -> Result<()>;
    /// Cancels a registration, returning the cancellation time.
    async fn cancel(&self, registration: &Registration, data_id: &DataId)
    -> Result<DateTime<Utc>>;
    async fn list_by_codeholder(
        &self,
        registration: &Registration,
        codeholder_id: i64,
    ) -> Result<Vec<Participant>>;
}

/// The external payment-processing service.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Customer-facing methods of a payment organization, non-internal and
    /// non-intermediary, ordered by name.
    async fn list_methods(&self, org: u32) -> Result<Vec<PaymentMethod>>;
    async fn method(&self, org: u32, method_id: u32) -> Result<PaymentMethod>;
    /// Minor-units-per-major-unit multipliers keyed by currency code.
    async fn currency_multipliers(&self) -> Result<HashMap<CurrencyCode, u32>>;
    /// Exchange rates with `base` as the base currency.
    async fn exchange_rates(&self, base: &str) -> Result<HashMap<CurrencyCode, Decimal>>;
    async fn create_intent(&self, intent: &NewPaymentIntent) -> Result<IntentId>;
    /// Intents whose trigger purpose carries this data id, newest first.
    async fn intent_history(&self, data_id: &DataId) -> Result<Vec<IntentHistoryEntry>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalOutcome {
    pub success: bool,
    pub value: Value,
}

/// The external, pure expression interpreter. This workflow only constructs
/// and serializes expression trees; evaluation always happens behind this port.
#[async_trait]
pub trait ScriptEvaluator: Send + Sync {
    async fn eval(
        &self,
        stack: &[ScriptModule],
        vars: &Map<String, Value>,
        expr: &Expr,
    ) -> Result<EvalOutcome>;
}

/// Renders a limited markdown subset to HTML.
#[async_trait]
pub trait MarkdownRenderer: Send + Sync {
    async fn render(&self, source: &str, allowed: &[&str]) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormValidation {
    /// Cleaned field values ready for persistence.
    Valid(Map<String, Value>),
    Invalid(Vec<FieldError>),
}

/// The dynamic form-field widget layer: validates submissions against the form
/// definition and renders the form body.
#[async_trait]
pub trait FormEngine: Send + Sync {
    async fn validate(
        &self,
        config: &FormConfig,
        existing: Option<&Participant>,
        post: &Map<String, Value>,
    ) -> Result<FormValidation>;
    async fn render(
        &self,
        config: &FormConfig,
        existing: Option<&Participant>,
        post: Option<&Map<String, Value>>,
    ) -> Result<String>;
}

/// Per-session mutable state: the single-use nonce collection and one-shot
/// flags. Shared across concurrent requests of the same session, so
/// implementations must make `consume_nonce` and `take_flag` atomic.
#[async_trait]
pub trait SessionState: Send + Sync {
    /// Generates a fresh random 256-bit token and adds it to the session.
    async fn issue_nonce(&self) -> String;
    /// Removes exactly one matching token. Returns false, leaving the
    /// collection unchanged, if no exact match exists.
    async fn consume_nonce(&self, nonce: &str) -> bool;
    async fn set_flag(&self, name: &str);
    /// Atomic read-and-clear of a one-shot flag.
    async fn take_flag(&self, name: &str) -> bool;
}

pub type ParticipantRepositoryRef = Arc<dyn ParticipantRepository>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type ScriptEvaluatorRef = Arc<dyn ScriptEvaluator>;
pub type MarkdownRendererRef = Arc<dyn MarkdownRenderer>;
pub type FormEngineRef = Arc<dyn FormEngine>;
pub type SessionStateRef = Arc<dyn SessionState>;
