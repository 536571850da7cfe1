use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::domain::participant::DataId;

/// ISO currency code, e.g. "EUR".
pub type CurrencyCode = String;

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum MethodType {
    /// Gateway-hosted checkout; listed under "automatic" methods.
    Stripe,
    /// Settled through an intermediary organization. Not supported here.
    Intermediary,
    /// Manually settled (bank transfer, cash, ...).
    Manual,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct FeeFixed {
    pub val: i64,
    pub cur: CurrencyCode,
}

/// A payment method as served by the payment organization.
///
/// Invariant: methods with `internal == true` exist for administrative use and
/// must never be offered to customers.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    pub id: u32,
    pub r#type: MethodType,
    pub name: String,
    #[serde(default)]
    pub description_preview: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub currencies: Vec<CurrencyCode>,
    #[serde(default)]
    pub fee_percent: Option<Decimal>,
    #[serde(default)]
    pub fee_fixed: Option<FeeFixed>,
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub is_recommended: bool,
    /// Seconds a created intent stays payable, if the method expires intents.
    #[serde(default)]
    pub payment_validity: Option<i64>,
}

/// One historical payment intent correlated to a registration.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct IntentHistoryEntry {
    /// Raw intent identifier bytes as stored by the gateway.
    pub id: Vec<u8>,
    pub status: String,
    pub total_amount: i64,
    pub currency: CurrencyCode,
    pub time_created: DateTime<Utc>,
    #[serde(default)]
    pub amount_refunded: i64,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    /// Display identifier derived from `id`, filled in by the workflow.
    #[serde(default)]
    pub id_encoded: Option<String>,
    /// `time_created + payment_validity`, filled in by the workflow when the
    /// method defines a validity window.
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
}

impl IntentHistoryEntry {
    /// Fills in the derived display fields.
    pub fn augment(mut self) -> Self {
        self.id_encoded = Some(URL_SAFE_NO_PAD.encode(&self.id));
        if let Some(validity) = self.payment_method.as_ref().and_then(|m| m.payment_validity) {
            self.expiry_date = Some(self.time_created + Duration::seconds(validity));
        }
        self
    }
}

/// Derived payment state for one participant. Never persisted; recomputed on
/// every request from the participant record and the form pricing config.
#[derive(Debug, Serialize, PartialEq, Clone, Default)]
pub struct PaymentInfo {
    pub has_payment: bool,
    pub outstanding_payment: bool,
    pub remaining_amount: i64,
    pub total_amount: i64,
    pub is_min_payment: bool,
    pub min_upfront: i64,
    pub payment_history: Vec<IntentHistoryEntry>,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct Customer {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct TriggerAmount {
    pub currency: CurrencyCode,
    pub amount: i64,
}

/// Purposes attached to a new payment intent. A `Trigger` purpose causes a
/// downstream effect keyed by `data_id` once the intent is paid.
#[derive(Debug, Serialize, PartialEq, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IntentPurpose {
    Trigger {
        title: String,
        description: String,
        amount: i64,
        #[serde(rename = "triggerAmount")]
        trigger_amount: TriggerAmount,
        triggers: String,
        /// Correlation id; the gateway expects the decoded bytes, not the hex
        /// string.
        #[serde(rename = "dataId", serialize_with = "DataId::serialize_raw")]
        data_id: DataId,
    },
}

/// Request payload for creating a payment intent at the gateway.
#[derive(Debug, Serialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewPaymentIntent {
    pub codeholder_id: Option<i64>,
    pub customer: Customer,
    pub payment_org_id: u32,
    pub payment_method_id: u32,
    pub currency: CurrencyCode,
    pub customer_notes: Option<String>,
    pub purposes: Vec<IntentPurpose>,
}

/// Opaque gateway-side identifier of a created intent; seeds the redirect URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentId(pub String);

/// Converts a major-unit decimal amount to minor units, truncating any
/// fraction below one minor unit.
pub fn to_minor_units(amount: Decimal, multiplier: u32) -> Option<i64> {
    (amount * Decimal::from(multiplier)).floor().to_i64()
}
