use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque identifier correlating a participant's registration across systems.
///
/// Stored and transported as a hex string; the payment service correlates
/// intents by the raw bytes, so [`DataId::raw_bytes`] exposes the decoded form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataId(String);

impl DataId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the hex representation. Non-hex characters are dropped pairwise;
    /// the identifier is opaque to us, so a best-effort decode is enough for
    /// correlation purposes.
    pub fn raw_bytes(&self) -> Vec<u8> {
        let bytes = self.0.as_bytes();
        bytes
            .chunks_exact(2)
            .filter_map(|pair| {
                let hi = (pair[0] as char).to_digit(16)?;
                let lo = (pair[1] as char).to_digit(16)?;
                Some((hi * 16 + lo) as u8)
            })
            .collect()
    }

    /// Serializes the decoded byte form instead of the hex string, for fields
    /// the payment service correlates by raw bytes.
    pub fn serialize_raw<S: serde::Serializer>(
        id: &DataId,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(id.raw_bytes())
    }
}

impl std::fmt::Display for DataId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one congress instance's registration form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub congress_id: u32,
    pub instance_id: u32,
}

/// A participant record as served by the participant repository.
///
/// `price` and `amount_paid` are integer minor units. A set `cancelled_time`
/// is terminal: no further edit, cancel or payment is possible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub data_id: DataId,
    #[serde(default)]
    pub codeholder_id: Option<i64>,
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub has_paid_minimum: bool,
    #[serde(default)]
    pub cancelled_time: Option<DateTime<Utc>>,
    pub created_time: DateTime<Utc>,
    #[serde(default)]
    pub edited_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub custom_form_vars: Map<String, Value>,
    /// Raw form-field values keyed by field name.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Participant {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled_time.is_some()
    }
}
