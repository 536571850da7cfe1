use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::domain::participant::DataId;
use crate::domain::request::{HttpMethod, RegistrationRequest};

const DATA_ID: &str = "dataId";
const VALIDATE: &str = "validate";
const CANCEL: &str = "cancel";
const REALLY_CANCEL: &str = "really_cancel";
const PAYMENT: &str = "payment";
const PAYMENT_METHOD: &str = "method";
const PAYMENT_CURRENCY: &str = "currency";
const PAYMENT_SUCCESS_RETURN: &str = "payment_success_return";

/// Builds the explicit request context out of raw transport pieces: page
/// path, HTTP method, decoded query parameters and the decoded POST body.
pub fn read_request(
    path: &str,
    method: HttpMethod,
    query: &HashMap<String, String>,
    post: Option<Map<String, Value>>,
) -> RegistrationRequest {
    let is_actual_cancellation = flag(query, REALLY_CANCEL);
    RegistrationRequest {
        path: path.to_string(),
        method,
        data_id: query
            .get(DATA_ID)
            .filter(|v| !v.is_empty())
            .map(DataId::new),
        validate_only: flag(query, VALIDATE),
        // really_cancel implies cancel
        is_cancellation: flag(query, CANCEL) || is_actual_cancellation,
        is_actual_cancellation,
        is_payment: flag(query, PAYMENT),
        payment_method: query.get(PAYMENT_METHOD).and_then(|v| v.parse().ok()),
        payment_currency: query.get(PAYMENT_CURRENCY).filter(|v| !v.is_empty()).cloned(),
        payment_success_return: flag(query, PAYMENT_SUCCESS_RETURN),
        post,
    }
}

/// Query-parameter boolean coercion: present and not one of the falsy
/// spellings.
fn flag(query: &HashMap<String, String>, key: &str) -> bool {
    query
        .get(key)
        .is_some_and(|v| !v.is_empty() && v != "0" && v != "false")
}
