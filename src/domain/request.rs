use serde_json::{Map, Value};

use crate::domain::participant::DataId;
use crate::domain::payment::CurrencyCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Everything the workflow needs to know about one incoming request, resolved
/// up front so the workflow itself never touches ambient transport state.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationRequest {
    /// Path of the registration page, base for all generated targets.
    pub path: String,
    pub method: HttpMethod,
    pub data_id: Option<DataId>,
    pub validate_only: bool,
    pub is_cancellation: bool,
    /// Implies `is_cancellation`.
    pub is_actual_cancellation: bool,
    pub is_payment: bool,
    pub payment_method: Option<u32>,
    pub payment_currency: Option<CurrencyCode>,
    pub payment_success_return: bool,
    /// Decoded POST body, if any.
    pub post: Option<Map<String, Value>>,
}

impl RegistrationRequest {
    /// A plain GET of the page, used as the base for tests and defaults.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: HttpMethod::Get,
            data_id: None,
            validate_only: false,
            is_cancellation: false,
            is_actual_cancellation: false,
            is_payment: false,
            payment_method: None,
            payment_currency: None,
            payment_success_return: false,
            post: None,
        }
    }

    pub fn is_post(&self) -> bool {
        self.method == HttpMethod::Post
    }

    /// Canonical edit URL of a registration; also the post-payment return.
    pub fn edit_target(&self, data_id: &DataId) -> String {
        format!("{}?dataId={}", self.path, data_id)
    }

    pub fn payment_target(&self, data_id: &DataId) -> String {
        format!("{}?dataId={}&payment=true", self.path, data_id)
    }

    pub fn cancel_target(&self, data_id: &DataId) -> String {
        format!("{}?dataId={}&cancel=true", self.path, data_id)
    }

    pub fn really_cancel_target(&self, data_id: &DataId) -> String {
        format!("{}?dataId={}&really_cancel=true", self.path, data_id)
    }

    pub fn validate_target(&self, data_id: Option<&DataId>) -> String {
        match data_id {
            Some(id) => format!("{}?validate=true&dataId={}", self.path, id),
            None => format!("{}?validate=true", self.path),
        }
    }

    pub fn submit_target(&self, data_id: Option<&DataId>) -> String {
        match data_id {
            Some(id) => format!("{}?dataId={}", self.path, id),
            None => self.path.clone(),
        }
    }

    /// The parent congress page.
    pub fn back_target(&self) -> String {
        match self.path.rfind('/') {
            Some(idx) => self.path[..idx].to_string(),
            None => String::new(),
        }
    }
}
