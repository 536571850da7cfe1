use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::participant::DataId;
use crate::domain::payment::{CurrencyCode, PaymentInfo, PaymentMethod};
use crate::domain::ports::FieldError;

/// Stable message keys resolved to localized text by the host template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKey {
    ErrSubmitGeneric,
    ErrNonceInvalid,
    ErrSubmitNoName,
    ErrSubmitNoEmail,
    PaymentErrBadRequest,
    PaymentSuccessReturnMsg,
}

/// Form-level failure state surfaced alongside the re-rendered form.
/// `NonceInvalid` is kept distinct from field validation: it usually means an
/// expired session or a double submit, not bad input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormError {
    NonceInvalid,
    Validation { fields: Vec<FieldError> },
    /// Unexpected persistence failure; details are logged, never shown.
    Unknown,
}

/// A payment method plus its markdown descriptions rendered for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodView {
    #[serde(flatten)]
    pub method: PaymentMethod,
    pub description_rendered: Option<String>,
    pub long_description_rendered: Option<String>,
}

/// Amount bounds for the payment form, in major units of the target currency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmountBounds {
    pub min: Decimal,
    pub max: Decimal,
    pub step: Decimal,
    /// Prefilled value; defaults to the full remaining amount.
    pub value: Decimal,
}

/// The payment-amount form for one selected method and currency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentFormView {
    pub form_nonce: String,
    pub payment: PaymentInfo,
    pub method: MethodView,
    pub currency: CurrencyCode,
    pub currency_multiplier: u32,
    pub price_currency: CurrencyCode,
    /// Conversion of 1_000_000 target-currency minor units into the price
    /// currency, for client-side approximations.
    pub approx_conversion_rate: i64,
    pub bounds: AmountBounds,
    pub customer_name: String,
    pub customer_email: String,
    pub back_target: String,
    /// Base64-encoded expression script computing the fee preview, consumed by
    /// the external client-side evaluator.
    pub fee_script: String,
    pub error: Option<MessageKey>,
    /// Gateway checkout URL; set only after a successful submission.
    pub success_redirect: Option<String>,
    pub success_return: Option<String>,
}

/// What the host page should render for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ViewModel {
    /// 302 to the given location; the host owns the actual redirect.
    Redirect { location: String },
    /// Terminal error view. `is_not_found` distinguishes an unresolvable data
    /// id from any other upstream failure.
    Error { is_not_found: bool },
    /// Terminal cancelled view; permanent for a cancelled registration.
    Cancelled {
        cancel_success: bool,
        back_target: String,
    },
    /// "Really cancel?" confirmation prompt.
    CancelPrompt {
        cancel_error: bool,
        back_target: String,
        really_cancel_target: String,
    },
    /// Shown exactly once after a successful submission redirect.
    Confirmation {
        payment: PaymentInfo,
        edit_target: String,
        back_target: String,
    },
    Form {
        data_id: Option<DataId>,
        payment: PaymentInfo,
        editable: bool,
        cancelable: bool,
        back_target: String,
        cancel_target: Option<String>,
        validate_target: String,
        submit_target: String,
        form_nonce: String,
        /// Rendered form body from the form engine.
        form: String,
        message: Option<MessageKey>,
        error: Option<FormError>,
    },
    /// Read-only payment history; shown when nothing is outstanding.
    PaymentHistory {
        payment: PaymentInfo,
        edit_target: String,
    },
    /// Method picker, split into gateway-hosted and manual methods.
    PaymentMethods {
        payment: PaymentInfo,
        auto_methods: Vec<MethodView>,
        other_methods: Vec<MethodView>,
        edit_target: String,
        method_target: String,
        data_id: DataId,
        error: Option<MessageKey>,
    },
    PaymentForm(Box<PaymentFormView>),
}

impl ViewModel {
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::Redirect {
            location: location.into(),
        }
    }
}
