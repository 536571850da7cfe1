use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Map, Value};

use crate::application::Settings;
use crate::application::currency::CurrencyConverter;
use crate::domain::config::{FormConfig, PriceConfig};
use crate::domain::expr::{Expr, Script};
use crate::domain::participant::{DataId, Participant};
use crate::domain::payment::{
    Customer, CurrencyCode, IntentId, IntentPurpose, MethodType, NewPaymentIntent, PaymentInfo,
    PaymentMethod, TriggerAmount, to_minor_units,
};
use crate::domain::ports::{
    MarkdownRendererRef, PaymentGatewayRef, ScriptEvaluatorRef, SessionState,
};
use crate::domain::request::RegistrationRequest;
use crate::domain::view::{AmountBounds, MessageKey, MethodView, PaymentFormView, ViewModel};
use crate::error::{RegistrationError, Result};

/// Markdown constructs allowed in method descriptions.
const DESCRIPTION_MARKDOWN: &[&str] = &["emphasis", "strikethrough", "link"];

/// Downstream effect a paid trigger purpose causes.
const TRIGGER_KIND: &str = "congress_registration";

/// Computes balances and bounds, lists methods, validates and submits
/// payments. Invoked by the registration workflow for active, non-cancelled
/// participants with `payment=true`.
pub struct PaymentSubworkflow {
    gateway: PaymentGatewayRef,
    evaluator: ScriptEvaluatorRef,
    markdown: MarkdownRendererRef,
    converter: CurrencyConverter,
    config: Arc<FormConfig>,
    settings: Arc<Settings>,
}

enum SubmitOutcome {
    Accepted { redirect: String, return_url: String },
    Rejected(MessageKey),
}

impl PaymentSubworkflow {
    pub fn new(
        gateway: PaymentGatewayRef,
        evaluator: ScriptEvaluatorRef,
        markdown: MarkdownRendererRef,
        config: Arc<FormConfig>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            converter: CurrencyConverter::new(gateway.clone()),
            gateway,
            evaluator,
            markdown,
            config,
            settings,
        }
    }

    /// Runs the payment flow for one request. The only error that escapes is
    /// the internal-method invariant violation; every collaborator failure is
    /// converted into a view-model field here.
    pub async fn run(
        &self,
        participant: &Participant,
        request: &RegistrationRequest,
        session: &dyn SessionState,
    ) -> Result<ViewModel> {
        let data_id = participant.data_id.clone();
        let payment = self.compute_info(participant).await;
        let edit_target = request.edit_target(&data_id);

        let price = match self.config.price.as_ref() {
            Some(price) if payment.outstanding_payment => price,
            _ => {
                // nothing left to pay; read-only history
                return Ok(ViewModel::PaymentHistory {
                    payment,
                    edit_target,
                });
            }
        };

        let mut error_out = None;
        if let (Some(method_id), Some(org)) = (request.payment_method, self.settings.payment_org) {
            match self.gateway.method(org, method_id).await {
                Ok(method) => {
                    // Ordered guards; a resolved currency means the amount
                    // form can be shown for this method.
                    let currency = match request.payment_currency.clone() {
                        // intermediary settlement is not supported here
                        _ if method.r#type == MethodType::Intermediary => None,
                        Some(cur) if method.currencies.contains(&cur) => Some(cur),
                        _ => None,
                    };

                    if let Some(currency) = currency {
                        if method.internal {
                            return Err(RegistrationError::InternalMethod(method.id));
                        }
                        match self
                            .method_form(participant, payment.clone(), method, currency, price, request, session)
                            .await
                        {
                            Ok(view) => return Ok(view),
                            Err(err @ RegistrationError::InternalMethod(_)) => return Err(err),
                            Err(err) => {
                                tracing::warn!(%err, org, method = method_id, "payment form unavailable");
                                error_out = Some(MessageKey::ErrSubmitGeneric);
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(%err, org, method = method_id, "failed to fetch payment method");
                    error_out = Some(MessageKey::ErrSubmitGeneric);
                }
            }
        }

        self.method_list(payment, request, edit_target, data_id, error_out)
            .await
    }

    /// Derives the per-request payment state from the participant record and
    /// the form pricing config. Never persisted.
    pub async fn compute_info(&self, participant: &Participant) -> PaymentInfo {
        let Some(price) = participant.price.filter(|price| *price > 0) else {
            return PaymentInfo::default();
        };
        let remaining = price - participant.amount_paid;
        let min_upfront = self
            .config
            .price
            .as_ref()
            .map(|p| p.min_upfront.min(remaining))
            .unwrap_or(0);

        let payment_history = match self.gateway.intent_history(&participant.data_id).await {
            Ok(entries) => entries.into_iter().map(|entry| entry.augment()).collect(),
            Err(err) => {
                tracing::error!(%err, data_id = %participant.data_id, "failed to fetch payment intents");
                Vec::new()
            }
        };

        PaymentInfo {
            has_payment: true,
            outstanding_payment: remaining > 0,
            remaining_amount: remaining,
            total_amount: price,
            is_min_payment: participant.amount_paid < min_upfront,
            min_upfront,
            payment_history,
        }
    }

    /// The amount form for one resolved method and currency, handling a POST
    /// submission when one is present.
    async fn method_form(
        &self,
        participant: &Participant,
        payment: PaymentInfo,
        method: PaymentMethod,
        currency: CurrencyCode,
        price: &PriceConfig,
        request: &RegistrationRequest,
        session: &dyn SessionState,
    ) -> Result<ViewModel> {
        let data_id = &participant.data_id;
        let edit_target = request.edit_target(data_id);
        let price_currency = price.currency.clone();
        let multiplier = self.multiplier_for(&currency).await?;

        // Bounds in target-currency minor units; converted once, then scaled
        // to major units for the form.
        let remaining = payment.remaining_amount;
        let deficit = if participant.has_paid_minimum {
            1
        } else {
            let upfront_deficit = price.min_upfront - participant.amount_paid;
            remaining.min(upfront_deficit).max(1)
        };
        let min_minor = self.converter.convert(&price_currency, &currency, deficit).await?;
        let max_minor = self
            .converter
            .convert(&price_currency, &currency, remaining)
            .await?;
        let mult = Decimal::from(multiplier);
        let bounds = AmountBounds {
            min: Decimal::from(min_minor) / mult,
            max: Decimal::from(max_minor) / mult,
            step: Decimal::ONE / mult,
            value: Decimal::from(max_minor) / mult,
        };

        let identity = self.participant_identity(participant).await;

        let mut error = None;
        let mut success_redirect = None;
        let mut success_return = None;
        if request.is_post() {
            let post = request.post.clone().unwrap_or_default();
            let outcome = self
                .submit(
                    participant,
                    &method,
                    &currency,
                    &price_currency,
                    multiplier,
                    &bounds,
                    &identity,
                    &post,
                    &edit_target,
                    session,
                )
                .await;
            match outcome {
                SubmitOutcome::Accepted {
                    redirect,
                    return_url,
                } => {
                    success_redirect = Some(redirect);
                    success_return = Some(return_url);
                }
                SubmitOutcome::Rejected(key) => error = Some(key),
            }
        }

        let approx_conversion_rate = self
            .converter
            .convert(&currency, &price_currency, 1_000_000)
            .await?;
        let fee_script =
            fee_preview_script(&method, &currency, &self.settings.fees_label).encode();
        let method = self.method_view(method, true).await;
        let form_nonce = session.issue_nonce().await;
        let back_target = request.payment_target(data_id);

        Ok(ViewModel::PaymentForm(Box::new(PaymentFormView {
            form_nonce,
            payment,
            method,
            currency,
            currency_multiplier: multiplier,
            price_currency,
            approx_conversion_rate,
            bounds,
            customer_name: identity.name,
            customer_email: identity.email,
            back_target,
            fee_script,
            error,
            success_redirect,
            success_return,
        })))
    }

    /// Validates and submits one payment. Each rejection reason is a separate
    /// guard; the nonce is consumed before anything else, so a rejected
    /// submission needs a fresh one.
    #[allow(clippy::too_many_arguments)]
    async fn submit(
        &self,
        participant: &Participant,
        method: &PaymentMethod,
        currency: &CurrencyCode,
        price_currency: &CurrencyCode,
        multiplier: u32,
        bounds: &AmountBounds,
        identity: &Customer,
        post: &Map<String, Value>,
        edit_target: &str,
        session: &dyn SessionState,
    ) -> SubmitOutcome {
        use SubmitOutcome::Rejected;

        let nonce_valid = match post.get("nonce").and_then(Value::as_str) {
            Some(nonce) => session.consume_nonce(nonce).await,
            None => false,
        };
        if !nonce_valid {
            return Rejected(MessageKey::ErrNonceInvalid);
        }

        let (Some(amount_raw), Some(notes)) = (
            post.get("amount").and_then(Value::as_str),
            post.get("notes").and_then(Value::as_str),
        ) else {
            return Rejected(MessageKey::PaymentErrBadRequest);
        };
        let Ok(amount) = amount_raw.trim().parse::<Decimal>() else {
            return Rejected(MessageKey::PaymentErrBadRequest);
        };
        if amount < bounds.min || amount > bounds.max {
            return Rejected(MessageKey::PaymentErrBadRequest);
        }
        let Some(amount_minor) = to_minor_units(amount, multiplier) else {
            return Rejected(MessageKey::PaymentErrBadRequest);
        };
        if !method.currencies.contains(currency) {
            return Rejected(MessageKey::PaymentErrBadRequest);
        }
        if identity.name.is_empty() {
            return Rejected(MessageKey::ErrSubmitNoName);
        }
        if identity.email.is_empty() {
            return Rejected(MessageKey::ErrSubmitNoEmail);
        }

        let trigger_amount = match self
            .converter
            .convert(currency, price_currency, amount_minor)
            .await
        {
            Ok(amount) => amount,
            Err(err) => {
                tracing::warn!(%err, "conversion failed during payment submission");
                return Rejected(MessageKey::ErrSubmitGeneric);
            }
        };

        let Some(org) = self.settings.payment_org else {
            return Rejected(MessageKey::ErrSubmitGeneric);
        };
        let intent = NewPaymentIntent {
            codeholder_id: participant.codeholder_id,
            customer: identity.clone(),
            payment_org_id: org,
            payment_method_id: method.id,
            currency: currency.clone(),
            customer_notes: (!notes.is_empty()).then(|| notes.to_string()),
            purposes: vec![IntentPurpose::Trigger {
                title: self.settings.purpose_title.clone(),
                description: self.settings.congress_name.clone(),
                amount: amount_minor,
                trigger_amount: TriggerAmount {
                    currency: price_currency.clone(),
                    amount: trigger_amount,
                },
                triggers: TRIGGER_KIND.to_string(),
                data_id: participant.data_id.clone(),
            }],
        };

        match self.gateway.create_intent(&intent).await {
            Ok(IntentId(id)) => {
                let return_url = format!("{}{}", self.settings.base_url, edit_target);
                let redirect = format!(
                    "{}/i/{}?return={}",
                    self.settings.payments_host,
                    id,
                    urlencode(&return_url)
                );
                SubmitOutcome::Accepted {
                    redirect,
                    return_url,
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to create payment intent");
                Rejected(MessageKey::ErrSubmitGeneric)
            }
        }
    }

    /// The method picker: customer-facing methods split into gateway-hosted
    /// and manual, recommended first within each group, then alphabetical.
    async fn method_list(
        &self,
        payment: PaymentInfo,
        request: &RegistrationRequest,
        edit_target: String,
        data_id: DataId,
        error: Option<MessageKey>,
    ) -> Result<ViewModel> {
        let mut auto_methods = Vec::new();
        let mut other_methods = Vec::new();

        if let Some(org) = self.settings.payment_org {
            match self.gateway.list_methods(org).await {
                Ok(methods) => {
                    let mut methods: Vec<PaymentMethod> = methods
                        .into_iter()
                        .filter(|m| !m.internal && m.r#type != MethodType::Intermediary)
                        .collect();
                    methods.sort_by(|a, b| {
                        b.is_recommended
                            .cmp(&a.is_recommended)
                            .then_with(|| a.name.cmp(&b.name))
                    });
                    for method in methods {
                        let is_auto = method.r#type == MethodType::Stripe;
                        let view = self.method_view(method, false).await;
                        if is_auto {
                            auto_methods.push(view);
                        } else {
                            other_methods.push(view);
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(%err, org, "failed to list payment methods");
                }
            }
        }

        Ok(ViewModel::PaymentMethods {
            payment,
            auto_methods,
            other_methods,
            edit_target,
            method_target: request.path.clone(),
            data_id,
            error,
        })
    }

    async fn method_view(&self, method: PaymentMethod, long: bool) -> MethodView {
        let description_rendered = self
            .render_description(method.description_preview.as_deref())
            .await;
        let long_description_rendered = if long {
            self.render_description(method.description.as_deref()).await
        } else {
            None
        };
        MethodView {
            method,
            description_rendered,
            long_description_rendered,
        }
    }

    async fn render_description(&self, source: Option<&str>) -> Option<String> {
        let source = source.filter(|s| !s.is_empty())?;
        match self.markdown.render(source, DESCRIPTION_MARKDOWN).await {
            Ok(html) => Some(html),
            Err(err) => {
                tracing::warn!(%err, "failed to render method description");
                None
            }
        }
    }

    /// Resolves the customer name and email through the form's identifier
    /// fields, evaluated against the participant's field values. Failures
    /// leave the respective part empty; submission then rejects.
    async fn participant_identity(&self, participant: &Participant) -> Customer {
        let stack = self.config.script_stack();
        let mut out = Customer {
            name: String::new(),
            email: String::new(),
        };
        let fields = [
            (&self.config.identifier_name, &mut out.name),
            (&self.config.identifier_email, &mut out.email),
        ];
        for (field, slot) in fields {
            let expr = Expr::call("id", [field.clone()]);
            match self.evaluator.eval(&stack, &participant.data, &expr).await {
                Ok(outcome) if outcome.success => *slot = eval_value_string(&outcome.value),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(%err, field, "identifier evaluation failed");
                }
            }
        }
        out
    }

    async fn multiplier_for(&self, currency: &str) -> Result<u32> {
        let multipliers = self.gateway.currency_multipliers().await?;
        multipliers.get(currency).copied().ok_or_else(|| {
            RegistrationError::Upstream(format!("no multiplier for currency {currency}"))
        })
    }
}

/// Flattens an evaluator result into display text: arrays are concatenated,
/// strings pass through, anything else is stringified.
fn eval_value_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(eval_value_string).collect(),
        other => other.to_string(),
    }
}

/// Builds the declarative fee-preview script for the client-side evaluator:
/// "<label>: <fixed fee> + <percent> % (<computed>)", with branches collapsing
/// to whichever fee components the method actually has. `@amount` refers to
/// the live form value; this workflow never evaluates the script.
pub fn fee_preview_script(method: &PaymentMethod, currency: &str, fees_label: &str) -> Script {
    let fee_fixed_val = method.fee_fixed.as_ref().map(|f| f.val).unwrap_or(0);
    let fee_fixed_cur = method
        .fee_fixed
        .as_ref()
        .map(|f| f.cur.clone())
        .unwrap_or_default();
    let fee_pc_val = method
        .fee_percent
        .and_then(|p| p.to_f64())
        .unwrap_or(0.0);

    let mut s = Script::new();
    s.push("text_pre", Expr::str(format!("**{fees_label}**: ")));

    s.push("0", Expr::num(0));
    s.push("100", Expr::num(100));

    s.push("currency", Expr::str(currency));
    s.push("fee_fixed_val", Expr::num(fee_fixed_val as f64));
    s.push("fee_fixed_cur", Expr::str(fee_fixed_cur));
    s.push(
        "fee_fixed",
        Expr::call("currency_fmt", ["fee_fixed_cur", "fee_fixed_val"]),
    );

    s.push("fee_pc_val", Expr::num(fee_pc_val));
    s.push("fee_pc_val_100", Expr::call("*", ["fee_pc_val", "100"]));

    s.push("has_fixed_fee", Expr::call(">", ["fee_fixed_val", "0"]));
    s.push("has_pc_fee", Expr::call(">", ["fee_pc_val", "0"]));
    s.push(
        "has_both_fees",
        Expr::call("and", ["has_fixed_fee", "has_pc_fee"]),
    );
    s.push(
        "has_any_fee",
        Expr::call("or", ["has_fixed_fee", "has_pc_fee"]),
    );

    s.push("text_fee_fixed", Expr::call("id", ["fee_fixed"]));

    s.push("text_fee_join", Expr::str(" % ("));
    s.push("text_fee_after", Expr::str(")"));
    s.push(
        "text_fee_pc",
        Expr::call("++", ["fee_pc_val_100", "text_fee_join"]),
    );
    s.push(
        "fee_pc_real_val",
        Expr::call("*", ["fee_pc_val", "@amount"]),
    );
    s.push(
        "text_fee_val",
        Expr::call("currency_fmt", ["currency", "fee_pc_real_val"]),
    );
    s.push(
        "text_fee_calc",
        Expr::call("++", ["text_fee_val", "text_fee_after"]),
    );
    s.push(
        "text_fee_percent",
        Expr::call("++", ["text_fee_pc", "text_fee_calc"]),
    );

    s.push("join", Expr::str(" + "));
    s.push(
        "text_both_fees1",
        Expr::call("++", ["text_fee_fixed", "join"]),
    );
    s.push(
        "text_both_fees",
        Expr::call("++", ["text_both_fees1", "text_fee_percent"]),
    );

    s.push(
        "text_fee",
        Expr::switch([
            (Some("has_both_fees"), "text_both_fees"),
            (Some("has_fixed_fee"), "text_fee_fixed"),
            (None, "text_fee_percent"),
        ]),
    );
    s.push("fees_text2", Expr::call("++", ["text_pre", "text_fee"]));
    s.push("empty_string", Expr::str(""));
    s.push(
        "fees_text",
        Expr::switch([(Some("has_any_fee"), "fees_text2"), (None, "empty_string")]),
    );
    s
}

/// Percent-encodes a string for use as a query-parameter value.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
