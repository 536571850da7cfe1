#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use congress_registration::application::Settings;
use congress_registration::application::workflow::RegistrationWorkflow;
use congress_registration::domain::config::FormConfig;
use congress_registration::domain::expr::{Expr, ScriptModule};
use congress_registration::domain::participant::{DataId, Participant, Registration};
use congress_registration::domain::payment::{
    CurrencyCode, FeeFixed, IntentHistoryEntry, IntentId, MethodType, NewPaymentIntent,
    PaymentMethod,
};
use congress_registration::domain::ports::{
    EvalOutcome, FieldError, FormEngine, FormValidation, MarkdownRenderer, ParticipantRepository,
    PaymentGateway, ScriptEvaluator,
};
use congress_registration::error::{RegistrationError, Result};

pub const PAGE_PATH: &str = "/congress/registration";

pub fn form_config() -> FormConfig {
    serde_json::from_value(serde_json::json!({
        "price": {"currency": "EUR", "minUpfront": 2000},
        "editable": true,
        "cancellable": true,
        "identifierName": "name",
        "identifierEmail": "email",
        "form": [
            {"el": "input", "name": "name", "type": "text"},
            {"el": "input", "name": "email", "type": "email"},
        ],
    }))
    .unwrap()
}

pub fn settings() -> Settings {
    Settings {
        registration: Registration {
            congress_id: 1,
            instance_id: 2,
        },
        payment_org: Some(9),
        payments_host: "https://pay.example.org".into(),
        base_url: "https://congress.example.org".into(),
        congress_name: "Example Congress 2026".into(),
        purpose_title: "Congress registration".into(),
        fees_label: "Payment fees".into(),
    }
}

pub fn participant(data_id: &str, price: i64, amount_paid: i64) -> Participant {
    let mut data = Map::new();
    data.insert("name".into(), Value::String("Ana Haveno".into()));
    data.insert("email".into(), Value::String("ana@example.org".into()));
    Participant {
        data_id: DataId::new(data_id),
        codeholder_id: Some(77),
        price: Some(price),
        amount_paid,
        has_paid_minimum: false,
        cancelled_time: None,
        created_time: Utc::now(),
        edited_time: None,
        custom_form_vars: Map::new(),
        data,
    }
}

/// Participant repository backed by a map, with a counter for created ids.
#[derive(Default)]
pub struct FakeRepository {
    pub participants: Mutex<HashMap<DataId, Participant>>,
    next_id: AtomicU32,
}

impl FakeRepository {
    pub async fn insert(&self, participant: Participant) {
        self.participants
            .lock()
            .await
            .insert(participant.data_id.clone(), participant);
    }

    pub async fn get(&self, data_id: &DataId) -> Option<Participant> {
        self.participants.lock().await.get(data_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.participants.lock().await.len()
    }
}

#[async_trait]
impl ParticipantRepository for FakeRepository {
    async fn fetch(
        &self,
        _registration: &Registration,
        data_id: &DataId,
        _fields: &[String],
    ) -> Result<Participant> {
        self.participants
            .lock()
            .await
            .get(data_id)
            .cloned()
            .ok_or(RegistrationError::NotFound)
    }

    async fn create(
        &self,
        _registration: &Registration,
        data: &Map<String, Value>,
    ) -> Result<DataId> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let data_id = DataId::new(format!("{id:04x}"));
        let mut p = participant(data_id.as_str(), 10000, 0);
        p.data = data.clone();
        self.insert(p).await;
        Ok(data_id)
    }

    async fn update(
        &self,
        _registration: &Registration,
        data_id: &DataId,
        data: &Map<String, Value>,
    ) -> Result<()> {
        let mut participants = self.participants.lock().await;
        let p = participants
            .get_mut(data_id)
            .ok_or(RegistrationError::NotFound)?;
        p.data = data.clone();
        p.edited_time = Some(Utc::now());
        Ok(())
    }

    async fn cancel(
        &self,
        _registration: &Registration,
        data_id: &DataId,
    ) -> Result<DateTime<Utc>> {
        let mut participants = self.participants.lock().await;
        let p = participants
            .get_mut(data_id)
            .ok_or(RegistrationError::NotFound)?;
        let time = Utc::now();
        p.cancelled_time = Some(time);
        Ok(time)
    }

    async fn list_by_codeholder(
        &self,
        _registration: &Registration,
        codeholder_id: i64,
    ) -> Result<Vec<Participant>> {
        Ok(self
            .participants
            .lock()
            .await
            .values()
            .filter(|p| p.codeholder_id == Some(codeholder_id))
            .cloned()
            .collect())
    }
}

pub fn stripe_method(id: u32, name: &str, recommended: bool) -> PaymentMethod {
    PaymentMethod {
        id,
        r#type: MethodType::Stripe,
        name: name.into(),
        description_preview: Some("*cards*".into()),
        description: Some("pay by *card*".into()),
        currencies: vec!["EUR".into(), "USD".into()],
        fee_percent: Some(dec!(0.029)),
        fee_fixed: Some(FeeFixed {
            val: 25,
            cur: "EUR".into(),
        }),
        internal: false,
        is_recommended: recommended,
        payment_validity: None,
    }
}

pub fn manual_method(id: u32, name: &str, recommended: bool) -> PaymentMethod {
    PaymentMethod {
        id,
        r#type: MethodType::Manual,
        name: name.into(),
        description_preview: None,
        description: None,
        currencies: vec!["EUR".into()],
        fee_percent: None,
        fee_fixed: None,
        internal: false,
        is_recommended: recommended,
        payment_validity: Some(3600),
    }
}

/// Payment gateway with fixed EUR/USD rates and a recording intent store.
#[derive(Default)]
pub struct FakeGateway {
    pub methods: Vec<PaymentMethod>,
    pub history: Vec<IntentHistoryEntry>,
    pub created_intents: Mutex<Vec<NewPaymentIntent>>,
    pub fail_method_fetch: bool,
}

impl FakeGateway {
    pub fn with_methods(methods: Vec<PaymentMethod>) -> Self {
        Self {
            methods,
            ..Self::default()
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn list_methods(&self, _org: u32) -> Result<Vec<PaymentMethod>> {
        Ok(self.methods.clone())
    }

    async fn method(&self, _org: u32, method_id: u32) -> Result<PaymentMethod> {
        if self.fail_method_fetch {
            return Err(RegistrationError::Upstream("method fetch failed".into()));
        }
        self.methods
            .iter()
            .find(|m| m.id == method_id)
            .cloned()
            .ok_or_else(|| RegistrationError::Upstream("no such method".into()))
    }

    async fn currency_multipliers(&self) -> Result<HashMap<CurrencyCode, u32>> {
        Ok(HashMap::from([("EUR".into(), 100), ("USD".into(), 100)]))
    }

    async fn exchange_rates(&self, base: &str) -> Result<HashMap<CurrencyCode, Decimal>> {
        match base {
            "EUR" => Ok(HashMap::from([("USD".into(), dec!(1.25))])),
            "USD" => Ok(HashMap::from([("EUR".into(), dec!(0.8))])),
            _ => Err(RegistrationError::Upstream("no such base".into())),
        }
    }

    async fn create_intent(&self, intent: &NewPaymentIntent) -> Result<IntentId> {
        let mut intents = self.created_intents.lock().await;
        intents.push(intent.clone());
        Ok(IntentId(format!("intent-{}", intents.len())))
    }

    async fn intent_history(&self, _data_id: &DataId) -> Result<Vec<IntentHistoryEntry>> {
        Ok(self.history.clone())
    }
}

/// Evaluator understanding exactly the `id` lookup the workflow emits.
pub struct FakeEvaluator;

#[async_trait]
impl ScriptEvaluator for FakeEvaluator {
    async fn eval(
        &self,
        _stack: &[ScriptModule],
        vars: &Map<String, Value>,
        expr: &Expr,
    ) -> Result<EvalOutcome> {
        if let Expr::Call { func, args } = expr
            && func == "id"
            && let Some(name) = args.first()
        {
            return Ok(match vars.get(name) {
                Some(value) => EvalOutcome {
                    success: true,
                    value: value.clone(),
                },
                None => EvalOutcome {
                    success: false,
                    value: Value::Null,
                },
            });
        }
        Ok(EvalOutcome {
            success: false,
            value: Value::Null,
        })
    }
}

pub struct FakeMarkdown;

#[async_trait]
impl MarkdownRenderer for FakeMarkdown {
    async fn render(&self, source: &str, _allowed: &[&str]) -> Result<String> {
        Ok(format!("<p>{source}</p>"))
    }
}

/// Form engine requiring non-empty `name` and `email` fields.
pub struct FakeFormEngine;

#[async_trait]
impl FormEngine for FakeFormEngine {
    async fn validate(
        &self,
        _config: &FormConfig,
        _existing: Option<&Participant>,
        post: &Map<String, Value>,
    ) -> Result<FormValidation> {
        let mut errors = Vec::new();
        for field in ["name", "email"] {
            let ok = post
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|v| !v.is_empty());
            if !ok {
                errors.push(FieldError {
                    field: field.into(),
                    message: "required".into(),
                });
            }
        }
        if errors.is_empty() {
            let mut clean = post.clone();
            clean.remove("nonce");
            Ok(FormValidation::Valid(clean))
        } else {
            Ok(FormValidation::Invalid(errors))
        }
    }

    async fn render(
        &self,
        _config: &FormConfig,
        _existing: Option<&Participant>,
        _post: Option<&Map<String, Value>>,
    ) -> Result<String> {
        Ok("<form-body/>".into())
    }
}

pub struct Fixture {
    pub workflow: RegistrationWorkflow,
    pub repo: Arc<FakeRepository>,
    pub gateway: Arc<FakeGateway>,
}

pub fn fixture(gateway: FakeGateway) -> Fixture {
    fixture_with_config(form_config(), gateway)
}

pub fn fixture_with_config(config: FormConfig, gateway: FakeGateway) -> Fixture {
    let repo = Arc::new(FakeRepository::default());
    let gateway = Arc::new(gateway);
    let workflow = RegistrationWorkflow::new(
        repo.clone(),
        Arc::new(FakeFormEngine),
        gateway.clone(),
        Arc::new(FakeEvaluator),
        Arc::new(FakeMarkdown),
        config,
        settings(),
    );
    Fixture {
        workflow,
        repo,
        gateway,
    }
}

pub fn post_body(pairs: &[(&str, &str)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}
