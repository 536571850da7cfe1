use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::expr::ScriptModule;
use crate::domain::payment::CurrencyCode;

/// Pricing section of the form definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceConfig {
    pub currency: CurrencyCode,
    /// Minimum amount (minor units) a participant must pay upfront.
    #[serde(default)]
    pub min_upfront: i64,
}

/// One item of the dynamic form definition. Only the parts this workflow needs
/// are modeled; rendering-specific attributes stay with the form engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "el", rename_all = "lowercase")]
pub enum FormItem {
    Input {
        name: String,
        #[serde(flatten)]
        rest: Map<String, Value>,
    },
    Script {
        script: ScriptModule,
    },
    Text {
        #[serde(flatten)]
        rest: Map<String, Value>,
    },
}

/// The congress registration form definition, as configured by the organizers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormConfig {
    #[serde(default)]
    pub price: Option<PriceConfig>,
    #[serde(default)]
    pub editable: bool,
    #[serde(default)]
    pub cancellable: bool,
    /// Names of the form fields holding the participant's identity, used to
    /// resolve the payment customer.
    pub identifier_name: String,
    pub identifier_email: String,
    #[serde(default)]
    pub identifier_country_code: Option<String>,
    pub form: Vec<FormItem>,
    #[serde(default)]
    pub custom_form_vars: Map<String, Value>,
}

impl FormConfig {
    /// The field list to request when fetching a participant: the fixed record
    /// fields plus one `data.<name>` entry per form input.
    pub fn participant_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = [
            "cancelledTime",
            "price",
            "amountPaid",
            "hasPaidMinimum",
            "codeholderId",
            "createdTime",
            "editedTime",
            "customFormVars",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect();
        for item in &self.form {
            if let FormItem::Input { name, .. } = item {
                fields.push(format!("data.{name}"));
            }
        }
        fields
    }

    /// The script modules of the form, in order, for the evaluator stack.
    pub fn script_stack(&self) -> Vec<ScriptModule> {
        self.form
            .iter()
            .filter_map(|item| match item {
                FormItem::Script { script } => Some(script.clone()),
                _ => None,
            })
            .collect()
    }
}
