use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// One node of the declarative expression tree consumed by the external
/// client-side evaluator.
///
/// Nodes reference each other by name within a [`Script`]; form variables are
/// referenced with an `@` prefix (e.g. `"@amount"`). The workflow only
/// constructs and serializes these trees, it never evaluates them.
///
/// Wire format: `{"t":"s","v":…}` string literal, `{"t":"n","v":…}` number
/// literal, `{"t":"c","f":…,"a":[…]}` call, `{"t":"w","m":[…]}` multi-branch
/// dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Expr {
    #[serde(rename = "s")]
    Str {
        #[serde(rename = "v")]
        value: String,
    },
    #[serde(rename = "n")]
    Num {
        #[serde(rename = "v")]
        value: f64,
    },
    #[serde(rename = "c")]
    Call {
        #[serde(rename = "f")]
        func: String,
        #[serde(rename = "a")]
        args: Vec<String>,
    },
    #[serde(rename = "w")]
    Switch {
        #[serde(rename = "m")]
        branches: Vec<Branch>,
    },
}

/// One branch of a `Switch` node. `cond: None` is the fallback branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    #[serde(rename = "c")]
    pub cond: Option<String>,
    #[serde(rename = "v")]
    pub value: String,
}

impl Expr {
    pub fn str(value: impl Into<String>) -> Self {
        Self::Str {
            value: value.into(),
        }
    }

    pub fn num(value: impl Into<f64>) -> Self {
        Self::Num {
            value: value.into(),
        }
    }

    pub fn call<S: Into<String>>(func: impl Into<String>, args: impl IntoIterator<Item = S>) -> Self {
        Self::Call {
            func: func.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn switch(branches: impl IntoIterator<Item = (Option<&'static str>, &'static str)>) -> Self {
        Self::Switch {
            branches: branches
                .into_iter()
                .map(|(cond, value)| Branch {
                    cond: cond.map(str::to_owned),
                    value: value.to_owned(),
                })
                .collect(),
        }
    }
}

/// An ordered collection of named expression nodes, serialized as a JSON map.
///
/// Order is kept for readability of the serialized script; references are by
/// name, so the evaluator does not depend on it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script(Vec<(String, Expr)>);

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, expr: Expr) {
        self.0.push((name.into(), expr));
    }

    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, e)| e)
    }

    /// Serializes the script to base64-encoded JSON, the form the client-side
    /// evaluator expects it in.
    pub fn encode(&self) -> String {
        // serialization of a plain map of plain values cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        STANDARD.encode(json)
    }
}

impl Serialize for Script {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, expr) in &self.0 {
            map.serialize_entry(name, expr)?;
        }
        map.end()
    }
}

/// A script module attached to the form definition, opaque to this workflow;
/// passed through to the evaluator as part of the script stack.
pub type ScriptModule = serde_json::Map<String, serde_json::Value>;
