use sepa_model::{RdfTerm, TermKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named SPARQL template of a profile (an entry of `updates` or `queries`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationTemplate {
    pub sparql: String,
    /// Declared free variables, keyed by variable name.
    #[serde(rename = "forcedBindings", default)]
    pub forced_bindings: BTreeMap<String, ForcedBinding>,
}

/// Declaration of one forced-binding variable: its term kind and an optional default value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForcedBinding {
    #[serde(rename = "type")]
    pub kind: TermKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
}

impl ForcedBinding {
    /// The default term, if the profile gives a non-empty value.
    pub fn default_term(&self) -> Option<RdfTerm> {
        let value = self.value.as_deref().filter(|value| !value.is_empty())?;
        Some(match (self.kind, &self.datatype) {
            (TermKind::Literal, Some(datatype)) => RdfTerm::typed_literal(value, datatype),
            (kind, _) => RdfTerm::literal(value).with_kind(kind),
        })
    }
}

impl OperationTemplate {
    pub fn declared_variables(&self) -> impl Iterator<Item = &str> {
        self.forced_bindings.keys().map(String::as_str)
    }
}

/// Whether `name` can be used as a SPARQL variable name.
pub(crate) fn is_valid_variable(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_variable_char)
}

pub(crate) fn is_variable_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '\u{B7}'
}
