mod bindings;

pub use bindings::Bindings;

use serde::{Deserialize, Serialize};

/// An ordered sequence of [`Bindings`] sharing one variable list.
///
/// Rows may leave variables unbound, but never bind a variable that is not part of
/// [`BindingsResults::variables`]: adding such a row extends the variable list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "JsonResults", into = "JsonResults")]
pub struct BindingsResults {
    variables: Vec<String>,
    bindings: Vec<Bindings>,
}

impl BindingsResults {
    pub fn new(variables: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            variables: variables.into_iter().map(Into::into).collect(),
            bindings: Vec::new(),
        }
    }

    /// An empty result set with the same variable list.
    #[must_use]
    pub fn empty_like(&self) -> Self {
        Self::new(self.variables.iter().cloned())
    }

    pub fn add(&mut self, row: Bindings) {
        for variable in row.variables() {
            if !self.variables.iter().any(|known| known == variable) {
                self.variables.push(variable.to_owned());
            }
        }
        self.bindings.push(row);
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn bindings(&self) -> &[Bindings] {
        &self.bindings
    }

    pub fn into_bindings(self) -> Vec<Bindings> {
        self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn contains(&self, row: &Bindings) -> bool {
        self.bindings.contains(row)
    }
}

impl FromIterator<Bindings> for BindingsResults {
    fn from_iter<T: IntoIterator<Item = Bindings>>(iter: T) -> Self {
        let mut results = BindingsResults::default();
        for row in iter {
            results.add(row);
        }
        results
    }
}

/// The delta of a subscription's result set between two notifications.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ARBindingsResults {
    #[serde(rename = "addedResults", default)]
    pub added: BindingsResults,
    #[serde(rename = "removedResults", default)]
    pub removed: BindingsResults,
}

impl ARBindingsResults {
    pub fn new(added: BindingsResults, removed: BindingsResults) -> Self {
        Self { added, removed }
    }

    /// The first snapshot of a subscription, seen as rows added to an empty result set.
    pub fn first(snapshot: BindingsResults) -> Self {
        let removed = snapshot.empty_like();
        Self {
            added: snapshot,
            removed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// A change notification pushed by the broker for one subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub spuid: String,
    /// Sequence number assigned by the broker, if it sends one.
    pub sequence: Option<u64>,
    pub results: ARBindingsResults,
}

/// Results in the SPARQL 1.1 JSON format.
///
/// Some brokers omit the `head`/`results` wrapping and send `{"bindings": [...]}` directly; both
/// shapes are accepted.
#[derive(Serialize, Deserialize)]
struct JsonResults {
    #[serde(default)]
    head: Option<JsonHead>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    results: Option<JsonBindings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bindings: Option<Vec<Bindings>>,
}

#[derive(Serialize, Deserialize)]
struct JsonHead {
    #[serde(default)]
    vars: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct JsonBindings {
    bindings: Vec<Bindings>,
}

impl TryFrom<JsonResults> for BindingsResults {
    type Error = &'static str;

    fn try_from(json: JsonResults) -> Result<Self, Self::Error> {
        let rows = match (json.results, json.bindings) {
            (Some(results), _) => results.bindings,
            (None, Some(bindings)) => bindings,
            (None, None) => return Err("missing field `results`"),
        };
        let mut results = BindingsResults::new(json.head.map(|head| head.vars).unwrap_or_default());
        for row in rows {
            results.add(row);
        }
        Ok(results)
    }
}

impl From<BindingsResults> for JsonResults {
    fn from(results: BindingsResults) -> Self {
        JsonResults {
            head: Some(JsonHead {
                vars: results.variables,
            }),
            results: Some(JsonBindings {
                bindings: results.bindings,
            }),
            bindings: None,
        }
    }
}
