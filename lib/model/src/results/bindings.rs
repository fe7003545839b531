use crate::RdfTerm;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Formatter;

/// An ordered mapping from variable names to [`RdfTerm`]s.
///
/// Used both for a single result row and for the forced values of a template. Variable names
/// are unique; binding an already bound variable replaces its value in place.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bindings {
    entries: Vec<(String, RdfTerm)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `variable` to `value`. A leading `?` or `$` is stripped from the name.
    pub fn add_binding(&mut self, variable: impl Into<String>, value: RdfTerm) {
        let variable = normalize_variable(variable.into());
        match self.entries.iter_mut().find(|(name, _)| *name == variable) {
            Some((_, current)) => *current = value,
            None => self.entries.push((variable, value)),
        }
    }

    /// Builder-style variant of [`Bindings::add_binding`].
    #[must_use]
    pub fn with_binding(mut self, variable: impl Into<String>, value: RdfTerm) -> Self {
        self.add_binding(variable, value);
        self
    }

    pub fn get(&self, variable: &str) -> Option<&RdfTerm> {
        self.entries
            .iter()
            .find(|(name, _)| name == variable)
            .map(|(_, term)| term)
    }

    /// The lexical value bound to `variable`, if any.
    pub fn value(&self, variable: &str) -> Option<&str> {
        self.get(variable).map(RdfTerm::value)
    }

    pub fn contains(&self, variable: &str) -> bool {
        self.get(variable).is_some()
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RdfTerm)> {
        self.entries.iter().map(|(name, term)| (name.as_str(), term))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, RdfTerm)> for Bindings {
    fn from_iter<T: IntoIterator<Item = (N, RdfTerm)>>(iter: T) -> Self {
        let mut bindings = Bindings::new();
        for (name, term) in iter {
            bindings.add_binding(name, term);
        }
        bindings
    }
}

fn normalize_variable(variable: String) -> String {
    match variable.strip_prefix(['?', '$']) {
        Some(stripped) => stripped.to_owned(),
        None => variable,
    }
}

impl Serialize for Bindings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, term) in &self.entries {
            map.serialize_entry(name, term)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Bindings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BindingsVisitor;

        impl<'de> Visitor<'de> for BindingsVisitor {
            type Value = Bindings;

            fn expecting(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
                formatter.write_str("a map from variable names to RDF terms")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut bindings = Bindings::new();
                while let Some((name, term)) = map.next_entry::<String, RdfTerm>()? {
                    bindings.add_binding(name, term);
                }
                Ok(bindings)
            }
        }

        deserializer.deserialize_map(BindingsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebinding_keeps_position() {
        let mut bindings = Bindings::new()
            .with_binding("a", RdfTerm::literal("1"))
            .with_binding("b", RdfTerm::literal("2"));
        bindings.add_binding("?a", RdfTerm::uri("http://a"));
        assert_eq!(bindings.variables().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(bindings.get("a"), Some(&RdfTerm::uri("http://a")));
        assert_eq!(bindings.len(), 2);
    }

    #[test]
    fn json_keeps_row_order() -> Result<(), serde_json::Error> {
        let row: Bindings = serde_json::from_str(
            r#"{"text":{"type":"literal","value":"hi"},"message":{"type":"uri","value":"http://m"}}"#,
        )?;
        assert_eq!(row.variables().collect::<Vec<_>>(), vec!["text", "message"]);
        assert_eq!(row.value("message"), Some("http://m"));
        assert_eq!(serde_json::from_str::<Bindings>(&serde_json::to_string(&row)?)?, row);
        Ok(())
    }
}
