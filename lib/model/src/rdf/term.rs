use oxrdf::{BlankNode, Literal, NamedNode, Term};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The kind of an [`RdfTerm`].
///
/// Also used by the forced-binding schema of a profile, where only [`TermKind::Uri`] and
/// [`TermKind::Literal`] can be declared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermKind {
    Uri,
    Literal,
    #[serde(rename = "bnode")]
    BlankNode,
}

impl Display for TermKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TermKind::Uri => "uri",
            TermKind::Literal => "literal",
            TermKind::BlankNode => "bnode",
        })
    }
}

/// A literal with an optional datatype or language tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RdfLiteral {
    pub value: String,
    pub datatype: Option<String>,
    pub language: Option<String>,
}

/// A value bound to a SPARQL variable.
///
/// Terms are immutable values. Two terms are equal if they are of the same kind and carry the
/// same lexical value (including datatype and language for literals).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "JsonTerm", into = "JsonTerm")]
pub enum RdfTerm {
    Uri(String),
    Literal(RdfLiteral),
    BlankNode(String),
}

impl RdfTerm {
    pub fn uri(value: impl Into<String>) -> Self {
        Self::Uri(value.into())
    }

    /// Creates a simple literal (no datatype, no language tag).
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(RdfLiteral {
            value: value.into(),
            datatype: None,
            language: None,
        })
    }

    pub fn typed_literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self::Literal(RdfLiteral {
            value: value.into(),
            datatype: Some(datatype.into()),
            language: None,
        })
    }

    pub fn language_tagged_literal(value: impl Into<String>, language: impl Into<String>) -> Self {
        Self::Literal(RdfLiteral {
            value: value.into(),
            datatype: None,
            language: Some(language.into()),
        })
    }

    pub fn blank_node(id: impl Into<String>) -> Self {
        Self::BlankNode(id.into())
    }

    pub fn kind(&self) -> TermKind {
        match self {
            RdfTerm::Uri(_) => TermKind::Uri,
            RdfTerm::Literal(_) => TermKind::Literal,
            RdfTerm::BlankNode(_) => TermKind::BlankNode,
        }
    }

    /// The lexical value: the IRI, the literal's lexical form or the blank node identifier.
    pub fn value(&self) -> &str {
        match self {
            RdfTerm::Uri(value) | RdfTerm::BlankNode(value) => value,
            RdfTerm::Literal(literal) => &literal.value,
        }
    }

    pub fn is_uri(&self) -> bool {
        matches!(self, RdfTerm::Uri(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, RdfTerm::Literal(_))
    }

    pub fn is_blank_node(&self) -> bool {
        matches!(self, RdfTerm::BlankNode(_))
    }

    /// Returns a term of the given kind carrying the same lexical value.
    ///
    /// Datatype and language tag are kept if the term stays a literal.
    #[must_use]
    pub fn with_kind(self, kind: TermKind) -> Self {
        if self.kind() == kind {
            return self;
        }
        let value = match self {
            RdfTerm::Uri(value) | RdfTerm::BlankNode(value) => value,
            RdfTerm::Literal(literal) => literal.value,
        };
        match kind {
            TermKind::Uri => RdfTerm::Uri(value),
            TermKind::Literal => RdfTerm::literal(value),
            TermKind::BlankNode => RdfTerm::BlankNode(value),
        }
    }

    /// Renders the term in SPARQL syntax (`<iri>`, `"literal"@en`, `_:b0`).
    ///
    /// IRIs, blank node identifiers and language tags are checked first, so the result is always
    /// a single SPARQL term. Literal escaping is delegated to oxrdf.
    pub fn to_sparql(&self) -> Result<String, InvalidTerm> {
        Term::try_from(self.clone()).map(|term| term.to_string())
    }
}

impl Display for RdfTerm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.to_sparql() {
            Ok(sparql) => f.write_str(&sparql),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}

/// A term that cannot be written as RDF.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidTerm {
    #[error("Invalid IRI '{iri}': {reason}")]
    Iri { iri: String, reason: String },
    #[error("Invalid blank node identifier '{id}': {reason}")]
    BlankNode { id: String, reason: String },
    #[error("Invalid language tag '{tag}': {reason}")]
    LanguageTag { tag: String, reason: String },
}

fn named_node(iri: String) -> Result<NamedNode, InvalidTerm> {
    NamedNode::new(iri.as_str()).map_err(|e| InvalidTerm::Iri {
        reason: e.to_string(),
        iri,
    })
}

impl From<Term> for RdfTerm {
    fn from(term: Term) -> Self {
        match term {
            Term::NamedNode(node) => RdfTerm::Uri(node.into_string()),
            Term::BlankNode(node) => RdfTerm::BlankNode(node.into_string()),
            Term::Literal(literal) => {
                let (value, datatype, language) = literal.destruct();
                RdfTerm::Literal(RdfLiteral {
                    value,
                    datatype: datatype.map(NamedNode::into_string),
                    language,
                })
            }
        }
    }
}

impl TryFrom<RdfTerm> for Term {
    type Error = InvalidTerm;

    fn try_from(term: RdfTerm) -> Result<Self, Self::Error> {
        Ok(match term {
            RdfTerm::Uri(iri) => Term::NamedNode(named_node(iri)?),
            RdfTerm::BlankNode(id) => Term::BlankNode(BlankNode::new(id.as_str()).map_err(
                |e| InvalidTerm::BlankNode {
                    reason: e.to_string(),
                    id,
                },
            )?),
            RdfTerm::Literal(RdfLiteral {
                value,
                datatype,
                language,
            }) => Term::Literal(match (language, datatype) {
                (Some(language), _) => {
                    Literal::new_language_tagged_literal(value, language.as_str()).map_err(
                        |e| InvalidTerm::LanguageTag {
                            reason: e.to_string(),
                            tag: language,
                        },
                    )?
                }
                (None, Some(datatype)) => Literal::new_typed_literal(value, named_node(datatype)?),
                (None, None) => Literal::new_simple_literal(value),
            }),
        })
    }
}

/// A term in the [SPARQL 1.1 JSON results](https://www.w3.org/TR/sparql11-results-json/) format.
#[derive(Clone, Serialize, Deserialize)]
struct JsonTerm {
    #[serde(rename = "type")]
    kind: JsonTermKind,
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    datatype: Option<String>,
    #[serde(rename = "xml:lang", default, skip_serializing_if = "Option::is_none")]
    language: Option<String>,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum JsonTermKind {
    Uri,
    Literal,
    /// Emitted by some SPARQL 1.0 era servers.
    TypedLiteral,
    Bnode,
}

impl From<JsonTerm> for RdfTerm {
    fn from(term: JsonTerm) -> Self {
        match term.kind {
            JsonTermKind::Uri => RdfTerm::Uri(term.value),
            JsonTermKind::Bnode => RdfTerm::BlankNode(term.value),
            JsonTermKind::Literal | JsonTermKind::TypedLiteral => RdfTerm::Literal(RdfLiteral {
                value: term.value,
                datatype: term.datatype,
                language: term.language,
            }),
        }
    }
}

impl From<RdfTerm> for JsonTerm {
    fn from(term: RdfTerm) -> Self {
        match term {
            RdfTerm::Uri(value) => JsonTerm {
                kind: JsonTermKind::Uri,
                value,
                datatype: None,
                language: None,
            },
            RdfTerm::BlankNode(value) => JsonTerm {
                kind: JsonTermKind::Bnode,
                value,
                datatype: None,
                language: None,
            },
            RdfTerm::Literal(literal) => JsonTerm {
                kind: JsonTermKind::Literal,
                value: literal.value,
                datatype: literal.datatype,
                language: literal.language,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip_keeps_kind() -> Result<(), serde_json::Error> {
        let terms = [
            RdfTerm::uri("http://schema.org/Message"),
            RdfTerm::literal("http://schema.org/Message"),
            RdfTerm::blank_node("http://schema.org/Message"),
            RdfTerm::typed_literal("42", "http://www.w3.org/2001/XMLSchema#integer"),
            RdfTerm::language_tagged_literal("ciao", "it"),
        ];
        for term in terms {
            let json = serde_json::to_string(&term)?;
            let decoded: RdfTerm = serde_json::from_str(&json)?;
            assert_eq!(decoded, term, "{json}");
        }
        Ok(())
    }

    #[test]
    fn json_shape() -> Result<(), serde_json::Error> {
        let json = serde_json::to_value(RdfTerm::language_tagged_literal("ciao", "it"))?;
        assert_eq!(
            json,
            serde_json::json!({"type": "literal", "value": "ciao", "xml:lang": "it"})
        );
        let json = serde_json::to_value(RdfTerm::blank_node("b0"))?;
        assert_eq!(json, serde_json::json!({"type": "bnode", "value": "b0"}));
        Ok(())
    }

    #[test]
    fn legacy_typed_literal_is_a_literal() -> Result<(), serde_json::Error> {
        let term: RdfTerm = serde_json::from_str(
            r#"{"type":"typed-literal","value":"1","datatype":"http://www.w3.org/2001/XMLSchema#int"}"#,
        )?;
        assert_eq!(
            term,
            RdfTerm::typed_literal("1", "http://www.w3.org/2001/XMLSchema#int")
        );
        Ok(())
    }

    #[test]
    fn uri_and_literal_with_same_value_differ() {
        assert_ne!(RdfTerm::uri("x"), RdfTerm::literal("x"));
        assert_ne!(RdfTerm::blank_node("x"), RdfTerm::literal("x"));
    }

    #[test]
    fn sparql_rendering() -> Result<(), InvalidTerm> {
        assert_eq!(RdfTerm::literal("Message #0").to_sparql()?, "\"Message #0\"");
        assert_eq!(RdfTerm::literal("say \"hi\"").to_sparql()?, "\"say \\\"hi\\\"\"");
        assert_eq!(
            RdfTerm::uri("http://schema.org/Message").to_sparql()?,
            "<http://schema.org/Message>"
        );
        assert_eq!(RdfTerm::blank_node("b0").to_sparql()?, "_:b0");
        assert_eq!(
            RdfTerm::language_tagged_literal("ciao", "it").to_sparql()?,
            "\"ciao\"@it"
        );
        Ok(())
    }

    #[test]
    fn invalid_terms_are_not_rendered() {
        let injected = RdfTerm::uri("http://x/a> ?p ?o } ; DROP ALL ; DELETE {<http://x/b");
        assert!(matches!(injected.to_sparql(), Err(InvalidTerm::Iri { .. })));
        assert!(matches!(
            RdfTerm::literal("x> . <y").with_kind(TermKind::Uri).to_sparql(),
            Err(InvalidTerm::Iri { .. })
        ));
        assert!(matches!(
            RdfTerm::blank_node("b0 } ; DROP ALL").to_sparql(),
            Err(InvalidTerm::BlankNode { .. })
        ));
        assert!(matches!(
            RdfTerm::language_tagged_literal("x", "en } ;").to_sparql(),
            Err(InvalidTerm::LanguageTag { .. })
        ));
        assert!(matches!(
            RdfTerm::typed_literal("1", "not an iri").to_sparql(),
            Err(InvalidTerm::Iri { .. })
        ));
        // Still printable for diagnostics.
        assert!(injected.to_string().contains("DROP ALL"));
    }

    #[test]
    fn oxrdf_roundtrip() -> Result<(), InvalidTerm> {
        let term = RdfTerm::typed_literal("2.5", "http://www.w3.org/2001/XMLSchema#decimal");
        assert_eq!(RdfTerm::from(Term::try_from(term.clone())?), term);
        Ok(())
    }

    #[test]
    fn with_kind_converts_lexical_value() {
        assert_eq!(
            RdfTerm::literal("http://a").with_kind(TermKind::Uri),
            RdfTerm::uri("http://a")
        );
        let tagged = RdfTerm::language_tagged_literal("a", "en");
        assert_eq!(tagged.clone().with_kind(TermKind::Literal), tagged);
    }
}
