use serde_json::{json, Map, Value};
use std::fmt::{Display, Formatter};

/// A SPARQL 1.1 query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryRequest {
    pub token: Option<u64>,
    pub sparql: String,
}

impl QueryRequest {
    pub fn new(sparql: impl Into<String>) -> Self {
        Self {
            token: None,
            sparql: sparql.into(),
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: u64) -> Self {
        self.token = Some(token);
        self
    }
}

impl Display for QueryRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.token {
            Some(token) => write!(f, "QUERY #{token} {}", self.sparql),
            None => write!(f, "QUERY {}", self.sparql),
        }
    }
}

/// A SPARQL 1.1 update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateRequest {
    pub token: Option<u64>,
    pub sparql: String,
}

impl UpdateRequest {
    pub fn new(sparql: impl Into<String>) -> Self {
        Self {
            token: None,
            sparql: sparql.into(),
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: u64) -> Self {
        self.token = Some(token);
        self
    }
}

impl Display for UpdateRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.token {
            Some(token) => write!(f, "UPDATE #{token} {}", self.sparql),
            None => write!(f, "UPDATE {}", self.sparql),
        }
    }
}

/// Subscribes to the results of a SPARQL query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub token: Option<u64>,
    pub sparql: String,
    /// A name the broker echoes back in the `subscribed` reply.
    pub alias: Option<String>,
}

impl SubscribeRequest {
    pub fn new(sparql: impl Into<String>) -> Self {
        Self {
            token: None,
            sparql: sparql.into(),
            alias: None,
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The channel frame, e.g. `{"subscribe":"SELECT ..."}`.
    pub fn to_message(&self, authorization: Option<&str>) -> String {
        let mut message = Map::new();
        message.insert("subscribe".to_owned(), json!(self.sparql));
        if let Some(alias) = &self.alias {
            message.insert("alias".to_owned(), json!(alias));
        }
        if let Some(authorization) = authorization {
            message.insert("authorization".to_owned(), json!(authorization));
        }
        Value::Object(message).to_string()
    }
}

impl Display for SubscribeRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("SUBSCRIBE ")?;
        if let Some(alias) = &self.alias {
            write!(f, "[{alias}] ")?;
        }
        f.write_str(&self.sparql)
    }
}

/// Cancels the subscription identified by `spuid`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsubscribeRequest {
    pub token: Option<u64>,
    pub spuid: String,
}

impl UnsubscribeRequest {
    pub fn new(spuid: impl Into<String>) -> Self {
        Self {
            token: None,
            spuid: spuid.into(),
        }
    }

    pub fn to_message(&self, authorization: Option<&str>) -> String {
        let mut message = Map::new();
        message.insert("unsubscribe".to_owned(), json!(self.spuid));
        if let Some(authorization) = authorization {
            message.insert("authorization".to_owned(), json!(authorization));
        }
        Value::Object(message).to_string()
    }
}

impl Display for UnsubscribeRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "UNSUBSCRIBE {}", self.spuid)
    }
}
