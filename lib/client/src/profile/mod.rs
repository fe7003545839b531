//! The application profile: a JSON document describing a broker and the named SPARQL templates
//! an application uses.
//!
//! ```json
//! {
//!   "parameters": {
//!     "host": "localhost",
//!     "ports": {"http": 8000, "https": 8443, "ws": 9000, "wss": 9443},
//!     "paths": {"query": "/query", "update": "/update", "subscribe": "/subscribe",
//!               "register": "/oauth/register", "tokenRequest": "/oauth/token", "securePath": "/secure"},
//!     "methods": {"query": "POST", "update": "URL_ENCODED_POST"},
//!     "formats": {"query": "JSON", "update": "HTML"}
//!   },
//!   "namespaces": {"schema": "http://schema.org/"},
//!   "updates": {
//!     "PUBLISH_A_MESSAGE": {
//!       "sparql": "INSERT DATA { schema:Message-1 schema:text ?text }",
//!       "forcedBindings": {"text": {"type": "literal"}}
//!     }
//!   },
//!   "queries": {
//!     "SUBSCRIBE_TO_MESSAGES": {"sparql": "SELECT ?message ?text WHERE { ?message schema:text ?text }"}
//!   }
//! }
//! ```

mod parameters;
mod template;

pub use parameters::{
    Formats, HttpMethod, Methods, Parameters, Paths, Ports, QueryFormat, UpdateFormat,
};
pub use template::{ForcedBinding, OperationTemplate};

pub(crate) use template::is_variable_char;

use crate::security::Credentials;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// An error raised while loading or using an [`ApplicationProfile`].
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Could not read profile '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid profile: {0}")]
    Json(#[from] serde_json::Error),
    #[error("The profile does not define a host")]
    MissingHost,
    #[error("The profile does not define an update named '{0}'")]
    UnknownUpdate(String),
    #[error("The profile does not define a query named '{0}'")]
    UnknownQuery(String),
    #[error("'{variable}' declared by '{operation}' is not a valid SPARQL variable name")]
    InvalidVariable { operation: String, variable: String },
    #[error("Invalid value for '{variable}': {source}")]
    InvalidBinding {
        variable: String,
        #[source]
        source: sepa_model::InvalidTerm,
    },
    #[error("Updates cannot be sent with the GET method")]
    UnsupportedUpdateMethod,
    #[error("Invalid endpoint URL '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error(transparent)]
    CredentialStore(#[from] crate::security::CredentialStoreError),
}

/// A parsed application profile.
///
/// Loaded once when a client is built. Only the security material changes afterwards, and it is
/// owned by the client's credential store, not by this value.
#[derive(Clone, Debug, Deserialize)]
pub struct ApplicationProfile {
    parameters: Parameters,
    #[serde(default)]
    namespaces: BTreeMap<String, String>,
    #[serde(default)]
    updates: BTreeMap<String, OperationTemplate>,
    #[serde(default)]
    queries: BTreeMap<String, OperationTemplate>,
    #[serde(default)]
    extended: Option<Value>,
    #[serde(skip)]
    source: Option<PathBuf>,
}

impl ApplicationProfile {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ProfileError::Io {
            path: path.to_owned(),
            source,
        })?;
        let mut profile = Self::from_reader(BufReader::new(file))?;
        profile.source = Some(path.to_owned());
        Ok(profile)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, ProfileError> {
        let profile: Self = serde_json::from_reader(reader)?;
        profile.validate()?;
        Ok(profile)
    }

    fn validate(&self) -> Result<(), ProfileError> {
        if self.parameters.host.is_empty() {
            return Err(ProfileError::MissingHost);
        }
        if self.parameters.methods.update == HttpMethod::Get {
            return Err(ProfileError::UnsupportedUpdateMethod);
        }
        for (operation, template) in self.updates.iter().chain(&self.queries) {
            if let Some(variable) = template
                .declared_variables()
                .find(|variable| !template::is_valid_variable(variable))
            {
                return Err(ProfileError::InvalidVariable {
                    operation: operation.clone(),
                    variable: variable.to_owned(),
                });
            }
        }
        Ok(())
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// The security material stored in the profile document.
    pub fn credentials(&self) -> Credentials {
        self.parameters.security.clone().unwrap_or_default()
    }

    /// The file this profile was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn update(&self, id: &str) -> Option<&OperationTemplate> {
        self.updates.get(id)
    }

    pub fn query(&self, id: &str) -> Option<&OperationTemplate> {
        self.queries.get(id)
    }

    pub fn update_ids(&self) -> impl Iterator<Item = &str> {
        self.updates.keys().map(String::as_str)
    }

    pub fn query_ids(&self) -> impl Iterator<Item = &str> {
        self.queries.keys().map(String::as_str)
    }

    pub fn namespaces(&self) -> &BTreeMap<String, String> {
        &self.namespaces
    }

    pub fn namespace(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(String::as_str)
    }

    /// `PREFIX` declarations for every namespace, one per line.
    pub fn prologue(&self) -> String {
        self.namespaces
            .iter()
            .map(|(prefix, iri)| format!("PREFIX {prefix}: <{iri}>\n"))
            .collect()
    }

    /// Application-specific data carried in the profile's `extended` object.
    pub fn extended(&self) -> Option<&Value> {
        self.extended.as_ref()
    }
}

impl FromStr for ApplicationProfile {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_reader(s.as_bytes())
    }
}
