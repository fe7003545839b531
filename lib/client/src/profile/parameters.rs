use crate::security::Credentials;
use serde::{Deserialize, Serialize};

/// Connection parameters of a broker (the `parameters` object of a profile).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub host: String,
    pub ports: Ports,
    pub paths: Paths,
    pub methods: Methods,
    pub formats: Formats,
    /// Persisted security material, if the client registered before.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<Credentials>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Ports {
    pub http: u16,
    pub https: u16,
    pub ws: u16,
    pub wss: u16,
}

impl Default for Ports {
    fn default() -> Self {
        Self {
            http: 8000,
            https: 8443,
            ws: 9000,
            wss: 9443,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Paths {
    pub query: String,
    pub update: String,
    pub subscribe: String,
    pub register: String,
    pub token_request: String,
    pub secure_path: String,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            query: "/query".to_owned(),
            update: "/update".to_owned(),
            subscribe: "/subscribe".to_owned(),
            register: "/oauth/register".to_owned(),
            token_request: "/oauth/token".to_owned(),
            secure_path: "/secure".to_owned(),
        }
    }
}

/// How a SPARQL operation is carried over HTTP.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    /// `?query=` in the URL. Only valid for queries.
    #[serde(rename = "GET")]
    Get,
    /// Unencoded SPARQL in the body (`application/sparql-query` / `application/sparql-update`).
    #[serde(rename = "POST")]
    Post,
    /// `query=` / `update=` in an `application/x-www-form-urlencoded` body.
    #[serde(rename = "URL_ENCODED_POST")]
    UrlEncodedPost,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Methods {
    pub query: HttpMethod,
    pub update: HttpMethod,
}

impl Default for Methods {
    fn default() -> Self {
        Self {
            query: HttpMethod::Post,
            update: HttpMethod::UrlEncodedPost,
        }
    }
}

/// Response format requested from the query endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryFormat {
    Json,
}

impl QueryFormat {
    pub fn accept(self) -> &'static str {
        match self {
            QueryFormat::Json => "application/sparql-results+json",
        }
    }
}

/// Response format requested from the update endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UpdateFormat {
    Html,
    Json,
    Text,
}

impl UpdateFormat {
    pub fn accept(self) -> &'static str {
        match self {
            UpdateFormat::Html => "text/html",
            UpdateFormat::Json => "application/json",
            UpdateFormat::Text => "text/plain",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Formats {
    pub query: QueryFormat,
    pub update: UpdateFormat,
}

impl Default for Formats {
    fn default() -> Self {
        Self {
            query: QueryFormat::Json,
            update: UpdateFormat::Html,
        }
    }
}

impl Parameters {
    pub fn query_url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.ports.http, self.paths.query)
    }

    pub fn update_url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.ports.http, self.paths.update)
    }

    pub fn subscribe_url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.ports.ws, self.paths.subscribe)
    }

    /// Base URL of the security extension, `https://host:https` (or `http://host:https` without TLS).
    pub fn secure_base_url(&self, use_tls: bool) -> String {
        let scheme = if use_tls { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.ports.https)
    }

    pub fn register_url(&self, use_tls: bool) -> String {
        format!("{}{}", self.secure_base_url(use_tls), self.paths.register)
    }

    pub fn token_request_url(&self, use_tls: bool) -> String {
        format!("{}{}", self.secure_base_url(use_tls), self.paths.token_request)
    }

    pub fn secure_query_url(&self, use_tls: bool) -> String {
        format!(
            "{}{}{}",
            self.secure_base_url(use_tls),
            self.paths.secure_path,
            self.paths.query
        )
    }

    pub fn secure_update_url(&self, use_tls: bool) -> String {
        format!(
            "{}{}{}",
            self.secure_base_url(use_tls),
            self.paths.secure_path,
            self.paths.update
        )
    }

    pub fn secure_subscribe_url(&self, use_tls: bool) -> String {
        let scheme = if use_tls { "wss" } else { "ws" };
        format!(
            "{scheme}://{}:{}{}{}",
            self.host, self.ports.wss, self.paths.secure_path, self.paths.subscribe
        )
    }
}
