//! The SPARQL 1.1 protocol over HTTP.

use crate::profile::{HttpMethod, Parameters, QueryFormat, UpdateFormat};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use sepa_model::{
    BindingsResults, ErrorResponse, QueryRequest, QueryResponse, Response, UpdateRequest,
    UpdateResponse,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};

const SPARQL_QUERY: &str = "application/sparql-query";
const SPARQL_UPDATE: &str = "application/sparql-update";

/// Where and how queries and updates are sent.
#[derive(Clone, Debug)]
pub struct Endpoints {
    pub query_url: String,
    pub update_url: String,
    pub query_method: HttpMethod,
    pub update_method: HttpMethod,
    pub query_format: QueryFormat,
    pub update_format: UpdateFormat,
}

impl Endpoints {
    /// The plain endpoints of a profile.
    pub fn from_parameters(parameters: &Parameters) -> Self {
        Self {
            query_url: parameters.query_url(),
            update_url: parameters.update_url(),
            query_method: parameters.methods.query,
            update_method: parameters.methods.update,
            query_format: parameters.formats.query,
            update_format: parameters.formats.update,
        }
    }

    /// The endpoints of the security extension, `<securePath><queryPath|updatePath>`.
    ///
    /// Secure queries always carry raw SPARQL and secure updates a form, whatever the profile's
    /// methods say.
    pub fn secure_from_parameters(parameters: &Parameters, use_tls: bool) -> Self {
        Self {
            query_url: parameters.secure_query_url(use_tls),
            update_url: parameters.secure_update_url(use_tls),
            query_method: HttpMethod::Post,
            update_method: HttpMethod::UrlEncodedPost,
            query_format: QueryFormat::Json,
            update_format: UpdateFormat::Text,
        }
    }
}

/// A stateless SPARQL protocol client: one HTTP exchange per call, no retries.
#[derive(Clone, Debug)]
pub struct SparqlHttpClient {
    client: Client,
    endpoints: Endpoints,
}

/// Error bodies sent by the broker: `{"code": 400, "body": "..."}`.
#[derive(Deserialize)]
struct ErrorBody {
    code: Option<u16>,
    #[serde(alias = "error_description", alias = "message")]
    body: Option<String>,
}

impl SparqlHttpClient {
    pub fn new(client: Client, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub async fn query(&self, request: &QueryRequest, timeout: Duration) -> Response {
        self.send_query(request, None, timeout).await.into()
    }

    pub async fn update(&self, request: &UpdateRequest, timeout: Duration) -> Response {
        self.send_update(request, None, timeout).await.into()
    }

    /// Sends a query, with `Authorization: Bearer <token>` if `bearer` is set.
    pub(crate) async fn send_query(
        &self,
        request: &QueryRequest,
        bearer: Option<&str>,
        timeout: Duration,
    ) -> Result<Response, ErrorResponse> {
        debug!("{request}");
        let url = &self.endpoints.query_url;
        let builder = match self.endpoints.query_method {
            HttpMethod::Get => self
                .client
                .get(url)
                .query(&[("query", request.sparql.as_str())]),
            HttpMethod::Post => self
                .client
                .post(url)
                .header(CONTENT_TYPE, SPARQL_QUERY)
                .body(request.sparql.clone()),
            HttpMethod::UrlEncodedPost => self
                .client
                .post(url)
                .form(&[("query", request.sparql.as_str())]),
        }
        .header(ACCEPT, self.endpoints.query_format.accept());

        let body = execute(authorize(builder, bearer), url, timeout)
            .await
            .map_err(|e| e.with_token(request.token))?;
        let results: BindingsResults = serde_json::from_str(&body).map_err(|e| {
            ErrorResponse::malformed(format!("Invalid SPARQL results from {url}: {e}"))
                .with_token(request.token)
        })?;
        Ok(Response::Query(QueryResponse {
            token: request.token,
            results,
        }))
    }

    /// Sends an update, with `Authorization: Bearer <token>` if `bearer` is set.
    pub(crate) async fn send_update(
        &self,
        request: &UpdateRequest,
        bearer: Option<&str>,
        timeout: Duration,
    ) -> Result<Response, ErrorResponse> {
        debug!("{request}");
        let url = &self.endpoints.update_url;
        let builder = match self.endpoints.update_method {
            HttpMethod::Post => self
                .client
                .post(url)
                .header(CONTENT_TYPE, SPARQL_UPDATE)
                .body(request.sparql.clone()),
            // Profiles with GET updates are rejected when loaded.
            HttpMethod::UrlEncodedPost | HttpMethod::Get => self
                .client
                .post(url)
                .form(&[("update", request.sparql.as_str())]),
        }
        .header(ACCEPT, self.endpoints.update_format.accept());

        let body = execute(authorize(builder, bearer), url, timeout)
            .await
            .map_err(|e| e.with_token(request.token))?;
        Ok(Response::Update(UpdateResponse {
            token: request.token,
            body,
        }))
    }
}

fn authorize(builder: RequestBuilder, bearer: Option<&str>) -> RequestBuilder {
    match bearer {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    }
}

/// Runs one exchange and returns the whole response body, or the error it describes.
pub(crate) async fn execute(
    builder: RequestBuilder,
    url: &str,
    timeout: Duration,
) -> Result<String, ErrorResponse> {
    let response = builder
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| request_error(url, &e))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| request_error(url, &e))?;
    if status.is_client_error() || status.is_server_error() {
        debug!("{url} answered {status}: {body}");
        return Err(status_error(status, body));
    }
    Ok(body)
}

fn request_error(url: &str, error: &reqwest::Error) -> ErrorResponse {
    if error.is_timeout() {
        ErrorResponse::timeout(format!("No answer from {url}"))
    } else {
        error!("HTTP exchange with {url} failed: {error}");
        ErrorResponse::transport(error.to_string())
    }
}

/// JSON error bodies take precedence over the status line.
fn status_error(status: StatusCode, body: String) -> ErrorResponse {
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody {
            code,
            body: Some(message),
        }) => ErrorResponse::server(code.unwrap_or(status.as_u16()), message),
        Ok(ErrorBody {
            code: Some(code), ..
        }) => ErrorResponse::server(code, body),
        _ => ErrorResponse::server(status.as_u16(), body),
    }
}
