//! The security extension: client registration, access tokens and the secure endpoints.
//!
//! Registration and token requests go to the authorization server over HTTPS. Secure queries
//! and updates carry `Authorization: Bearer <token>`. Secure subscriptions use a second channel
//! (`wss`) whose messages carry the same header value in an `authorization` field.
//!
//! A token is never requested implicitly: when it is missing or expired the secure primitives
//! fail with `Unauthorized` and the caller decides when to call [`SecurityExtension::request_token`].

mod credentials;
mod store;

pub use credentials::Credentials;
pub use store::{CredentialStore, CredentialStoreError, MemoryCredentialStore, ProfileFileStore};

use crate::http::{self, Endpoints, SparqlHttpClient};
use crate::profile::Parameters;
use crate::subscription::SubscriptionHandler;
use crate::transport::{Connector, Transport};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use sepa_model::{
    ErrorResponse, QueryRequest, RegistrationResponse, Response, SubscribeRequest, TokenResponse,
    UnsubscribeRequest, UpdateRequest,
};
use serde_json::{json, Value};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, info};

const APPLICATION_JSON: &str = "application/json";

/// Security state of a client and the primitives that use it.
pub struct SecurityExtension {
    client: Client,
    register_url: String,
    token_url: String,
    http: SparqlHttpClient,
    channel: Transport,
    store: Arc<dyn CredentialStore>,
    credentials: RwLock<Credentials>,
    /// Serializes saves so that no update is lost. The credentials lock is not held meanwhile.
    save_gate: tokio::sync::Mutex<()>,
}

impl SecurityExtension {
    /// Loads the credentials from `store`.
    pub fn new(
        parameters: &Parameters,
        use_tls: bool,
        client: Client,
        connector: Arc<dyn Connector>,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, CredentialStoreError> {
        let credentials = store.load()?;
        Ok(Self {
            register_url: parameters.register_url(use_tls),
            token_url: parameters.token_request_url(use_tls),
            http: SparqlHttpClient::new(
                client.clone(),
                Endpoints::secure_from_parameters(parameters, use_tls),
            ),
            channel: Transport::new(parameters.secure_subscribe_url(use_tls), connector),
            client,
            store,
            credentials: RwLock::new(credentials),
            save_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// A copy of the current security material.
    pub fn credentials(&self) -> Credentials {
        self.read().clone()
    }

    pub fn is_registered(&self) -> bool {
        self.read().is_registered()
    }

    pub fn has_valid_token(&self) -> bool {
        self.read().has_valid_token()
    }

    /// The secure subscription channel.
    pub fn channel(&self) -> &Transport {
        &self.channel
    }

    /// Registers `identity` with the authorization server and stores the issued client
    /// credentials.
    pub async fn register(&self, identity: &str, timeout: Duration) -> Response {
        self.try_register(identity, timeout).await.into()
    }

    async fn try_register(&self, identity: &str, timeout: Duration) -> Result<Response, ErrorResponse> {
        debug!("REGISTER {identity}");
        let request = self
            .client
            .post(&self.register_url)
            .header(CONTENT_TYPE, APPLICATION_JSON)
            .header(ACCEPT, APPLICATION_JSON)
            .body(
                json!({
                    "client_identity": identity,
                    "grant_types": ["client_credentials"]
                })
                .to_string(),
            );
        let body = parse_reply(&http::execute(request, &self.register_url, timeout).await?)?;
        let (Some(client_id), Some(client_secret)) = (
            body.get("client_id").and_then(Value::as_str),
            body.get("client_secret").and_then(Value::as_str),
        ) else {
            return Err(ErrorResponse::malformed(
                "Credentials not found in the registration response",
            ));
        };

        self.update_credentials(|credentials| credentials.set_client(client_id, client_secret))
            .await?;
        info!("Registered '{identity}' as {client_id}");
        Ok(Response::Registration(RegistrationResponse {
            client_id: client_id.to_owned(),
            client_secret: client_secret.to_owned(),
        }))
    }

    /// Requests an access token with the stored client credentials.
    ///
    /// Fails with `Unauthorized`, without contacting the server, if the client is not registered.
    pub async fn request_token(&self, timeout: Duration) -> Response {
        self.try_request_token(timeout).await.into()
    }

    async fn try_request_token(&self, timeout: Duration) -> Result<Response, ErrorResponse> {
        let (client_id, client_secret) = {
            let credentials = self.read();
            let (id, secret) = credentials.client().ok_or_else(|| {
                ErrorResponse::unauthorized("The client is not registered. Register first")
            })?;
            (id.to_owned(), secret.to_owned())
        };
        debug!("TOKEN REQUEST for {client_id}");
        let request = self
            .client
            .post(&self.token_url)
            .basic_auth(&client_id, Some(&client_secret))
            .header(CONTENT_TYPE, APPLICATION_JSON)
            .header(ACCEPT, APPLICATION_JSON);
        let body = parse_reply(&http::execute(request, &self.token_url, timeout).await?)?;
        let (Some(access_token), Some(token_type), Some(expires_in)) = (
            body.get("access_token").and_then(Value::as_str),
            body.get("token_type").and_then(Value::as_str),
            body.get("expires_in").and_then(Value::as_i64),
        ) else {
            return Err(ErrorResponse::malformed(format!(
                "Token response not recognized: {body}"
            )));
        };

        let expires_at = token_expiry(OffsetDateTime::now_utc(), expires_in)?;
        self.update_credentials(|credentials| {
            credentials.set_token(access_token, token_type, expires_at);
        })
        .await?;
        debug!("Token for {client_id} valid until {expires_at}");
        Ok(Response::Token(TokenResponse {
            access_token: access_token.to_owned(),
            token_type: token_type.to_owned(),
            expires_at,
        }))
    }

    pub async fn secure_update(&self, request: &UpdateRequest, timeout: Duration) -> Response {
        self.try_secure_update(request, timeout).await.into()
    }

    async fn try_secure_update(
        &self,
        request: &UpdateRequest,
        timeout: Duration,
    ) -> Result<Response, ErrorResponse> {
        let token = self.valid_token()?;
        let response = self.http.send_update(request, Some(&token), timeout).await?;
        if let Response::Update(update) = &response {
            check_code(&update.body).map_err(|e| e.with_token(request.token))?;
        }
        Ok(response)
    }

    pub async fn secure_query(&self, request: &QueryRequest, timeout: Duration) -> Response {
        match self.valid_token() {
            Ok(token) => self
                .http
                .send_query(request, Some(&token), timeout)
                .await
                .into(),
            Err(e) => e.with_token(request.token).into(),
        }
    }

    /// Subscribes over the secure channel.
    pub async fn secure_subscribe(
        &self,
        request: &SubscribeRequest,
        handler: Arc<dyn SubscriptionHandler>,
        timeout: Duration,
    ) -> Response {
        match self.valid_token() {
            Ok(token) => {
                self.channel
                    .subscribe(request, Some(&format!("Bearer {token}")), handler, timeout)
                    .await
            }
            Err(e) => e.into(),
        }
    }

    pub async fn secure_unsubscribe(
        &self,
        request: &UnsubscribeRequest,
        timeout: Duration,
    ) -> Response {
        match self.valid_token() {
            Ok(token) => {
                self.channel
                    .unsubscribe(request, Some(&format!("Bearer {token}")), timeout)
                    .await
            }
            Err(e) => e.into(),
        }
    }

    fn valid_token(&self) -> Result<String, ErrorResponse> {
        let credentials = self.read();
        match &credentials.jwt {
            Some(jwt) if !credentials.is_token_expired() => Ok(jwt.clone()),
            Some(_) => Err(ErrorResponse::unauthorized(
                "The access token expired. Request a new one",
            )),
            None => Err(ErrorResponse::unauthorized(
                "No access token. Request one first",
            )),
        }
    }

    /// Applies `change` and persists the result. The in-memory state is only replaced once the
    /// store accepted it. The store runs on the blocking pool.
    async fn update_credentials(
        &self,
        change: impl FnOnce(&mut Credentials),
    ) -> Result<(), ErrorResponse> {
        let _saving = self.save_gate.lock().await;
        let mut updated = self.read().clone();
        change(&mut updated);
        let store = Arc::clone(&self.store);
        let saved = updated.clone();
        tokio::task::spawn_blocking(move || store.save(&saved))
            .await
            .map_err(|e| ErrorResponse::persistence(format!("The save task failed: {e}")))?
            .map_err(|e| {
                ErrorResponse::persistence(format!("Could not save the security material: {e}"))
            })?;
        *self.write() = updated;
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Credentials> {
        self.credentials.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Credentials> {
        self.credentials.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SecurityExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityExtension")
            .field("register_url", &self.register_url)
            .field("token_url", &self.token_url)
            .field("credentials", &*self.read())
            .finish_non_exhaustive()
    }
}

/// Parses an authorization server reply. A `code` >= 400 is an error whatever was asked.
fn parse_reply(body: &str) -> Result<Value, ErrorResponse> {
    let value: Value = serde_json::from_str(body)
        .map_err(|_| ErrorResponse::malformed(format!("Unknown response: {body}")))?;
    if !value.is_object() {
        return Err(ErrorResponse::malformed(format!("Unknown response: {body}")));
    }
    check_value_code(&value)?;
    Ok(value)
}

/// `expires_in` is a number of seconds from `now`.
fn token_expiry(now: OffsetDateTime, expires_in: i64) -> Result<OffsetDateTime, ErrorResponse> {
    if expires_in < 0 {
        return Err(ErrorResponse::malformed(format!(
            "Negative token lifetime: {expires_in}"
        )));
    }
    now.checked_add(time::Duration::seconds(expires_in))
        .ok_or_else(|| {
            ErrorResponse::malformed(format!("Token lifetime out of range: {expires_in}"))
        })
}

/// Secure update bodies are free text, so only JSON bodies are inspected.
fn check_code(body: &str) -> Result<(), ErrorResponse> {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => check_value_code(&value),
        Err(_) => Ok(()),
    }
}

fn check_value_code(value: &Value) -> Result<(), ErrorResponse> {
    let Some(code) = value
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
    else {
        return Ok(());
    };
    if code < 400 {
        return Ok(());
    }
    let message = value
        .get("body")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Err(ErrorResponse::server(code, message))
}
