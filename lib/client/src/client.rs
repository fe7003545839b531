use crate::config::ClientOptions;
use crate::http::{Endpoints, SparqlHttpClient};
use crate::pattern::instantiate;
use crate::profile::{ApplicationProfile, ProfileError};
use crate::security::{
    CredentialStore, MemoryCredentialStore, ProfileFileStore, SecurityExtension,
};
use crate::subscription::{Subscription, SubscriptionHandler};
use crate::transport::{Connector, Transport, WebSocketConnector};
use reqwest::{Client, Url};
use sepa_model::{
    Bindings, QueryRequest, Response, SubscribeRequest, UnsubscribeRequest,
    UpdateRequest,
};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A client of one broker, described by an [`ApplicationProfile`].
///
/// Queries and updates go over HTTP, subscriptions over a channel opened on first use. Once the
/// client is registered with the security extension every primitive uses the secure endpoints.
///
/// The client is meant to be shared (`Arc<SepaClient>`); every method takes `&self`.
#[derive(Debug)]
pub struct SepaClient {
    profile: Arc<ApplicationProfile>,
    options: ClientOptions,
    http: SparqlHttpClient,
    channel: Transport,
    security: SecurityExtension,
    next_token: AtomicU64,
}

/// Builds a [`SepaClient`].
#[must_use]
pub struct SepaClientBuilder {
    profile: ApplicationProfile,
    options: ClientOptions,
    credential_store: Option<Arc<dyn CredentialStore>>,
    connector: Option<Arc<dyn Connector>>,
    http_client: Option<Client>,
}

impl SepaClientBuilder {
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Where registrations and tokens are persisted.
    ///
    /// Defaults to the profile file when the profile was loaded from one, else to memory.
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credential_store = Some(store);
        self
    }

    /// How subscription channels are opened. Defaults to [`WebSocketConnector`].
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn build(self) -> Result<SepaClient, ProfileError> {
        let parameters = self.profile.parameters();
        let use_tls = self.options.use_tls;
        for url in [
            parameters.query_url(),
            parameters.update_url(),
            parameters.subscribe_url(),
            parameters.register_url(use_tls),
            parameters.secure_subscribe_url(use_tls),
        ] {
            if let Err(e) = Url::parse(&url) {
                return Err(ProfileError::InvalidEndpoint {
                    url,
                    reason: e.to_string(),
                });
            }
        }

        let client = self.http_client.unwrap_or_default();
        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(WebSocketConnector),
        };
        let store: Arc<dyn CredentialStore> = match (self.credential_store, self.profile.source()) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(ProfileFileStore::new(path)),
            (None, None) => Arc::new(MemoryCredentialStore::new(self.profile.credentials())),
        };
        let security = SecurityExtension::new(
            parameters,
            use_tls,
            client.clone(),
            Arc::clone(&connector),
            store,
        )?;

        Ok(SepaClient {
            http: SparqlHttpClient::new(client, Endpoints::from_parameters(parameters)),
            channel: Transport::new(parameters.subscribe_url(), connector),
            security,
            options: self.options,
            profile: Arc::new(self.profile),
            next_token: AtomicU64::new(0),
        })
    }
}

impl SepaClient {
    pub fn builder(profile: ApplicationProfile) -> SepaClientBuilder {
        SepaClientBuilder {
            profile,
            options: ClientOptions::default(),
            credential_store: None,
            connector: None,
            http_client: None,
        }
    }

    pub fn new(profile: ApplicationProfile) -> Result<Self, ProfileError> {
        Self::builder(profile).build()
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        Self::new(ApplicationProfile::from_path(path)?)
    }

    pub fn profile(&self) -> &ApplicationProfile {
        &self.profile
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn security(&self) -> &SecurityExtension {
        &self.security
    }

    /// The plain subscription channel.
    pub fn channel(&self) -> &Transport {
        &self.channel
    }

    fn is_secure(&self) -> bool {
        self.security.is_registered()
    }

    fn next_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub async fn update(&self, sparql: impl Into<String>) -> Response {
        let request = UpdateRequest::new(sparql).with_token(self.next_token());
        if self.is_secure() {
            self.security
                .secure_update(&request, self.options.http_timeout)
                .await
        } else {
            self.http.update(&request, self.options.http_timeout).await
        }
    }

    pub async fn query(&self, sparql: impl Into<String>) -> Response {
        let request = QueryRequest::new(sparql).with_token(self.next_token());
        if self.is_secure() {
            self.security
                .secure_query(&request, self.options.http_timeout)
                .await
        } else {
            self.http.query(&request, self.options.http_timeout).await
        }
    }

    /// Runs the named query of the profile with `forced` bindings.
    ///
    /// Fails without contacting the broker if `id` is unknown or a value is not a valid term.
    pub async fn query_named(&self, id: &str, forced: &Bindings) -> Result<Response, ProfileError> {
        let template = self
            .profile
            .query(id)
            .ok_or_else(|| ProfileError::UnknownQuery(id.to_owned()))?;
        Ok(self.query(instantiate(&self.profile, template, forced)?).await)
    }

    /// Subscribes to the results of `sparql`.
    ///
    /// On success the [`Response::Subscribe`] carries the spuid; [`SepaClient::subscription`]
    /// gives the handle.
    pub async fn subscribe(
        &self,
        sparql: impl Into<String>,
        alias: Option<&str>,
        handler: Arc<dyn SubscriptionHandler>,
    ) -> Response {
        let mut request = SubscribeRequest::new(sparql);
        request.token = Some(self.next_token());
        if let Some(alias) = alias {
            request = request.with_alias(alias);
        }
        if self.is_secure() {
            self.security
                .secure_subscribe(&request, handler, self.options.channel_timeout)
                .await
        } else {
            self.channel
                .subscribe(&request, None, handler, self.options.channel_timeout)
                .await
        }
    }

    /// Cancels a subscription on whichever channel holds it.
    pub async fn unsubscribe(&self, spuid: &str) -> Response {
        let mut request = UnsubscribeRequest::new(spuid);
        request.token = Some(self.next_token());
        if self.security.channel().subscription(spuid).is_some() {
            self.security
                .secure_unsubscribe(&request, self.options.channel_timeout)
                .await
        } else {
            self.channel
                .unsubscribe(&request, None, self.options.channel_timeout)
                .await
        }
    }

    pub fn subscription(&self, spuid: &str) -> Option<Subscription> {
        self.channel
            .subscription(spuid)
            .or_else(|| self.security.channel().subscription(spuid))
    }

    /// Registers with the authorization server. See [`SecurityExtension::register`].
    pub async fn register(&self, identity: &str) -> Response {
        self.security
            .register(identity, self.options.http_timeout)
            .await
    }

    /// Requests an access token. See [`SecurityExtension::request_token`].
    pub async fn request_token(&self) -> Response {
        self.security.request_token(self.options.http_timeout).await
    }
}
