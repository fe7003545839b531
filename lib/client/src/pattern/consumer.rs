use crate::pattern::instantiate;
use crate::profile::{OperationTemplate, ProfileError};
use crate::subscription::{Subscription, SubscriptionHandler};
use crate::SepaClient;
use sepa_model::{Bindings, ErrorResponse, Response};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Subscribes to one named query of the profile and forwards its events to a handler.
pub struct Consumer {
    client: Arc<SepaClient>,
    query_id: String,
    template: OperationTemplate,
    handler: Arc<dyn SubscriptionHandler>,
    subscription: Mutex<Option<Subscription>>,
}

impl Consumer {
    pub fn new(
        client: Arc<SepaClient>,
        query_id: &str,
        handler: Arc<dyn SubscriptionHandler>,
    ) -> Result<Self, ProfileError> {
        let template = client
            .profile()
            .query(query_id)
            .cloned()
            .ok_or_else(|| ProfileError::UnknownQuery(query_id.to_owned()))?;
        Ok(Self {
            client,
            query_id: query_id.to_owned(),
            template,
            handler,
            subscription: Mutex::new(None),
        })
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn client(&self) -> &Arc<SepaClient> {
        &self.client
    }

    /// The query text with `forced` merged over the declared defaults.
    pub fn sparql(&self, forced: &Bindings) -> Result<String, ProfileError> {
        instantiate(self.client.profile(), &self.template, forced)
    }

    /// Subscribes. The handler receives the first results before this returns.
    pub async fn subscribe(&self, forced: &Bindings) -> Response {
        let sparql = match self.sparql(forced) {
            Ok(sparql) => sparql,
            Err(e) => return self.invalid(&e),
        };
        let response = self
            .client
            .subscribe(sparql, None, Arc::clone(&self.handler))
            .await;
        if let Response::Subscribe(subscribed) = &response {
            *self.current() = self.client.subscription(&subscribed.spuid);
        }
        response
    }

    /// Cancels the current subscription.
    pub async fn unsubscribe(&self) -> Response {
        let Some(subscription) = self.subscription() else {
            return ErrorResponse::not_connected(format!("{} is not subscribed", self.query_id))
                .into();
        };
        let response = self.client.unsubscribe(subscription.spuid()).await;
        if response.is_unsubscribe() {
            *self.current() = None;
        }
        response
    }

    /// The last subscription made, whatever its state.
    pub fn subscription(&self) -> Option<Subscription> {
        self.current().clone()
    }

    /// Runs the query once instead of subscribing to it.
    pub async fn query(&self, forced: &Bindings) -> Response {
        match self.sparql(forced) {
            Ok(sparql) => self.client.query(sparql).await,
            Err(e) => self.invalid(&e),
        }
    }

    fn invalid(&self, error: &ProfileError) -> Response {
        ErrorResponse::invalid_request(format!("{}: {error}", self.query_id)).into()
    }

    fn current(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("query_id", &self.query_id)
            .field("subscription", &self.subscription())
            .finish_non_exhaustive()
    }
}
