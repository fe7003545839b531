use crate::pattern::{Consumer, Producer};
use crate::profile::ProfileError;
use crate::subscription::{Subscription, SubscriptionHandler};
use crate::SepaClient;
use futures::future::join_all;
use sepa_model::{ARBindingsResults, Bindings, BindingsResults, ErrorResponse, Response};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// A [`Consumer`] that runs a trigger update for every added result row.
///
/// The trigger's forced bindings are taken from the row, by variable name. Rows are processed
/// concurrently and independently: a failed update is logged and does not affect the others.
#[derive(Debug)]
pub struct Aggregator {
    consumer: Consumer,
    producer: Arc<Producer>,
}

impl Aggregator {
    /// `handler` receives every event of the subscription, before the trigger runs.
    pub fn new(
        client: Arc<SepaClient>,
        query_id: &str,
        update_id: &str,
        handler: Arc<dyn SubscriptionHandler>,
    ) -> Result<Self, ProfileError> {
        let producer = Arc::new(Producer::new(Arc::clone(&client), update_id)?);
        let trigger = Arc::new(TriggerHandler {
            inner: handler,
            producer: Arc::clone(&producer),
        });
        Ok(Self {
            consumer: Consumer::new(client, query_id, trigger)?,
            producer,
        })
    }

    pub async fn subscribe(&self, forced: &Bindings) -> Response {
        self.consumer.subscribe(forced).await
    }

    pub async fn unsubscribe(&self) -> Response {
        self.consumer.unsubscribe().await
    }

    pub fn subscription(&self) -> Option<Subscription> {
        self.consumer.subscription()
    }

    pub fn consumer(&self) -> &Consumer {
        &self.consumer
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }
}

struct TriggerHandler {
    inner: Arc<dyn SubscriptionHandler>,
    producer: Arc<Producer>,
}

impl TriggerHandler {
    fn trigger_bindings(&self, row: &Bindings) -> Bindings {
        self.producer
            .template()
            .declared_variables()
            .filter_map(|variable| Some((variable, row.get(variable)?.clone())))
            .collect()
    }
}

impl SubscriptionHandler for TriggerHandler {
    fn on_results(&self, spuid: &str, results: &ARBindingsResults) {
        self.inner.on_results(spuid, results);
    }

    fn on_added_results(&self, spuid: &str, results: &BindingsResults) {
        self.inner.on_added_results(spuid, results);
        if results.is_empty() {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("Cannot run {}: no Tokio runtime", self.producer.update_id());
            return;
        };
        let rows: Vec<Bindings> = results
            .bindings()
            .iter()
            .map(|row| self.trigger_bindings(row))
            .collect();
        debug!(
            "Running {} for {} rows of {spuid}",
            self.producer.update_id(),
            rows.len()
        );
        let producer = Arc::clone(&self.producer);
        runtime.spawn(async move {
            let responses = join_all(rows.iter().map(|row| producer.update(row))).await;
            for response in responses {
                if let Some(error) = response.as_error() {
                    warn!("{} failed: {error}", producer.update_id());
                }
            }
        });
    }

    fn on_removed_results(&self, spuid: &str, results: &BindingsResults) {
        self.inner.on_removed_results(spuid, results);
    }

    fn on_ping(&self) {
        self.inner.on_ping();
    }

    fn on_broken_socket(&self, spuid: &str) {
        self.inner.on_broken_socket(spuid);
    }

    fn on_error(&self, error: &ErrorResponse) {
        self.inner.on_error(error);
    }
}
