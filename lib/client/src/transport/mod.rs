//! The subscription channel.
//!
//! A [`Transport`] owns one channel to the broker and turns it into request/reply exchanges. The
//! wire protocol carries no correlation id, so at most one request awaits its reply at a time and
//! other callers queue behind it. Replies are matched by their kind and key: `subscribed` answers
//! the subscribe sent with the same alias, `unsubscribed` the unsubscribe of the same spuid.
//! Anything that does not match the pending request is dropped. A subscribe without an alias is
//! sent with one derived from its request token.
//!
//! Inbound frames are handled on a dedicated reader task. Notifications go straight to the
//! handler registered for their spuid, independently of the pending request.

mod connector;
mod message;

pub use connector::{Channel, ChannelEvent, ConnectError, Connector, WebSocketConnector};

use crate::subscription::{SharedState, Subscription, SubscriptionHandler, SubscriptionState};
use dashmap::DashMap;
use message::InboundMessage;
use sepa_model::{
    ARBindingsResults, ErrorResponse, Notification, Response, SubscribeRequest, SubscribeResponse,
    UnsubscribeRequest, UnsubscribeResponse,
};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, warn};

/// A channel to one broker endpoint, shared by every clone of the handle.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    url: String,
    connector: Arc<dyn Connector>,
    link: Mutex<Option<Link>>,
    /// Serializes channel opening.
    connect_gate: tokio::sync::Mutex<()>,
    /// Serializes request/reply exchanges. Tokio's mutex is fair, so callers are served in order.
    request_gate: tokio::sync::Mutex<()>,
    pending: Mutex<Option<PendingReply>>,
    subscriptions: DashMap<String, SubscriptionEntry>,
    next_token: AtomicU64,
    generation: AtomicU64,
}

struct Link {
    outbound: mpsc::UnboundedSender<String>,
    generation: u64,
}

struct PendingReply {
    token: u64,
    expect: Expectation,
    reply: oneshot::Sender<Response>,
}

enum Expectation {
    Subscribe {
        alias: String,
        handler: Arc<dyn SubscriptionHandler>,
        state: SharedState,
    },
    Unsubscribe {
        spuid: String,
    },
}

struct SubscriptionEntry {
    handler: Arc<dyn SubscriptionHandler>,
    state: SharedState,
    alias: Option<String>,
}

impl Transport {
    pub fn new(url: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        Self {
            inner: Arc::new(TransportInner {
                url: url.into(),
                connector,
                link: Mutex::new(None),
                connect_gate: tokio::sync::Mutex::new(()),
                request_gate: tokio::sync::Mutex::new(()),
                pending: Mutex::new(None),
                subscriptions: DashMap::new(),
                next_token: AtomicU64::new(0),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn is_connected(&self) -> bool {
        self.inner.link().is_some()
    }

    /// Opens the channel unless it is already open.
    pub async fn connect(&self, timeout: Duration) -> Result<(), ErrorResponse> {
        let deadline = Instant::now() + timeout;
        let _gate = timeout_at(deadline, self.inner.connect_gate.lock())
            .await
            .map_err(|_| self.inner.connect_timeout(timeout))?;
        if self.is_connected() {
            return Ok(());
        }

        let channel = match timeout_at(deadline, self.inner.connector.open(&self.inner.url)).await
        {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                error!("Could not connect to {}: {e}", self.inner.url);
                return Err(ErrorResponse::not_connected(e.to_string()));
            }
            Err(_) => return Err(self.inner.connect_timeout(timeout)),
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *self.inner.link() = Some(Link {
            outbound: channel.outbound,
            generation,
        });
        tokio::spawn(read_loop(
            Arc::downgrade(&self.inner),
            channel.inbound,
            generation,
        ));
        debug!("Connected to {} (channel #{generation})", self.inner.url);
        Ok(())
    }

    /// Subscribes, connecting first if needed.
    ///
    /// The handler receives the first results as an addition before this returns, then every
    /// notification of the subscription. `authorization` is added to the message as is.
    pub async fn subscribe(
        &self,
        request: &SubscribeRequest,
        authorization: Option<&str>,
        handler: Arc<dyn SubscriptionHandler>,
        timeout: Duration,
    ) -> Response {
        let deadline = Instant::now() + timeout;
        if let Err(e) = self.connect(timeout).await {
            return e.into();
        }
        let token = self.inner.token_for(request.token);
        let alias = request
            .alias
            .clone()
            .unwrap_or_else(|| format!("request-{token}"));
        let request = request.clone().with_alias(alias.clone());
        debug!("#{token} {request}");
        let expect = Expectation::Subscribe {
            alias,
            handler,
            state: SharedState::new(),
        };
        self.send_and_receive(request.to_message(authorization), expect, token, deadline)
            .await
            .into()
    }

    /// Cancels a subscription. Fails with `NotConnected` if the channel is closed.
    pub async fn unsubscribe(
        &self,
        request: &UnsubscribeRequest,
        authorization: Option<&str>,
        timeout: Duration,
    ) -> Response {
        if !self.is_connected() {
            return ErrorResponse::not_connected(format!(
                "Cannot unsubscribe {}: the channel is closed",
                request.spuid
            ))
            .into();
        }
        let token = self.inner.token_for(request.token);
        debug!("#{token} {request}");
        let expect = Expectation::Unsubscribe {
            spuid: request.spuid.clone(),
        };
        self.send_and_receive(
            request.to_message(authorization),
            expect,
            token,
            Instant::now() + timeout,
        )
        .await
        .into()
    }

    /// The handle of a known subscription.
    pub fn subscription(&self, spuid: &str) -> Option<Subscription> {
        self.inner.subscriptions.get(spuid).map(|entry| {
            Subscription::new(spuid.to_owned(), entry.alias.clone(), entry.state.clone())
        })
    }

    /// Handles of every subscription of this channel.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.inner
            .subscriptions
            .iter()
            .map(|entry| {
                Subscription::new(
                    entry.key().clone(),
                    entry.alias.clone(),
                    entry.state.clone(),
                )
            })
            .collect()
    }

    /// Closes the channel. Its subscriptions are cancelled without notifying their handlers.
    pub fn close(&self) {
        if self.inner.link().take().is_none() {
            return;
        }
        debug!("Closing the channel to {}", self.inner.url);
        self.inner
            .fail_pending(ErrorResponse::not_connected("The channel was closed"));
        for (_, entry) in self.inner.drain_subscriptions() {
            entry.state.set(SubscriptionState::Cancelled);
        }
    }

    /// Sends one request and waits for the reply matching `expect`, queueing behind any exchange
    /// already in flight. The whole exchange, queueing included, ends at `deadline`.
    async fn send_and_receive(
        &self,
        message: String,
        expect: Expectation,
        token: u64,
        deadline: Instant,
    ) -> Result<Response, ErrorResponse> {
        let _queue = timeout_at(deadline, self.inner.request_gate.lock())
            .await
            .map_err(|_| {
                ErrorResponse::timeout("Timed out waiting for a previous request to complete")
            })?;

        let (reply, mut receiver) = oneshot::channel();
        *self.inner.pending() = Some(PendingReply {
            token,
            expect,
            reply,
        });
        if let Err(e) = self.inner.send(message) {
            self.inner.clear_pending(token);
            return Err(e.with_token(Some(token)));
        }

        let response = match timeout_at(deadline, &mut receiver).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(ErrorResponse::not_connected(
                    "The channel closed before the reply arrived",
                )
                .with_token(Some(token)))
            }
            Err(_) => {
                if self.inner.clear_pending(token) {
                    return Err(ErrorResponse::timeout(format!(
                        "No reply from {}",
                        self.inner.url
                    ))
                    .with_token(Some(token)));
                }
                // The reader took the reply while the deadline elapsed.
                receiver.await.map_err(|_| {
                    ErrorResponse::not_connected("The channel closed before the reply arrived")
                        .with_token(Some(token))
                })?
            }
        };
        response.into_result().map_err(|e| e.with_token(Some(token)))
    }
}

impl Debug for Transport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("url", &self.inner.url)
            .field("connected", &self.is_connected())
            .field("subscriptions", &self.inner.subscriptions.len())
            .finish_non_exhaustive()
    }
}

impl TransportInner {
    fn link(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, Option<PendingReply>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The token of the request, or a fresh one when the caller did not number it.
    fn token_for(&self, token: Option<u64>) -> u64 {
        token.unwrap_or_else(|| self.next_token.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn connect_timeout(&self, timeout: Duration) -> ErrorResponse {
        ErrorResponse::timeout(format!(
            "Channel to {} not opened within {} ms",
            self.url,
            timeout.as_millis()
        ))
    }

    fn send(&self, message: String) -> Result<(), ErrorResponse> {
        let link = self.link();
        let link = link
            .as_ref()
            .ok_or_else(|| ErrorResponse::not_connected("The channel is closed"))?;
        link.outbound
            .send(message)
            .map_err(|_| ErrorResponse::not_connected("The channel is closed"))
    }

    /// Drops the pending request if it is still the one identified by `token`.
    fn clear_pending(&self, token: u64) -> bool {
        let mut pending = self.pending();
        if pending.as_ref().is_some_and(|pending| pending.token == token) {
            *pending = None;
            true
        } else {
            false
        }
    }

    fn take_pending(&self, accepts: impl FnOnce(&Expectation) -> bool) -> Option<PendingReply> {
        let mut pending = self.pending();
        if pending.as_ref().is_some_and(|pending| accepts(&pending.expect)) {
            pending.take()
        } else {
            None
        }
    }

    fn fail_pending(&self, error: ErrorResponse) {
        let pending = self.pending().take();
        if let Some(pending) = pending {
            resolve(pending.reply, error.with_token(Some(pending.token)).into());
        }
    }

    fn drain_subscriptions(&self) -> Vec<(String, SubscriptionEntry)> {
        let spuids: Vec<String> = self
            .subscriptions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        spuids
            .into_iter()
            .filter_map(|spuid| self.subscriptions.remove(&spuid))
            .collect()
    }

    fn active_handlers(&self) -> Vec<Arc<dyn SubscriptionHandler>> {
        self.subscriptions
            .iter()
            .filter(|entry| entry.state.get() == SubscriptionState::Active)
            .map(|entry| Arc::clone(&entry.handler))
            .collect()
    }

    fn dispatch(&self, frame: &str) {
        match InboundMessage::parse(frame) {
            Ok(InboundMessage::Ping) => {
                debug!("Ping from {}", self.url);
                for handler in self.active_handlers() {
                    handler.on_ping();
                }
            }
            Ok(InboundMessage::Subscribed(response)) => self.on_subscribed(response),
            Ok(InboundMessage::Unsubscribed(spuid)) => self.on_unsubscribed(spuid),
            Ok(InboundMessage::Notification(notification)) => self.on_notification(notification),
            Ok(InboundMessage::Error(error)) => self.on_error_frame(error),
            Err(e) => warn!("Dropping frame from {}: {}: {frame}", self.url, e.message),
        }
    }

    fn on_subscribed(&self, response: SubscribeResponse) {
        // Brokers that do not echo the alias are matched by kind only.
        let pending = self.take_pending(|expect| {
            matches!(expect, Expectation::Subscribe { alias, .. }
                if response.alias.as_ref().map_or(true, |echoed| echoed == alias))
        });
        let Some(PendingReply {
            token,
            expect: Expectation::Subscribe { handler, state, .. },
            reply,
        }) = pending
        else {
            warn!(
                "Dropping subscribed reply {} (alias {:?}): no matching subscribe request is waiting",
                response.spuid, response.alias
            );
            return;
        };
        debug!(
            "Subscribed {} (request #{token}, {} first results)",
            response.spuid,
            response.first_results.len()
        );

        // Registered before the caller resumes so that no notification is missed.
        state.set(SubscriptionState::Active);
        self.subscriptions.insert(
            response.spuid.clone(),
            SubscriptionEntry {
                handler: Arc::clone(&handler),
                state,
                alias: response.alias.clone(),
            },
        );
        let first = ARBindingsResults::first(response.first_results.clone());
        handler.on_results(&response.spuid, &first);
        handler.on_added_results(&response.spuid, &first.added);
        resolve(reply, Response::Subscribe(response));
    }

    fn on_unsubscribed(&self, spuid: String) {
        let pending = self.take_pending(|expect| {
            matches!(expect, Expectation::Unsubscribe { spuid: expected } if *expected == spuid)
        });
        let Some(pending) = pending else {
            warn!("Dropping unsubscribed reply {spuid}: no matching request is waiting");
            return;
        };
        debug!("Unsubscribed {spuid} (request #{})", pending.token);
        if let Some((_, entry)) = self.subscriptions.remove(&spuid) {
            entry.state.set(SubscriptionState::Cancelled);
        }
        resolve(
            pending.reply,
            Response::Unsubscribe(UnsubscribeResponse { spuid }),
        );
    }

    fn on_notification(&self, notification: Notification) {
        let Notification {
            spuid,
            sequence,
            results,
        } = notification;
        let Some((handler, state)) = self
            .subscriptions
            .get(&spuid)
            .map(|entry| (Arc::clone(&entry.handler), entry.state.clone()))
        else {
            debug!("Dropping notification for unknown subscription {spuid}");
            return;
        };
        if state.get() != SubscriptionState::Active {
            debug!("Dropping notification for {spuid}: the subscription is not active");
            return;
        }
        debug!(
            "Notification {} for {spuid}: +{} -{}",
            sequence.map_or_else(String::new, |sequence| format!("#{sequence}")),
            results.added.len(),
            results.removed.len()
        );
        handler.on_results(&spuid, &results);
        if !results.removed.is_empty() {
            handler.on_removed_results(&spuid, &results.removed);
        }
        if !results.added.is_empty() {
            handler.on_added_results(&spuid, &results.added);
        }
    }

    fn on_error_frame(&self, error: ErrorResponse) {
        let pending = self.take_pending(|_| true);
        match pending {
            Some(pending) => {
                debug!("Request #{} failed: {error}", pending.token);
                resolve(
                    pending.reply,
                    error.with_token(Some(pending.token)).into(),
                );
            }
            None => {
                warn!("Error from {}: {error}", self.url);
                self.broadcast_error(&error);
            }
        }
    }

    fn broadcast_error(&self, error: &ErrorResponse) {
        for handler in self.active_handlers() {
            handler.on_error(error);
        }
    }

    fn on_close(&self, generation: u64, reason: &str) {
        {
            let mut link = self.link();
            if !link
                .as_ref()
                .is_some_and(|link| link.generation == generation)
            {
                return;
            }
            *link = None;
        }
        warn!("Channel to {} closed: {reason}", self.url);
        self.fail_pending(ErrorResponse::not_connected(format!(
            "The channel closed: {reason}"
        )));
        for (spuid, entry) in self.drain_subscriptions() {
            if entry
                .state
                .transition(SubscriptionState::Active, SubscriptionState::Broken)
            {
                entry.handler.on_broken_socket(&spuid);
            }
        }
    }
}

fn resolve(reply: oneshot::Sender<Response>, response: Response) {
    if reply.send(response).is_err() {
        debug!("Dropping a reply: its caller stopped waiting");
    }
}

async fn read_loop(
    transport: Weak<TransportInner>,
    mut inbound: mpsc::UnboundedReceiver<ChannelEvent>,
    generation: u64,
) {
    while let Some(event) = inbound.recv().await {
        let Some(transport) = transport.upgrade() else {
            return;
        };
        match event {
            ChannelEvent::Message(frame) => transport.dispatch(&frame),
            ChannelEvent::Error(reason) => {
                error!("Channel error on {}: {reason}", transport.url);
                transport.broadcast_error(&ErrorResponse::transport(reason));
            }
            ChannelEvent::Closed(reason) => {
                transport.on_close(generation, &reason);
                return;
            }
        }
    }
    if let Some(transport) = transport.upgrade() {
        transport.on_close(generation, "the connector dropped the channel");
    }
}
