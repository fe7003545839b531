#![allow(dead_code, reason = "Each test file uses a different part of the helpers")]

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::routing::{any, MethodRouter};
use axum::Router;
use sepa_client::profile::ApplicationProfile;
use sepa_client::security::{CredentialStore, MemoryCredentialStore};
use sepa_client::transport::{Channel, ChannelEvent, ConnectError, Connector};
use sepa_client::{ClientOptions, SepaClient, SubscriptionHandler};
use sepa_model::{ARBindingsResults, BindingsResults, ErrorResponse};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(5);

/// The broker side of a channel opened by [`MockConnector`].
pub struct MockServer {
    pub url: String,
    pub received: mpsc::UnboundedReceiver<String>,
    pub events: mpsc::UnboundedSender<ChannelEvent>,
}

impl MockServer {
    pub async fn next_message(&mut self) -> Value {
        let frame = timeout(WAIT, self.received.recv())
            .await
            .expect("no message from the client")
            .expect("the client closed the channel");
        serde_json::from_str(&frame).expect("the client sent invalid JSON")
    }

    pub fn has_pending_message(&mut self) -> bool {
        !self.received.is_empty()
    }

    pub fn send(&self, frame: &Value) {
        self.send_raw(&frame.to_string());
    }

    pub fn send_raw(&self, frame: &str) {
        self.events
            .send(ChannelEvent::Message(frame.to_owned()))
            .expect("the transport dropped the channel");
    }

    pub fn close(&self, reason: &str) {
        self.events
            .send(ChannelEvent::Closed(reason.to_owned()))
            .expect("the transport dropped the channel");
    }
}

/// Opens in-memory channels and hands their broker side to the test.
pub struct MockConnector {
    servers: mpsc::UnboundedSender<MockServer>,
    refuse: AtomicBool,
    hang: AtomicBool,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockServer>) {
        let (servers, receiver) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                servers,
                refuse: AtomicBool::new(false),
                hang: AtomicBool::new(false),
            }),
            receiver,
        )
    }

    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, url: &str) -> Result<Channel, ConnectError> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ConnectError::Refused(url.to_owned()));
        }
        let (outbound, received) = mpsc::unbounded_channel();
        let (events, inbound) = mpsc::unbounded_channel();
        self.servers
            .send(MockServer {
                url: url.to_owned(),
                received,
                events,
            })
            .map_err(|_| ConnectError::Refused("the test is over".to_owned()))?;
        Ok(Channel { outbound, inbound })
    }
}

pub async fn next_server(servers: &mut mpsc::UnboundedReceiver<MockServer>) -> MockServer {
    timeout(WAIT, servers.recv())
        .await
        .expect("no channel was opened")
        .expect("the connector is gone")
}

/// What a [`RecordingHandler`] saw, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Results(String, ARBindingsResults),
    Added(String, BindingsResults),
    Removed(String, BindingsResults),
    Ping,
    Broken(String),
    Error(ErrorResponse),
}

pub struct RecordingHandler {
    events: mpsc::UnboundedSender<Event>,
}

impl RecordingHandler {
    fn record(&self, event: Event) {
        // The test may have stopped listening.
        if self.events.send(event).is_err() {}
    }
}

impl SubscriptionHandler for RecordingHandler {
    fn on_results(&self, spuid: &str, results: &ARBindingsResults) {
        self.record(Event::Results(spuid.to_owned(), results.clone()));
    }

    fn on_added_results(&self, spuid: &str, results: &BindingsResults) {
        self.record(Event::Added(spuid.to_owned(), results.clone()));
    }

    fn on_removed_results(&self, spuid: &str, results: &BindingsResults) {
        self.record(Event::Removed(spuid.to_owned(), results.clone()));
    }

    fn on_ping(&self) {
        self.record(Event::Ping);
    }

    fn on_broken_socket(&self, spuid: &str) {
        self.record(Event::Broken(spuid.to_owned()));
    }

    fn on_error(&self, error: &ErrorResponse) {
        self.record(Event::Error(error.clone()));
    }
}

pub fn recorder() -> (Arc<RecordingHandler>, mpsc::UnboundedReceiver<Event>) {
    let (events, receiver) = mpsc::unbounded_channel();
    (Arc::new(RecordingHandler { events }), receiver)
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(WAIT, events.recv())
        .await
        .expect("no event was delivered")
        .expect("the handler is gone")
}

/// Lets the reader task run, then checks that nothing else was delivered.
pub async fn assert_no_event(events: &mut mpsc::UnboundedReceiver<Event>) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(events.is_empty(), "unexpected event: {:?}", events.try_recv());
}

/// One HTTP exchange seen by a test server.
#[derive(Clone, Debug, Default)]
pub struct Captured {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub accept: Option<String>,
    pub authorization: Option<String>,
    pub body: String,
}

impl Captured {
    /// A value of the form or query string, decoded.
    pub fn form_value(&self, key: &str) -> Option<String> {
        let encoded = self.query.clone().unwrap_or_else(|| self.body.clone());
        reqwest::Url::parse(&format!("http://localhost/?{encoded}"))
            .ok()?
            .query_pairs()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.into_owned())
    }
}

pub type Log = Arc<Mutex<Vec<Captured>>>;

pub fn log() -> Log {
    Arc::default()
}

pub fn captured(log: &Log) -> Vec<Captured> {
    log.lock().unwrap().clone()
}

/// Records every exchange in `log` and answers with `status` and `body`.
pub fn canned(log: &Log, status: StatusCode, body: &'static str) -> MethodRouter {
    respond(log, move |_| (status, body))
}

/// Records every exchange in `log` and answers with what `reply` returns for it.
pub fn respond<F>(log: &Log, reply: F) -> MethodRouter
where
    F: Fn(&Captured) -> (StatusCode, &'static str) + Clone + Send + Sync + 'static,
{
    let log = Arc::clone(log);
    any(
        move |method: Method, uri: Uri, headers: HeaderMap, request_body: String| {
            let log = Arc::clone(&log);
            let reply = reply.clone();
            async move {
                let header = |name: &str| {
                    headers
                        .get(name)
                        .and_then(|value| value.to_str().ok())
                        .map(str::to_owned)
                };
                let request = Captured {
                    method: method.to_string(),
                    path: uri.path().to_owned(),
                    query: uri.query().map(str::to_owned),
                    content_type: header("content-type"),
                    accept: header("accept"),
                    authorization: header("authorization"),
                    body: request_body,
                };
                let response = reply(&request);
                log.lock().unwrap().push(request);
                response
            }
        },
    )
}

/// Serves `router` on a free local port.
pub async fn serve(router: Router) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    port
}

/// A local port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

pub fn profile_json(port: u16) -> Value {
    json!({
        "parameters": {
            "host": "127.0.0.1",
            "ports": {"http": port, "https": port, "ws": port, "wss": port},
            "paths": {
                "query": "/query",
                "update": "/update",
                "subscribe": "/subscribe",
                "register": "/oauth/register",
                "tokenRequest": "/oauth/token",
                "securePath": "/secure"
            },
            "methods": {"query": "POST", "update": "URL_ENCODED_POST"},
            "formats": {"query": "JSON", "update": "HTML"}
        },
        "namespaces": {
            "schema": "http://schema.org/",
            "rdf": "http://www.w3.org/1999/02/22-rdf-syntax-ns#"
        },
        "updates": {
            "PUBLISH_A_MESSAGE": {
                "sparql": "INSERT {?message rdf:type schema:Message ; schema:text ?text} WHERE {BIND(IRI(CONCAT(\"http://schema.org/Message-\",STRUUID())) AS ?message)}",
                "forcedBindings": {"text": {"type": "literal", "value": ""}}
            },
            "REMOVE_A_MESSAGE": {
                "sparql": "DELETE {?message ?p ?o} WHERE {?message rdf:type schema:Message ; ?p ?o}",
                "forcedBindings": {"message": {"type": "uri"}}
            }
        },
        "queries": {
            "SUBSCRIBE_TO_MESSAGES": {
                "sparql": "SELECT ?message ?text WHERE {?message rdf:type schema:Message ; schema:text ?text}"
            },
            "MESSAGES_BY_TEXT": {
                "sparql": "SELECT ?message WHERE {?message schema:text ?text}",
                "forcedBindings": {"text": {"type": "literal"}}
            }
        }
    })
}

pub fn profile(port: u16) -> ApplicationProfile {
    ApplicationProfile::from_str(&profile_json(port).to_string()).unwrap()
}

pub fn test_options() -> ClientOptions {
    ClientOptions {
        channel_timeout: Duration::from_secs(2),
        http_timeout: Duration::from_secs(2),
        use_tls: false,
    }
}

/// A client of a local test broker, with its channels opened by `connector`.
pub fn client(port: u16, connector: Arc<dyn Connector>) -> Arc<SepaClient> {
    client_with_store(port, connector, Arc::new(MemoryCredentialStore::default()))
}

pub fn client_with_store(
    port: u16,
    connector: Arc<dyn Connector>,
    store: Arc<dyn CredentialStore>,
) -> Arc<SepaClient> {
    Arc::new(
        SepaClient::builder(profile(port))
            .options(test_options())
            .connector(connector)
            .credential_store(store)
            .build()
            .unwrap(),
    )
}
