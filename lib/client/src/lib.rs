//! A client for SPARQL Event Processing brokers.
//!
//! Queries and updates use the [SPARQL 1.1 protocol](https://www.w3.org/TR/sparql11-protocol/)
//! over HTTP. Subscriptions use a WebSocket channel: the broker answers a subscribe request with
//! the first results and then pushes the rows added to and removed from the result set.
//!
//! ```no_run
//! use sepa_client::{SepaClient, SubscriptionHandler};
//! use sepa_model::BindingsResults;
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl SubscriptionHandler for Printer {
//!     fn on_added_results(&self, spuid: &str, results: &BindingsResults) {
//!         tracing::info!("{spuid}: {} new rows", results.len());
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let client = SepaClient::from_path("chat.jsap")?;
//! client.update("INSERT DATA { <s> <p> \"o\" }").await.into_result()?;
//! client
//!     .subscribe("SELECT * WHERE { ?s ?p ?o }", None, Arc::new(Printer))
//!     .await
//!     .into_result()?;
//! # Result::<_, Box<dyn std::error::Error>>::Ok(())
//! # }).unwrap();
//! ```

mod client;
mod config;
pub mod http;
pub mod pattern;
pub mod profile;
pub mod security;
mod subscription;
pub mod transport;

pub use client::{SepaClient, SepaClientBuilder};
pub use config::{ClientOptions, DEFAULT_TIMEOUT, HTTP_TIMEOUT};
pub use subscription::{Subscription, SubscriptionHandler, SubscriptionState};
