//! Roles built on a shared [`SepaClient`](crate::SepaClient) and the named templates of its
//! profile.
//!
//! - A [`Producer`] publishes one named update.
//! - A [`Consumer`] subscribes to one named query.
//! - An [`Aggregator`] is a consumer that runs one named update for every added result row.

mod aggregator;
mod consumer;
mod producer;
mod substitution;

pub use aggregator::Aggregator;
pub use consumer::Consumer;
pub use producer::Producer;

pub(crate) use substitution::instantiate;
