//! Data model shared by the SPARQL Event Processing client crates.
//!
//! - [`RdfTerm`], [`Bindings`] and [`BindingsResults`] represent SPARQL results in the
//!   [SPARQL 1.1 JSON](https://www.w3.org/TR/sparql11-results-json/) format.
//! - [`ARBindingsResults`] is the added/removed delta carried by subscription notifications.
//! - The request types and the closed [`Response`] sum type describe every protocol exchange.

mod error;
mod rdf;
mod request;
mod response;
mod results;

pub use error::*;
pub use rdf::*;
pub use request::*;
pub use response::*;
pub use results::*;

// Re-export the oxrdf term so callers can convert at the boundary.
pub use oxrdf::Term as OxTerm;
