use clap::{Parser, Subcommand, ValueHint};
use sepa_model::RdfTerm;
use std::path::PathBuf;

#[derive(Parser)]
#[command(about, version, name = "sepa")]
/// Command line client for SPARQL Event Processing brokers
pub struct Args {
    /// Application profile (JSAP) describing the broker and its named operations
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub profile: PathBuf,
    /// Use http and ws instead of https and wss for the security extension
    #[arg(long)]
    pub no_tls: bool,
    /// Timeout of every request, in milliseconds
    #[arg(long)]
    pub timeout: Option<u64>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a SPARQL query and print its results as SPARQL JSON
    Query {
        /// The query text, or the id of a query of the profile with --named
        query: String,
        /// Treat QUERY as the id of a query of the profile
        #[arg(long)]
        named: bool,
        /// Forced binding of the named query, as VARIABLE=VALUE
        ///
        /// A value written as <IRI> is an IRI, anything else a literal.
        #[arg(short, long = "bind", value_parser = parse_binding)]
        bindings: Vec<(String, RdfTerm)>,
    },
    /// Run a SPARQL update
    Update {
        /// The update text
        update: String,
    },
    /// Run a named update of the profile
    Publish {
        /// Id of the update in the profile
        update_id: String,
        /// Forced binding, as VARIABLE=VALUE
        #[arg(short, long = "bind", value_parser = parse_binding)]
        bindings: Vec<(String, RdfTerm)>,
    },
    /// Subscribe to a named query of the profile and print its notifications until interrupted
    Subscribe {
        /// Id of the query in the profile
        query_id: String,
        /// Forced binding, as VARIABLE=VALUE
        #[arg(short, long = "bind", value_parser = parse_binding)]
        bindings: Vec<(String, RdfTerm)>,
    },
    /// Register with the authorization server of the broker
    ///
    /// The issued client credentials are saved in the profile.
    Register {
        /// Identity to register
        identity: String,
    },
    /// Request an access token with the registered client credentials
    Token,
}

/// Parses `VARIABLE=VALUE`, where `<...>` values are IRIs.
pub fn parse_binding(arg: &str) -> Result<(String, RdfTerm), String> {
    let (variable, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("'{arg}' is not of the form VARIABLE=VALUE"))?;
    let variable = variable.trim_start_matches(['?', '$']);
    if variable.is_empty() {
        return Err(format!("'{arg}' has no variable name"));
    }
    let value = match value.strip_prefix('<').and_then(|v| v.strip_suffix('>')) {
        Some(iri) => RdfTerm::uri(iri),
        None => RdfTerm::literal(value),
    };
    Ok((variable.to_owned(), value))
}
