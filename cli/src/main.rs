#![allow(clippy::print_stdout, reason = "Results are the output of the tool")]
use crate::cli::{Args, Command};
use anyhow::Context;
use clap::Parser;
use sepa_client::pattern::{Consumer, Producer};
use sepa_client::profile::ApplicationProfile;
use sepa_client::{ClientOptions, SepaClient, SubscriptionHandler};
use sepa_model::{ARBindingsResults, Bindings, BindingsResults, ErrorResponse, RdfTerm, Response};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod cli;

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let profile = ApplicationProfile::from_path(&args.profile)
        .with_context(|| format!("Could not load the profile {}", args.profile.display()))?;
    let mut options = ClientOptions {
        use_tls: !args.no_tls,
        ..ClientOptions::default()
    };
    if let Some(timeout) = args.timeout {
        options.channel_timeout = Duration::from_millis(timeout);
        options.http_timeout = Duration::from_millis(timeout);
    }
    let client = Arc::new(SepaClient::builder(profile).options(options).build()?);

    match args.command {
        Command::Query {
            query,
            named,
            bindings,
        } => {
            let response = if named {
                client.query_named(&query, &to_bindings(bindings)).await?
            } else {
                client.query(query).await
            };
            if let Response::Query(response) = response.into_result()? {
                println!("{}", serde_json::to_string_pretty(&response.results)?);
            }
        }
        Command::Update { update } => print_update(client.update(update).await)?,
        Command::Publish {
            update_id,
            bindings,
        } => {
            let producer = Producer::new(client, &update_id)?;
            print_update(producer.update(&to_bindings(bindings)).await)?;
        }
        Command::Subscribe {
            query_id,
            bindings,
        } => {
            let consumer = Consumer::new(client, &query_id, Arc::new(Printer))?;
            consumer.subscribe(&to_bindings(bindings)).await.into_result()?;
            tokio::signal::ctrl_c().await?;
            info!("Interrupted, unsubscribing");
            consumer.unsubscribe().await.into_result()?;
        }
        Command::Register { identity } => {
            if let Response::Registration(registration) =
                client.register(&identity).await.into_result()?
            {
                info!("Registered as {}", registration.client_id);
            }
        }
        Command::Token => {
            if let Response::Token(token) = client.request_token().await.into_result()? {
                info!("Token valid until {}", token.expires_at);
            }
        }
    }
    Ok(())
}

fn to_bindings(bindings: Vec<(String, RdfTerm)>) -> Bindings {
    bindings.into_iter().collect()
}

fn print_update(response: Response) -> anyhow::Result<()> {
    if let Response::Update(update) = response.into_result()? {
        if !update.body.is_empty() {
            println!("{}", update.body);
        }
    }
    Ok(())
}

fn format_row(row: &Bindings) -> String {
    row.iter()
        .map(|(variable, value)| format!("?{variable}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Prints added rows with a `+` and removed rows with a `-`.
struct Printer;

impl SubscriptionHandler for Printer {
    fn on_added_results(&self, spuid: &str, results: &BindingsResults) {
        for row in results.bindings() {
            println!("{spuid} + {}", format_row(row));
        }
    }

    fn on_removed_results(&self, spuid: &str, results: &BindingsResults) {
        for row in results.bindings() {
            println!("{spuid} - {}", format_row(row));
        }
    }

    fn on_results(&self, spuid: &str, results: &ARBindingsResults) {
        tracing::debug!(
            "{spuid}: {} added, {} removed",
            results.added.len(),
            results.removed.len()
        );
    }

    fn on_broken_socket(&self, spuid: &str) {
        warn!("The channel of {spuid} closed, the subscription is lost");
    }

    fn on_error(&self, error: &ErrorResponse) {
        warn!("Broker error: {error}");
    }
}

#[cfg(test)]
#[allow(clippy::panic_in_result_fn, reason = "Tests")]
mod tests {
    use super::*;
    use crate::cli::parse_binding;
    use assert_cmd::Command as Process;

    fn cli_command() -> Process {
        let mut command = Process::new(env!("CARGO"));
        command.arg("run").arg("--bin").arg("sepa").arg("--");
        command
    }

    #[test]
    fn cli_help() {
        let output = cli_command().output().unwrap();
        assert!(!output.status.success());
        assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));
    }

    #[test]
    fn cli_missing_profile() {
        let output = cli_command()
            .arg("--profile")
            .arg("/does/not/exist.jsap")
            .arg("token")
            .output()
            .unwrap();
        assert!(!output.status.success());
        assert!(String::from_utf8_lossy(&output.stderr).contains("/does/not/exist.jsap"));
    }

    #[test]
    fn publish_arguments() {
        let args = Args::try_parse_from([
            "sepa",
            "--profile",
            "chat.jsap",
            "--no-tls",
            "publish",
            "SEND",
            "--bind",
            "text=Hello world",
            "-b",
            "?receiver=<http://example.com/alice>",
        ])
        .unwrap();
        assert!(args.no_tls);
        let Command::Publish {
            update_id,
            bindings,
        } = args.command
        else {
            panic!("expected publish");
        };
        assert_eq!(update_id, "SEND");
        let bindings = to_bindings(bindings);
        assert_eq!(bindings.get("text"), Some(&RdfTerm::literal("Hello world")));
        assert_eq!(
            bindings.get("receiver"),
            Some(&RdfTerm::uri("http://example.com/alice"))
        );
    }

    #[test]
    fn query_arguments() {
        let args = Args::try_parse_from([
            "sepa",
            "-p",
            "chat.jsap",
            "--timeout",
            "500",
            "query",
            "--named",
            "MESSAGES",
        ])
        .unwrap();
        assert_eq!(args.timeout, Some(500));
        assert!(matches!(
            args.command,
            Command::Query { named: true, ref query, .. } if query == "MESSAGES"
        ));
    }

    #[test]
    fn profile_is_required() {
        assert!(Args::try_parse_from(["sepa", "token"]).is_err());
    }

    #[test]
    fn invalid_bindings() {
        assert!(parse_binding("no-equal-sign").is_err());
        assert!(parse_binding("=value").is_err());
        assert_eq!(
            parse_binding("x=").unwrap(),
            ("x".to_owned(), RdfTerm::literal(""))
        );
    }

    #[test]
    fn row_format() {
        let row = Bindings::new()
            .with_binding("s", RdfTerm::uri("http://example.com/s"))
            .with_binding("o", RdfTerm::literal("o"));
        assert_eq!(format_row(&row), "?s=<http://example.com/s> ?o=\"o\"");
    }

    #[test]
    fn clap_debug() {
        use clap::CommandFactory;

        Args::command().debug_assert()
    }
}
