mod common;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use common::{next_event, profile, recorder, serve, test_options, Event};
use sepa_client::{SepaClient, SubscriptionState};
use serde_json::{json, Value};
use std::sync::Arc;

/// A broker that answers one subscription, pushes one notification and closes the socket when
/// `close_after_subscribe` is set.
async fn broker(mut socket: WebSocket, close_after_subscribe: bool) {
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let request: Value = serde_json::from_str(&text).unwrap();
        let replies = if request.get("subscribe").is_some() {
            vec![
                json!({
                    "subscribed": "spu-ws",
                    "firstResults": {
                        "head": {"vars": ["text"]},
                        "results": {"bindings": [{"text": {"type": "literal", "value": "hello"}}]}
                    }
                }),
                json!({
                    "spuid": "spu-ws",
                    "sequence": 1,
                    "results": {
                        "addedResults": {"bindings": [{"text": {"type": "literal", "value": "world"}}]},
                        "removedResults": {"bindings": []}
                    }
                }),
            ]
        } else if let Some(spuid) = request.get("unsubscribe") {
            vec![json!({"unsubscribed": spuid})]
        } else {
            vec![json!({"code": 400, "body": "Unknown request"})]
        };
        for reply in replies {
            if socket.send(Message::Text(reply.to_string())).await.is_err() {
                return;
            }
        }
        if close_after_subscribe && request.get("subscribe").is_some() {
            let _closed: Result<(), axum::Error> = socket.send(Message::Close(None)).await;
            return;
        }
    }
}

async fn serve_broker(close_after_subscribe: bool) -> u16 {
    serve(Router::new().route(
        "/subscribe",
        get(move |upgrade: WebSocketUpgrade| async move {
            upgrade
                .on_upgrade(move |socket| broker(socket, close_after_subscribe))
                .into_response()
        }),
    ))
    .await
}

fn websocket_client(port: u16) -> Arc<SepaClient> {
    Arc::new(
        SepaClient::builder(profile(port))
            .options(test_options())
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn subscription_over_websocket() {
    let port = serve_broker(false).await;
    let client = websocket_client(port);
    let (handler, mut events) = recorder();

    let response = client
        .subscribe("SELECT ?text WHERE { ?s ?p ?text }", None, handler)
        .await;
    assert_eq!(response.as_subscribe().unwrap().spuid, "spu-ws");
    assert!(client.channel().is_connected());

    assert!(matches!(next_event(&mut events).await, Event::Results(..)));
    let Event::Added(_, first) = next_event(&mut events).await else {
        panic!("the first results are an addition");
    };
    assert_eq!(first.bindings()[0].value("text"), Some("hello"));
    assert!(matches!(next_event(&mut events).await, Event::Results(..)));
    let Event::Added(_, added) = next_event(&mut events).await else {
        panic!("the notification adds a row");
    };
    assert_eq!(added.bindings()[0].value("text"), Some("world"));

    assert!(client.unsubscribe("spu-ws").await.is_unsubscribe());
    assert!(client.subscription("spu-ws").is_none());
    client.channel().close();
    assert!(!client.channel().is_connected());
}

#[tokio::test]
async fn broker_closing_the_socket_breaks_the_subscription() {
    let port = serve_broker(true).await;
    let client = websocket_client(port);
    let (handler, mut events) = recorder();

    let response = client
        .subscribe("SELECT ?text WHERE { ?s ?p ?text }", None, handler)
        .await;
    assert!(response.is_subscribe(), "{response:?}");
    let subscription = client.subscription("spu-ws");

    loop {
        match next_event(&mut events).await {
            Event::Broken(spuid) => {
                assert_eq!(spuid, "spu-ws");
                break;
            }
            Event::Results(..) | Event::Added(..) | Event::Error(_) => {}
            other => panic!("unexpected event {other:?}"),
        }
    }
    if let Some(subscription) = subscription {
        assert_eq!(subscription.state(), SubscriptionState::Broken);
    }
    assert!(!client.channel().is_connected());
}

#[tokio::test]
async fn nothing_listening() {
    let port = common::closed_port().await;
    let client = websocket_client(port);
    let (handler, _events) = recorder();

    let response = client.subscribe("SELECT * WHERE {}", None, handler).await;
    assert_eq!(
        response.error_kind(),
        Some(sepa_model::ErrorKind::NotConnected)
    );
}
