use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// Something that happened on an open channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A text frame.
    Message(String),
    /// A failure that does not, by itself, close the channel.
    Error(String),
    /// The channel is closed. Always the last event.
    Closed(String),
}

/// The two ends of an open channel as seen by the transport.
///
/// Dropping `outbound` closes the channel. The connector reports the end of the channel with a
/// [`ChannelEvent::Closed`] (or by dropping the sender of `inbound`).
#[derive(Debug)]
pub struct Channel {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<ChannelEvent>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Could not open a channel to '{url}': {source}")]
    WebSocket {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },
    #[error("Connection refused: {0}")]
    Refused(String),
}

/// Opens channels to a broker.
///
/// [`WebSocketConnector`] is the production implementation; tests substitute an in-memory one.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &str) -> Result<Channel, ConnectError>;
}

/// Opens WebSocket channels with `tokio-tungstenite`.
///
/// Each channel is served by two tasks: one writing queued frames to the socket and one reading
/// frames from it.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &str) -> Result<Channel, ConnectError> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|source| ConnectError::WebSocket {
                url: url.to_owned(),
                source: Box::new(source),
            })?;
        debug!("WebSocket channel to {url} opened");
        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(error) = sink.send(Message::Text(frame)).await {
                    debug!("WebSocket write failed: {error}");
                    break;
                }
            }
            if let Err(error) = sink.close().await {
                debug!("WebSocket close failed: {error}");
            }
        });

        tokio::spawn(async move {
            let reason = loop {
                match source.next().await {
                    Some(Ok(Message::Text(frame))) => {
                        if inbound_tx.send(ChannelEvent::Message(frame)).is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map_or_else(
                            || "closed by the broker".to_owned(),
                            |frame| {
                                format!(
                                    "closed by the broker ({}): {}",
                                    u16::from(frame.code),
                                    frame.reason
                                )
                            },
                        );
                    }
                    Some(Ok(Message::Binary(frame))) => {
                        warn!("Ignoring a binary frame of {} bytes", frame.len());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        let reason = error.to_string();
                        if inbound_tx.send(ChannelEvent::Error(reason.clone())).is_err() {
                            return;
                        }
                        break reason;
                    }
                    None => break "end of stream".to_owned(),
                }
            };
            if inbound_tx.send(ChannelEvent::Closed(reason)).is_err() {
                debug!("Channel closed after the transport dropped it");
            }
        });

        Ok(Channel {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
