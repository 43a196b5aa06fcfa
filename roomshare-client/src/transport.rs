//! Persistent-connection plumbing. A [`Transport`] opens one connection and
//! hands back a [`Link`]: a pair of text channels backed by a send task and
//! a receive task. The link is closed when `inbound` yields `None`.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::mpsc, time::timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = futures::stream::SplitSink<WsStream, Message>;
type WsRead = futures::stream::SplitStream<WsStream>;

#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &Url) -> Result<Link, ClientError>;
}

#[derive(Debug, Clone)]
pub struct WsTransport {
    connect_timeout: Duration,
}

impl WsTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &Url) -> Result<Link, ClientError> {
        let (ws_stream, _) = timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| ClientError::ConnectTimeout(self.connect_timeout))??;

        let (write_half, read_half) = ws_stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(network_send_task(write_half, outbound_rx));
        tokio::spawn(network_receive_task(read_half, inbound_tx));

        Ok(Link {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

async fn network_send_task(mut ws_write: WsWrite, mut outgoing_rx: mpsc::UnboundedReceiver<String>) {
    while let Some(frame) = outgoing_rx.recv().await {
        if let Err(err) = ws_write.send(Message::Text(frame.into())).await {
            warn!("websocket write failed: {err}");
            break;
        }
    }
    let _ = ws_write.close().await;
}

async fn network_receive_task(mut ws_read: WsRead, incoming_tx: mpsc::UnboundedSender<String>) {
    while let Some(next) = ws_read.next().await {
        let message = match next {
            Ok(message) => message,
            Err(err) => {
                warn!("websocket read failed: {err}");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                if incoming_tx.send(text.as_str().to_owned()).is_err() {
                    break;
                }
            }
            Message::Close(frame) => {
                info!(?frame, "server closed the connection");
                break;
            }
            Message::Binary(data) => {
                debug!(len = data.len(), "ignoring binary frame");
            }
            _ => {}
        }
    }
}
