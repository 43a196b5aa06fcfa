//! Live link to the room: a driver task that keeps (re)opening the
//! connection on a fixed delay, and a [`ConnectionManager`] that folds the
//! driver's events into chat state.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use roomshare_core::{
    ChatMessage, ClientEvent, HistoryUpdate, MessageStore, ServerEvent, decode_server_event,
    encode_client_event, format::format_clock,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::ClientError,
    transport::{Link, Transport},
};

const UNKNOWN_USER: &str = "unknown user";
const PENDING_MARKER: &str = "sending…";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "connected",
            ConnectionState::Closed => "disconnected",
        }
    }
}

#[derive(Debug)]
pub enum ConnectionEvent {
    Connecting { attempt: u64 },
    Opened { outbound: mpsc::UnboundedSender<String> },
    Frame(String),
    /// `reason` is set when the attempt failed before the link opened.
    Closed { reason: Option<String> },
}

/// What applying a [`ConnectionEvent`] changed.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEffect {
    State(ConnectionState),
    /// Welcome frame accepted. `history` is `None` when the frame carried
    /// no history and the store was left alone.
    Welcomed { history: Option<HistoryUpdate> },
    ChatAppended(HistoryUpdate),
    Ignored,
}

/// Opens the link, forwards its frames, and reopens it `reconnect_delay`
/// after every close or failed attempt. Runs until the receiving side of
/// `events` is dropped.
pub async fn run_connection_driver<E>(
    transport: Arc<dyn Transport>,
    url: Url,
    reconnect_delay: Duration,
    events: mpsc::UnboundedSender<E>,
) where
    E: From<ConnectionEvent> + Send + 'static,
{
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        info!(attempt, url = %url, "connecting");
        if events.send(ConnectionEvent::Connecting { attempt }.into()).is_err() {
            return;
        }

        let closed = match transport.open(&url).await {
            Ok(Link { outbound, mut inbound }) => {
                info!(attempt, "connected");
                if events.send(ConnectionEvent::Opened { outbound }.into()).is_err() {
                    return;
                }
                while let Some(frame) = inbound.recv().await {
                    if events.send(ConnectionEvent::Frame(frame).into()).is_err() {
                        return;
                    }
                }
                info!("connection closed");
                ConnectionEvent::Closed { reason: None }
            }
            Err(err) => {
                warn!(attempt, url = %url, "connect failed: {err}");
                ConnectionEvent::Closed {
                    reason: Some(err.to_string()),
                }
            }
        };
        if events.send(closed.into()).is_err() {
            return;
        }

        debug!(delay_ms = reconnect_delay.as_millis() as u64, "reconnect scheduled");
        tokio::time::sleep(reconnect_delay).await;
    }
}

#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    client_name: Option<String>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    pending_seq: u64,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Connecting,
            client_name: None,
            outbound: None,
            pending_seq: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Name the server assigned in its welcome frame.
    pub fn client_name(&self) -> &str {
        self.client_name.as_deref().unwrap_or(UNKNOWN_USER)
    }

    pub fn apply(&mut self, event: ConnectionEvent, store: &mut MessageStore) -> ConnectionEffect {
        match event {
            ConnectionEvent::Connecting { .. } => {
                self.state = ConnectionState::Connecting;
                ConnectionEffect::State(self.state)
            }
            ConnectionEvent::Opened { outbound } => {
                self.state = ConnectionState::Open;
                self.outbound = Some(outbound);
                ConnectionEffect::State(self.state)
            }
            ConnectionEvent::Closed { .. } => {
                self.state = ConnectionState::Closed;
                self.outbound = None;
                store.drop_pending();
                ConnectionEffect::State(self.state)
            }
            ConnectionEvent::Frame(frame) => self.apply_frame(&frame, store),
        }
    }

    fn apply_frame(&mut self, frame: &str, store: &mut MessageStore) -> ConnectionEffect {
        let event = match decode_server_event(frame) {
            Ok(event) => event,
            Err(err) => {
                warn!(len = frame.len(), "dropping malformed frame: {err}");
                return ConnectionEffect::Ignored;
            }
        };

        match event {
            ServerEvent::Welcome(welcome) => {
                let name = welcome.client_name.unwrap_or_else(|| UNKNOWN_USER.to_owned());
                info!(client_name = %name, "welcomed");
                self.client_name = Some(name);
                let history = welcome.chat_history.map(|history| store.bulk_replace(history));
                ConnectionEffect::Welcomed { history }
            }
            ServerEvent::ChatMessage { message } => {
                ConnectionEffect::ChatAppended(store.append(message))
            }
            ServerEvent::Unknown => {
                debug!("ignoring frame with unknown type");
                ConnectionEffect::Ignored
            }
        }
    }

    /// Sends `text` over the open link and shows it as pending until the
    /// server echoes it back. Fails with [`ClientError::NotConnected`] when
    /// there is no usable link.
    pub fn send_chat(&mut self, text: &str, store: &mut MessageStore) -> Result<(), ClientError> {
        let outbound = match (&self.outbound, self.state) {
            (Some(outbound), ConnectionState::Open) => outbound,
            _ => return Err(ClientError::NotConnected),
        };
        let frame = encode_client_event(&ClientEvent::ChatMessage {
            message: text.to_owned(),
        })?;
        outbound.send(frame).map_err(|_| ClientError::NotConnected)?;

        self.pending_seq += 1;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or_default();
        store.show_pending(ChatMessage {
            id: format!("pending-{}", self.pending_seq),
            message: text.to_owned(),
            client_name: self.client_name().to_owned(),
            client_ip: PENDING_MARKER.to_owned(),
            timestamp,
            time_str: format_clock(timestamp),
        });
        Ok(())
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
