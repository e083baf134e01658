// Realtime notification channel: a WebSocket subscription to the backend's
// event stream.
//
// The manager owns at most one connection per authenticated session and does
// not reconnect on transport loss by itself: connects happen on sign-in,
// disconnects on sign-out. Undecodable frames are surfaced as events and the
// stream keeps running.

use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::protocol::ChannelFrame;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to open notification channel: {0}")]
    Connect(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events the channel delivers to its owner.
#[derive(Debug, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Frame(ChannelFrame),
    /// A frame failed to decode. The channel stays open and the store is
    /// untouched.
    ParseError(String),
}

/// Owns the persistent subscription for one authenticated session.
pub struct ChannelManager {
    state: ChannelState,
    task: Option<JoinHandle<()>>,
    tx: mpsc::Sender<ChannelEvent>,
}

impl ChannelManager {
    pub fn new(tx: mpsc::Sender<ChannelEvent>) -> Self {
        ChannelManager {
            state: ChannelState::Disconnected,
            task: None,
            tx,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Open the channel, authenticating with the session token.
    ///
    /// If a channel is already open it is closed first: at most one channel
    /// exists per session.
    pub async fn connect(
        &mut self,
        stream_url: &str,
        session_token: &str,
    ) -> Result<(), ChannelError> {
        self.disconnect();
        self.state = ChannelState::Connecting;

        let url = format!("{stream_url}?token={session_token}");
        let (ws, _response) = match connect_async(url.as_str()).await {
            Ok(pair) => pair,
            Err(e) => {
                self.state = ChannelState::Disconnected;
                return Err(ChannelError::Connect(e.to_string()));
            }
        };

        self.state = ChannelState::Connected;
        info!("notification channel connected");
        let _ = self.tx.send(ChannelEvent::Connected).await;

        let tx = self.tx.clone();
        self.task = Some(tokio::spawn(async move {
            let (_write, read) = ws.split();
            let _ = process_frame_stream(read, &tx).await;
            let _ = tx.send(ChannelEvent::Disconnected).await;
        }));
        Ok(())
    }

    /// Close the channel, if open. Reconnection only happens on the next
    /// sign-in.
    pub fn disconnect(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("notification channel closed");
        }
        self.state = ChannelState::Disconnected;
    }

    /// Record that the server side ended the stream. Called by the owner on
    /// receiving [`ChannelEvent::Disconnected`].
    pub fn mark_disconnected(&mut self) {
        self.task = None;
        self.state = ChannelState::Disconnected;
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Pump raw WebSocket messages into decoded [`ChannelEvent`]s.
///
/// Returns `Err(())` if the event channel is closed (receiver dropped),
/// signalling the caller to stop. Generic over the stream type so it can be
/// exercised with in-memory streams.
pub async fn process_frame_stream<St>(
    mut stream: St,
    tx: &mpsc::Sender<ChannelEvent>,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ChannelFrame>(&text) {
                Ok(frame) => {
                    if tx.send(ChannelEvent::Frame(frame)).await.is_err() {
                        return Err(());
                    }
                }
                Err(e) => {
                    // Bad frames are reported but never close the channel.
                    warn!("undecodable channel frame: {e}");
                    if tx.send(ChannelEvent::ParseError(e.to_string())).await.is_err() {
                        return Err(());
                    }
                }
            },
            Ok(Message::Close(_)) => {
                info!("server sent close frame");
                break;
            }
            Err(e) => {
                warn!("channel transport error: {e}");
                break;
            }
            _ => {
                // Ignore Binary, Ping, Pong, Frame variants.
            }
        }
    }
    Ok(())
}
