//! WebSocket implementation of the realtime channel using tokio-tungstenite.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chatsync_shared::{ChannelError, ClientCommand, ServerEvent, WsEnvelope};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use url::Url;

use crate::channel::{CloseHandler, PushHandler, RealtimeChannel};

/// Query parameter carrying the credential on the upgrade request.
const CREDENTIAL_PARAM: &str = "access_token";

/// One established socket.
struct LiveSocket {
    epoch: u64,
    sender: UnboundedSender<WsEnvelope<ClientCommand>>,
    reader: JoinHandle<()>,
}

/// A realtime channel over a single WebSocket.
///
/// The socket is not re-established after it drops. The close handler runs
/// once and group commands fail with [`ChannelError::NotConnected`] until
/// `connect` is called again.
pub struct WsChannel {
    url: String,
    handler: Arc<Mutex<Option<PushHandler>>>,
    closed: Arc<Mutex<Option<CloseHandler>>>,
    live: Arc<Mutex<Option<LiveSocket>>>,
    epoch: AtomicU64,
}

impl WsChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            handler: Arc::new(Mutex::new(None)),
            closed: Arc::new(Mutex::new(None)),
            live: Arc::new(Mutex::new(None)),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn is_open(&self) -> bool {
        self.live.lock().is_some()
    }

    fn url_for(&self, credential: &str) -> Result<String, ChannelError> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| ChannelError::Connect(format!("invalid realtime URL {}: {e}", self.url)))?;
        url.query_pairs_mut()
            .append_pair(CREDENTIAL_PARAM, credential);
        Ok(url.to_string())
    }

    fn send(&self, cmd: ClientCommand) -> Result<(), ChannelError> {
        let live = self.live.lock();
        let socket = live.as_ref().ok_or(ChannelError::NotConnected)?;
        crate::log_debug!("WsChannel::send {:?}", cmd);
        socket
            .sender
            .send(WsEnvelope::new(cmd))
            .map_err(|e| ChannelError::Send(e.to_string()))
    }
}

/// Decode one text frame and hand pushed messages to the handler.
fn dispatch(handler: &Mutex<Option<PushHandler>>, text: &str) {
    let envelope = match serde_json::from_str::<WsEnvelope<ServerEvent>>(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            crate::log_error!("Failed to parse realtime frame: {}", e);
            return;
        }
    };

    match envelope.payload {
        ServerEvent::MessageNew { message } => {
            // Clone out so the handler runs without the lock held.
            let handler = handler.lock().clone();
            match handler {
                Some(handler) => handler(message),
                None => crate::log_warn!("Dropping pushed message {}: no handler", message.id),
            }
        }
        ServerEvent::Error { code, message } => {
            crate::log_warn!("Realtime server error {}: {}", code, message);
        }
    }
}

#[async_trait]
impl RealtimeChannel for WsChannel {
    async fn connect(&self, credential: &str) -> Result<(), ChannelError> {
        if self.is_open() {
            return Ok(());
        }

        let url = self.url_for(credential)?;
        let (ws_stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        crate::log_info!("WebSocket connected to {}", self.url);

        let (mut write, mut read) = ws_stream.split();
        let (sender, mut receiver) = unbounded_channel::<WsEnvelope<ClientCommand>>();
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        // Write task: ends when every sender is dropped.
        tokio::spawn(async move {
            while let Some(cmd) = receiver.recv().await {
                match serde_json::to_string(&cmd) {
                    Ok(json) => {
                        if let Err(e) = write.send(WsMessage::text(json)).await {
                            crate::log_error!("Send failed: {}", e);
                            break;
                        }
                    }
                    Err(e) => crate::log_error!("Serialize failed: {}", e),
                }
            }
            let _ = write.close().await;
        });

        let handler = self.handler.clone();
        let closed = self.closed.clone();
        let live = self.live.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => dispatch(&handler, text.as_str()),
                    Ok(WsMessage::Close(_)) => {
                        crate::log_info!("WebSocket received close frame");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        crate::log_error!("WebSocket read error: {}", e);
                        break;
                    }
                }
            }

            // A socket taken by `disconnect` or replaced by a newer one is
            // not reported.
            let dropped = {
                let mut live = live.lock();
                let ours = live.as_ref().is_some_and(|s| s.epoch == epoch);
                if ours {
                    *live = None;
                }
                ours
            };
            if dropped {
                crate::log_info!("WebSocket closed by remote");
                let on_close = closed.lock().clone();
                if let Some(on_close) = on_close {
                    on_close();
                }
            }
        });

        let mut live = self.live.lock();
        if reader.is_finished() {
            return Err(ChannelError::Connect("socket closed during handshake".into()));
        }
        *live = Some(LiveSocket {
            epoch,
            sender,
            reader,
        });
        Ok(())
    }

    async fn disconnect(&self) {
        let socket = self.live.lock().take();
        if let Some(socket) = socket {
            socket.reader.abort();
            // Dropping the sender lets the write task flush and close the socket.
            drop(socket.sender);
            crate::log_info!("WebSocket to {} disconnected", self.url);
        }
    }

    async fn join_group(&self, chat_id: &str) -> Result<(), ChannelError> {
        self.send(ClientCommand::JoinGroup {
            chat_id: chat_id.to_string(),
        })
    }

    async fn leave_group(&self, chat_id: &str) -> Result<(), ChannelError> {
        self.send(ClientCommand::LeaveGroup {
            chat_id: chat_id.to_string(),
        })
    }

    fn on_message(&self, handler: PushHandler) {
        *self.handler.lock() = Some(handler);
    }

    fn on_close(&self, handler: CloseHandler) {
        *self.closed.lock() = Some(handler);
    }
}
