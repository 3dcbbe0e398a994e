//! Lifecycle of the realtime channel: connect/disconnect with the session and
//! keep exactly one conversation group joined, matching the active chat.

use std::sync::Arc;

use chatsync_shared::ChannelError;
use parking_lot::Mutex;

use crate::channel::{ConnectionState, PushHandler, RealtimeChannel};
use crate::events::{EventBus, SyncEvent};

/// State shared with the channel's close handler.
struct Tracked {
    events: EventBus,
    state: Mutex<ConnectionState>,
    joined: Mutex<Option<String>>,
}

impl Tracked {
    fn set_state(&self, state: ConnectionState) {
        {
            let mut current = self.state.lock();
            if *current == state {
                return;
            }
            *current = state.clone();
        }
        self.events.emit(SyncEvent::ConnectionChanged(state));
    }

    /// The channel dropped on its own; forget the joined group.
    fn lost(&self) {
        *self.joined.lock() = None;
        let live = matches!(
            *self.state.lock(),
            ConnectionState::Connected | ConnectionState::Connecting
        );
        if live {
            crate::log_warn!("Realtime channel lost");
            self.set_state(ConnectionState::Disconnected);
        }
    }
}

pub struct ConnectionLifecycleManager {
    channel: Arc<dyn RealtimeChannel>,
    tracked: Arc<Tracked>,
    /// Serializes group changes so interleaved switches cannot leave a stale
    /// group joined.
    group_ops: tokio::sync::Mutex<()>,
}

impl ConnectionLifecycleManager {
    pub fn new(channel: Arc<dyn RealtimeChannel>, events: EventBus) -> Self {
        let tracked = Arc::new(Tracked {
            events,
            state: Mutex::new(ConnectionState::Disconnected),
            joined: Mutex::new(None),
        });
        let on_close = Arc::downgrade(&tracked);
        channel.on_close(Arc::new(move || {
            if let Some(tracked) = on_close.upgrade() {
                tracked.lost();
            }
        }));
        Self {
            channel,
            tracked,
            group_ops: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.tracked.state.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.tracked.state.lock().is_connected()
    }

    /// The group currently joined, if any.
    pub fn joined_group(&self) -> Option<String> {
        self.tracked.joined.lock().clone()
    }

    fn set_state(&self, state: ConnectionState) {
        self.tracked.set_state(state);
    }

    /// Open the channel and register `handler` for inbound messages.
    ///
    /// A failure leaves the manager in [`ConnectionState::Failed`]; it is
    /// logged, not returned. Request/response calls keep working without the
    /// channel. There is no automatic retry; after a failure or a dropped
    /// connection, calling `connect` again opens a new one.
    pub async fn connect(&self, credential: &str, handler: PushHandler) {
        if matches!(
            self.state(),
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            crate::log_debug!("connect: already {:?}", self.state());
            return;
        }

        self.set_state(ConnectionState::Connecting);
        self.channel.on_message(handler);

        match self.channel.connect(credential).await {
            Ok(()) => {
                // The socket may already have dropped again, which resets the
                // state to `Disconnected`.
                let mut state = self.tracked.state.lock();
                if *state == ConnectionState::Connecting {
                    *state = ConnectionState::Connected;
                    drop(state);
                    crate::log_info!("Realtime channel connected");
                    self.tracked
                        .events
                        .emit(SyncEvent::ConnectionChanged(ConnectionState::Connected));
                }
            }
            Err(e) => {
                crate::log_error!("Realtime channel unavailable, continuing without push: {}", e);
                self.set_state(ConnectionState::Failed {
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Tear the channel down. Calling it while disconnected does nothing.
    pub async fn disconnect(&self) {
        if matches!(self.state(), ConnectionState::Disconnected) {
            return;
        }
        let _ops = self.group_ops.lock().await;
        self.channel.disconnect().await;
        *self.tracked.joined.lock() = None;
        crate::log_info!("Realtime channel disconnected");
        self.set_state(ConnectionState::Disconnected);
    }

    /// Join `chat_id`'s group, leaving any other joined group first.
    pub async fn join(&self, chat_id: &str) {
        let _ops = self.group_ops.lock().await;
        self.join_locked(chat_id).await;
    }

    /// Leave `chat_id`'s group.
    pub async fn leave(&self, chat_id: &str) {
        let _ops = self.group_ops.lock().await;
        self.leave_locked(chat_id).await;
    }

    /// Make the joined group equal `target`, whatever it is by the time the
    /// previous group change has finished.
    pub async fn align(&self, target: impl FnOnce() -> Option<String>) {
        let _ops = self.group_ops.lock().await;
        let target = target();
        let joined = self.joined_group();
        if joined == target {
            return;
        }
        match target {
            Some(chat_id) => self.join_locked(&chat_id).await,
            None => {
                if let Some(previous) = joined {
                    self.leave_locked(&previous).await;
                }
            }
        }
    }

    async fn join_locked(&self, chat_id: &str) {
        if !self.is_connected() {
            crate::log_debug!("join {}: channel not connected, skipping", chat_id);
            return;
        }
        let previous = self.joined_group();
        if previous.as_deref() == Some(chat_id) {
            return;
        }
        if let Some(previous) = previous {
            self.leave_locked(&previous).await;
        }

        match self.channel.join_group(chat_id).await {
            Ok(()) => {
                crate::log_debug!("Joined group {}", chat_id);
                *self.tracked.joined.lock() = Some(chat_id.to_string());
            }
            Err(e) => self.channel_failed("join", chat_id, e),
        }
    }

    async fn leave_locked(&self, chat_id: &str) {
        if !self.is_connected() {
            crate::log_debug!("leave {}: channel not connected, skipping", chat_id);
            return;
        }
        if let Err(e) = self.channel.leave_group(chat_id).await {
            self.channel_failed("leave", chat_id, e);
        } else {
            crate::log_debug!("Left group {}", chat_id);
        }
        let mut joined = self.tracked.joined.lock();
        if joined.as_deref() == Some(chat_id) {
            *joined = None;
        }
    }

    fn channel_failed(&self, op: &str, chat_id: &str, error: ChannelError) {
        crate::log_warn!("Realtime {} for {} failed: {}", op, chat_id, error);
        if error == ChannelError::NotConnected {
            *self.tracked.joined.lock() = None;
            self.set_state(ConnectionState::Disconnected);
        }
    }
}
