//! In-memory gateway and channel doubles for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chatsync_shared::{ChannelError, Conversation, FetchError, Message, NewConversation, User};
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::channel::{CloseHandler, PushHandler, RealtimeChannel};
use crate::gateway::RequestGateway;

pub fn message(id: &str, chat_id: &str, text: &str, secs: i64) -> Message {
    Message {
        id: id.to_string(),
        chat_id: chat_id.to_string(),
        sender_id: "u1".to_string(),
        text: text.to_string(),
        created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
    }
}

pub fn conversation(id: &str, title: &str, last: Option<Message>) -> Conversation {
    Conversation {
        id: id.to_string(),
        title: title.to_string(),
        description: String::new(),
        is_direct_chat: false,
        participants: Vec::new(),
        last_message: last,
    }
}

pub fn user(id: &str, first: &str, last: &str) -> User {
    User {
        id: id.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: format!("{}@example.com", first.to_lowercase()),
    }
}

/// Keeps one gateway call open until released.
#[derive(Clone)]
pub struct Hold {
    call: String,
    /// Signalled once the call has reached the gateway.
    pub started: Arc<Notify>,
    /// Signal to let the call complete.
    pub release: Arc<Notify>,
}

#[derive(Default)]
pub struct FakeGateway {
    conversations: Mutex<Vec<Conversation>>,
    messages: Mutex<HashMap<String, Vec<Message>>>,
    users: Mutex<Vec<User>>,
    calls: Mutex<Vec<String>>,
    fail_next: Mutex<Option<FetchError>>,
    hold: Mutex<Option<Hold>>,
    next_id: AtomicU64,
}

impl FakeGateway {
    pub fn set_conversations(&self, conversations: Vec<Conversation>) {
        *self.conversations.lock() = conversations;
    }

    pub fn set_messages(&self, chat_id: &str, messages: Vec<Message>) {
        self.messages.lock().insert(chat_id.to_string(), messages);
    }

    pub fn set_users(&self, users: Vec<User>) {
        *self.users.lock() = users;
    }

    /// Make the next call fail with `error`.
    pub fn fail_next(&self, error: FetchError) {
        *self.fail_next.lock() = Some(error);
    }

    /// Hold the next call recorded as `call`, e.g. `"list_conversations"`.
    pub fn hold_call(&self, call: &str) -> Hold {
        let hold = Hold {
            call: call.to_string(),
            started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        *self.hold.lock() = Some(hold.clone());
        hold
    }

    pub fn hold_history(&self, chat_id: &str) -> Hold {
        self.hold_call(&format!("list_messages:{chat_id}"))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) -> Result<(), FetchError> {
        self.calls.lock().push(call);
        match self.fail_next.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn wait_if_held(&self, call: &str) {
        let hold = {
            let mut hold = self.hold.lock();
            if hold.as_ref().is_some_and(|h| h.call == call) {
                hold.take()
            } else {
                None
            }
        };
        if let Some(hold) = hold {
            hold.started.notify_one();
            hold.release.notified().await;
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl RequestGateway for FakeGateway {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, FetchError> {
        self.record("list_conversations".into())?;
        self.wait_if_held("list_conversations").await;
        Ok(self.conversations.lock().clone())
    }

    async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>, FetchError> {
        let call = format!("list_messages:{chat_id}");
        self.record(call.clone())?;
        self.wait_if_held(&call).await;

        Ok(self
            .messages
            .lock()
            .get(chat_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn post_message(&self, chat_id: &str, text: &str) -> Result<Message, FetchError> {
        self.record(format!("post_message:{chat_id}"))?;
        Ok(Message {
            id: self.next_id("srv"),
            chat_id: chat_id.to_string(),
            sender_id: "me".to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
        })
    }

    async fn create_direct_conversation(
        &self,
        request: &NewConversation,
    ) -> Result<Conversation, FetchError> {
        self.record(format!("create_direct_conversation:{}", request.title))?;
        let users = self.users.lock().clone();
        let participants = request
            .user_ids
            .iter()
            .map(|id| {
                users
                    .iter()
                    .find(|u| &u.id == id)
                    .cloned()
                    .unwrap_or_else(|| user(id, "", ""))
            })
            .collect();
        Ok(Conversation {
            id: self.next_id("dm"),
            title: request.title.clone(),
            description: request.description.clone(),
            is_direct_chat: request.is_direct_chat,
            participants,
            last_message: None,
        })
    }

    async fn list_other_users(&self) -> Result<Vec<User>, FetchError> {
        self.record("list_other_users".into())?;
        Ok(self.users.lock().clone())
    }
}

#[derive(Default)]
pub struct FakeChannel {
    calls: Mutex<Vec<String>>,
    handler: Mutex<Option<PushHandler>>,
    closed: Mutex<Option<CloseHandler>>,
    refuse_connect: bool,
    group_error: Mutex<Option<ChannelError>>,
}

impl FakeChannel {
    /// A channel whose `connect` always fails.
    pub fn refusing() -> Self {
        Self {
            refuse_connect: true,
            ..Self::default()
        }
    }

    /// Make every later join/leave fail with `error`.
    pub fn fail_groups(&self, error: ChannelError) {
        *self.group_error.lock() = Some(error);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Deliver `message` as if the server pushed it.
    pub fn push(&self, message: Message) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(message);
        }
    }

    /// Drop the connection as if the server went away.
    pub fn drop_connection(&self) {
        self.calls.lock().push("dropped".into());
        let on_close = self.closed.lock().clone();
        if let Some(on_close) = on_close {
            on_close();
        }
    }

    fn group_result(&self) -> Result<(), ChannelError> {
        match self.group_error.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RealtimeChannel for FakeChannel {
    async fn connect(&self, credential: &str) -> Result<(), ChannelError> {
        self.calls.lock().push(format!("connect:{credential}"));
        if self.refuse_connect {
            return Err(ChannelError::Connect("connection refused".into()));
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.calls.lock().push("disconnect".into());
    }

    async fn join_group(&self, chat_id: &str) -> Result<(), ChannelError> {
        self.calls.lock().push(format!("join:{chat_id}"));
        self.group_result()
    }

    async fn leave_group(&self, chat_id: &str) -> Result<(), ChannelError> {
        self.calls.lock().push(format!("leave:{chat_id}"));
        self.group_result()
    }

    fn on_message(&self, handler: PushHandler) {
        *self.handler.lock() = Some(handler);
    }

    fn on_close(&self, handler: CloseHandler) {
        *self.closed.lock() = Some(handler);
    }
}
