//! Conversation list ordered by recency.
//!
//! The front of the list is always the conversation with the newest known
//! `last_message`; the only reordering is moving a conversation to the front
//! when it gets a new one.

use std::future::Future;
use std::sync::Arc;

use chatsync_shared::{Conversation, FetchError, Message, NewConversation, User};
use parking_lot::Mutex;

use crate::events::{EventBus, SyncEvent};
use crate::gateway::RequestGateway;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryState {
    pub conversations: Vec<Conversation>,
    pub is_loading: bool,
    pub error: Option<String>,
}

pub struct ConversationRegistry {
    gateway: Arc<dyn RequestGateway>,
    events: EventBus,
    state: Mutex<RegistryState>,
    /// Held across lookup and create so overlapping requests for the same
    /// participant create one chat.
    direct_ops: tokio::sync::Mutex<()>,
}

fn contains_ci(field: &str, needle: &str) -> bool {
    field.to_lowercase().contains(needle)
}

impl ConversationRegistry {
    pub fn new(gateway: Arc<dyn RequestGateway>, events: EventBus) -> Self {
        Self {
            gateway,
            events,
            state: Mutex::new(RegistryState::default()),
            direct_ops: tokio::sync::Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> RegistryState {
        self.state.lock().clone()
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.state.lock().conversations.clone()
    }

    /// Replace the whole list with the server's.
    pub async fn fetch_all(&self) -> Result<(), FetchError> {
        {
            let mut state = self.state.lock();
            state.is_loading = true;
            state.error = None;
        }

        let result = self.gateway.list_conversations().await;

        {
            let mut state = self.state.lock();
            state.is_loading = false;
            match &result {
                Ok(conversations) => {
                    crate::log_info!("Conversations fetched: {}", conversations.len());
                    state.conversations = conversations.clone();
                }
                Err(e) => {
                    crate::log_error!("Error fetching conversations: {}", e);
                    state.error = Some(e.to_string());
                }
            }
        }
        self.events.emit(SyncEvent::ConversationsChanged);

        result.map(|_| ())
    }

    pub fn find_by_id(&self, chat_id: &str) -> Option<Conversation> {
        self.state
            .lock()
            .conversations
            .iter()
            .find(|c| c.id == chat_id)
            .cloned()
    }

    /// Conversations whose title, description or last message text contains
    /// `query`, ignoring case. An empty query matches everything.
    pub fn search(&self, query: &str) -> Vec<Conversation> {
        let state = self.state.lock();
        if query.is_empty() {
            return state.conversations.clone();
        }

        let needle = query.to_lowercase();
        state
            .conversations
            .iter()
            .filter(|c| {
                contains_ci(&c.title, &needle)
                    || contains_ci(&c.description, &needle)
                    || c.last_message
                        .as_ref()
                        .is_some_and(|m| contains_ci(&m.text, &needle))
            })
            .cloned()
            .collect()
    }

    /// Make `message` the conversation's last message and move it to the
    /// front. Returns false when the conversation is not tracked.
    pub fn record_new_message(&self, message: &Message) -> bool {
        {
            let mut state = self.state.lock();
            let Some(index) = state
                .conversations
                .iter()
                .position(|c| c.id == message.chat_id)
            else {
                crate::log_debug!(
                    "record_new_message: unknown conversation {}",
                    message.chat_id
                );
                return false;
            };

            let mut conversation = state.conversations.remove(index);
            conversation.last_message = Some(message.clone());
            state.conversations.insert(0, conversation);
        }
        self.events.emit(SyncEvent::ConversationsChanged);
        true
    }

    fn find_direct_chat(&self, user_id: &str) -> Option<Conversation> {
        self.state
            .lock()
            .conversations
            .iter()
            .find(|c| c.is_direct_chat && c.has_participant(user_id))
            .cloned()
    }

    /// Return the existing direct chat with `participant`, or create one with
    /// `create` and put it at the front.
    pub async fn upsert_direct_chat<F, Fut>(
        &self,
        participant: &User,
        create: F,
    ) -> Result<Conversation, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Conversation, FetchError>>,
    {
        let _ops = self.direct_ops.lock().await;
        if let Some(existing) = self.find_direct_chat(&participant.id) {
            crate::log_debug!("Direct chat already exists: {}", existing.id);
            return Ok(existing);
        }

        let created = create().await.inspect_err(|e| {
            crate::log_error!("Error creating direct chat: {}", e);
        })?;

        {
            let mut state = self.state.lock();
            // A fetch that finished meanwhile may already carry it.
            state.conversations.retain(|c| c.id != created.id);
            state.conversations.insert(0, created.clone());
        }
        crate::log_info!("New direct chat created: {}", created.id);
        self.events.emit(SyncEvent::ConversationsChanged);

        Ok(created)
    }

    /// [`Self::upsert_direct_chat`] backed by the gateway.
    pub async fn create_direct_chat(&self, participant: &User) -> Result<Conversation, FetchError> {
        let request = NewConversation::direct_with(participant);
        let gateway = self.gateway.clone();
        self.upsert_direct_chat(participant, || async move {
            gateway.create_direct_conversation(&request).await
        })
        .await
    }

    pub fn clear_error(&self) {
        self.state.lock().error = None;
    }

    /// Forget everything, e.g. on logout.
    pub fn reset(&self) {
        *self.state.lock() = RegistryState::default();
        self.events.emit(SyncEvent::ConversationsChanged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{conversation, message, user, FakeGateway};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry(gateway: &Arc<FakeGateway>) -> ConversationRegistry {
        ConversationRegistry::new(gateway.clone(), EventBus::new(16))
    }

    fn ids(list: &[Conversation]) -> Vec<&str> {
        list.iter().map(|c| c.id.as_str()).collect()
    }

    #[tokio::test]
    async fn fetch_all_replaces_state_and_clears_error() {
        let gateway = Arc::new(FakeGateway::default());
        let registry = registry(&gateway);

        gateway.fail_next(FetchError::Network("offline".into()));
        assert!(registry.fetch_all().await.is_err());
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.error.as_deref(), Some("Network error: offline"));
        assert!(!snapshot.is_loading);

        gateway.set_conversations(vec![conversation("A", "Alpha", None)]);
        registry.fetch_all().await.unwrap();
        let snapshot = registry.snapshot();
        assert_eq!(ids(&snapshot.conversations), vec!["A"]);
        assert_eq!(snapshot.error, None);
    }

    #[tokio::test]
    async fn new_message_moves_conversation_to_front() {
        let gateway = Arc::new(FakeGateway::default());
        gateway.set_conversations(vec![
            conversation("B", "Beta", Some(message("m2", "B", "later", 20))),
            conversation("A", "Alpha", Some(message("m1", "A", "earlier", 10))),
        ]);
        let registry = registry(&gateway);
        registry.fetch_all().await.unwrap();

        assert!(registry.record_new_message(&message("m3", "A", "newest", 30)));

        let list = registry.conversations();
        assert_eq!(ids(&list), vec!["A", "B"]);
        assert_eq!(list[0].last_message.as_ref().unwrap().id, "m3");
        assert_eq!(list[1].last_message.as_ref().unwrap().id, "m2");
    }

    #[tokio::test]
    async fn message_for_unknown_conversation_is_ignored() {
        let gateway = Arc::new(FakeGateway::default());
        gateway.set_conversations(vec![conversation("A", "Alpha", None)]);
        let registry = registry(&gateway);
        registry.fetch_all().await.unwrap();

        assert!(!registry.record_new_message(&message("m1", "Z", "hi", 1)));
        assert_eq!(ids(&registry.conversations()), vec!["A"]);
        assert!(registry.find_by_id("Z").is_none());
    }

    #[tokio::test]
    async fn search_is_case_insensitive_across_fields() {
        let gateway = Arc::new(FakeGateway::default());
        let mut ops = conversation("A", "Ops Room", None);
        ops.description = "Pager rotation".into();
        gateway.set_conversations(vec![
            ops,
            conversation("B", "Lunch", Some(message("m1", "B", "Tacos today?", 1))),
            conversation("C", "Random", None),
        ]);
        let registry = registry(&gateway);
        registry.fetch_all().await.unwrap();

        assert_eq!(ids(&registry.search("ops")), vec!["A"]);
        assert_eq!(ids(&registry.search("PAGER")), vec!["A"]);
        assert_eq!(ids(&registry.search("tacos")), vec!["B"]);
        assert_eq!(ids(&registry.search("")), vec!["A", "B", "C"]);
        assert!(registry.search("nothing").is_empty());
    }

    #[tokio::test]
    async fn upsert_direct_chat_creates_once() {
        let gateway = Arc::new(FakeGateway::default());
        gateway.set_conversations(vec![conversation("A", "Alpha", None)]);
        let registry = registry(&gateway);
        registry.fetch_all().await.unwrap();

        let bob = user("u2", "Bob", "Stone");
        let calls = AtomicUsize::new(0);
        let created = &calls;
        let make = move || async move {
            created.fetch_add(1, Ordering::SeqCst);
            let mut conv = conversation("D1", "Chat with Bob Stone", None);
            conv.is_direct_chat = true;
            conv.participants = vec![user("u2", "Bob", "Stone")];
            Ok(conv)
        };

        let first = registry.upsert_direct_chat(&bob, make).await.unwrap();
        let second = registry.upsert_direct_chat(&bob, make).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.id, second.id);
        assert_eq!(ids(&registry.conversations()), vec!["D1", "A"]);
    }

    #[tokio::test]
    async fn overlapping_upserts_create_one_direct_chat() {
        let gateway = Arc::new(FakeGateway::default());
        let registry = registry(&gateway);

        let bob = user("u2", "Bob", "Stone");
        let calls = AtomicUsize::new(0);
        let created = &calls;
        let make = move || async move {
            let n = created.fetch_add(1, Ordering::SeqCst) + 1;
            // Let the other request run its lookup while this one is pending.
            tokio::task::yield_now().await;
            let mut conv = conversation(&format!("D{n}"), "Chat with Bob Stone", None);
            conv.is_direct_chat = true;
            conv.participants = vec![user("u2", "Bob", "Stone")];
            Ok(conv)
        };

        let (first, second) = tokio::join!(
            registry.upsert_direct_chat(&bob, make),
            registry.upsert_direct_chat(&bob, make)
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.unwrap().id, "D1");
        assert_eq!(second.unwrap().id, "D1");
        assert_eq!(ids(&registry.conversations()), vec!["D1"]);
    }

    #[tokio::test]
    async fn fetch_all_marks_loading_while_in_flight() {
        let gateway = Arc::new(FakeGateway::default());
        gateway.set_conversations(vec![conversation("A", "Alpha", None)]);
        let registry = Arc::new(registry(&gateway));
        let hold = gateway.hold_call("list_conversations");

        let fetch = tokio::spawn({
            let registry = registry.clone();
            async move { registry.fetch_all().await }
        });
        hold.started.notified().await;

        let during = registry.snapshot();
        assert!(during.is_loading);
        assert!(during.conversations.is_empty());

        hold.release.notify_one();
        fetch.await.unwrap().unwrap();

        let after = registry.snapshot();
        assert!(!after.is_loading);
        assert_eq!(ids(&after.conversations), vec!["A"]);
    }

    #[tokio::test]
    async fn group_chat_with_participant_does_not_count_as_direct() {
        let gateway = Arc::new(FakeGateway::default());
        let mut group = conversation("G", "Team", None);
        group.participants = vec![user("u2", "Bob", "Stone")];
        gateway.set_conversations(vec![group]);
        let registry = registry(&gateway);
        registry.fetch_all().await.unwrap();

        let direct = registry
            .create_direct_chat(&user("u2", "Bob", "Stone"))
            .await
            .unwrap();

        assert!(direct.is_direct_chat);
        assert_ne!(direct.id, "G");
        assert_eq!(
            gateway.calls(),
            vec!["list_conversations", "create_direct_conversation:Chat with Bob Stone"]
        );
    }

    #[tokio::test]
    async fn failed_create_leaves_list_untouched() {
        let gateway = Arc::new(FakeGateway::default());
        let registry = registry(&gateway);
        gateway.fail_next(FetchError::Http {
            status: 500,
            body: String::new(),
        });

        let err = registry
            .create_direct_chat(&user("u2", "Bob", "Stone"))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert!(registry.conversations().is_empty());
    }
}
