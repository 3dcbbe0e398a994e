//! Directory of other users, for starting direct chats.

use std::sync::Arc;

use chatsync_shared::{FetchError, User};
use parking_lot::Mutex;

use crate::events::{EventBus, SyncEvent};
use crate::gateway::RequestGateway;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsersState {
    pub users: Vec<User>,
    pub query: String,
    pub is_loading: bool,
    pub error: Option<String>,
}

pub struct UserDirectory {
    gateway: Arc<dyn RequestGateway>,
    events: EventBus,
    state: Mutex<UsersState>,
}

impl UserDirectory {
    pub fn new(gateway: Arc<dyn RequestGateway>, events: EventBus) -> Self {
        Self {
            gateway,
            events,
            state: Mutex::new(UsersState::default()),
        }
    }

    pub fn snapshot(&self) -> UsersState {
        self.state.lock().clone()
    }

    pub async fn fetch_all(&self) -> Result<(), FetchError> {
        {
            let mut state = self.state.lock();
            state.is_loading = true;
            state.error = None;
        }

        let result = self.gateway.list_other_users().await;

        {
            let mut state = self.state.lock();
            state.is_loading = false;
            match &result {
                Ok(users) => {
                    crate::log_info!("Users fetched: {}", users.len());
                    state.users = users.clone();
                }
                Err(e) => {
                    crate::log_error!("Error fetching users: {}", e);
                    state.error = Some(e.to_string());
                }
            }
        }
        self.events.emit(SyncEvent::UsersChanged);

        result.map(|_| ())
    }

    pub fn set_query(&self, query: impl Into<String>) {
        self.state.lock().query = query.into();
    }

    /// Users matching the current query on first name, last name, email or
    /// full name, ignoring case.
    pub fn filtered(&self) -> Vec<User> {
        let state = self.state.lock();
        if state.query.is_empty() {
            return state.users.clone();
        }

        let query = state.query.to_lowercase();
        state
            .users
            .iter()
            .filter(|u| {
                u.first_name.to_lowercase().contains(&query)
                    || u.last_name.to_lowercase().contains(&query)
                    || u.email.to_lowercase().contains(&query)
                    || format!("{} {}", u.first_name, u.last_name)
                        .to_lowercase()
                        .contains(&query)
            })
            .cloned()
            .collect()
    }

    pub fn find_by_id(&self, user_id: &str) -> Option<User> {
        self.state
            .lock()
            .users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
    }

    pub fn total(&self) -> usize {
        self.state.lock().users.len()
    }

    pub fn clear_error(&self) {
        self.state.lock().error = None;
    }

    pub fn clear(&self) {
        {
            let mut state = self.state.lock();
            state.users.clear();
            state.query.clear();
        }
        self.events.emit(SyncEvent::UsersChanged);
    }
}
