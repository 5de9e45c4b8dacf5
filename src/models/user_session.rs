use crate::models::chat_message::ChatMessage;

/// Per-session state kept server side, keyed by the id stored in the session cookie.
#[derive(Debug, Clone, Default)]
pub struct UserSession {
    pub user_id: String,
    pub authenticated: bool,
    pub history: Vec<ChatMessage>,
    /// Conversation thread reused across queries when threads are kept per session.
    pub thread_id: Option<String>,
    /// Set while a chat request on this session is running.
    pub in_flight: bool,
    /// Bumped by every clear, so a reply started before it is not merged back.
    pub epoch: u64,
}

impl UserSession {
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        UserSession {
            user_id: user_id.into(),
            authenticated: true,
            ..Default::default()
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.history.push(message);
    }

    /// Empties the scrollback and forgets the reused thread.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.thread_id = None;
        self.epoch = self.epoch.wrapping_add(1);
    }
}
