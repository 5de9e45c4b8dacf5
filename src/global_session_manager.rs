use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::user_session::UserSession;

/// Why a chat request could not start on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimError {
    NotFound,
    Busy,
}

/// Server-side session table shared by all workers.
#[derive(Clone, Default)]
pub struct GlobalSessionManager {
    sessions: Arc<Mutex<HashMap<String, UserSession>>>,
}

impl GlobalSessionManager {
    pub fn new() -> Self {
        GlobalSessionManager {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, UserSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or updates a session
    pub fn insert(&self, session_id: String, session: UserSession) {
        self.lock().insert(session_id, session);
    }

    /// Retrieves a session if it exists
    pub fn get(&self, session_id: &str) -> Option<UserSession> {
        self.lock().get(session_id).cloned()
    }

    /// Applies `f` to a stored session in place
    pub fn update<F>(&self, session_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut UserSession),
    {
        match self.lock().get_mut(session_id) {
            Some(session) => {
                f(session);
                true
            }
            None => false,
        }
    }

    /// Marks a logged-in session busy and returns a snapshot of it.
    /// The session stays busy until the returned guard is dropped.
    pub fn claim(&self, session_id: &str) -> Result<(UserSession, InFlightGuard), ClaimError> {
        let mut sessions = self.lock();
        match sessions.get_mut(session_id) {
            Some(session) if !session.authenticated => Err(ClaimError::NotFound),
            Some(session) if session.in_flight => Err(ClaimError::Busy),
            Some(session) => {
                session.in_flight = true;
                let guard = InFlightGuard {
                    manager: self.clone(),
                    session_id: session_id.to_string(),
                };
                Ok((session.clone(), guard))
            }
            None => Err(ClaimError::NotFound),
        }
    }

    pub fn remove(&self, session_id: &str) -> Option<UserSession> {
        self.lock().remove(session_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Clears the busy flag of a claimed session on drop.
pub struct InFlightGuard {
    manager: GlobalSessionManager,
    session_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.manager.update(&self.session_id, |s| s.in_flight = false);
    }
}
