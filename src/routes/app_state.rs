use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::global_session_manager::GlobalSessionManager;
use crate::services::chat_service::ChatService;
use crate::services::interaction_logger::InteractionLogger;

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub logger: Arc<InteractionLogger>,
    pub session_manager: GlobalSessionManager,
    /// Cancelled on shutdown so in-flight runs stop polling.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(chat: Arc<ChatService>, logger: Arc<InteractionLogger>) -> Self {
        AppState {
            chat,
            logger,
            session_manager: GlobalSessionManager::new(),
            shutdown: CancellationToken::new(),
        }
    }
}
