pub mod chat_message;
pub mod interaction;
pub mod user_session;
