pub mod chat_handler;
pub mod session_handler;
