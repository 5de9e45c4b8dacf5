pub mod assistant_runner;
pub mod chat_service;
pub mod google_auth;
pub mod interaction_logger;
pub mod openai_assistants;
pub mod sheets_service;
