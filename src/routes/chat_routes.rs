use actix_session::Session;
use actix_web::{get, post, web, Responder};

use crate::handlers::chat_handler::{self, ChatRequest};
use crate::routes::app_state::AppState;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(chat).service(clear_history).service(quick_prompts);
}

#[post("/api/chat")]
async fn chat(data: web::Data<AppState>, session: Session, req_body: web::Json<ChatRequest>) -> impl Responder {
    chat_handler::handle_chat_request(data, session, req_body).await
}

#[post("/api/clear")]
async fn clear_history(data: web::Data<AppState>, session: Session) -> impl Responder {
    chat_handler::clear_history(data, session).await
}

#[get("/api/prompts")]
async fn quick_prompts() -> impl Responder {
    chat_handler::quick_prompts().await
}
