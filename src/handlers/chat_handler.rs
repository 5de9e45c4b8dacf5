use actix_session::Session;
use actix_web::{web, HttpResponse};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::QUICK_PROMPTS;
use crate::global_session_manager::ClaimError;
use crate::handlers::session_handler::current_session_id;
use crate::models::chat_message::ChatMessage;
use crate::models::user_session::UserSession;
use crate::routes::app_state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub category: &'static str,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized().json(json!({ "error": "Please log in first" }))
}

/// The cookie's session id and its server-side state, if the user is logged in.
fn authenticated_session(data: &AppState, session: &Session) -> Option<(String, UserSession)> {
    let session_id = current_session_id(session)?;
    let user_session = data.session_manager.get(&session_id)?;
    if !user_session.authenticated {
        return None;
    }
    Some((session_id, user_session))
}

pub async fn handle_chat_request(
    data: web::Data<AppState>,
    session: Session,
    req_body: web::Json<ChatRequest>,
) -> HttpResponse {
    let Some(session_id) = current_session_id(&session) else {
        warn!("Chat request without a session cookie");
        return unauthorized();
    };
    // One request per session at a time; the guard frees the session on every return path.
    let (mut user_session, _in_flight) = match data.session_manager.claim(&session_id) {
        Ok(claimed) => claimed,
        Err(ClaimError::NotFound) => {
            warn!("Chat request without an authenticated session");
            return unauthorized();
        }
        Err(ClaimError::Busy) => {
            info!("Rejected overlapping chat request for session {}", session_id);
            return HttpResponse::Conflict()
                .json(json!({ "error": "Please wait for the current reply before sending another message" }));
        }
    };

    let user_input = req_body.message.trim();
    if user_input.is_empty() {
        return HttpResponse::BadRequest().json(json!({ "error": "Message is empty" }));
    }
    info!("Processing message for {} (session {})", user_session.user_id, session_id);

    let cancel = data.shutdown.child_token();
    let outcome = data.chat.process_chat(user_input, &mut user_session, &cancel).await;

    // Merge into the stored session rather than overwrite it: a logout or a
    // clear that happened while the run was in flight wins.
    let epoch = user_session.epoch;
    let thread_id = user_session.thread_id.clone();
    let still_logged_in = data.session_manager.update(&session_id, |stored| {
        if stored.epoch != epoch {
            info!("History of session {} was cleared mid-query; reply not kept", session_id);
            return;
        }
        stored.push(ChatMessage::user(user_input));
        stored.push(ChatMessage::assistant(outcome.reply.clone()));
        stored.thread_id = thread_id;
    });
    if !still_logged_in {
        info!("Session {} ended while its query was running", session_id);
    }

    let log_outcome = data
        .logger
        .log_interaction(&user_session.user_id, user_input, &outcome.reply, outcome.category)
        .await;

    HttpResponse::Ok().json(ChatResponse {
        response: outcome.reply,
        category: outcome.category.label(),
        is_error: outcome.is_error,
        notice: log_outcome.notice(),
    })
}

pub async fn clear_history(data: web::Data<AppState>, session: Session) -> HttpResponse {
    let Some((session_id, _)) = authenticated_session(&data, &session) else {
        return unauthorized();
    };
    data.session_manager.update(&session_id, |s| s.clear_history());
    info!("Cleared chat history for session {}", session_id);
    HttpResponse::Ok().json(json!({ "cleared": true }))
}

pub async fn quick_prompts() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "prompts": QUICK_PROMPTS }))
}
