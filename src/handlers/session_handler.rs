use actix_session::Session;
use actix_web::{web, HttpResponse};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::models::user_session::UserSession;
use crate::routes::app_state::AppState;

pub const SESSION_ID_KEY: &str = "session_id";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
}

/// Any non-empty identifier is accepted; there is no directory to check it against.
pub fn validate_user_id(user_id: &str) -> bool {
    !user_id.is_empty()
}

/// The session id stored in the cookie, if any.
pub fn current_session_id(session: &Session) -> Option<String> {
    match session.get::<String>(SESSION_ID_KEY) {
        Ok(id) => id,
        Err(e) => {
            warn!("Unreadable session cookie: {:?}", e);
            None
        }
    }
}

pub async fn login(data: web::Data<AppState>, session: Session, req_body: web::Json<LoginRequest>) -> HttpResponse {
    let user_id = req_body.user_id.trim();
    if !validate_user_id(user_id) {
        return HttpResponse::BadRequest().json(json!({ "error": "Please enter your SUNet ID." }));
    }

    if let Some(previous) = current_session_id(&session) {
        data.session_manager.remove(&previous);
    }

    let session_id = Uuid::new_v4().to_string();
    session.renew();
    if let Err(e) = session.insert(SESSION_ID_KEY, &session_id) {
        error!("Failed to insert session_id into cookie: {:?}", e);
        return HttpResponse::InternalServerError().json(json!({ "error": "Could not start a session" }));
    }

    data.session_manager
        .insert(session_id.clone(), UserSession::authenticated(user_id));
    info!("User {} logged in (session {})", user_id, session_id);

    HttpResponse::Ok().json(json!({ "authenticated": true, "user_id": user_id }))
}

pub async fn logout(data: web::Data<AppState>, session: Session) -> HttpResponse {
    if let Some(session_id) = current_session_id(&session) {
        if let Some(user_session) = data.session_manager.remove(&session_id) {
            info!("User {} logged out", user_session.user_id);
        }
    }
    session.purge();
    HttpResponse::Ok().json(json!({ "authenticated": false }))
}

pub async fn session_status(data: web::Data<AppState>, session: Session) -> HttpResponse {
    let user_session = current_session_id(&session)
        .and_then(|id| data.session_manager.get(&id))
        .filter(|s| s.authenticated);

    match user_session {
        Some(s) => HttpResponse::Ok().json(json!({
            "authenticated": true,
            "user_id": s.user_id,
            "messages": s.history,
        })),
        None => HttpResponse::Ok().json(json!({
            "authenticated": false,
            "user_id": null,
            "messages": [],
        })),
    }
}
