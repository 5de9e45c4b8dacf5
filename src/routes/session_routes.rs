use actix_session::Session;
use actix_web::{get, post, web, Responder};

use crate::handlers::session_handler::{self, LoginRequest};
use crate::routes::app_state::AppState;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(login).service(logout).service(session_status);
}

#[post("/api/login")]
async fn login(data: web::Data<AppState>, session: Session, req_body: web::Json<LoginRequest>) -> impl Responder {
    session_handler::login(data, session, req_body).await
}

#[post("/api/logout")]
async fn logout(data: web::Data<AppState>, session: Session) -> impl Responder {
    session_handler::logout(data, session).await
}

#[get("/api/session")]
async fn session_status(data: web::Data<AppState>, session: Session) -> impl Responder {
    session_handler::session_status(data, session).await
}
