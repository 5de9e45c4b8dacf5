use std::sync::Arc;

use actix_files::Files;
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::Key;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use log::{error, info, warn};

use athena_chat::config::{self, AppConfig, SheetsConfig};
use athena_chat::routes::app_state::AppState;
use athena_chat::routes::{chat_routes, session_routes};
use athena_chat::services::chat_service::ChatService;
use athena_chat::services::interaction_logger::InteractionLogger;
use athena_chat::services::openai_assistants::OpenAiAssistantsClient;
use athena_chat::services::sheets_service::{GoogleSheetsClient, SheetsBackend};

/// Connects to the audit spreadsheet; `None` disables logging without stopping the server.
async fn connect_sheets(config: Option<&SheetsConfig>) -> Option<Arc<dyn SheetsBackend>> {
    let sheets = config?;
    info!("Attempting to connect to Google Sheets...");
    match GoogleSheetsClient::connect(sheets).await {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            error!("Failed to connect to Google Sheets: {}", e);
            None
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    config::init_logging();

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    let backend = OpenAiAssistantsClient::new(&config.openai_api_key, &config.openai_base_url)
        .context("Failed to build the assistants client")?;
    let chat = Arc::new(ChatService::from_config(Arc::new(backend), &config));
    chat.verify_assistants().await;

    let sheets = connect_sheets(config.sheets.as_ref()).await;
    let sheet_name = config
        .sheets
        .as_ref()
        .map(|s| s.sheet_name.as_str())
        .unwrap_or(config::DEFAULT_LOG_SHEET);
    let logger = Arc::new(InteractionLogger::new(sheets, sheet_name, config.log_timezone));
    if logger.is_available() {
        if let Err(e) = logger.ensure_header().await {
            error!("Error checking/initializing sheet: {}", e);
        }
    }

    let state = AppState::new(chat, logger);
    let shutdown = state.shutdown.clone();

    let session_key = match &config.session_key {
        Some(bytes) => Key::from(bytes.as_slice()),
        None => {
            warn!("SESSION_KEY not set; sessions will not survive a restart");
            Key::generate()
        }
    };

    let static_dir = config.static_dir.clone();
    info!("Starting server on http://{}", config.bind_addr);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
                    .cookie_secure(false)
                    .build(),
            )
            .wrap(Logger::default())
            .configure(session_routes::init_routes)
            .configure(chat_routes::init_routes)
            .service(Files::new("/", &static_dir).index_file("index.html"))
    })
    .disable_signals()
    .bind(&config.bind_addr)
    .with_context(|| format!("Failed to bind {}", config.bind_addr))?
    .run();

    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down; cancelling in-flight assistant runs");
            shutdown.cancel();
            handle.stop(true).await;
        }
    });

    server.await?;
    Ok(())
}
