use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use log::{error, info, warn};
use tokio::sync::Mutex;

use crate::models::interaction::{header_row, Category, InteractionRecord};
use crate::services::sheets_service::{SheetsBackend, SheetsError};

/// Result of a best-effort log write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutcome {
    Logged,
    Unavailable,
    Failed(String),
}

impl LogOutcome {
    /// Text for a non-fatal notice in the chat surface, when the row was not written.
    pub fn notice(&self) -> Option<String> {
        match self {
            LogOutcome::Logged => None,
            LogOutcome::Unavailable => Some("Conversation logging is currently unavailable.".to_string()),
            LogOutcome::Failed(_) => Some("This exchange could not be logged.".to_string()),
        }
    }
}

/// Appends one audit row per exchange; never fails the chat flow.
pub struct InteractionLogger {
    backend: Option<Arc<dyn SheetsBackend>>,
    sheet_name: String,
    timezone: Tz,
    header_ready: Mutex<bool>,
}

impl InteractionLogger {
    pub fn new(backend: Option<Arc<dyn SheetsBackend>>, sheet_name: &str, timezone: Tz) -> Self {
        if backend.is_none() {
            warn!("Sheets backend not initialized; interactions will not be logged");
        }
        InteractionLogger {
            backend,
            sheet_name: sheet_name.to_string(),
            timezone,
            header_ready: Mutex::new(false),
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    fn header_range(&self) -> String {
        format!("{}!A1:G1", self.sheet_name)
    }

    fn rows_range(&self) -> String {
        format!("{}!A:G", self.sheet_name)
    }

    /// Writes the header row unless the sheet already has one.
    pub async fn ensure_header(&self) -> Result<(), SheetsError> {
        let backend = self.backend.as_ref().ok_or(SheetsError::Unavailable)?;
        let mut ready = self.header_ready.lock().await;
        if *ready {
            return Ok(());
        }

        let range = self.header_range();
        let existing = backend.read_range(&range).await?;
        if existing.iter().all(|row| row.is_empty()) {
            backend.update_range(&range, vec![header_row()]).await?;
            info!("Wrote header row to {}", range);
        }
        *ready = true;
        Ok(())
    }

    pub async fn log_interaction(
        &self,
        user_id: &str,
        input: &str,
        output: &str,
        category: Category,
    ) -> LogOutcome {
        let Some(backend) = self.backend.as_ref() else {
            error!("Sheets backend not initialized; skipping log row");
            return LogOutcome::Unavailable;
        };

        if let Err(e) = self.ensure_header().await {
            error!("Error checking/initializing sheet: {}", e);
            return LogOutcome::Failed(e.to_string());
        }

        let now = Utc::now().with_timezone(&self.timezone);
        let record = InteractionRecord::new(now, user_id, input, output, category);
        match backend.append_rows(&self.rows_range(), vec![record.to_row()]).await {
            Ok(()) => {
                info!("Logged {} interaction for {}", category, user_id);
                LogOutcome::Logged
            }
            Err(e) => {
                error!("Failed to log interaction: {}", e);
                LogOutcome::Failed(e.to_string())
            }
        }
    }
}
