use std::sync::Arc;

use lazy_static::lazy_static;
use log::{error, info, warn};
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, AssistantSet, PollPolicy, ThreadPolicy};
use crate::models::interaction::Category;
use crate::models::user_session::UserSession;
use crate::services::assistant_runner::run_assistant;
use crate::services::openai_assistants::{AssistantBackend, AssistantError};

lazy_static! {
    // File-search citations such as 【4:0†source】
    static ref SOURCE_MARKER: Regex = Regex::new(r"【\d+:\d+†[^】]*】").unwrap();
}

const STYLE_TAG: &str = "<userStyle>Normal</userStyle>";

/// Removes citation markers and the echoed style tag, then trims.
pub fn clean_reply(text: &str) -> String {
    SOURCE_MARKER
        .replace_all(text, "")
        .replace(STYLE_TAG, "")
        .trim()
        .to_string()
}

/// Downstream assistant picked by the labeler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Scheduler,
    Informational,
}

impl Route {
    /// `1` selects the scheduler, any other integer the informational assistant.
    pub fn from_label(reply: &str) -> Result<Route, AssistantError> {
        let trimmed = reply.trim();
        let label: i64 = trimmed
            .parse()
            .map_err(|_| AssistantError::MalformedLabel(trimmed.to_string()))?;
        Ok(if label == 1 { Route::Scheduler } else { Route::Informational })
    }

    pub fn category(&self) -> Category {
        match self {
            Route::Scheduler => Category::CourseScheduler,
            Route::Informational => Category::AdminInfo,
        }
    }
}

/// What the chat surface shows for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutcome {
    pub reply: String,
    pub category: Category,
    pub is_error: bool,
}

pub struct ChatService {
    backend: Arc<dyn AssistantBackend>,
    assistants: AssistantSet,
    instructions: Option<String>,
    thread_policy: ThreadPolicy,
    poll: PollPolicy,
}

impl ChatService {
    pub fn new(
        backend: Arc<dyn AssistantBackend>,
        assistants: AssistantSet,
        instructions: Option<String>,
        thread_policy: ThreadPolicy,
        poll: PollPolicy,
    ) -> Self {
        ChatService {
            backend,
            assistants,
            instructions,
            thread_policy,
            poll,
        }
    }

    pub fn from_config(backend: Arc<dyn AssistantBackend>, config: &AppConfig) -> Self {
        Self::new(
            backend,
            config.assistants.clone(),
            config.run_instructions.clone(),
            config.thread_policy,
            config.poll.clone(),
        )
    }

    /// Looks up every configured assistant once so a bad id shows up in the startup log.
    pub async fn verify_assistants(&self) {
        for (role, id) in self.assistants.roles() {
            match self.backend.retrieve_assistant(id).await {
                Ok(info) => info!(
                    "Using {} assistant {} ({})",
                    role,
                    info.id,
                    info.name.as_deref().unwrap_or("unnamed")
                ),
                Err(e) => warn!("Could not retrieve {} assistant {}: {}", role, id, e),
            }
        }
    }

    /// Answers one query. Failures come back as an error-labelled outcome, never as `Err`.
    pub async fn process_chat(
        &self,
        user_input: &str,
        session: &mut UserSession,
        cancel: &CancellationToken,
    ) -> ChatOutcome {
        match self.answer(user_input, session, cancel).await {
            Ok((reply, category)) => ChatOutcome {
                reply: clean_reply(&reply),
                category,
                is_error: false,
            },
            Err(e) => {
                if matches!(e, AssistantError::Timeout(_) | AssistantError::Cancelled) {
                    // The abandoned run may still be cancelling on that thread.
                    session.thread_id = None;
                }
                let reply = format!("Error processing query: {}", e);
                error!("{} (user {})", reply, session.user_id);
                ChatOutcome {
                    reply,
                    category: Category::Error,
                    is_error: true,
                }
            }
        }
    }

    async fn answer(
        &self,
        user_input: &str,
        session: &mut UserSession,
        cancel: &CancellationToken,
    ) -> Result<(String, Category), AssistantError> {
        let thread_id = self.thread_for(session).await?;
        self.backend.add_user_message(&thread_id, user_input).await?;

        match &self.assistants {
            AssistantSet::Single { assistant } => {
                let reply = self.run(&thread_id, assistant, self.instructions.as_deref(), cancel).await?;
                Ok((reply, Category::Assistant))
            }
            AssistantSet::Routed {
                labeler,
                scheduler,
                informational,
            } => {
                let label = self.run(&thread_id, labeler, None, cancel).await?;
                let route = Route::from_label(&label).unwrap_or_else(|e| {
                    warn!("{}; defaulting to the admin info assistant", e);
                    Route::Informational
                });
                info!("Labeler chose {:?} for thread {}", route, thread_id);

                let target = match route {
                    Route::Scheduler => scheduler,
                    Route::Informational => informational,
                };
                let reply = self.run(&thread_id, target, self.instructions.as_deref(), cancel).await?;
                Ok((reply, route.category()))
            }
        }
    }

    async fn run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        instructions: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<String, AssistantError> {
        run_assistant(
            self.backend.as_ref(),
            thread_id,
            assistant_id,
            instructions,
            &self.poll,
            cancel,
        )
        .await
    }

    async fn thread_for(&self, session: &mut UserSession) -> Result<String, AssistantError> {
        match self.thread_policy {
            ThreadPolicy::PerQuery => self.backend.create_thread().await,
            ThreadPolicy::PerSession => {
                if let Some(thread_id) = &session.thread_id {
                    return Ok(thread_id.clone());
                }
                let thread_id = self.backend.create_thread().await?;
                session.thread_id = Some(thread_id.clone());
                Ok(thread_id)
            }
        }
    }
}
