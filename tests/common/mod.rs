#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use athena_chat::config::{AssistantSet, PollPolicy, ThreadPolicy};
use athena_chat::routes::app_state::AppState;
use athena_chat::services::chat_service::ChatService;
use athena_chat::services::interaction_logger::InteractionLogger;
use athena_chat::services::openai_assistants::{
    AssistantBackend, AssistantError, AssistantInfo, Run, RunStatus,
};
use athena_chat::services::sheets_service::{SheetsBackend, SheetsError};

pub const LABELER: &str = "asst_label";
pub const SCHEDULER: &str = "asst_sched";
pub const ADMIN_INFO: &str = "asst_admin";

#[derive(Default)]
pub struct AssistantCalls {
    pub threads_created: usize,
    pub user_messages: Vec<String>,
    pub runs: Vec<String>,
    pub cancelled: Vec<String>,
    last_reply: HashMap<String, String>,
}

/// Assistant service fake: each assistant id answers with a fixed reply.
pub struct ScriptedAssistants {
    replies: HashMap<String, String>,
    never_complete: bool,
    pub calls: Mutex<AssistantCalls>,
}

impl ScriptedAssistants {
    pub fn routed(label: &str, scheduler_reply: &str, admin_reply: &str) -> Self {
        let replies = HashMap::from([
            (LABELER.to_string(), label.to_string()),
            (SCHEDULER.to_string(), scheduler_reply.to_string()),
            (ADMIN_INFO.to_string(), admin_reply.to_string()),
        ]);
        ScriptedAssistants { replies, never_complete: false, calls: Mutex::new(AssistantCalls::default()) }
    }

    /// Runs start but stay `in_progress` forever.
    pub fn stalled() -> Self {
        ScriptedAssistants { replies: HashMap::new(), never_complete: true, calls: Mutex::new(AssistantCalls::default()) }
    }

    fn status(&self) -> RunStatus {
        if self.never_complete {
            RunStatus::InProgress
        } else {
            RunStatus::Completed
        }
    }
}

#[async_trait]
impl AssistantBackend for ScriptedAssistants {
    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<AssistantInfo, AssistantError> {
        Ok(AssistantInfo { id: assistant_id.to_string(), name: None, model: None })
    }

    async fn create_thread(&self) -> Result<String, AssistantError> {
        let mut calls = self.calls.lock().unwrap();
        calls.threads_created += 1;
        Ok(format!("thread_{}", calls.threads_created))
    }

    async fn add_user_message(&self, _thread_id: &str, content: &str) -> Result<(), AssistantError> {
        self.calls.lock().unwrap().user_messages.push(content.to_string());
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        _instructions: Option<String>,
    ) -> Result<Run, AssistantError> {
        let mut calls = self.calls.lock().unwrap();
        calls.runs.push(assistant_id.to_string());
        if let Some(reply) = self.replies.get(assistant_id) {
            calls.last_reply.insert(thread_id.to_string(), reply.clone());
        }
        Ok(Run { id: format!("run_{}", calls.runs.len()), status: self.status(), last_error: None })
    }

    async fn retrieve_run(&self, _thread_id: &str, run_id: &str) -> Result<Run, AssistantError> {
        Ok(Run { id: run_id.to_string(), status: self.status(), last_error: None })
    }

    async fn cancel_run(&self, _thread_id: &str, run_id: &str) -> Result<(), AssistantError> {
        self.calls.lock().unwrap().cancelled.push(run_id.to_string());
        Ok(())
    }

    async fn latest_message_text(&self, thread_id: &str) -> Result<Option<String>, AssistantError> {
        Ok(self.calls.lock().unwrap().last_reply.get(thread_id).cloned())
    }
}

/// Spreadsheet fake holding one sheet's rows in memory.
#[derive(Default)]
pub struct InMemorySheet {
    pub rows: Mutex<Vec<Vec<Value>>>,
    pub offline: AtomicBool,
}

impl InMemorySheet {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Vec<Vec<Value>> {
        self.rows.lock().unwrap().clone()
    }

    fn check_online(&self) -> Result<(), SheetsError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(SheetsError::Http("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SheetsBackend for InMemorySheet {
    async fn check_spreadsheet(&self) -> Result<String, SheetsError> {
        self.check_online()?;
        Ok("Athena Logs".to_string())
    }

    async fn read_range(&self, _range: &str) -> Result<Vec<Vec<Value>>, SheetsError> {
        self.check_online()?;
        Ok(self.rows.lock().unwrap().iter().take(1).cloned().collect())
    }

    async fn update_range(&self, _range: &str, rows: Vec<Vec<Value>>) -> Result<(), SheetsError> {
        self.check_online()?;
        let mut stored = self.rows.lock().unwrap();
        for (i, row) in rows.into_iter().enumerate() {
            if i < stored.len() {
                stored[i] = row;
            } else {
                stored.push(row);
            }
        }
        Ok(())
    }

    async fn append_rows(&self, _range: &str, rows: Vec<Vec<Value>>) -> Result<(), SheetsError> {
        self.check_online()?;
        self.rows.lock().unwrap().extend(rows);
        Ok(())
    }
}

pub fn routed_assistants() -> AssistantSet {
    AssistantSet::Routed {
        labeler: LABELER.to_string(),
        scheduler: SCHEDULER.to_string(),
        informational: ADMIN_INFO.to_string(),
    }
}

pub fn quick_poll(timeout: Duration) -> PollPolicy {
    PollPolicy {
        initial_interval: Duration::from_millis(5),
        max_interval: Duration::from_millis(20),
        backoff: 2.0,
        timeout,
    }
}

pub fn app_state(assistants: Arc<ScriptedAssistants>, sheet: Option<Arc<InMemorySheet>>) -> AppState {
    app_state_with(assistants, sheet, ThreadPolicy::PerQuery, quick_poll(Duration::from_secs(5)))
}

pub fn app_state_with(
    assistants: Arc<ScriptedAssistants>,
    sheet: Option<Arc<InMemorySheet>>,
    thread_policy: ThreadPolicy,
    poll: PollPolicy,
) -> AppState {
    let _ = env_logger::builder().is_test(true).try_init();
    let chat = ChatService::new(assistants, routed_assistants(), None, thread_policy, poll);
    let sheet: Option<Arc<dyn SheetsBackend>> = sheet.map(|s| s as Arc<dyn SheetsBackend>);
    let logger = InteractionLogger::new(sheet, "Logs", chrono_tz::America::Los_Angeles);
    AppState::new(Arc::new(chat), Arc::new(logger))
}
