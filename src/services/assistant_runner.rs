use log::{debug, info, warn};
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::PollPolicy;
use crate::services::openai_assistants::{AssistantBackend, AssistantError, Run, RunStatus};

/// Runs `assistant_id` against `thread_id` and returns the newest message text.
///
/// The run is polled under `policy`: the wait between polls grows by the backoff
/// factor up to the cap, and the whole wait is bounded by `policy.timeout`.
/// On timeout or cancellation the remote run is cancelled on a best-effort basis.
pub async fn run_assistant(
    backend: &dyn AssistantBackend,
    thread_id: &str,
    assistant_id: &str,
    instructions: Option<&str>,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<String, AssistantError> {
    let run = backend
        .create_run(thread_id, assistant_id, instructions.map(str::to_string))
        .await?;
    info!("Started run {} of assistant {} on thread {}", run.id, assistant_id, thread_id);

    let run_id = run.id.clone();
    match wait_for_run(backend, thread_id, run, policy, cancel).await {
        Ok(_) => {}
        Err(e @ (AssistantError::Timeout(_) | AssistantError::Cancelled)) => {
            warn!("Abandoning run {}: {}", run_id, e);
            if let Err(cancel_err) = backend.cancel_run(thread_id, &run_id).await {
                warn!("Failed to cancel run {}: {}", run_id, cancel_err);
            }
            return Err(e);
        }
        Err(e) => return Err(e),
    }

    backend
        .latest_message_text(thread_id)
        .await?
        .ok_or(AssistantError::EmptyReply)
}

async fn wait_for_run(
    backend: &dyn AssistantBackend,
    thread_id: &str,
    mut run: Run,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<Run, AssistantError> {
    let deadline = Instant::now() + policy.timeout;
    let mut interval = policy.initial_interval;

    loop {
        match run.status {
            RunStatus::Completed => return Ok(run),
            RunStatus::RequiresAction => {
                return Err(AssistantError::RunFailed {
                    status: run.status.as_str().to_string(),
                    message: "run requested tool outputs, which are not supported".to_string(),
                })
            }
            status if status.is_terminal() => {
                let message = run
                    .last_error
                    .map(|e| e.message)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "no details provided".to_string());
                return Err(AssistantError::RunFailed {
                    status: status.as_str().to_string(),
                    message,
                });
            }
            _ => {}
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(AssistantError::Timeout(policy.timeout));
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(AssistantError::Cancelled),
            _ = sleep(interval.min(deadline - now)) => {}
        }
        interval = policy.next_interval(interval);

        let remaining = deadline.saturating_duration_since(Instant::now());
        let polled = tokio::select! {
            _ = cancel.cancelled() => return Err(AssistantError::Cancelled),
            polled = timeout(remaining, backend.retrieve_run(thread_id, &run.id)) => polled,
        };

        match polled {
            Err(_) => return Err(AssistantError::Timeout(policy.timeout)),
            Ok(Ok(next)) => {
                debug!("Run {} status: {}", next.id, next.status.as_str());
                run = next;
            }
            Ok(Err(e)) if e.is_transient() => {
                warn!("Transient error polling run {}: {}", run.id, e);
            }
            Ok(Err(e)) => return Err(e),
        }
    }
}
