use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{Mutex, Notify};
use tokio::time::{Instant, timeout_at};

use crate::lifecycle::{PollOutcome, QueryLifecycleManager};
use crate::models::{CoreError, CoreErrorKind, QueryExecutionId, QueryOperation};
use crate::orchestration::{PollTaskId, PollTaskSnapshot, PollTaskStatus, PollingResult};
use crate::service::QueryService;

/// Runs `poll_query_status` calls on the blocking pool, one task per call.
///
/// Abandoning a wait never stops the underlying poll loop; it runs until its
/// own exit condition. Finished snapshots stay until `remove_finished` is called.
pub struct PollingRuntime<S: QueryService + 'static> {
    manager: Arc<QueryLifecycleManager<S>>,
    inner: Arc<Mutex<RuntimeState>>,
}

impl<S: QueryService + 'static> Clone for PollingRuntime<S> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            inner: self.inner.clone(),
        }
    }
}

#[derive(Default)]
struct RuntimeState {
    next_task_id: u64,
    tasks: HashMap<PollTaskId, PollTaskSnapshot>,
    completion_notifiers: HashMap<PollTaskId, Arc<Notify>>,
}

impl<S: QueryService + 'static> PollingRuntime<S> {
    pub fn new(manager: Arc<QueryLifecycleManager<S>>) -> Self {
        Self {
            manager,
            inner: Arc::new(Mutex::new(RuntimeState::default())),
        }
    }

    pub fn manager(&self) -> &Arc<QueryLifecycleManager<S>> {
        &self.manager
    }

    pub async fn spawn(
        &self,
        execution_id: QueryExecutionId,
        max_polling_attempts: Option<u32>,
    ) -> PollingResult<PollTaskId> {
        if execution_id.is_blank() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidArgument,
                "query execution id is required",
            )
            .operation(QueryOperation::Poll));
        }

        let task_id = {
            let mut state = self.inner.lock().await;
            let task_id = PollTaskId(state.next_task_id);
            state.next_task_id = state.next_task_id.saturating_add(1);

            state.tasks.insert(
                task_id,
                PollTaskSnapshot {
                    id: task_id,
                    execution_id: execution_id.clone(),
                    max_polling_attempts,
                    status: PollTaskStatus::Queued,
                    outcome: None,
                    created_at: SystemTime::now(),
                    started_at: None,
                    finished_at: None,
                    error_message: None,
                },
            );

            state
                .completion_notifiers
                .insert(task_id, Arc::new(Notify::new()));
            task_id
        };

        let inner = self.inner.clone();
        let manager = self.manager.clone();
        tokio::spawn(async move {
            set_running(&inner, task_id).await;

            let poll_id = execution_id.clone();
            let joined = tokio::task::spawn_blocking(move || {
                manager.poll_query_status(&poll_id, max_polling_attempts)
            })
            .await;

            match joined {
                Ok(outcome) => {
                    set_terminal(&inner, task_id, PollTaskStatus::Completed, Some(outcome), None)
                        .await;
                }
                Err(join_error) => {
                    tracing::error!(
                        task_id = task_id.0,
                        execution_id = %execution_id,
                        message = %join_error,
                        "poll task join failure"
                    );
                    set_terminal(
                        &inner,
                        task_id,
                        PollTaskStatus::Failed,
                        None,
                        Some(format!("poll task join failure: {join_error}")),
                    )
                    .await;
                }
            }
        });

        Ok(task_id)
    }

    pub async fn snapshot(&self, task_id: PollTaskId) -> PollingResult<PollTaskSnapshot> {
        let state = self.inner.lock().await;
        state
            .tasks
            .get(&task_id)
            .cloned()
            .ok_or_else(|| task_lookup_error(task_id))
    }

    pub async fn status(&self, task_id: PollTaskId) -> PollingResult<PollTaskStatus> {
        Ok(self.snapshot(task_id).await?.status)
    }

    /// Forgets a finished task and returns its final snapshot.
    pub async fn remove_finished(&self, task_id: PollTaskId) -> PollingResult<PollTaskSnapshot> {
        let mut state = self.inner.lock().await;
        let status = state
            .tasks
            .get(&task_id)
            .map(|task| task.status)
            .ok_or_else(|| task_lookup_error(task_id))?;
        if !status.is_terminal() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidArgument,
                format!("poll task '{}' has not finished", task_id.0),
            )
            .operation(QueryOperation::Poll));
        }

        state
            .tasks
            .remove(&task_id)
            .ok_or_else(|| task_lookup_error(task_id))
    }

    pub async fn wait_for_terminal(
        &self,
        task_id: PollTaskId,
        timeout_duration: Option<Duration>,
    ) -> PollingResult<PollTaskSnapshot> {
        let deadline = timeout_duration.map(|duration| Instant::now() + duration);

        loop {
            let state = self.inner.lock().await;
            let snapshot = state
                .tasks
                .get(&task_id)
                .cloned()
                .ok_or_else(|| task_lookup_error(task_id))?;
            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
            let notify = state
                .completion_notifiers
                .get(&task_id)
                .cloned()
                .ok_or_else(|| task_lookup_error(task_id))?;
            // Registered before the lock is released so a completion in between is not lost.
            let notified = notify.notified();
            drop(state);

            match deadline {
                Some(deadline) => {
                    timeout_at(deadline, notified).await.map_err(|_| {
                        CoreError::new(
                            CoreErrorKind::Timeout,
                            format!("timed out waiting for poll task '{}' to finish", task_id.0),
                        )
                        .operation(QueryOperation::Poll)
                        .execution_id(&snapshot.execution_id)
                    })?;
                }
                None => notified.await,
            }
        }
    }
}

async fn set_running(inner: &Arc<Mutex<RuntimeState>>, task_id: PollTaskId) {
    let mut state = inner.lock().await;
    if let Some(task) = state.tasks.get_mut(&task_id) {
        task.status = PollTaskStatus::Running;
        task.started_at = Some(SystemTime::now());
    }
}

async fn set_terminal(
    inner: &Arc<Mutex<RuntimeState>>,
    task_id: PollTaskId,
    status: PollTaskStatus,
    outcome: Option<PollOutcome>,
    error_message: Option<String>,
) {
    let notify = {
        let mut state = inner.lock().await;
        if let Some(task) = state.tasks.get_mut(&task_id) {
            task.status = status;
            task.outcome = outcome;
            task.finished_at = Some(SystemTime::now());
            task.error_message = error_message;
        }
        state.completion_notifiers.remove(&task_id)
    };

    // Waiters registered while the task was running still hold the notifier.
    if let Some(notify) = notify {
        notify.notify_waiters();
    }
}

fn task_lookup_error(task_id: PollTaskId) -> CoreError {
    CoreError::new(
        CoreErrorKind::NotFound,
        format!("unknown poll task id '{}'", task_id.0),
    )
    .operation(QueryOperation::Poll)
}
