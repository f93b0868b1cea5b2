use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::{
    ColumnInfo, CoreError, CoreErrorKind, QueryExecutionId, QueryExecutionRecord, QueryOperation,
    QueryRequest, QueryState, QueryStatusRecord, ResultPage, ResultRow,
};
use crate::service::{QueryService, ServiceResult};

/// One scripted answer to `get_execution`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StatusLookup {
    State(QueryState),
    /// A state spelling the client does not know.
    RawState(String),
    /// Record returned without a status block.
    MissingStatus,
    /// The service answered without a record.
    NoRecord,
    Error(CoreError),
}

/// Scriptable service for tests and local runs. Clones share the same state.
#[derive(Clone, Default)]
pub struct InMemoryQueryService {
    inner: Arc<Mutex<ServiceState>>,
}

#[derive(Default)]
struct ServiceState {
    next_execution: u64,
    executions: HashMap<QueryExecutionId, ScriptedExecution>,
    idempotency_tokens: HashMap<String, QueryExecutionId>,
    submissions: Vec<QueryRequest>,
    submit_error: Option<CoreError>,
}

#[derive(Default)]
struct ScriptedExecution {
    record: QueryExecutionRecord,
    lookups: VecDeque<StatusLookup>,
    columns: Vec<ColumnInfo>,
    rows: Vec<ResultRow>,
    results_error: Option<CoreError>,
    status_lookups: usize,
    result_requests: Vec<(u32, Option<String>)>,
    cancel_requests: usize,
}

impl InMemoryQueryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an execution the service already knows about.
    pub fn insert_execution(&self, record: QueryExecutionRecord) {
        let mut state = self.state();
        state.executions.insert(
            record.execution_id.clone(),
            ScriptedExecution {
                record,
                ..ScriptedExecution::default()
            },
        );
    }

    /// Queues answers for successive `get_execution` calls. The last answer repeats.
    pub fn script_lookups(
        &self,
        execution_id: &QueryExecutionId,
        lookups: impl IntoIterator<Item = StatusLookup>,
    ) {
        let mut state = self.state();
        let execution = state
            .executions
            .entry(execution_id.clone())
            .or_insert_with(|| ScriptedExecution {
                record: QueryExecutionRecord::new(execution_id.clone()),
                ..ScriptedExecution::default()
            });
        execution.lookups = lookups.into_iter().collect();
    }

    pub fn script_states(
        &self,
        execution_id: &QueryExecutionId,
        states: impl IntoIterator<Item = QueryState>,
    ) {
        self.script_lookups(execution_id, states.into_iter().map(StatusLookup::State));
    }

    pub fn set_state_change_reason(&self, execution_id: &QueryExecutionId, reason: &str) {
        let mut state = self.state();
        if let Some(execution) = state.executions.get_mut(execution_id) {
            execution
                .record
                .status
                .get_or_insert_with(QueryStatusRecord::default)
                .state_change_reason = Some(reason.to_string());
        }
    }

    pub fn set_results(
        &self,
        execution_id: &QueryExecutionId,
        columns: Vec<ColumnInfo>,
        rows: Vec<ResultRow>,
    ) {
        let mut state = self.state();
        if let Some(execution) = state.executions.get_mut(execution_id) {
            execution.columns = columns;
            execution.rows = rows;
        }
    }

    pub fn fail_results(&self, execution_id: &QueryExecutionId, error: CoreError) {
        let mut state = self.state();
        if let Some(execution) = state.executions.get_mut(execution_id) {
            execution.results_error = Some(error);
        }
    }

    pub fn fail_submissions(&self, error: CoreError) {
        self.state().submit_error = Some(error);
    }

    pub fn submissions(&self) -> Vec<QueryRequest> {
        self.state().submissions.clone()
    }

    pub fn status_lookups(&self, execution_id: &QueryExecutionId) -> usize {
        self.with_execution(execution_id, |execution| execution.status_lookups)
    }

    pub fn result_fetches(&self, execution_id: &QueryExecutionId) -> usize {
        self.with_execution(execution_id, |execution| execution.result_requests.len())
    }

    pub fn result_requests(&self, execution_id: &QueryExecutionId) -> Vec<(u32, Option<String>)> {
        self.with_execution(execution_id, |execution| execution.result_requests.clone())
    }

    pub fn cancel_requests(&self, execution_id: &QueryExecutionId) -> usize {
        self.with_execution(execution_id, |execution| execution.cancel_requests)
    }

    fn with_execution<T: Default>(
        &self,
        execution_id: &QueryExecutionId,
        read: impl FnOnce(&ScriptedExecution) -> T,
    ) -> T {
        self.state()
            .executions
            .get(execution_id)
            .map(read)
            .unwrap_or_default()
    }

    // Inspection helpers tolerate poisoning; the trait methods report it.
    fn state(&self) -> MutexGuard<'_, ServiceState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_state(&self, operation: QueryOperation) -> ServiceResult<MutexGuard<'_, ServiceState>> {
        self.inner.lock().map_err(|_| {
            CoreError::new(CoreErrorKind::Internal, "in-memory query service mutex poisoned")
                .operation(operation)
        })
    }
}

impl QueryService for InMemoryQueryService {
    fn submit(&self, request: &QueryRequest) -> ServiceResult<QueryExecutionId> {
        let mut state = self.lock_state(QueryOperation::Submit)?;
        if let Some(error) = state.submit_error.clone() {
            return Err(error);
        }
        state.submissions.push(request.clone());

        if let Some(token) = &request.client_request_token
            && let Some(existing) = state.idempotency_tokens.get(token)
        {
            return Ok(existing.clone());
        }

        state.next_execution = state.next_execution.saturating_add(1);
        let execution_id = QueryExecutionId::new(format!("exec-{}", state.next_execution));
        if let Some(token) = &request.client_request_token {
            state
                .idempotency_tokens
                .insert(token.clone(), execution_id.clone());
        }

        let record = QueryExecutionRecord {
            execution_id: execution_id.clone(),
            query: Some(request.query.clone()),
            workgroup: Some(request.workgroup.clone()),
            status: Some(QueryStatusRecord {
                state: Some(QueryState::Queued.as_str().to_string()),
                ..QueryStatusRecord::default()
            }),
            result_configuration: Some(request.result_configuration.clone()),
        };
        state.executions.insert(
            execution_id.clone(),
            ScriptedExecution {
                record,
                ..ScriptedExecution::default()
            },
        );

        Ok(execution_id)
    }

    fn get_execution(
        &self,
        execution_id: &QueryExecutionId,
    ) -> ServiceResult<Option<QueryExecutionRecord>> {
        let mut state = self.lock_state(QueryOperation::CheckStatus)?;
        let execution = state
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| unknown_execution(QueryOperation::CheckStatus, execution_id))?;
        execution.status_lookups += 1;

        let lookup = if execution.lookups.len() > 1 {
            execution.lookups.pop_front()
        } else {
            execution.lookups.front().cloned()
        };

        let mut record = execution.record.clone();
        match lookup {
            None => {}
            Some(StatusLookup::State(query_state)) => {
                record.status.get_or_insert_with(QueryStatusRecord::default).state =
                    Some(query_state.as_str().to_string());
            }
            Some(StatusLookup::RawState(raw)) => {
                record.status.get_or_insert_with(QueryStatusRecord::default).state = Some(raw);
            }
            Some(StatusLookup::MissingStatus) => record.status = None,
            Some(StatusLookup::NoRecord) => return Ok(None),
            Some(StatusLookup::Error(error)) => return Err(error),
        }

        Ok(Some(record))
    }

    fn get_results(
        &self,
        execution_id: &QueryExecutionId,
        max_results: u32,
        next_token: Option<&str>,
    ) -> ServiceResult<ResultPage> {
        let mut state = self.lock_state(QueryOperation::FetchResults)?;
        let execution = state
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| unknown_execution(QueryOperation::FetchResults, execution_id))?;
        execution
            .result_requests
            .push((max_results, next_token.map(str::to_string)));

        if let Some(error) = execution.results_error.clone() {
            return Err(error);
        }
        if max_results == 0 {
            return Err(CoreError::new(
                CoreErrorKind::InvalidArgument,
                "max results must be greater than zero",
            )
            .operation(QueryOperation::FetchResults)
            .execution_id(execution_id));
        }

        let offset = match next_token {
            Some(token) => token.parse::<usize>().map_err(|_| {
                CoreError::new(
                    CoreErrorKind::InvalidArgument,
                    format!("unrecognized continuation token '{token}'"),
                )
                .operation(QueryOperation::FetchResults)
                .execution_id(execution_id)
            })?,
            None => 0,
        };

        let start = offset.min(execution.rows.len());
        let end = start
            .saturating_add(max_results as usize)
            .min(execution.rows.len());
        let next_token = (end < execution.rows.len()).then(|| end.to_string());

        Ok(ResultPage {
            columns: execution.columns.clone(),
            rows: execution.rows[start..end].to_vec(),
            next_token,
        })
    }

    fn cancel(&self, execution_id: &QueryExecutionId) -> ServiceResult<serde_json::Value> {
        let mut state = self.lock_state(QueryOperation::Stop)?;
        let execution = state
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| unknown_execution(QueryOperation::Stop, execution_id))?;
        execution.cancel_requests += 1;

        let status = execution
            .record
            .status
            .get_or_insert_with(QueryStatusRecord::default);
        let already_terminal = status
            .state
            .as_deref()
            .and_then(QueryState::parse)
            .is_some_and(QueryState::is_terminal);
        if !already_terminal {
            status.state = Some(QueryState::Cancelled.as_str().to_string());
            execution.lookups.clear();
        }

        Ok(serde_json::json!({ "QueryExecutionId": execution_id.as_str() }))
    }
}

fn unknown_execution(operation: QueryOperation, execution_id: &QueryExecutionId) -> CoreError {
    CoreError::new(
        CoreErrorKind::NotFound,
        format!("unknown query execution id '{execution_id}'"),
    )
    .operation(operation)
    .execution_id(execution_id)
}
