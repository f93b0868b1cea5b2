pub mod config;
pub mod polling;

use std::sync::Arc;

pub use config::{DEFAULT_SLEEP_TIME, ManagerConfig};
pub use polling::{PollOutcome, PollPhase, Sleeper, ThreadSleeper};

use crate::models::{
    CoreError, CoreErrorKind, QueryExecutionId, QueryExecutionRecord, QueryOperation,
    QueryRequest, QueryState, ResultPage,
};
use crate::service::{PaginationConfig, QueryService, ResultPages};

pub type LifecycleResult<T> = Result<T, CoreError>;

pub const DEFAULT_MAX_RESULTS: u32 = 1000;

/// Drives one query execution from submission to results on top of a `QueryService`.
///
/// Status inspection absorbs failures into `None`; every other operation propagates
/// them. All calls block the caller, polling included.
pub struct QueryLifecycleManager<S: QueryService> {
    service: S,
    config: ManagerConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl<S: QueryService> QueryLifecycleManager<S> {
    pub fn new(service: S) -> Self {
        Self::with_config(service, ManagerConfig::default())
    }

    pub fn with_config(service: S, config: ManagerConfig) -> Self {
        Self {
            service,
            config,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn run_query(&self, request: QueryRequest) -> LifecycleResult<QueryExecutionId> {
        request.validate()?;

        if self.config.log_query {
            tracing::info!(
                query = %request.query,
                workgroup = %request.workgroup,
                context = ?request.context.entries(),
                result_configuration = ?request.result_configuration.entries(),
                client_request_token = ?request.client_request_token,
                "submitting query"
            );
        }

        let execution_id = self
            .service
            .submit(&request)
            .map_err(|error| error.attribute(QueryOperation::Submit, None))?;

        tracing::info!(execution_id = %execution_id, "query submitted");
        Ok(execution_id)
    }

    /// Current state of the execution, or `None` when it cannot be determined.
    pub fn check_query_status(&self, execution_id: &QueryExecutionId) -> Option<QueryState> {
        let record = self.lookup_record(QueryOperation::CheckStatus, execution_id)?;

        let Some(raw_state) = record.raw_state() else {
            tracing::error!(
                execution_id = %execution_id,
                "query execution record has no state"
            );
            return None;
        };

        let state = QueryState::parse(raw_state);
        if state.is_none() {
            tracing::error!(
                execution_id = %execution_id,
                raw_state,
                "unrecognized query execution state"
            );
        }
        state
    }

    pub fn get_state_change_reason(&self, execution_id: &QueryExecutionId) -> Option<String> {
        let record = self.lookup_record(QueryOperation::StateChangeReason, execution_id)?;

        let reason = record.state_change_reason().map(str::to_string);
        if reason.is_none() {
            tracing::error!(
                execution_id = %execution_id,
                "query execution record has no state change reason"
            );
        }
        reason
    }

    /// Checks status until a terminal state, or until `max_polling_attempts`
    /// checks have been made. A budget of zero means no budget.
    pub fn poll_query_status(
        &self,
        execution_id: &QueryExecutionId,
        max_polling_attempts: Option<u32>,
    ) -> PollOutcome {
        let budget = max_polling_attempts.filter(|budget| *budget > 0);
        let mut attempt: u32 = 1;

        loop {
            let phase = PollPhase::observe(self.check_query_status(execution_id));
            match phase {
                PollPhase::Unknown => {
                    tracing::info!(
                        execution_id = %execution_id,
                        attempt,
                        "query execution state is invalid, retrying"
                    );
                }
                PollPhase::Intermediate(state) => {
                    tracing::info!(
                        execution_id = %execution_id,
                        attempt,
                        state = ?state,
                        "query execution is still in a non-terminal state"
                    );
                }
                PollPhase::Terminal(state) => {
                    tracing::info!(
                        execution_id = %execution_id,
                        attempt,
                        state = ?state,
                        "query execution completed"
                    );
                    return PollOutcome {
                        phase,
                        attempts: attempt,
                    };
                }
            }

            if budget.is_some_and(|budget| attempt >= budget) {
                tracing::info!(
                    execution_id = %execution_id,
                    attempts = attempt,
                    state = ?phase.state(),
                    "polling attempt budget exhausted"
                );
                return PollOutcome {
                    phase,
                    attempts: attempt,
                };
            }

            self.sleeper.sleep(self.config.sleep_time);
            attempt = attempt.saturating_add(1);
        }
    }

    /// One page of results. `Ok(None)` unless the execution has succeeded.
    pub fn get_query_results(
        &self,
        execution_id: &QueryExecutionId,
        next_token: Option<&str>,
        max_results: u32,
    ) -> LifecycleResult<Option<ResultPage>> {
        if !self.results_available(execution_id) {
            return Ok(None);
        }

        let next_token = next_token.filter(|token| !token.is_empty());
        self.service
            .get_results(execution_id, max_results, next_token)
            .map(Some)
            .map_err(|error| error.attribute(QueryOperation::FetchResults, Some(execution_id)))
    }

    /// Lazy page sequence over the results. `None` unless the execution has succeeded.
    pub fn get_query_results_paginator(
        &self,
        execution_id: &QueryExecutionId,
        config: PaginationConfig,
    ) -> Option<ResultPages<'_>> {
        if !self.results_available(execution_id) {
            return None;
        }
        Some(self.service.paginate_results(execution_id, config))
    }

    pub fn get_output_location(&self, execution_id: &QueryExecutionId) -> LifecycleResult<String> {
        if execution_id.is_blank() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidArgument,
                "query execution id is required",
            )
            .operation(QueryOperation::OutputLocation));
        }

        let record = self
            .service
            .get_execution(execution_id)
            .map_err(|error| error.attribute(QueryOperation::OutputLocation, Some(execution_id)))?
            .ok_or_else(|| {
                CoreError::new(
                    CoreErrorKind::MissingField,
                    "service returned no query execution record",
                )
                .operation(QueryOperation::OutputLocation)
                .execution_id(execution_id)
            })?;

        match record.output_location() {
            Some(location) => Ok(location.to_string()),
            None => {
                tracing::error!(
                    execution_id = %execution_id,
                    "query execution record has no output location"
                );
                Err(CoreError::new(
                    CoreErrorKind::MissingField,
                    "result configuration has no output location",
                )
                .operation(QueryOperation::OutputLocation)
                .execution_id(execution_id))
            }
        }
    }

    /// Requests cancellation and returns the raw service answer.
    pub fn stop_query(&self, execution_id: &QueryExecutionId) -> LifecycleResult<serde_json::Value> {
        tracing::info!(execution_id = %execution_id, "stopping query execution");
        self.service
            .cancel(execution_id)
            .map_err(|error| error.attribute(QueryOperation::Stop, Some(execution_id)))
    }

    fn lookup_record(
        &self,
        operation: QueryOperation,
        execution_id: &QueryExecutionId,
    ) -> Option<QueryExecutionRecord> {
        match self.service.get_execution(execution_id) {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                tracing::error!(
                    execution_id = %execution_id,
                    operation = operation.as_str(),
                    "service returned no query execution record"
                );
                None
            }
            Err(error) => {
                let error = error.attribute(operation, Some(execution_id));
                tracing::error!(
                    execution_id = %execution_id,
                    operation = operation.as_str(),
                    kind = ?error.kind,
                    message = %error.message,
                    "failed to read query execution"
                );
                None
            }
        }
    }

    fn results_available(&self, execution_id: &QueryExecutionId) -> bool {
        match self.check_query_status(execution_id) {
            Some(state) if state.is_success() => true,
            Some(state) => {
                tracing::error!(
                    execution_id = %execution_id,
                    state = ?state,
                    "query execution has not succeeded, results unavailable"
                );
                false
            }
            None => {
                tracing::error!(
                    execution_id = %execution_id,
                    "query execution state is invalid, results unavailable"
                );
                false
            }
        }
    }
}
