mod args;
mod http;

use std::process::ExitCode;
use std::sync::Arc;

use serde_json::{Value, json};
use sqlpoll_core::lifecycle::{ManagerConfig, PollOutcome, QueryLifecycleManager};
use sqlpoll_core::logging::init_logging;
use sqlpoll_core::models::{CoreError, CoreErrorKind, QueryExecutionId, QueryOperation};
use sqlpoll_core::orchestration::{PollTaskSnapshot, PollTaskStatus, PollingRuntime};

use crate::args::{CliArgs, Command, ENDPOINT_ENV, USAGE, WaitOptions, parse_args};
use crate::http::{DEFAULT_HTTP_TIMEOUT, HttpQueryService};

type Manager = QueryLifecycleManager<HttpQueryService>;

fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(error) => {
            eprintln!("error: {}", error.message);
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    if args.command == Command::Help {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    if let Err(error) = init_logging("info") {
        eprintln!("warning: {}", error.message);
    }

    match run(args).and_then(|output| render(&output)) {
        Ok(rendered) => {
            println!("{rendered}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            tracing::error!(
                operation = ?error.operation,
                execution_id = ?error.execution_id,
                kind = ?error.kind,
                "command failed"
            );
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: CliArgs) -> Result<Value, CoreError> {
    let base = match &args.config_path {
        Some(path) => load_config(path)?,
        None => ManagerConfig::default(),
    };
    let config = args.manager_config(base);

    let endpoint = args
        .endpoint
        .clone()
        .or_else(|| std::env::var(ENDPOINT_ENV).ok())
        .filter(|endpoint| !endpoint.trim().is_empty())
        .ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::InvalidArgument,
                format!("no service endpoint: pass --endpoint or set {ENDPOINT_ENV}"),
            )
        })?;

    let service = HttpQueryService::new(&endpoint, DEFAULT_HTTP_TIMEOUT)?;
    let manager = Arc::new(QueryLifecycleManager::with_config(service, config));
    execute(manager, args.command)
}

fn execute(manager: Arc<Manager>, command: Command) -> Result<Value, CoreError> {
    match command {
        Command::Run { request, wait } => {
            let execution_id = manager.run_query(request)?;
            match wait {
                Some(wait) => {
                    let snapshot = wait_for_poll(manager.clone(), execution_id.clone(), wait)?;
                    Ok(json!({
                        "QueryExecutionId": execution_id,
                        "Poll": poll_json(&snapshot)?,
                    }))
                }
                None => Ok(json!({ "QueryExecutionId": execution_id })),
            }
        }
        Command::Status(execution_id) => {
            let state = manager.check_query_status(&execution_id);
            Ok(json!({ "QueryExecutionId": execution_id, "State": state }))
        }
        Command::Reason(execution_id) => {
            let reason = manager.get_state_change_reason(&execution_id);
            Ok(json!({ "QueryExecutionId": execution_id, "StateChangeReason": reason }))
        }
        Command::Poll { execution_id, wait } => {
            let snapshot = wait_for_poll(manager, execution_id.clone(), wait)?;
            Ok(json!({
                "QueryExecutionId": execution_id,
                "Poll": poll_json(&snapshot)?,
            }))
        }
        Command::Results {
            execution_id,
            next_token,
            max_results,
        } => {
            let page = manager.get_query_results(&execution_id, next_token.as_deref(), max_results)?;
            Ok(json!({ "QueryExecutionId": execution_id, "Results": to_json(&page)? }))
        }
        Command::Pages {
            execution_id,
            pagination,
        } => {
            let result = match manager.get_query_results_paginator(&execution_id, pagination) {
                Some(pages) => Some(pages.build_full_result()?),
                None => None,
            };
            Ok(json!({ "QueryExecutionId": execution_id, "Results": to_json(&result)? }))
        }
        Command::Location(execution_id) => {
            let location = manager.get_output_location(&execution_id)?;
            Ok(json!({ "QueryExecutionId": execution_id, "OutputLocation": location }))
        }
        Command::Stop(execution_id) => manager.stop_query(&execution_id),
        Command::Help => Ok(Value::String(USAGE.to_string())),
    }
}

/// Runs the poll on the blocking pool so `--timeout` can abandon the wait.
fn wait_for_poll(
    manager: Arc<Manager>,
    execution_id: QueryExecutionId,
    wait: WaitOptions,
) -> Result<PollTaskSnapshot, CoreError> {
    let tokio_rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("failed to create tokio runtime: {error}"),
            )
            .operation(QueryOperation::Poll)
        })?;

    let polling = PollingRuntime::new(manager);
    let result = tokio_rt.block_on(async {
        let task_id = polling.spawn(execution_id, wait.max_attempts).await?;
        polling.wait_for_terminal(task_id, wait.timeout).await?;
        polling.remove_finished(task_id).await
    });

    // A timed-out poll keeps a blocking thread busy; do not wait for it.
    tokio_rt.shutdown_background();
    result
}

fn poll_json(snapshot: &PollTaskSnapshot) -> Result<Value, CoreError> {
    if snapshot.status == PollTaskStatus::Failed {
        return Err(CoreError::new(
            CoreErrorKind::Internal,
            snapshot
                .error_message
                .clone()
                .unwrap_or_else(|| "poll task failed".to_string()),
        )
        .operation(QueryOperation::Poll)
        .execution_id(&snapshot.execution_id));
    }

    let outcome = snapshot.outcome.map(outcome_json);
    Ok(outcome.unwrap_or(Value::Null))
}

fn outcome_json(outcome: PollOutcome) -> Value {
    json!({
        "State": outcome.state(),
        "Terminal": outcome.is_terminal(),
        "Attempts": outcome.attempts,
    })
}

fn load_config(path: &str) -> Result<ManagerConfig, CoreError> {
    let raw = std::fs::read_to_string(path).map_err(|error| {
        CoreError::new(
            CoreErrorKind::InvalidArgument,
            format!("failed to read config file '{path}': {error}"),
        )
    })?;
    ManagerConfig::from_json_str(&raw)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, CoreError> {
    serde_json::to_value(value).map_err(|error| {
        CoreError::new(
            CoreErrorKind::Internal,
            format!("failed to serialize output: {error}"),
        )
    })
}

fn render(output: &Value) -> Result<String, CoreError> {
    serde_json::to_string_pretty(output).map_err(|error| {
        CoreError::new(
            CoreErrorKind::Internal,
            format!("failed to render output: {error}"),
        )
    })
}
